//! Connection registry and audience fan-out.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::polls::ConnectionId;
use crate::session::{Audience, EventSink, Role, ServerEvent};

/// Outbound queue of one connection; frames are pre-serialized JSON.
pub type Outbox = mpsc::UnboundedSender<Arc<String>>;

#[derive(Debug)]
struct ClientConnection {
    tx: Outbox,
    teacher: bool,
    student: bool,
}

impl ClientConnection {
    fn matches(&self, audience: &Audience) -> bool {
        match audience {
            Audience::Teachers => self.teacher,
            Audience::Students => self.student,
            Audience::Everyone => true,
            // Handled by direct lookup
            Audience::Connection(_) => false,
        }
    }
}

/// Open connections and their audience membership.
#[derive(Debug, Default)]
pub struct Hub {
    connections: RwLock<HashMap<ConnectionId, ClientConnection>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection_id: ConnectionId, tx: Outbox) {
        self.connections.write().insert(
            connection_id,
            ClientConnection {
                tx,
                teacher: false,
                student: false,
            },
        );
    }

    /// Drop a connection and its memberships. Idempotent.
    pub fn unregister(&self, connection_id: &ConnectionId) {
        self.connections.write().remove(connection_id);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    pub fn has_role(&self, connection_id: &ConnectionId, role: Role) -> bool {
        self.connections
            .read()
            .get(connection_id)
            .map(|conn| match role {
                Role::Teacher => conn.teacher,
                Role::Student => conn.student,
            })
            .unwrap_or(false)
    }
}

impl EventSink for Hub {
    fn join(&self, connection_id: &ConnectionId, role: Role) {
        let mut connections = self.connections.write();
        let Some(conn) = connections.get_mut(connection_id) else {
            warn!(conn_id = %connection_id, ?role, "join for unknown connection");
            return;
        };
        match role {
            Role::Teacher => conn.teacher = true,
            Role::Student => conn.student = true,
        }
    }

    fn send(&self, audience: Audience, event: ServerEvent) {
        let frame = match serde_json::to_string(&event) {
            Ok(json) => Arc::new(json),
            Err(err) => {
                warn!(event = event.name(), error = %err, "failed to serialize event");
                return;
            }
        };

        let connections = self.connections.read();
        let mut recipients = 0usize;
        if let Audience::Connection(connection_id) = &audience {
            if let Some(conn) = connections.get(connection_id) {
                if conn.tx.send(frame).is_ok() {
                    recipients += 1;
                }
            }
        } else {
            for (connection_id, conn) in connections.iter() {
                if !conn.matches(&audience) {
                    continue;
                }
                if conn.tx.send(Arc::clone(&frame)).is_ok() {
                    recipients += 1;
                } else {
                    debug!(conn_id = %connection_id, "outbox closed, event dropped");
                }
            }
        }
        debug!(event = event.name(), ?audience, recipients, "event delivered");
    }
}
