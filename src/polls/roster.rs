//! Student roster keyed by connection.

use super::model::{ConnectionId, Participant};
use std::collections::HashMap;

/// Connected students. Connection id is the only key; display names may repeat.
#[derive(Debug, Default)]
pub struct Roster {
    participants: HashMap<ConnectionId, Participant>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the participant for this connection.
    pub fn join(&mut self, connection_id: ConnectionId, display_name: impl Into<String>) {
        let participant = Participant {
            connection_id: connection_id.clone(),
            display_name: display_name.into(),
        };
        self.participants.insert(connection_id, participant);
    }

    /// Remove a participant. Absent ids are ignored.
    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<Participant> {
        self.participants.remove(connection_id)
    }

    pub fn size(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn has(&self, connection_id: &ConnectionId) -> bool {
        self.participants.contains_key(connection_id)
    }

    pub fn get(&self, connection_id: &ConnectionId) -> Option<&Participant> {
        self.participants.get(connection_id)
    }
}
