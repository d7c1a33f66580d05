//! WebSocket transport
//!
//! One task per direction: the reader parses client events and feeds the
//! session, the writer drains the connection's outbox into the socket.

pub mod hub;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use hub::{Hub, Outbox};

use super::AppState;
use crate::metrics::STD_METRICS;
use crate::polls::ConnectionId;
use crate::session::{Audience, ClientEvent, EventSink, ServerEvent};

/// Upgrade `GET /ws` to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = ConnectionId::generate();
    let (tx, mut rx) = mpsc::unbounded_channel::<Arc<String>>();
    state.hub.register(connection_id.clone(), tx);
    STD_METRICS.ws_connections_active.inc();
    info!(conn_id = %connection_id, "client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_tx.send(Message::Text(frame.as_str().into())).await.is_err() {
                break;
            }
        }
    });

    let reader_state = state.clone();
    let reader_id = connection_id.clone();
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => dispatch_frame(&reader_state, &reader_id, text.as_str()),
                Message::Close(_) => break,
                // Pings are answered by axum
                _ => {}
            }
        }
    });

    stop_both(writer, reader).await;

    state.session.disconnect(&connection_id);
    state.hub.unregister(&connection_id);
    STD_METRICS.ws_connections_active.dec();
    info!(conn_id = %connection_id, "client disconnected");
}

/// Wait for either task to finish, then abort the other and wait for it to
/// stop. No frame is dispatched once this returns.
async fn stop_both(mut writer: JoinHandle<()>, mut reader: JoinHandle<()>) {
    tokio::select! {
        _ = &mut writer => {
            reader.abort();
            let _ = reader.await;
        }
        _ = &mut reader => {
            writer.abort();
            let _ = writer.await;
        }
    }
}

/// Parse one text frame and apply it. Malformed frames are answered with an
/// `error` event to the sender only.
pub(crate) fn dispatch_frame(state: &AppState, connection_id: &ConnectionId, text: &str) {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => state.session.handle(connection_id, event),
        Err(err) => {
            warn!(conn_id = %connection_id, error = %err, "invalid client message");
            debug!(conn_id = %connection_id, frame = text, "rejected frame");
            state.hub.send(
                Audience::Connection(connection_id.clone()),
                ServerEvent::error(format!("invalid message: {}", err)),
            );
        }
    }
}
