//! Dashboard WebSocket endpoint
//!
//! Admin dashboards connect here and receive every `new_request` and
//! `status_update` event fired while they are connected. There is no
//! backlog; the socket is write-mostly and inbound frames are ignored
//! except as liveness signals.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};

use crate::state::AppState;
use crate::store::{DirectoryStore, WorkflowStore};

/// GET /ws
pub async fn dashboard_socket<S>(
    State(state): State<Arc<AppState<S>>>,
    ws: WebSocketUpgrade,
) -> Response
where
    S: DirectoryStore + WorkflowStore + 'static,
{
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket<S>(socket: WebSocket, state: Arc<AppState<S>>)
where
    S: DirectoryStore + WorkflowStore + 'static,
{
    let (id, mut events) = state.events.register();
    tracing::debug!(connection = id.0, "Dashboard connected");

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(payload) => {
                        if sink.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Dashboards only listen; drop pings and stray frames
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.events.unregister(id);
    tracing::debug!(connection = id.0, "Dashboard disconnected");
}
