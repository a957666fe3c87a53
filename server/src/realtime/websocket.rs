//! WebSocket endpoint for the live chat channel.
//!
//! One session per authenticated user: the upgrade registers an outbound
//! queue in the [`ConnectionRegistry`], then the read loop feeds inbound
//! JSON payloads to the dispatcher one at a time. A failed read is a normal
//! disconnect and triggers cleanup; per-event failures never end the
//! session.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    auth::AuthUser,
    db::DbPool,
    models::UserId,
    realtime::{dispatch, ConnectionRegistry},
};

/// Outbound events queued per connection before the socket applies
/// backpressure to the pushing side; beyond this, pushes are skipped.
const EVENT_BUFFER_SIZE: usize = 32;

/// WebSocket handler for the chat channel
/// GET /chat/ws
pub async fn chat_ws(
    ws: WebSocketUpgrade,
    State(pool): State<DbPool>,
    State(registry): State<Arc<ConnectionRegistry>>,
    auth_user: AuthUser,
) -> Response {
    let user_id = auth_user.user_id;
    info!(user_id, "Chat WebSocket upgrade accepted");

    ws.on_upgrade(move |socket| handle_socket(socket, pool, registry, user_id))
}

async fn handle_socket(
    socket: WebSocket,
    pool: DbPool,
    registry: Arc<ConnectionRegistry>,
    user_id: UserId,
) {
    let (mut sink, mut stream) = socket.split();

    let (tx, mut rx) = tokio::sync::mpsc::channel(EVENT_BUFFER_SIZE);
    let token = registry.register(user_id, tx);
    crate::metrics::update_connection_gauge(registry.connection_count());

    // Forward queued live pushes to the socket as JSON text frames.
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(error = %e, "Failed to encode chat event");
                    continue;
                }
            };
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    // Read loop: exactly one payload in flight per connection.
    let dispatch_pool = pool.clone();
    let dispatch_registry = registry.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = stream.next().await {
            match msg {
                Message::Text(text) => {
                    let payload: serde_json::Value = match serde_json::from_str(text.as_str()) {
                        Ok(payload) => payload,
                        Err(e) => {
                            debug!(user_id, error = %e, "Ignoring non-JSON chat frame");
                            continue;
                        }
                    };
                    let outcome =
                        dispatch(&dispatch_pool, &dispatch_registry, user_id, payload).await;
                    debug!(user_id, ?outcome, "Processed inbound chat event");
                }
                Message::Close(_) => break,
                // Ping/pong handled by axum; binary frames are not part of
                // the chat wire contract.
                _ => {}
            }
        }
    });

    // Either side finishing ends the session.
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    // Guarded cleanup: if a newer connection replaced this one, its entry
    // stays.
    registry.unregister_if_current(user_id, token);
    crate::metrics::update_connection_gauge(registry.connection_count());
    info!(user_id, "Chat WebSocket connection closed");
}
