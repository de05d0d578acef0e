//! WebSocket progress stream
//!
//! Each connection subscribes to the progress bus and forwards every update
//! as a JSON text frame. Inbound frames are tolerated and ignored. When the
//! bus evicts a slow connection its channel closes and the socket is torn
//! down; a broken socket likewise unsubscribes on the way out.

use crate::api::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;

/// `GET /ws`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (id, mut updates) = state.bus.subscribe();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(update) = update else {
                    // Evicted by the bus (slow consumer); close the socket.
                    break;
                };
                let text = match serde_json::to_string(&update) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to encode progress update");
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            inbound = stream.next() => {
                match inbound {
                    // Clients may send anything; unknown messages are ignored.
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                }
            }
        }
    }

    state.bus.unsubscribe(id);
    let _ = sink.close().await;
}
