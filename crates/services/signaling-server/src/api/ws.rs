//! WebSocket transport
//!
//! Each upgraded socket becomes one endpoint. Inbound text frames are handed
//! to the coordinator in arrival order; a forward task drains the endpoint's
//! mailbox into the socket. When the mailbox closes (the sweeper evicted the
//! endpoint) the socket is closed too.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;

use super::AppState;
use crate::coordinator::{Connection, SessionCoordinator};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let max = state.config.limits.max_message_bytes;
    ws.max_message_size(max)
        .max_frame_size(max)
        .on_upgrade(move |socket| handle_socket(socket, state.coordinator))
}

async fn handle_socket(socket: WebSocket, coordinator: Arc<SessionCoordinator>) {
    let Connection {
        guard,
        mut outbound,
    } = coordinator.connect();
    let id = guard.id().to_string();

    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut forward_task = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let json = match message.to_json() {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("Failed to serialize outbound message: {}", e);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json)).await.is_err() {
                return;
            }
        }
        // Mailbox dropped by the coordinator
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    loop {
        tokio::select! {
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => coordinator.handle_text(&id, &text),
                Some(Ok(Message::Close(_))) | None => {
                    tracing::debug!(endpoint_id = %id, "WebSocket closed by client");
                    break;
                }
                Some(Err(e)) => {
                    tracing::warn!(endpoint_id = %id, "WebSocket error: {}", e);
                    break;
                }
                // Binary frames carry nothing; ping/pong is answered by the socket
                Some(Ok(_)) => {
                    coordinator.touch(&id);
                }
            },
            _ = &mut forward_task => {
                tracing::debug!(endpoint_id = %id, "Outbound side finished, closing");
                break;
            }
        }
    }

    forward_task.abort();
    // Runs the disconnect cleanup
    drop(guard);
}
