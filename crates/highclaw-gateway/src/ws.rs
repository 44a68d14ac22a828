// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket transport for JSON-RPC.
//!
//! Each text frame carries one request (see [`crate::rpc`]). Requests run on
//! their own tasks, so a slow `chat.send` does not block later frames;
//! responses may therefore arrive out of order and are matched by `id`.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::rpc;
use crate::server::GatewayState;

/// Outbound frames buffered per connection.
const WRITE_QUEUE: usize = 64;

/// WebSocket upgrade handler. Authentication already happened in the route
/// middleware.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle an individual WebSocket connection.
///
/// The writer task drains an mpsc queue into the socket; the reader loop
/// parses frames and spawns one dispatch task per request.
async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::debug!(conn_id = %conn_id, "websocket connected");

    let (tx, mut rx) = mpsc::channel::<String>(WRITE_QUEUE);

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_receiver.next().await {
        match msg {
            Message::Text(text) => {
                let frame: &str = &text;
                let frame = frame.to_owned();
                let state = state.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let Some(response) = rpc::handle_frame(&state, &frame).await else {
                        return;
                    };
                    match serde_json::to_string(&response) {
                        Ok(encoded) => {
                            let _ = tx.send(encoded).await;
                        }
                        Err(e) => tracing::warn!(error = %e, "failed to encode RPC response"),
                    }
                });
            }
            Message::Close(_) => break,
            _ => {} // Binary frames are ignored; ping/pong is handled by axum.
        }
    }

    tracing::debug!(conn_id = %conn_id, "websocket closed");
    writer.abort();
}
