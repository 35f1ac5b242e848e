//! WebSocket endpoint for interactive clients.
//!
//! Inbound frames are JSON `{message, session_id?, id?}`. The literal
//! message `"/stop"` cancels the session's running turn and is acked
//! immediately. Anything else starts a turn; its events broadcast to
//! every connected client tagged with the session id, and the original
//! `id` is echoed on the initial user ack.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use rh_domain::RESERVED_SESSION;

use crate::runtime::bridge;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct InboundFrame {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (client_id, mut broadcast_rx) = state.clients.register();

    // Outbound: drain hub broadcasts into this socket.
    let writer = tokio::spawn(async move {
        while let Some(event) = broadcast_rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Inbound loop.
    while let Some(Ok(frame)) = stream.next().await {
        let Message::Text(text) = frame else {
            continue;
        };
        let inbound: InboundFrame = match serde_json::from_str(&text) {
            Ok(f) => f,
            Err(e) => {
                state.clients.broadcast(serde_json::json!({
                    "type": "error",
                    "content": format!("invalid message: {e}"),
                }));
                continue;
            }
        };
        let session_id = inbound
            .session_id
            .unwrap_or_else(|| RESERVED_SESSION.to_owned());

        if inbound.message == "/stop" {
            bridge::cancel(&state, Some(&session_id));
            state.clients.broadcast(serde_json::json!({
                "type": "status",
                "content": "Interrupt signal sent.",
                "session_id": session_id,
            }));
            continue;
        }

        // Ack the user message, echoing the client-supplied id.
        let mut ack = serde_json::json!({
            "type": "user",
            "content": inbound.message,
            "session_id": session_id,
        });
        if let Some(id) = &inbound.id {
            ack["id"] = serde_json::Value::String(id.clone());
        }
        state.clients.broadcast(ack);

        match bridge::submit_turn(&state, &session_id, &inbound.message) {
            Ok(rx) => {
                let state = state.clone();
                let session = session_id.clone();
                tokio::spawn(async move {
                    bridge::pump_to_clients(&state, &session, rx).await;
                });
            }
            Err(busy) => {
                state.clients.broadcast(serde_json::json!({
                    "type": "error",
                    "content": busy.to_string(),
                    "session_id": session_id,
                }));
            }
        }
    }

    writer.abort();
    state.clients.unregister(client_id);
}
