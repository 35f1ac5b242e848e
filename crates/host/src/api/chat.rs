//! Synchronous chat endpoint: run a full turn, return the aggregated
//! assistant text.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use rh_domain::RESERVED_SESSION;

use crate::runtime::bridge;
use crate::runtime::events::HostEvent;
use crate::state::AppState;

use super::error_response;

#[derive(Debug, Deserialize)]
pub struct ChatSyncRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

pub async fn chat_sync(
    State(state): State<AppState>,
    Json(body): Json<ChatSyncRequest>,
) -> impl IntoResponse {
    if body.message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "message must not be empty");
    }
    let session_id = body
        .session_id
        .unwrap_or_else(|| RESERVED_SESSION.to_owned());

    let mut rx = match bridge::submit_turn(&state, &session_id, &body.message) {
        Ok(rx) => rx,
        Err(busy) => return error_response(StatusCode::TOO_MANY_REQUESTS, busy.to_string()),
    };

    let mut text = String::new();
    let mut last_tool = String::new();
    let mut errors = Vec::new();
    while let Some(event) = rx.recv().await {
        match event {
            HostEvent::Delta { content } => text.push_str(&content),
            HostEvent::Tool { content, .. } => last_tool = content,
            HostEvent::Error { content } => errors.push(content),
            HostEvent::Status { .. } | HostEvent::Done => {}
        }
    }

    if !errors.is_empty() {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, errors.join("; "));
    }

    // No prose? Fall back to the last tool output so the caller still
    // sees what happened.
    let content = if text.trim().is_empty() { last_tool } else { text };
    Json(serde_json::json!({
        "status": "success",
        "session_id": session_id,
        "content": content,
    }))
    .into_response()
}
