//! Session management endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use rh_domain::RESERVED_SESSION;

use crate::state::AppState;

use super::{domain_error, error_response};

pub async fn list(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.transcripts.list_sessions())
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub session_id: String,
}

pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateRequest>,
) -> impl IntoResponse {
    if body.session_id.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "session_id must not be empty");
    }
    // Sessions materialize on first write; an empty clear creates one.
    match state.transcripts.clear(&body.session_id) {
        Ok(()) => Json(serde_json::json!({
            "status": "created",
            "id": body.session_id,
        }))
        .into_response(),
        Err(e) => domain_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub new_name: String,
}

pub async fn rename(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<RenameRequest>,
) -> impl IntoResponse {
    if session_id == RESERVED_SESSION {
        return error_response(StatusCode::FORBIDDEN, "the main session cannot be renamed");
    }
    match state.transcripts.rename(&session_id, &body.new_name) {
        Ok(()) => Json(serde_json::json!({
            "status": "renamed",
            "id": body.new_name,
        }))
        .into_response(),
        Err(e) => domain_error(e),
    }
}

pub async fn remove(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.transcripts.delete(&session_id) {
        Ok(true) => Json(serde_json::json!({"status": "deleted"})).into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "session not found"),
        Err(e) => domain_error(e),
    }
}

pub async fn clear(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.transcripts.clear(&session_id) {
        Ok(()) => Json(serde_json::json!({"status": "cleared"})).into_response(),
        Err(e) => domain_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let session = query
        .session_id
        .unwrap_or_else(|| RESERVED_SESSION.to_owned());
    Json(state.transcripts.read(&session))
}
