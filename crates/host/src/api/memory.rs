//! Long-term memory inspection endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

use super::error_response;

pub async fn list(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.retrieval.export_all())
}

pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.retrieval.delete(&id) {
        Ok(true) => Json(serde_json::json!({"status": "deleted"})).into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, format!("no memory with id '{id}'")),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
