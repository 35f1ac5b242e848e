//! Sentinel management endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use rh_sentinel::SentinelKind;

use crate::state::AppState;

use super::error_response;

pub async fn list(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.sentinels.list())
}

pub async fn remove(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> impl IntoResponse {
    let kind: SentinelKind = match kind.parse() {
        Ok(k) => k,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    if state.sentinels.remove(kind, &id) {
        Json(serde_json::json!({"status": "deleted"})).into_response()
    } else {
        error_response(StatusCode::NOT_FOUND, format!("no {kind} sentinel '{id}'"))
    }
}

#[derive(Debug, Deserialize)]
pub struct FireHotkeyRequest {
    pub key_combo: String,
}

/// Deliver a hotkey press on behalf of the OS integration (or a test).
pub async fn fire_hotkey(
    State(state): State<AppState>,
    Json(body): Json<FireHotkeyRequest>,
) -> impl IntoResponse {
    if state.sentinels.fire_hotkey(&body.key_combo) {
        Json(serde_json::json!({"status": "fired"})).into_response()
    } else {
        error_response(
            StatusCode::NOT_FOUND,
            format!("no behavior sentinel matches '{}'", body.key_combo),
        )
    }
}
