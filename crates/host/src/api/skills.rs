//! Skill management endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use crate::state::AppState;

use super::error_response;

pub async fn list(State(state): State<AppState>) -> impl IntoResponse {
    let skills: Vec<serde_json::Value> = state
        .skills
        .index()
        .into_iter()
        .map(|(name, description)| {
            serde_json::json!({
                "name": name,
                "description": description,
            })
        })
        .collect();
    Json(skills)
}

#[derive(Debug, Deserialize)]
pub struct LearnRequest {
    pub source: String,
}

pub async fn learn(
    State(state): State<AppState>,
    Json(body): Json<LearnRequest>,
) -> impl IntoResponse {
    if body.source.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "source must not be empty");
    }
    let (ok, message) = state.skills.learn(&body.source).await;
    if ok {
        Json(serde_json::json!({"status": "learned", "detail": message})).into_response()
    } else {
        error_response(StatusCode::BAD_REQUEST, message)
    }
}

pub async fn remove(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    if state.skills.delete(&name) {
        Json(serde_json::json!({"status": "deleted"})).into_response()
    } else {
        error_response(StatusCode::NOT_FOUND, format!("no skill named '{name}'"))
    }
}
