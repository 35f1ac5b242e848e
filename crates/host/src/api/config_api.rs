//! Runtime configuration endpoints. Mutations persist to disk, swap the
//! in-memory snapshot, and refresh the LLM client; in-flight turns keep
//! the snapshot they started with.

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use crate::bootstrap::refresh_llm_client;
use crate::config::{HostConfig, ProfilesDoc};
use crate::state::AppState;

use super::domain_error;

pub async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    Json((*state.config.snapshot()).clone())
}

pub async fn put_config(
    State(state): State<AppState>,
    Json(body): Json<HostConfig>,
) -> impl IntoResponse {
    match state.config.update_config(body) {
        Ok(()) => {
            refresh_llm_client(&state);
            Json(serde_json::json!({"status": "updated"})).into_response()
        }
        Err(e) => domain_error(e),
    }
}

pub async fn get_profiles(State(state): State<AppState>) -> impl IntoResponse {
    // Strip API keys from the listing.
    let mut doc = (*state.config.profiles()).clone();
    for profile in doc.profiles.values_mut() {
        if !profile.api_key.is_empty() {
            profile.api_key = "***".to_owned();
        }
    }
    Json(doc)
}

pub async fn put_profiles(
    State(state): State<AppState>,
    Json(body): Json<ProfilesDoc>,
) -> impl IntoResponse {
    match state.config.update_profiles(body) {
        Ok(()) => {
            refresh_llm_client(&state);
            Json(serde_json::json!({"status": "updated"})).into_response()
        }
        Err(e) => domain_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct SwitchRequest {
    pub profile: String,
}

pub async fn switch_profile(
    State(state): State<AppState>,
    Json(body): Json<SwitchRequest>,
) -> impl IntoResponse {
    match state.config.switch_active_profile(&body.profile) {
        Ok(()) => {
            refresh_llm_client(&state);
            Json(serde_json::json!({
                "status": "switched",
                "active_profile": body.profile,
            }))
            .into_response()
        }
        Err(e) => domain_error(e),
    }
}
