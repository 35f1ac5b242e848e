//! HTTP + WebSocket surface.
//!
//! Errors use the `{status, detail}` envelope with conventional codes:
//! 400 invalid, 403 forbidden, 404 missing, 500 internal.

pub mod chat;
pub mod config_api;
pub mod memory;
pub mod sentinels;
pub mod sessions;
pub mod skills;
pub mod ws;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use rh_domain::error::Error;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/status", get(status))
        .route("/api/chat/sync", post(chat::chat_sync))
        .route("/api/sessions", get(sessions::list).post(sessions::create))
        .route(
            "/api/sessions/:id",
            axum::routing::patch(sessions::rename).delete(sessions::remove),
        )
        .route("/api/sessions/:id/clear", post(sessions::clear))
        .route("/api/history", get(sessions::history))
        .route("/api/memory", get(memory::list))
        .route("/api/memory/:id", delete(memory::remove))
        .route("/api/skills", get(skills::list))
        .route("/api/skills/learn", post(skills::learn))
        .route("/api/skills/:name", delete(skills::remove))
        .route("/api/sentinels", get(sentinels::list))
        .route("/api/sentinels/:kind/:id", delete(sentinels::remove))
        .route("/api/sentinels/fire_hotkey", post(sentinels::fire_hotkey))
        .route(
            "/api/config",
            get(config_api::get_config).put(config_api::put_config),
        )
        .route(
            "/api/profiles",
            get(config_api::get_profiles).put(config_api::put_profiles),
        )
        .route(
            "/api/config/active_profile",
            post(config_api::switch_profile),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn status(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "llm_ready": state.llm.read().is_some(),
        "clients": state.clients.client_count(),
        "memories": state.retrieval.count(),
        "sessions": state.transcripts.list_sessions().len(),
    }))
}

/// The `{status, detail}` error envelope.
pub(crate) fn error_response(code: StatusCode, detail: impl Into<String>) -> axum::response::Response {
    (
        code,
        Json(serde_json::json!({
            "status": "error",
            "detail": detail.into(),
        })),
    )
        .into_response()
}

/// Map a domain error to its HTTP code.
pub(crate) fn domain_error(err: Error) -> axum::response::Response {
    let code = match &err {
        Error::Forbidden(_) => StatusCode::FORBIDDEN,
        Error::NotFound(_) | Error::SkillNotFound(_) => StatusCode::NOT_FOUND,
        Error::AlreadyExists(_) | Error::Config(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(code, err.to_string())
}
