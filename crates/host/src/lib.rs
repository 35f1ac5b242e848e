//! The Resonance host process: agent orchestration, tool dispatch, the
//! concurrency bridge, and the HTTP/WebSocket API.

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod embedder;
pub mod notify;
pub mod runtime;
pub mod state;

pub use bootstrap::build_state;
pub use state::AppState;
