//! Shared types for the Resonance host: chat messages, tool schemas,
//! streaming events, cancellation tokens, and the common error enum.

pub mod cancel;
pub mod error;
pub mod message;
pub mod stream;

pub use cancel::CancelToken;
pub use error::{Error, Result};
pub use message::{ChatMessage, Role, ToolCallRequest, ToolDefinition};
pub use stream::{BoxStream, SearchStrategy, StreamEvent};

/// The reserved session every sentinel-driven turn runs against.
/// It is created on startup and can never be deleted.
pub const RESERVED_SESSION: &str = "resonance_main";
