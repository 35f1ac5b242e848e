//! Context assembly for the LLM: sliding-window slicing over the session
//! log plus deterministic repair of tool-call chains.
//!
//! Crashes and cancellations can leave an assistant tool-call request
//! without its tool responses, or a tool response whose request slid out
//! of the window. The sanitizer restores the wire invariant (every
//! tool-call id answered exactly once, in order) so the chat endpoint
//! never sees malformed history.

pub mod builder;
pub mod sanitize;

pub use builder::{build_context, messages_for_summary};
pub use sanitize::{sanitize, RECOVERY_NOTICE};
