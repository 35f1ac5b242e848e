use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events emitted during an LLM stream.
///
/// Tool-call fragments are keyed by their slot `index`: the endpoint sends
/// the id/name once, then argument text in chunks. The orchestrator owns a
/// small per-index assembler that concatenates `ToolCallDelta` payloads
/// until the stream ends.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// A text token chunk.
    #[serde(rename = "token")]
    Token { text: String },

    /// A tool call slot opened: id and name are known.
    #[serde(rename = "tool_call_started")]
    ToolCallStarted {
        index: u32,
        call_id: String,
        tool_name: String,
    },

    /// Incremental argument text for a tool call slot.
    #[serde(rename = "tool_call_delta")]
    ToolCallDelta { index: u32, delta: String },

    /// Stream is finished.
    #[serde(rename = "done")]
    Done { finish_reason: Option<String> },

    /// An error occurred during streaming.
    #[serde(rename = "error")]
    Error { message: String },
}

/// Retrieval strategy selector, read from config per turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    Semantic,
    HybridTime,
    #[default]
    HybridLexical,
}
