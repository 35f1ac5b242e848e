//! LLM transport: the provider-agnostic [`LlmClient`] trait and the
//! OpenAI-compatible adapter (works against OpenAI, Ollama, vLLM,
//! LM Studio, and any other endpoint following the chat-completions
//! contract).

pub mod openai;
pub mod sse;
pub mod traits;

pub use openai::OpenAiCompatClient;
pub use traits::{ChatRequest, ChatResponse, LlmClient, ProviderProfile};
