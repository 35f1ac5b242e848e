//! Adapts the active LLM client's embeddings endpoint to the retrieval
//! store's [`Embedder`] trait.

use std::sync::Arc;

use parking_lot::RwLock;

use rh_domain::error::{Error, Result};
use rh_providers::LlmClient;
use rh_retrieval::Embedder;

/// Shared, swappable handle to the active LLM client. `None` until a
/// valid profile is configured.
pub type LlmHandle = Arc<RwLock<Option<Arc<dyn LlmClient>>>>;

pub struct ProviderEmbedder {
    llm: LlmHandle,
}

impl ProviderEmbedder {
    pub fn new(llm: LlmHandle) -> Self {
        Self { llm }
    }
}

#[async_trait::async_trait]
impl Embedder for ProviderEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let client = self
            .llm
            .read()
            .clone()
            .ok_or_else(|| Error::Retrieval("no LLM client configured".into()))?;
        client.embed(texts).await
    }
}
