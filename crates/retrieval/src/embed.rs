use rh_domain::error::Result;

/// Text embedding backend. The production implementation adapts the LLM
/// provider's embeddings endpoint; tests supply deterministic stand-ins.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input, all the same length.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
