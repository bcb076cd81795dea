use std::sync::Arc;

use super::provider::{LlmProvider, ProviderError};
use crate::core::errors::PipelineError;

/// Turns text into fixed-dimension vectors through an [`LlmProvider`].
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn LlmProvider>,
    model: String,
    dimension: usize,
}

impl Embedder {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            provider,
            model: model.into(),
            dimension,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ProviderError::Decode("empty embedding response".to_string()).into())
    }

    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let vectors = self.provider.embed(texts, &self.model).await?;

        if vectors.len() != texts.len() {
            return Err(ProviderError::Decode(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            ))
            .into());
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(ProviderError::Decode(format!(
                "embedding dimension {} does not match configured {}",
                bad.len(),
                self.dimension
            ))
            .into());
        }

        Ok(vectors)
    }
}
