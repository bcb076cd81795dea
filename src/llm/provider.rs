use async_trait::async_trait;
use thiserror::Error;

use super::types::ChatRequest;
use crate::core::errors::PipelineError;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Whether a repeat of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport(_) => true,
            ProviderError::Status { status, .. } => {
                matches!(*status, 408 | 409 | 429) || *status >= 500
            }
            ProviderError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return ProviderError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            };
        }
        if err.is_decode() {
            return ProviderError::Decode(err.to_string());
        }
        ProviderError::Transport(err.to_string())
    }
}

impl From<ProviderError> for PipelineError {
    fn from(err: ProviderError) -> Self {
        PipelineError::Provider(err.to_string())
    }
}

/// Embedding and chat-completion backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "openai")
    fn name(&self) -> &str;

    /// check if the provider is reachable
    async fn health_check(&self) -> Result<bool, ProviderError>;

    /// chat completion (non-streaming), returns the assistant content
    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, ProviderError>;

    /// generate one embedding per input, in input order
    async fn embed(&self, inputs: &[String], model_id: &str)
        -> Result<Vec<Vec<f32>>, ProviderError>;
}
