use thiserror::Error;

use crate::core::config::ConfigError;
use crate::core::errors::PipelineError;
use crate::llm::ProviderError;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to initialize LLM provider: {0}")]
    Provider(#[from] ProviderError),

    #[error("Failed to open vector index: {0}")]
    VectorIndex(#[source] PipelineError),

    #[error("Failed to connect to database: {0}")]
    Database(#[source] PipelineError),
}
