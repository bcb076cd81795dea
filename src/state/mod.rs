use std::sync::Arc;
use std::time::Duration;

use crate::chat::ChatPipeline;
use crate::classifier::ClassifierPipeline;
use crate::core::config::Settings;
use crate::llm::{Embedder, LlmProvider, OpenAiProvider, RetryPolicy, RetryingProvider};
use crate::rag::SqliteVectorIndex;
use crate::store::Database;

pub mod error;

use error::InitializationError;

/// OpenAI client wrapped in the configured retry policy.
pub fn build_provider(settings: &Settings) -> Result<Arc<dyn LlmProvider>, InitializationError> {
    if settings.openai.api_key.trim().is_empty() {
        tracing::warn!("openai.api_key is empty; provider calls will be rejected");
    }
    let client = OpenAiProvider::new(
        &settings.openai.base_url,
        &settings.openai.api_key,
        Duration::from_secs(settings.openai.request_timeout_secs),
    )?;
    Ok(Arc::new(RetryingProvider::new(
        Arc::new(client),
        RetryPolicy::from_settings(&settings.resilience),
    )))
}

pub async fn open_vector_index(settings: &Settings) -> Result<Arc<SqliteVectorIndex>, InitializationError> {
    let index = SqliteVectorIndex::open(&settings.classifier.vector_store_path)
        .await
        .map_err(InitializationError::VectorIndex)?;
    Ok(Arc::new(index))
}

pub fn build_embedder(settings: &Settings, provider: Arc<dyn LlmProvider>) -> Embedder {
    Embedder::new(
        provider,
        settings.classifier.embedding_model.clone(),
        settings.classifier.embedding_dimension,
    )
}

pub fn build_classifier_pipeline(
    settings: &Settings,
    provider: Arc<dyn LlmProvider>,
    index: Arc<SqliteVectorIndex>,
) -> ClassifierPipeline {
    ClassifierPipeline::new(
        build_embedder(settings, provider.clone()),
        index,
        provider,
        settings.classifier.clone(),
        settings.resilience.stage_timeout(),
    )
}

/// Shared state of the classifier service.
#[derive(Clone)]
pub struct ClassifierState {
    pub pipeline: Arc<ClassifierPipeline>,
    pub database: Database,
    pub index: Arc<SqliteVectorIndex>,
}

impl ClassifierState {
    /// Opens the vector index and database and wires the pipeline.
    pub async fn initialize(settings: &Settings) -> Result<Arc<Self>, InitializationError> {
        let provider = build_provider(settings)?;
        let index = open_vector_index(settings).await?;
        let database = Database::connect(&settings.database)
            .await
            .map_err(InitializationError::Database)?;

        let pipeline = build_classifier_pipeline(settings, provider, index.clone());
        Ok(Arc::new(Self {
            pipeline: Arc::new(pipeline),
            database,
            index,
        }))
    }

    pub async fn shutdown(&self) {
        self.database.close().await;
        self.index.close().await;
        tracing::info!("classifier resources closed");
    }
}

/// Shared state of the chatbot service.
#[derive(Clone)]
pub struct ChatbotState {
    pub pipeline: Arc<ChatPipeline>,
    pub database: Database,
}

impl ChatbotState {
    pub async fn initialize(settings: &Settings) -> Result<Arc<Self>, InitializationError> {
        let provider = build_provider(settings)?;
        let database = Database::connect(&settings.database)
            .await
            .map_err(InitializationError::Database)?;

        let pipeline = ChatPipeline::new(
            provider,
            Arc::new(database.clone()),
            settings.chatbot.clone(),
            settings.resilience.stage_timeout(),
        );
        Ok(Arc::new(Self {
            pipeline: Arc::new(pipeline),
            database,
        }))
    }

    pub async fn shutdown(&self) {
        self.database.close().await;
        tracing::info!("chatbot resources closed");
    }
}
