use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::category::Category;
use super::parse::{output_schema, parse_classification, Classification};
use crate::core::config::settings::ClassifierSettings;
use crate::core::errors::PipelineError;
use crate::llm::{ChatRequest, Embedder, LlmProvider};
use crate::pipeline::{RequestTrace, Stage};
use crate::rag::{ClassificationContextBuilder, ContextBuilderConfig, ScoredExample, VectorIndex};
use crate::store::{ClassificationLog, NewClassification};

/// Retrieved example as reported to clients and snapshotted in the log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedExample {
    pub text: String,
    pub label: u8,
    pub category: Category,
    pub score: f32,
}

impl From<&ScoredExample> for RetrievedExample {
    fn from(scored: &ScoredExample) -> Self {
        Self {
            text: scored.example.text.clone(),
            label: scored.example.label.label(),
            category: scored.example.label,
            score: scored.score,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassificationOutcome {
    pub request_id: Uuid,
    pub classification: Classification,
    pub examples: Vec<RetrievedExample>,
    pub retrieval_time: Duration,
    pub classification_time: Duration,
    pub total_time: Duration,
    /// Id of the persisted record, when the run was recorded.
    pub record_id: Option<i64>,
}

/// Embed, retrieve, generate and (optionally) persist one article.
pub struct ClassifierPipeline {
    embedder: Embedder,
    index: Arc<dyn VectorIndex>,
    provider: Arc<dyn LlmProvider>,
    context: ClassificationContextBuilder,
    settings: ClassifierSettings,
    stage_timeout: Duration,
}

impl ClassifierPipeline {
    pub fn new(
        embedder: Embedder,
        index: Arc<dyn VectorIndex>,
        provider: Arc<dyn LlmProvider>,
        settings: ClassifierSettings,
        stage_timeout: Duration,
    ) -> Self {
        let context = ClassificationContextBuilder::new(ContextBuilderConfig {
            example_chars: settings.example_chars,
            input_chars: settings.input_chars,
        });
        Self {
            embedder,
            index,
            provider,
            context,
            settings,
            stage_timeout,
        }
    }

    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Whether the completion backend answers its health probe.
    pub async fn provider_reachable(&self) -> bool {
        match self.provider.health_check().await {
            Ok(reachable) => reachable,
            Err(err) => {
                tracing::warn!(provider = self.provider.name(), "health check failed: {}", err);
                false
            }
        }
    }

    /// Classifies without writing anything.
    pub async fn classify(&self, text: &str) -> Result<ClassificationOutcome, PipelineError> {
        self.run(text, None).await
    }

    /// Classifies and inserts one record into `log`.
    pub async fn classify_and_record(
        &self,
        text: &str,
        log: &dyn ClassificationLog,
    ) -> Result<ClassificationOutcome, PipelineError> {
        self.run(text, Some(log)).await
    }

    fn validate(&self, text: &str) -> Result<(), PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::Validation("text must not be empty".to_string()));
        }
        let chars = text.chars().count();
        if chars > self.settings.max_input_length {
            return Err(PipelineError::Validation(format!(
                "text has {} characters, maximum is {}",
                chars, self.settings.max_input_length
            )));
        }
        Ok(())
    }

    async fn run(
        &self,
        text: &str,
        log: Option<&dyn ClassificationLog>,
    ) -> Result<ClassificationOutcome, PipelineError> {
        self.validate(text)?;

        let mut trace = RequestTrace::new("classifier");
        let timeout = self.stage_timeout;
        let started = Instant::now();

        let query = trace
            .run(Stage::Embedding, timeout, self.embedder.embed(text))
            .await?;
        let hits = trace
            .run(
                Stage::Retrieving,
                timeout,
                self.index.search(
                    &self.settings.collection_name,
                    &query,
                    self.settings.top_k,
                    self.settings.score_threshold,
                ),
            )
            .await?;
        let retrieval_time = started.elapsed();
        tracing::debug!(
            request_id = %trace.request_id(),
            retrieved = hits.len(),
            "retrieved similar examples"
        );

        let request = ChatRequest::new(self.context.build(text, &hits))
            .with_temperature(self.settings.temperature)
            .with_json_schema("classification_result", output_schema());

        let generation_started = Instant::now();
        let classification = trace
            .run(Stage::Generating, timeout, async {
                let raw = self.provider.chat(request, &self.settings.model).await?;
                parse_classification(&raw)
            })
            .await?;
        let classification_time = generation_started.elapsed();

        let mut outcome = ClassificationOutcome {
            request_id: trace.request_id(),
            classification,
            examples: hits.iter().map(RetrievedExample::from).collect(),
            retrieval_time,
            classification_time,
            total_time: started.elapsed(),
            record_id: None,
        };

        if let Some(log) = log {
            let record = self.record_for(text, &outcome)?;
            let id = trace
                .run(Stage::Persisting, timeout, log.insert(record))
                .await?;
            outcome.record_id = Some(id);
        }

        trace.finish()?;
        tracing::info!(
            request_id = %outcome.request_id,
            label = outcome.classification.category.label(),
            category = outcome.classification.category.name(),
            confidence = outcome.classification.confidence,
            examples = outcome.examples.len(),
            "classified article"
        );
        Ok(outcome)
    }

    fn record_for(
        &self,
        text: &str,
        outcome: &ClassificationOutcome,
    ) -> Result<NewClassification, PipelineError> {
        let snapshot: Value =
            serde_json::to_value(&outcome.examples).map_err(|e| PipelineError::Internal(e.to_string()))?;

        Ok(NewClassification {
            text: text.to_string(),
            predicted_label: outcome.classification.category.label(),
            predicted_category: outcome.classification.category.name().to_string(),
            confidence: outcome.classification.confidence,
            reasoning: outcome.classification.reasoning.clone(),
            retrieved_examples: snapshot,
            num_retrieved_examples: outcome.examples.len(),
            model_used: self.settings.model.clone(),
            pipeline_version: self.settings.pipeline_version.clone(),
            retrieval_time_ms: outcome.retrieval_time.as_millis() as u64,
            classification_time_ms: outcome.classification_time.as_millis() as u64,
            total_time_ms: outcome.total_time.as_millis() as u64,
        })
    }
}
