use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::locks::ConversationLocks;
use super::prompt::build_chat_messages;
use crate::core::config::settings::ChatbotSettings;
use crate::core::errors::PipelineError;
use crate::llm::{ChatRequest, LlmProvider};
use crate::pipeline::{RequestTrace, Stage};
use crate::store::{now_timestamp, Conversation, ConversationStore, StoredMessage};

#[derive(Debug, Clone)]
pub struct ChatReply {
    pub request_id: Uuid,
    pub conversation_id: String,
    pub response: String,
    pub timestamp: String,
    pub model_used: String,
}

#[derive(Debug, Clone)]
pub struct ConversationHistory {
    pub conversation: Conversation,
    pub messages: Vec<StoredMessage>,
}

/// Load history, generate a reply, persist the turn. Turns on one
/// conversation are serialized.
pub struct ChatPipeline {
    provider: Arc<dyn LlmProvider>,
    store: Arc<dyn ConversationStore>,
    locks: ConversationLocks,
    settings: ChatbotSettings,
    stage_timeout: Duration,
}

impl ChatPipeline {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        store: Arc<dyn ConversationStore>,
        settings: ChatbotSettings,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            store,
            locks: ConversationLocks::new(),
            settings,
            stage_timeout,
        }
    }

    pub fn settings(&self) -> &ChatbotSettings {
        &self.settings
    }

    pub async fn provider_reachable(&self) -> bool {
        match self.provider.health_check().await {
            Ok(reachable) => reachable,
            Err(err) => {
                tracing::warn!(provider = self.provider.name(), "health check failed: {}", err);
                false
            }
        }
    }

    fn history_window(&self) -> Option<usize> {
        match self.settings.history_window {
            0 => None,
            n => Some(n),
        }
    }

    fn validate(&self, conversation_id: &str, message: &str) -> Result<(), PipelineError> {
        let id_len = conversation_id.chars().count();
        if conversation_id.trim().is_empty() || id_len > self.settings.max_conversation_id_length {
            return Err(PipelineError::Validation(format!(
                "conversation_id must be 1 to {} characters",
                self.settings.max_conversation_id_length
            )));
        }
        if message.trim().is_empty() {
            return Err(PipelineError::Validation("message must not be empty".to_string()));
        }
        Ok(())
    }

    pub async fn chat(
        &self,
        conversation_id: &str,
        message: &str,
    ) -> Result<ChatReply, PipelineError> {
        self.validate(conversation_id, message)?;

        let _turn = self.locks.acquire(conversation_id).await;
        let received_at = now_timestamp();
        let mut trace = RequestTrace::new("chatbot");
        let timeout = self.stage_timeout;

        let history = trace
            .run(
                Stage::LoadingHistory,
                timeout,
                self.store.load_messages(conversation_id, self.history_window()),
            )
            .await?;
        tracing::debug!(
            request_id = %trace.request_id(),
            conversation_id,
            replayed = history.len(),
            "loaded conversation history"
        );

        let request = ChatRequest::new(build_chat_messages(&history, message))
            .with_temperature(self.settings.temperature);
        let response = trace
            .run(Stage::Generating, timeout, async {
                let reply = self.provider.chat(request, &self.settings.model).await?;
                if reply.trim().is_empty() {
                    return Err(PipelineError::Parse("model returned an empty reply".to_string()));
                }
                Ok(reply)
            })
            .await?;

        let stored = trace
            .run(
                Stage::Persisting,
                timeout,
                self.store
                    .append_turn(
                        conversation_id,
                        message,
                        &received_at,
                        &response,
                        &self.settings.model,
                    ),
            )
            .await?;

        trace.finish()?;
        tracing::info!(
            request_id = %trace.request_id(),
            conversation_id,
            reply_chars = response.chars().count(),
            "chat turn stored"
        );

        Ok(ChatReply {
            request_id: trace.request_id(),
            conversation_id: conversation_id.to_string(),
            response,
            timestamp: stored.timestamp,
            model_used: self.settings.model.clone(),
        })
    }

    /// Full stored history. `NotFound` for an unknown conversation.
    pub async fn history(&self, conversation_id: &str) -> Result<ConversationHistory, PipelineError> {
        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| {
                PipelineError::NotFound(format!("Conversation '{}' not found", conversation_id))
            })?;
        let messages = self.store.load_messages(conversation_id, None).await?;

        Ok(ConversationHistory {
            conversation,
            messages,
        })
    }
}
