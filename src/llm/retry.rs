//! Bounded retry with exponential backoff and jitter around provider calls.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};

use super::provider::{LlmProvider, ProviderError};
use super::types::ChatRequest;
use crate::core::config::settings::ResilienceSettings;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total calls, first attempt included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &ResilienceSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
        }
    }

    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_backoff)
            .with_max_delay(self.max_backoff)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
            .with_jitter()
    }
}

fn log_retry(operation: &'static str) -> impl FnMut(&ProviderError, Duration) {
    move |err, delay| {
        tracing::warn!(
            operation,
            delay_ms = delay.as_millis() as u64,
            "provider call failed, retrying: {}",
            err
        );
    }
}

/// Wraps any provider so every call goes through a [`RetryPolicy`].
pub struct RetryingProvider {
    inner: Arc<dyn LlmProvider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn LlmProvider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl LlmProvider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        self.inner.health_check().await
    }

    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, ProviderError> {
        (|| self.inner.chat(request.clone(), model_id))
            .retry(self.policy.backoff())
            .when(ProviderError::is_retryable)
            .notify(log_retry("chat"))
            .await
    }

    async fn embed(
        &self,
        inputs: &[String],
        model_id: &str,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        (|| self.inner.embed(inputs, model_id))
            .retry(self.policy.backoff())
            .when(ProviderError::is_retryable)
            .notify(log_retry("embed"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use backon::BackoffBuilder;

    use super::*;
    use crate::testing::FlakyProvider;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[test]
    fn schedule_allows_one_retry_less_than_attempts() {
        assert_eq!(fast_policy(4).backoff().build().count(), 3);
        assert_eq!(fast_policy(1).backoff().build().count(), 0);
    }

    #[test]
    fn settings_never_disable_the_first_attempt() {
        let settings = ResilienceSettings {
            max_attempts: 0,
            ..ResilienceSettings::default()
        };
        assert_eq!(RetryPolicy::from_settings(&settings).max_attempts, 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let flaky = Arc::new(FlakyProvider::new(2, 503));
        let provider = RetryingProvider::new(flaky.clone(), fast_policy(3));

        let vectors = provider.embed(&["x".to_string()], "m").await.unwrap();

        assert_eq!(vectors.len(), 1);
        assert_eq!(flaky.calls(), 3);
    }

    #[tokio::test]
    async fn retries_stop_at_the_bound() {
        let flaky = Arc::new(FlakyProvider::new(5, 503));
        let provider = RetryingProvider::new(flaky.clone(), fast_policy(3));

        let err = provider.embed(&["x".to_string()], "m").await.unwrap_err();

        assert!(matches!(err, ProviderError::Status { status: 503, .. }));
        assert_eq!(flaky.calls(), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let flaky = Arc::new(FlakyProvider::new(5, 401));
        let provider = RetryingProvider::new(flaky.clone(), fast_policy(3));

        let err = provider
            .chat(ChatRequest::new(vec![]), "m")
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Status { status: 401, .. }));
        assert_eq!(flaky.calls(), 1);
    }
}
