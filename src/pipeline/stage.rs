// Per-request stage machine
// RECEIVED -> [EMBEDDING -> RETRIEVING | LOADING_HISTORY] -> GENERATING -> PERSISTING -> RESPONDED
// any stage -> FAILED

use std::future::Future;
use std::time::{Duration, Instant};

use serde::Serialize;
use uuid::Uuid;

use crate::core::errors::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Received,
    Embedding,
    Retrieving,
    LoadingHistory,
    Generating,
    Persisting,
    Responded,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Embedding => "embedding",
            Stage::Retrieving => "retrieving",
            Stage::LoadingHistory => "loading_history",
            Stage::Generating => "generating",
            Stage::Persisting => "persisting",
            Stage::Responded => "responded",
            Stage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Responded | Stage::Failed)
    }

    /// Whether `next` may directly follow `self`.
    pub fn allows(&self, next: Stage) -> bool {
        if next == Stage::Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Stage::Received, Stage::Embedding)
                | (Stage::Received, Stage::LoadingHistory)
                | (Stage::Embedding, Stage::Retrieving)
                | (Stage::Retrieving, Stage::Generating)
                | (Stage::LoadingHistory, Stage::Generating)
                | (Stage::Generating, Stage::Persisting)
                | (Stage::Generating, Stage::Responded)
                | (Stage::Persisting, Stage::Responded)
        )
    }
}

/// Tracks one request through its stages, enforcing the transition table and
/// a deadline per stage.
#[derive(Debug)]
pub struct RequestTrace {
    request_id: Uuid,
    pipeline: &'static str,
    current: Stage,
    visited: Vec<Stage>,
    started: Instant,
}

impl RequestTrace {
    pub fn new(pipeline: &'static str) -> Self {
        let request_id = Uuid::new_v4();
        tracing::debug!(%request_id, pipeline, "request received");
        Self {
            request_id,
            pipeline,
            current: Stage::Received,
            visited: vec![Stage::Received],
            started: Instant::now(),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn transition(&mut self, next: Stage) -> Result<(), PipelineError> {
        if !self.current.allows(next) {
            return Err(PipelineError::Internal(format!(
                "invalid stage transition {} -> {}",
                self.current.as_str(),
                next.as_str()
            )));
        }
        tracing::debug!(
            request_id = %self.request_id,
            pipeline = self.pipeline,
            from = self.current.as_str(),
            to = next.as_str(),
            "stage transition"
        );
        self.current = next;
        self.visited.push(next);
        Ok(())
    }

    /// Enters `stage` and drives `fut` under `timeout`. On error or timeout
    /// the trace moves to FAILED and the error is returned.
    pub async fn run<T, F>(
        &mut self,
        stage: Stage,
        timeout: Duration,
        fut: F,
    ) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        if let Err(err) = self.transition(stage) {
            self.fail(&err);
            return Err(err);
        }

        let result = match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout {
                stage: stage.as_str(),
                after: timeout,
            }),
        };

        if let Err(err) = &result {
            self.fail(err);
        }
        result
    }

    pub fn finish(&mut self) -> Result<(), PipelineError> {
        self.transition(Stage::Responded)?;
        tracing::info!(
            request_id = %self.request_id,
            pipeline = self.pipeline,
            elapsed_ms = self.elapsed().as_millis() as u64,
            "request completed"
        );
        Ok(())
    }

    fn fail(&mut self, err: &PipelineError) {
        let failed_in = self.current;
        if self.current.allows(Stage::Failed) {
            self.current = Stage::Failed;
            self.visited.push(Stage::Failed);
        }
        tracing::warn!(
            request_id = %self.request_id,
            pipeline = self.pipeline,
            stage = failed_in.as_str(),
            kind = err.kind(),
            trace = %self.trace_string(),
            "request failed: {}",
            err
        );
    }

    pub fn trace_string(&self) -> String {
        self.visited
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}
