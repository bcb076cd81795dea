//! Batch classification of a CSV file.

use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::path::Path;
use std::time::{Duration, Instant};

use futures_util::stream::{self, StreamExt};
use governor::{Quota, RateLimiter};

use super::category::Category;
use super::pipeline::ClassifierPipeline;
use crate::core::errors::PipelineError;

#[derive(Debug, Clone)]
pub struct PredictionOptions {
    /// Rows between output checkpoints.
    pub batch_size: usize,
    /// Rows classified concurrently.
    pub concurrency: usize,
    pub requests_per_second: u32,
}

impl Default for PredictionOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            concurrency: 1,
            requests_per_second: 2,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PredictionSummary {
    pub total: usize,
    pub classified: usize,
    pub failed: usize,
    pub distribution: BTreeMap<Category, usize>,
    pub elapsed: Duration,
}

struct PredictionTable {
    headers: csv::StringRecord,
    rows: Vec<csv::StringRecord>,
    text_col: usize,
    label_col: usize,
}

impl PredictionTable {
    fn read(path: &Path) -> Result<Self, PipelineError> {
        let mut reader = csv::Reader::from_path(path).map_err(|e| {
            PipelineError::Validation(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut headers = reader
            .headers()
            .map_err(|e| PipelineError::Validation(e.to_string()))?
            .clone();

        let text_col = headers.iter().position(|h| h == "Text").ok_or_else(|| {
            PipelineError::Validation(format!("{} has no Text column", path.display()))
        })?;
        let label_col = match headers.iter().position(|h| h == "Label") {
            Some(idx) => idx,
            None => {
                headers.push_field("Label");
                headers.len() - 1
            }
        };

        let rows = reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| PipelineError::Validation(e.to_string()))?;

        Ok(Self {
            headers,
            rows,
            text_col,
            label_col,
        })
    }

    fn text(&self, row: usize) -> &str {
        self.rows[row].get(self.text_col).unwrap_or_default()
    }

    /// Writes every row; rows without a prediction get an empty label.
    fn write(&self, path: &Path, labels: &[Option<Category>]) -> Result<(), PipelineError> {
        let mut writer = csv::Writer::from_path(path).map_err(PipelineError::storage)?;
        writer
            .write_record(&self.headers)
            .map_err(PipelineError::storage)?;

        for (row, label) in self.rows.iter().zip(labels) {
            let label = label.map(|c| c.label().to_string()).unwrap_or_default();
            let fields = (0..self.headers.len()).map(|col| {
                if col == self.label_col {
                    label.as_str()
                } else {
                    row.get(col).unwrap_or_default()
                }
            });
            writer.write_record(fields).map_err(PipelineError::storage)?;
        }

        writer.flush().map_err(PipelineError::storage)?;
        Ok(())
    }
}

/// Classifies every `Text` row of `input` and writes `output` with a `Label`
/// column, checkpointing after each batch. Failed rows are counted and left
/// unlabeled.
pub async fn predict_csv(
    pipeline: &ClassifierPipeline,
    input: &Path,
    output: &Path,
    options: &PredictionOptions,
) -> Result<PredictionSummary, PipelineError> {
    let started = Instant::now();
    let table = PredictionTable::read(input)?;
    let total = table.rows.len();
    tracing::info!(path = %input.display(), rows = total, "loaded articles to classify");

    let rate = NonZeroU32::new(options.requests_per_second.max(1)).unwrap_or(NonZeroU32::MIN);
    let limiter = RateLimiter::direct(Quota::per_second(rate));

    let batch_size = options.batch_size.max(1);
    let concurrency = options.concurrency.max(1);
    let mut labels: Vec<Option<Category>> = vec![None; total];
    let mut summary = PredictionSummary {
        total,
        ..PredictionSummary::default()
    };

    let indices: Vec<usize> = (0..total).collect();
    for batch in indices.chunks(batch_size) {
        let results: Vec<(usize, Result<Category, PipelineError>)> =
            stream::iter(batch.iter().copied())
                .map(|row| {
                    let limiter = &limiter;
                    let table = &table;
                    async move {
                        limiter.until_ready().await;
                        let result = pipeline
                            .classify(table.text(row))
                            .await
                            .map(|outcome| outcome.classification.category);
                        (row, result)
                    }
                })
                .buffered(concurrency)
                .collect()
                .await;

        for (row, result) in results {
            match result {
                Ok(category) => {
                    labels[row] = Some(category);
                    summary.classified += 1;
                    *summary.distribution.entry(category).or_default() += 1;
                    tracing::info!(
                        row = row + 1,
                        total,
                        label = category.label(),
                        category = category.name(),
                        "classified row"
                    );
                }
                Err(err) => {
                    summary.failed += 1;
                    tracing::warn!(row = row + 1, kind = err.kind(), "row failed: {}", err);
                }
            }
        }

        table.write(output, &labels)?;
        tracing::info!(
            path = %output.display(),
            done = summary.classified + summary.failed,
            total,
            "checkpoint saved"
        );
    }

    if total == 0 {
        table.write(output, &labels)?;
    }

    summary.elapsed = started.elapsed();
    Ok(summary)
}
