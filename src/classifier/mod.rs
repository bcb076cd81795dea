//! Retrieval-augmented news classification.

pub mod category;
pub mod parse;
pub mod pipeline;
pub mod predictions;

pub use category::Category;
pub use parse::{parse_classification, Classification};
pub use pipeline::{ClassificationOutcome, ClassifierPipeline, RetrievedExample};
pub use predictions::{predict_csv, PredictionOptions, PredictionSummary};
