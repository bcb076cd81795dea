//! Retrieval side of the classifier.
//!
//! This module provides:
//! - `VectorIndex`: labeled-example storage with cosine similarity search
//! - `SqliteVectorIndex`: the embedded reference backend
//! - `ClassificationContextBuilder`: few-shot prompt assembly from search hits
//! - `Indexer`: builds a collection from a training CSV

pub mod context_builder;
pub mod indexer;
pub mod sqlite;
pub mod store;

pub use context_builder::{ClassificationContextBuilder, ContextBuilderConfig};
pub use indexer::{IndexReport, Indexer};
pub use sqlite::SqliteVectorIndex;
pub use store::{CollectionInfo, LabeledExample, ScoredExample, VectorIndex};
