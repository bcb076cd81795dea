use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::classifier::{Category, RetrievedExample};
use crate::core::errors::ApiError;
use crate::rag::{CollectionInfo, VectorIndex};
use crate::state::ClassifierState;
use crate::store::{ClassificationLog, ClassificationRecord};

const MAX_HISTORY_LIMIT: i64 = 1000;

#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    #[serde(alias = "message")]
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClassifyParams {
    #[serde(default)]
    pub include_examples: bool,
}

#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    pub predicted_label: u8,
    pub predicted_category: Category,
    pub confidence: f64,
    pub reasoning: String,
    pub retrieved_examples: usize,
    /// Seconds.
    pub retrieval_time: f64,
    /// Seconds.
    pub classification_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub examples: Option<Vec<RetrievedExample>>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_history_limit")]
    pub limit: i64,
}

fn default_history_limit() -> i64 {
    100
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub total: i64,
    pub records: Vec<ClassificationRecord>,
}

fn category_table() -> BTreeMap<String, &'static str> {
    Category::ALL
        .iter()
        .map(|c| (c.label().to_string(), c.name()))
        .collect()
}

pub fn pipeline_graph() -> Value {
    json!({
        "nodes": ["embed", "retrieve", "classify", "persist"],
        "entry_point": "embed",
        "flow": "embed → retrieve → classify → persist → END",
        "description": "Retrieval-augmented classification: similar labeled articles are used as few-shot examples",
        "mermaid": "graph LR\n    START([START]) --> embed[Embed]\n    embed --> retrieve[Retrieve]\n    retrieve --> classify[Classify]\n    classify --> persist[Persist]\n    persist --> END([END])",
    })
}

async fn collection_info(state: &ClassifierState) -> Result<Option<CollectionInfo>, ApiError> {
    let collection = &state.pipeline.settings().collection_name;
    Ok(state.pipeline.index().collection_info(collection).await?)
}

pub async fn root(State(state): State<Arc<ClassifierState>>) -> Result<impl IntoResponse, ApiError> {
    let vector_store = match collection_info(&state).await? {
        Some(info) => json!(info),
        None => json!({ "status": "not_initialized" }),
    };

    Ok(Json(json!({
        "message": "News Article Classifier API",
        "version": env!("CARGO_PKG_VERSION"),
        "pipeline": pipeline_graph(),
        "vector_store": vector_store,
        "endpoints": {
            "classify": "/classify - POST: Classify a news article",
            "history": "/history - GET: Retrieve classification history",
            "vectorstore": "/vectorstore/info - GET: Vector collection details",
            "graph": "/graph - GET: View pipeline structure",
            "health": "/health - GET: Health check",
        },
        "categories": category_table(),
    })))
}

pub async fn health(State(state): State<Arc<ClassifierState>>) -> impl IntoResponse {
    let (status, points) = match collection_info(&state).await {
        Ok(Some(info)) => ("ready", info.total_vectors),
        Ok(None) => ("not_initialized", 0),
        Err(err) => {
            tracing::warn!("vector store health check failed: {}", err);
            ("error", 0)
        }
    };

    Json(json!({
        "status": "healthy",
        "service": "news-classifier-api",
        "model": state.pipeline.settings().model,
        "vector_store_status": status,
        "vector_store_points": points,
        "provider_status": provider_status(state.pipeline.provider_reachable().await),
    }))
}

pub(crate) fn provider_status(reachable: bool) -> &'static str {
    if reachable {
        "reachable"
    } else {
        "unreachable"
    }
}

pub async fn graph() -> impl IntoResponse {
    Json(pipeline_graph())
}

pub async fn classify(
    State(state): State<Arc<ClassifierState>>,
    Query(params): Query<ClassifyParams>,
    Json(payload): Json<ClassifyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let max = state.pipeline.settings().max_input_length;
    let chars = payload.text.chars().count();
    if payload.text.trim().is_empty() || chars > max {
        return Err(ApiError::Unprocessable(format!(
            "text must be between 1 and {} characters",
            max
        )));
    }

    let outcome = state
        .pipeline
        .classify_and_record(&payload.text, &state.database)
        .await?;

    Ok(Json(ClassifyResponse {
        predicted_label: outcome.classification.category.label(),
        predicted_category: outcome.classification.category,
        confidence: outcome.classification.confidence,
        reasoning: outcome.classification.reasoning,
        retrieved_examples: outcome.examples.len(),
        retrieval_time: outcome.retrieval_time.as_secs_f64(),
        classification_time: outcome.classification_time.as_secs_f64(),
        examples: params.include_examples.then_some(outcome.examples),
    }))
}

pub async fn vectorstore_info(
    State(state): State<Arc<ClassifierState>>,
) -> Result<impl IntoResponse, ApiError> {
    let settings = state.pipeline.settings();
    let body = match collection_info(&state).await? {
        Some(info) => json!({
            "collection_name": info.name,
            "total_vectors": info.total_vectors,
            "vector_dimension": info.dimension,
            "status": info.status,
        }),
        None => json!({
            "collection_name": settings.collection_name,
            "total_vectors": 0,
            "vector_dimension": settings.embedding_dimension,
            "status": "not_initialized",
        }),
    };
    Ok(Json(body))
}

pub async fn history(
    State(state): State<Arc<ClassifierState>>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, ApiError> {
    if params.skip < 0 {
        return Err(ApiError::Unprocessable("skip must be >= 0".to_string()));
    }
    if !(1..=MAX_HISTORY_LIMIT).contains(&params.limit) {
        return Err(ApiError::Unprocessable(format!(
            "limit must be between 1 and {}",
            MAX_HISTORY_LIMIT
        )));
    }

    let total = state.database.count().await?;
    let records = state.database.list(params.skip, params.limit).await?;
    Ok(Json(HistoryResponse { total, records }))
}
