use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::classifier::provider_status;
use crate::core::errors::ApiError;
use crate::state::ChatbotState;
use crate::store::Sender;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub conversation_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub conversation_id: String,
    pub response: String,
    pub timestamp: String,
    pub model_used: String,
}

#[derive(Debug, Serialize)]
pub struct MessageRecord {
    pub sender: Sender,
    pub text: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ConversationHistoryResponse {
    pub conversation_id: String,
    pub messages: Vec<MessageRecord>,
    pub message_count: usize,
    pub created_at: String,
    pub updated_at: String,
}

pub fn pipeline_graph() -> Value {
    json!({
        "nodes": ["load_history", "generate_response", "persist_turn"],
        "entry_point": "load_history",
        "flow": "load_history → generate_response → persist_turn → END",
        "description": "Chatbot workflow: replay stored turns, generate a reply, store the exchange atomically",
        "mermaid": "graph LR\n    START([START]) --> load[Load History]\n    load --> generate[Generate Response]\n    generate --> persist[Persist Turn]\n    persist --> END([END])",
    })
}

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "message": "Chatbot API",
        "version": env!("CARGO_PKG_VERSION"),
        "pipeline": pipeline_graph(),
        "endpoints": {
            "chat": "/chat - POST: Send a message and get a response",
            "history": "/history/{conversation_id} - GET: Get conversation history",
            "health": "/health - GET: Health check",
            "graph": "/graph - GET: View pipeline structure",
        },
    }))
}

pub async fn health(State(state): State<Arc<ChatbotState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "chatbot-api",
        "model": state.pipeline.settings().model,
        "provider_status": provider_status(state.pipeline.provider_reachable().await),
    }))
}

pub async fn graph() -> impl IntoResponse {
    Json(pipeline_graph())
}

pub async fn chat(
    State(state): State<Arc<ChatbotState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reply = state
        .pipeline
        .chat(&payload.conversation_id, &payload.message)
        .await?;

    Ok(Json(ChatResponse {
        conversation_id: reply.conversation_id,
        response: reply.response,
        timestamp: reply.timestamp,
        model_used: reply.model_used,
    }))
}

pub async fn conversation_history(
    State(state): State<Arc<ChatbotState>>,
    Path(conversation_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let history = state.pipeline.history(&conversation_id).await?;

    let messages: Vec<MessageRecord> = history
        .messages
        .into_iter()
        .map(|m| MessageRecord {
            sender: m.sender,
            text: m.text,
            timestamp: m.timestamp,
        })
        .collect();

    Ok(Json(ConversationHistoryResponse {
        conversation_id: history.conversation.id,
        message_count: messages.len(),
        messages,
        created_at: history.conversation.created_at,
        updated_at: history.conversation.updated_at,
    }))
}
