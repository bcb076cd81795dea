use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::config::settings::ServerSettings;
use crate::server::handlers::{chatbot, classifier};
use crate::state::{ChatbotState, ClassifierState};

/// Routes of the classifier service.
pub fn classifier_router(state: Arc<ClassifierState>, server: &ServerSettings) -> Router {
    Router::new()
        .route("/", get(classifier::root))
        .route("/health", get(classifier::health))
        .route("/graph", get(classifier::graph))
        .route("/classify", post(classifier::classify))
        .route("/vectorstore/info", get(classifier::vectorstore_info))
        .route("/history", get(classifier::history))
        .with_state(state)
        .layer(build_cors_layer(server))
        .layer(TraceLayer::new_for_http())
}

/// Routes of the chatbot service.
pub fn chatbot_router(state: Arc<ChatbotState>, server: &ServerSettings) -> Router {
    Router::new()
        .route("/", get(chatbot::root))
        .route("/health", get(chatbot::health))
        .route("/graph", get(chatbot::graph))
        .route("/chat", post(chatbot::chat))
        .route("/history/:conversation_id", get(chatbot::conversation_history))
        .with_state(state)
        .layer(build_cors_layer(server))
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(server: &ServerSettings) -> CorsLayer {
    let origins = resolve_allowed_origins(server);

    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            origins
                .into_iter()
                .filter_map(|origin| HeaderValue::from_str(&origin).ok())
                .collect::<Vec<_>>(),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
}

fn resolve_allowed_origins(server: &ServerSettings) -> Vec<String> {
    let origins = server
        .cors_allowed_origins
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| item.to_string())
        .collect::<Vec<_>>();

    if origins.is_empty() {
        return default_local_origins();
    }

    origins
}

fn default_local_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
        "http://localhost:8000".to_string(),
        "http://127.0.0.1".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "http://127.0.0.1:5173".to_string(),
        "http://127.0.0.1:8000".to_string(),
    ]
}
