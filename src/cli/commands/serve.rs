//! HTTP API hosting one chat session.
//!
//! Requests are served one at a time: the session sits behind a mutex, so a
//! chat turn completes before the next one starts.

use super::chat::{build_chat_engine, engine_config};
use crate::cli::Output;
use crate::config::Settings;
use crate::error::PlotlineError;
use crate::llm::ChatMessage;
use crate::rag::{ChatEngine, ChatResponse};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Shared application state.
struct AppState {
    session: Mutex<ChatEngine>,
}

/// Run the HTTP API server.
pub async fn run_serve(
    host: &str,
    port: u16,
    model: Option<String>,
    collection: Option<String>,
    mode: Option<String>,
    settings: Settings,
) -> anyhow::Result<()> {
    let config = engine_config(&settings, model, collection, mode)?;
    let engine = build_chat_engine(&config, settings).await?;

    let state = Arc::new(AppState {
        session: Mutex::new(engine),
    });

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Plotline API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    Output::kv("Model", &config.model);
    Output::kv("Collection", &config.collection);
    Output::kv("Chat mode", config.mode.as_str());
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Chat", "POST /chat");
    Output::kv("Reset", "POST /reset");
    Output::kv("Session", "GET  /session");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, router(state)).await?;

    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/reset", post(reset))
        .route("/session", get(session))
        .layer(cors)
        .with_state(state)
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Serialize)]
struct SessionResponse {
    model: String,
    collection: String,
    mode: String,
    history: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// A library error on its way to the client.
struct ApiError(PlotlineError);

impl From<PlotlineError> for ApiError {
    fn from(e: PlotlineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            warn!("Chat request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// Client errors for bad input, 502 when a backing service failed.
fn status_for(error: &PlotlineError) -> StatusCode {
    match error {
        PlotlineError::InvalidInput(_) | PlotlineError::ValueData(_) => StatusCode::BAD_REQUEST,
        PlotlineError::UnsupportedBackend(_) => StatusCode::UNPROCESSABLE_ENTITY,
        e if e.is_upstream() => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(PlotlineError::InvalidInput("message must not be empty".to_string()).into());
    }

    let mut engine = state.session.lock().await;
    let response = engine.chat(message).await?;
    info!("Answered with {} source nodes", response.source_nodes.len());
    Ok(Json(response))
}

async fn reset(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.session.lock().await.reset();
    Json(serde_json::json!({ "status": "reset" }))
}

async fn session(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    let engine = state.session.lock().await;
    Json(SessionResponse {
        model: engine.model_name().to_string(),
        collection: engine.collection().to_string(),
        mode: engine.mode().as_str().to_string(),
        history: engine.history().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RagPrompts;
    use crate::embedding::HashingEmbedder;
    use crate::llm::testing::ScriptedModel;
    use crate::rag::{ChatMode, ContextBuilder};
    use crate::vector_store::MemoryVectorStore;

    fn state(replies: &[&str]) -> Arc<AppState> {
        let store = Arc::new(MemoryVectorStore::new("movies"));
        let builder = ContextBuilder::new(store, Arc::new(HashingEmbedder::new(32)));
        let engine = ChatEngine::new(
            Arc::new(ScriptedModel::new(replies)),
            builder,
            ChatMode::Context,
            "You are a movie expert.",
            RagPrompts::default(),
        );
        Arc::new(AppState {
            session: Mutex::new(engine),
        })
    }

    #[tokio::test]
    async fn test_chat_then_reset() {
        let state = state(&["Heat is a heist film."]);

        let Json(response) = chat(
            State(state.clone()),
            Json(ChatRequest {
                message: "What is Heat about?".to_string(),
            }),
        )
        .await
        .unwrap_or_else(|_| panic!("chat failed"));
        assert_eq!(response.response, "Heat is a heist film.");

        let Json(current) = session(State(state.clone())).await;
        assert_eq!(current.mode, "CONTEXT");
        assert_eq!(current.history.len(), 2);

        reset(State(state.clone())).await;
        let Json(current) = session(State(state)).await;
        assert!(current.history.is_empty());
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let state = state(&[]);
        let result = chat(
            State(state),
            Json(ChatRequest {
                message: "   ".to_string(),
            }),
        )
        .await;

        match result {
            Err(ApiError(e)) => assert_eq!(status_for(&e), StatusCode::BAD_REQUEST),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&PlotlineError::Llm("timeout".to_string())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&PlotlineError::VectorStore("down".to_string())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&PlotlineError::Config("bad".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_router_builds() {
        let _ = router(state(&[]));
    }
}
