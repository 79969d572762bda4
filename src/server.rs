use std::any::Any;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::AppState;
use crate::config::AppConfig;
use crate::error::{ApiError, FieldError};
use crate::gateway::Gateway;
use crate::llm::{ChatCompletionsDriver, CompletionProvider, LlmSettings, Message};
use crate::session::{InMemorySessionStore, SessionStore, spawn_sweeper};

/// Longest accepted query, in characters.
pub const MAX_QUERY_CHARS: usize = 1000;

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>, mut settings: LlmSettings) -> anyhow::Result<()> {
    settings.timeout = config.provider.timeout();

    info!(
        name: "llm.config.loaded",
        base_url = %settings.base_url,
        model = %settings.model,
        provider = ?settings.provider,
        "LLM configuration loaded"
    );

    let provider: Arc<dyn CompletionProvider> = Arc::new(ChatCompletionsDriver::new(settings)?);

    // Session store
    let sessions: Arc<dyn SessionStore> =
        Arc::new(InMemorySessionStore::new(config.sessions.store_limits()));
    let sweeper = spawn_sweeper(Arc::clone(&sessions), config.sessions.sweep_interval());

    let gateway = Gateway::new(sessions, provider, config.sessions.history_policy());
    let app = build_router(AppState::new(gateway));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        history_limit = config.sessions.history_limit,
        trim_mode = ?config.sessions.trim_mode,
        "Server started"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!(name: "server.stopped", "Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}

/// Build the application router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods(AnyOrigin)
        .allow_headers(AnyOrigin);

    Router::new()
        .route("/ask", post(ask))
        .route("/sessions/{id}/history", get(session_history))
        .route("/health", get(health))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    };
    ApiError::Internal(format!("handler panicked: {detail}")).into_response()
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for the ask API.
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    /// The user's question, 1 to 1000 characters.
    pub query: String,
    /// Optional session ID (creates new if not provided).
    #[serde(default)]
    pub session_id: Option<String>,
}

impl AskRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let chars = self.query.chars().count();
        if chars == 0 {
            return Err(ApiError::Validation(vec![FieldError::body(
                "query",
                "String should have at least 1 character",
                "string_too_short",
            )]));
        }
        if chars > MAX_QUERY_CHARS {
            return Err(ApiError::Validation(vec![FieldError::body(
                "query",
                format!("String should have at most {MAX_QUERY_CHARS} characters"),
                "string_too_long",
            )]));
        }
        Ok(())
    }
}

/// Response from the ask API.
#[derive(Debug, Serialize)]
pub struct AskResponse {
    /// The assistant's reply.
    pub response: String,
    /// Session ID for this conversation.
    pub session_id: String,
    /// Stored conversation after this exchange.
    pub history: Vec<Message>,
}

/// POST /ask - Run one exchange and return the reply with the session history.
async fn ask(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let Json(req) = payload?;
    req.validate()?;

    tracing::info!(
        query_len = req.query.len(),
        session_id = ?req.session_id,
        "Received ask request"
    );

    let exchange = state.gateway.handle(req.query, req.session_id).await?;

    Ok(Json(AskResponse {
        response: exchange.response,
        session_id: exchange.session_id,
        history: exchange.history,
    }))
}

/// GET /sessions/:id/history - Get the stored messages of a session.
async fn session_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    match state.gateway.store().get(&id) {
        Some(session) => Ok(Json(session.messages().await)),
        None => Err(ApiError::SessionNotFound(id)),
    }
}

/// Liveness report.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    sessions: usize,
}

/// GET /health - Liveness probe.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sessions: state.gateway.store().len(),
    })
}
