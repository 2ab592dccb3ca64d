//! Drone Copilot HTTP 服务
//!
//! 启动: cargo run --bin copilot-server --features server
//! 监听地址由 COPILOT_ADDR 指定，默认 127.0.0.1:3001

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;

use drone_copilot::agent::{history_entries, process_message, ChatRequest, ChatResponse, ErrorResponse, HistoryEntry};
use drone_copilot::core::{create_copilot_builder, FailureKind, TurnError, TurnRouter};
use drone_copilot::observability;

const DEFAULT_ADDR: &str = "127.0.0.1:3001";

#[derive(Clone)]
struct AppState {
    router: Arc<TurnRouter>,
}

#[derive(Serialize)]
struct HistoryResponse {
    history: Vec<HistoryEntry>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: TurnError) -> ApiError {
    let status = match err.kind() {
        FailureKind::InvalidRequest => StatusCode::BAD_REQUEST,
        FailureKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse::from(&err)))
}

async fn api_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let response = process_message(&state.router, &request).await.map_err(api_error)?;
    Ok(Json(ChatResponse { response }))
}

async fn api_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let messages = state.router.history(&id).await.map_err(api_error)?;
    Ok(Json(HistoryResponse {
        history: history_entries(&messages),
    }))
}

async fn api_delete(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    state.router.delete_thread(&id).await.map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::var("COPILOT_CONFIG").ok().map(Into::into);
    let router = create_copilot_builder(config_path).build().await?;
    let router = Arc::new(router);
    let state = AppState { router: router.clone() };

    let app = Router::new()
        .route("/api/chat", post(api_chat))
        .route("/api/chat/:id", delete(api_delete))
        .route("/api/chat/:id/history", get(api_history))
        .with_state(state);

    let addr = std::env::var("COPILOT_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("copilot-server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            router.supervisor().cancel();
        })
        .await?;
    Ok(())
}
