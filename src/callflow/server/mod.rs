// SPDX-License-Identifier: MIT

//! HTTP and WebSocket surface
//!
//! REST endpoints manage graphs through the store and run them one-shot;
//! `/api/sessions` upgrades to a WebSocket carrying the session protocol.

mod connection;

use axum::{
    body::Bytes,
    extract::{ws::WebSocketUpgrade, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::adk::error::{CallflowError, WorkflowError};
use crate::callflow::context::ExecutionContext;
use crate::callflow::graph::{ExecutionResult, Graph, GraphExecutor};
use crate::callflow::session::SessionEngine;
use crate::callflow::store::WorkflowStore;

/// Shared state for handlers
pub struct AppState {
    pub store: Arc<dyn WorkflowStore>,
    pub executor: Arc<GraphExecutor>,
    pub sessions: SessionEngine,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/workflows", get(list_workflows))
        .route("/api/workflows/{id}", get(get_workflow).put(save_workflow))
        .route("/api/workflows/{id}/run", axum::routing::post(run_workflow))
        .route("/api/sessions", get(session_socket))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` fires
pub async fn serve(
    state: Arc<AppState>,
    bind: &str,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    log::info!("Server shut down");
    Ok(())
}

/// Error body `{"error": ...}` with a status matching the failure
struct ApiError(StatusCode, String);

impl From<CallflowError> for ApiError {
    fn from(e: CallflowError) -> Self {
        let status = match &e {
            CallflowError::Workflow(WorkflowError::WorkflowNotFound(_)) => StatusCode::NOT_FOUND,
            CallflowError::Workflow(WorkflowError::GraphInvalid(_))
            | CallflowError::Json(_)
            | CallflowError::Yaml(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.0.is_server_error() {
            log::error!("Request failed: {}", self.1);
        }
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_workflows(State(state): State<Arc<AppState>>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.store.list().await?))
}

async fn get_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Graph>, ApiError> {
    Ok(Json(state.store.get_graph(&id).await?))
}

async fn save_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(graph): Json<Graph>,
) -> Result<Json<Value>, ApiError> {
    state.store.save_graph(&id, graph).await?;
    Ok(Json(json!({ "id": id, "saved": true })))
}

#[derive(Deserialize, Default)]
struct RunRequest {
    #[serde(default)]
    context: Option<Value>,
}

async fn run_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ExecutionResult>, ApiError> {
    // The body is optional
    let request: RunRequest = if body.is_empty() {
        RunRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(CallflowError::from)?
    };
    let graph = state.store.get_graph(&id).await?;
    let initial = request
        .context
        .map(ExecutionContext::from_json)
        .unwrap_or_default();

    log::info!("Running workflow {}", id);
    Ok(Json(state.executor.execute(&graph, initial).await))
}

async fn session_socket(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, state.sessions.clone()))
}
