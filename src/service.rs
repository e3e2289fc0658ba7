//! HTTP service surface
//!
//! Thin axum layer over the memory engine: write, retrieve, teach,
//! retrain, conflict resolution, and per-layer administration.

use std::sync::Arc;

use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router as AxumRouter;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::MemoryEngine;
use crate::error::MemoryError;
use crate::types::{
    ConflictAction, IdentityConflict, Layer, RetrieveOptions, RetrievedMemory, WriteRequest,
    WriteResult,
};

pub struct ServiceState {
    pub engine: MemoryEngine,
}

#[derive(Deserialize)]
struct RetrieveRequest {
    query: String,
    #[serde(default)]
    options: Option<RetrieveOptions>,
}

#[derive(Serialize)]
struct RetrieveResponse {
    results: Vec<RetrievedMemory>,
}

#[derive(Deserialize)]
struct TeachRequest {
    text: String,
    #[serde(default)]
    context: Vec<String>,
    correct_layer: Layer,
}

#[derive(Deserialize)]
struct ResolveRequest {
    conflict: IdentityConflict,
    action: ConflictAction,
}

struct ServerError(MemoryError);

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            MemoryError::SafetyBlocked { .. } | MemoryError::ExtractionFailed => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            MemoryError::EmbeddingUnavailable { .. } | MemoryError::ClassifierUninitialized => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

impl From<MemoryError> for ServerError {
    fn from(err: MemoryError) -> Self {
        Self(err)
    }
}

/// Build the HTTP router over an initialized engine.
pub fn service_router(state: Arc<ServiceState>) -> AxumRouter {
    AxumRouter::new()
        .route("/health", get(|| async { "OK" }))
        .route("/status", get(status_handler))
        .route("/write", post(write_handler))
        .route("/retrieve", post(retrieve_handler))
        .route("/teach", post(teach_handler))
        .route("/retrain", post(retrain_handler))
        .route("/resolve", post(resolve_handler))
        .route("/decay", post(decay_handler))
        .route("/layer/:layer", get(list_handler))
        .route("/layer/:layer/clear", post(clear_handler))
        .route("/layer/:layer/:id", axum::routing::delete(delete_handler))
        .with_state(state)
}

/// Run the memory service until the process exits.
pub async fn run_service(state: Arc<ServiceState>, addr: &str) -> anyhow::Result<()> {
    let app = service_router(state);
    info!("Memory service listening at http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn status_handler(
    State(state): State<Arc<ServiceState>>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let engine = &state.engine;
    Ok(Json(serde_json::json!({
        "embedding_status": engine.status(),
        "identity_count": engine.count(Layer::Identity).await?,
        "experience_count": engine.count(Layer::Experience).await?,
        "knowledge_count": engine.count(Layer::Knowledge).await?,
    })))
}

async fn write_handler(
    State(state): State<Arc<ServiceState>>,
    Json(request): Json<WriteRequest>,
) -> Result<Json<WriteResult>, ServerError> {
    Ok(Json(state.engine.write(request).await?))
}

async fn retrieve_handler(
    State(state): State<Arc<ServiceState>>,
    Json(request): Json<RetrieveRequest>,
) -> Result<Json<RetrieveResponse>, ServerError> {
    let options = request.options.unwrap_or_default();
    let results = state.engine.retrieve(&request.query, &options).await?;
    Ok(Json(RetrieveResponse { results }))
}

async fn teach_handler(
    State(state): State<Arc<ServiceState>>,
    Json(request): Json<TeachRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state
        .engine
        .teach(&request.text, &request.context, request.correct_layer)
        .await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

async fn retrain_handler(
    State(state): State<Arc<ServiceState>>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let replayed = state.engine.retrain().await?;
    Ok(Json(serde_json::json!({ "corrections_replayed": replayed })))
}

async fn resolve_handler(
    State(state): State<Arc<ServiceState>>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<WriteResult>, ServerError> {
    let result = state
        .engine
        .resolve_conflict(&request.conflict, request.action)
        .await?;
    Ok(Json(result))
}

async fn decay_handler(
    State(state): State<Arc<ServiceState>>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let updated = state.engine.apply_decay().await?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}

async fn list_handler(
    State(state): State<Arc<ServiceState>>,
    Path(layer): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let layer = parse_layer(&layer)?;
    Ok(Json(state.engine.list(layer).await?))
}

async fn clear_handler(
    State(state): State<Arc<ServiceState>>,
    Path(layer): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let layer = parse_layer(&layer)?;
    state.engine.clear(layer).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

async fn delete_handler(
    State(state): State<Arc<ServiceState>>,
    Path((layer, id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let layer = parse_layer(&layer)?;
    let deleted = state.engine.delete(layer, &id).await?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

fn parse_layer(value: &str) -> Result<Layer, ServerError> {
    value
        .parse::<Layer>()
        .map_err(|e| ServerError(MemoryError::Internal(e)))
}
