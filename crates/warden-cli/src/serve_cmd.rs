//! `warden serve`: a small REST surface over the harness manager, for
//! operators who want to drive harnesses from something other than this
//! CLI. Mirrors the CLI's own command set one-to-one rather than exposing
//! the manager's internals directly.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;

use warden_core::config::HarnessConfig;
use warden_core::manager::HarnessManager;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, message: msg.into() }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, message: format!("{err:#}") }
    }

    fn from_harness_error(err: warden_core::supervisor::HarnessError) -> Self {
        Self { status: StatusCode::CONFLICT, message: err.to_string() }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateHarnessRequest {
    pub agent_name: String,
    pub task_id: String,
    #[serde(default)]
    pub description: Option<String>,
    pub autonomy_level: Option<u8>,
}

#[derive(Debug, Serialize)]
pub struct CreateHarnessResponse {
    pub harness_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RejectGateRequest {
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct HarnessSummary {
    pub harness_id: String,
    pub agent_name: String,
    pub task_id: String,
    pub status: String,
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct AppState {
    manager: Arc<HarnessManager>,
    pool: PgPool,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(manager: Arc<HarnessManager>, pool: PgPool) -> Router {
    let state = AppState { manager, pool };
    Router::new()
        .route("/", get(index))
        .route("/api/harnesses", get(list_harnesses).post(create_harness))
        .route("/api/harnesses/{id}", get(get_harness))
        .route("/api/harnesses/{id}/start", post(start_harness))
        .route("/api/harnesses/{id}/pause", post(pause_harness))
        .route("/api/harnesses/{id}/resume", post(resume_harness))
        .route("/api/harnesses/{id}/stop", post(stop_harness))
        .route("/api/harnesses/{id}/gate/approve", post(approve_gate))
        .route("/api/harnesses/{id}/gate/reject", post(reject_gate))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(manager: Arc<HarnessManager>, pool: PgPool, bind: &str, port: u16) -> Result<()> {
    let app = build_router(manager, pool);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("warden serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    tracing::info!("warden serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn index(State(state): State<AppState>) -> Result<axum::response::Response, AppError> {
    let rows = warden_db::queries::checkpoints::list_harnesses(&state.pool).await.map_err(AppError::internal)?;

    let body = if rows.is_empty() {
        "<tr><td colspan=\"3\">No harnesses found.</td></tr>".to_string()
    } else {
        rows.iter()
            .map(|r| {
                format!(
                    "<tr><td><a href=\"/api/harnesses/{id}\">{id}</a></td><td>{agent}</td><td>{status:?}</td></tr>",
                    id = r.harness_id,
                    agent = r.agent_name,
                    status = r.status,
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let html = format!(
        "<!DOCTYPE html>\
<html><head><title>warden</title></head><body>\
<h1>warden</h1>\
<p><a href=\"/api/harnesses\">/api/harnesses</a></p>\
<table><tr><th>ID</th><th>Agent</th><th>Status</th></tr>{body}</table>\
</body></html>"
    );

    Ok(Html(html).into_response())
}

async fn list_harnesses(State(state): State<AppState>) -> Result<axum::response::Response, AppError> {
    let rows = warden_db::queries::checkpoints::list_harnesses(&state.pool).await.map_err(AppError::internal)?;
    let summaries: Vec<HarnessSummary> = rows
        .into_iter()
        .map(|r| HarnessSummary {
            harness_id: r.harness_id,
            agent_name: r.agent_name,
            task_id: r.task_id,
            status: format!("{:?}", r.status),
        })
        .collect();
    Ok(Json(summaries).into_response())
}

async fn create_harness(
    State(state): State<AppState>,
    Json(req): Json<CreateHarnessRequest>,
) -> Result<axum::response::Response, AppError> {
    let config = req.autonomy_level.map(|level| HarnessConfig { autonomy_level: level, ..HarnessConfig::default() });
    let harness_id = state
        .manager
        .create(&req.agent_name, &req.task_id, req.description, config)
        .await
        .map_err(AppError::from_harness_error)?;
    Ok((StatusCode::CREATED, Json(CreateHarnessResponse { harness_id })).into_response())
}

async fn reattach(state: &AppState, id: &str) -> Result<(), AppError> {
    if state.manager.status(id).await.is_none() {
        state.manager.resume_from_checkpoint(id).await.map_err(AppError::from_harness_error)?;
    }
    Ok(())
}

async fn get_harness(State(state): State<AppState>, Path(id): Path<String>) -> Result<axum::response::Response, AppError> {
    reattach(&state, &id).await?;
    let snapshot = state.manager.snapshot(&id).await.ok_or_else(|| AppError::not_found(format!("harness {id} not found")))?;
    Ok(Json(snapshot).into_response())
}

async fn start_harness(State(state): State<AppState>, Path(id): Path<String>) -> Result<axum::response::Response, AppError> {
    reattach(&state, &id).await?;
    state.manager.start(&id).await.map_err(AppError::from_harness_error)?;
    get_harness(State(state), Path(id)).await
}

async fn pause_harness(State(state): State<AppState>, Path(id): Path<String>) -> Result<axum::response::Response, AppError> {
    reattach(&state, &id).await?;
    state.manager.pause(&id).await.map_err(AppError::from_harness_error)?;
    get_harness(State(state), Path(id)).await
}

async fn resume_harness(State(state): State<AppState>, Path(id): Path<String>) -> Result<axum::response::Response, AppError> {
    reattach(&state, &id).await?;
    state.manager.resume(&id).await.map_err(AppError::from_harness_error)?;
    get_harness(State(state), Path(id)).await
}

async fn stop_harness(State(state): State<AppState>, Path(id): Path<String>) -> Result<axum::response::Response, AppError> {
    reattach(&state, &id).await?;
    state.manager.stop(&id).await.map_err(AppError::from_harness_error)?;
    get_harness(State(state), Path(id)).await
}

async fn approve_gate(State(state): State<AppState>, Path(id): Path<String>) -> Result<axum::response::Response, AppError> {
    reattach(&state, &id).await?;
    state.manager.approve_gate(&id).await.map_err(AppError::from_harness_error)?;
    get_harness(State(state), Path(id)).await
}

async fn reject_gate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RejectGateRequest>,
) -> Result<axum::response::Response, AppError> {
    reattach(&state, &id).await?;
    state.manager.reject_gate(&id, req.reason).await.map_err(AppError::from_harness_error)?;
    get_harness(State(state), Path(id)).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
