/// Health check endpoints for liveness and readiness
///
/// Liveness only proves the process answers. Readiness pings the metadata
/// database and the blob backend and reports 503 when either is down.

use crate::context::AppContext;
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Health status of individual component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component name
    pub name: String,

    /// Status: "healthy" or "unhealthy"
    pub status: String,

    /// Response time in milliseconds
    pub response_time_ms: u64,

    /// Optional error message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessStatus {
    /// "ready" or "not_ready"
    pub status: String,
    pub version: String,
    pub checks: Vec<ComponentHealth>,
}

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health_basic))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
}

/// Basic health check
pub async fn health_basic() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Liveness check
pub async fn liveness() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness check
///
/// Returns 200 when the database and blob backend both answer, 503 otherwise.
pub async fn readiness(
    State(ctx): State<AppContext>,
) -> (StatusCode, Json<ReadinessStatus>) {
    let checks = vec![check_database(&ctx).await, check_blob_storage(&ctx).await];
    let ready = checks.iter().all(|c| c.status == "healthy");

    if !ready {
        tracing::warn!("readiness_check_failed: {:?}", checks);
    }

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessStatus {
            status: if ready { "ready" } else { "not_ready" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            checks,
        }),
    )
}

fn component(name: &str, start: Instant, result: Result<(), String>) -> ComponentHealth {
    let (status, error) = match result {
        Ok(()) => ("healthy", None),
        Err(e) => ("unhealthy", Some(e)),
    };
    ComponentHealth {
        name: name.to_string(),
        status: status.to_string(),
        response_time_ms: start.elapsed().as_millis() as u64,
        error,
    }
}

async fn check_database(ctx: &AppContext) -> ComponentHealth {
    let start = Instant::now();
    let result = ctx
        .content
        .repository()
        .ping()
        .await
        .map_err(|e| e.to_string());
    component("database", start, result)
}

async fn check_blob_storage(ctx: &AppContext) -> ComponentHealth {
    let start = Instant::now();
    let blobs = ctx.content.blobs();
    let result = blobs.ping().await.map_err(|e| e.to_string());
    component(&format!("blob_storage:{}", blobs.backend_name()), start, result)
}
