//! Liveness and health endpoints

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok")
    pub status: String,
    /// Module name ("moonarch-splitter")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Jobs currently running the separation engine
    pub active_jobs: usize,
    /// Engine concurrency limit
    pub max_concurrent_jobs: usize,
}

/// GET /ping
pub async fn ping() -> Json<Value> {
    Json(json!({ "ping": "pong" }))
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let scheduler = state.ingestor.scheduler();

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "moonarch-splitter".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        active_jobs: scheduler.active_jobs(),
        max_concurrent_jobs: scheduler.max_concurrent(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health_check))
}
