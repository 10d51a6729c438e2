//! moonarch-splitter library interface
//!
//! Exposes the service wiring and HTTP router for integration testing.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use moonarch_common::events::EventBus;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::models::StemConfig;
use crate::services::{ArtifactServer, JobRunner, JobScheduler, StemEngine, UploadIngestor};
use crate::store::TaskStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Task records
    pub store: Arc<dyn TaskStore>,
    /// Upload staging and job submission
    pub ingestor: Arc<UploadIngestor>,
    /// Artifact lookup and archives
    pub artifacts: Arc<ArtifactServer>,
    /// Task lifecycle events for SSE
    pub event_bus: EventBus,
    /// Stem configuration for uploads without a `task` field
    pub default_stems: StemConfig,
    /// Upload size limit in bytes
    pub max_upload_bytes: usize,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Wire the store, engine and event bus into the job pipeline
    pub fn new(
        config: &ServiceConfig,
        store: Arc<dyn TaskStore>,
        engine: Arc<dyn StemEngine>,
        event_bus: EventBus,
    ) -> Self {
        let runner = Arc::new(JobRunner::new(
            store.clone(),
            engine,
            config.output_dir(),
            config.staging_dir(),
            event_bus.clone(),
        ));
        let scheduler = JobScheduler::new(runner, config.max_concurrent_jobs);
        let ingestor = UploadIngestor::new(
            store.clone(),
            scheduler,
            config.staging_dir(),
            event_bus.clone(),
        );
        let artifacts = ArtifactServer::new(store.clone(), config.output_dir(), config.archive_dir());

        Self {
            store,
            ingestor: Arc::new(ingestor),
            artifacts: Arc::new(artifacts),
            event_bus,
            default_stems: config.default_stems,
            max_upload_bytes: config.max_upload_bytes,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    let body_limit = state.max_upload_bytes;

    Router::new()
        .merge(api::process_routes())
        .merge(api::status_routes())
        .merge(api::download_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
