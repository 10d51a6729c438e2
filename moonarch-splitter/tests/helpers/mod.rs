//! Shared integration test helpers

#![allow(dead_code)]

pub mod fake_engine;
pub mod multipart;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use moonarch_common::events::EventBus;
use moonarch_splitter::config::ServiceConfig;
use moonarch_splitter::services::StemEngine;
use moonarch_splitter::store::{InMemoryTaskStore, TaskStore};
use moonarch_splitter::AppState;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub use multipart::MultipartBuilder;

/// Router plus the state and root folder behind it
pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: ServiceConfig,
    /// Kept alive for the duration of the test
    pub root: TempDir,
}

impl TestApp {
    pub fn new(engine: Arc<dyn StemEngine>) -> Self {
        Self::with_store(engine, Arc::new(InMemoryTaskStore::new()), |_| {})
    }

    pub fn with_config(engine: Arc<dyn StemEngine>, adjust: impl FnOnce(&mut ServiceConfig)) -> Self {
        Self::with_store(engine, Arc::new(InMemoryTaskStore::new()), adjust)
    }

    pub fn with_store(
        engine: Arc<dyn StemEngine>,
        store: Arc<dyn TaskStore>,
        adjust: impl FnOnce(&mut ServiceConfig),
    ) -> Self {
        let root = tempfile::tempdir().expect("Failed to create temp dir");
        let mut config = ServiceConfig::with_root(root.path());
        adjust(&mut config);
        config.ensure_directories().expect("Failed to create directories");

        let state = AppState::new(&config, store, engine, EventBus::new(100));
        let app = moonarch_splitter::build_router(state.clone());

        Self {
            app,
            state,
            config,
            root,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Vec<u8>) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let (status, body) = self.get(uri).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    pub async fn upload(&self, form: MultipartBuilder) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/process-audio/")
            .header("content-type", MultipartBuilder::content_type())
            .body(Body::from(form.build()))
            .unwrap();
        let (status, body) = self.send(request).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    /// Poll `/status/:id` until the task is completed or failed
    pub async fn wait_for_terminal(&self, task_id: &str) -> Value {
        for _ in 0..250 {
            let (status, task) = self.get_json(&format!("/status/{}", task_id)).await;
            assert_eq!(status, StatusCode::OK);
            if task["status"] == "completed" || task["status"] == "error" {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("Task {} did not reach a terminal state", task_id);
    }

    pub fn staging_is_empty(&self) -> bool {
        dir_is_empty(&self.config.staging_dir())
    }

    pub fn archives_are_empty(&self) -> bool {
        dir_is_empty(&self.config.archive_dir())
    }
}

pub fn dir_is_empty(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}

/// Placeholder audio bytes; the fake engines never decode the upload
pub fn audio_bytes() -> Vec<u8> {
    b"RIFF\x24\x00\x00\x00WAVEfmt fake upload payload".to_vec()
}
