//! Upload endpoint
//!
//! `POST /process-audio/` accepts a multipart form with the audio in
//! `audio_file` and an optional `task` naming the stem configuration
//! ("Vocal Remove", "Basic Split", "2stems", ...). Fields may arrive in any
//! order: the file is staged as it streams in and the task is created once
//! the whole form has been read. The response comes back as soon as the job
//! is scheduled; progress is observed through `/status/:task_id`.

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{StemConfig, TaskStatus};
use crate::services::StagedUpload;
use crate::AppState;

/// Multipart field carrying the audio file
pub const FILE_FIELD: &str = "audio_file";
/// Multipart field naming the stem configuration
pub const TASK_FIELD: &str = "task";

/// Response to an accepted upload
#[derive(Debug, Serialize)]
pub struct ProcessAudioResponse {
    pub message: String,
    pub task_id: Uuid,
    pub status: TaskStatus,
    /// Poll here for progress
    pub status_url: String,
    /// Stem name → download URL, valid once the task is completed
    pub downloads: BTreeMap<String, String>,
    /// Relative artifact paths, in stem order
    pub output_files: Vec<String>,
    /// Zip of every stem, valid once the task is completed
    pub archive_url: String,
}

/// POST /process-audio/
pub async fn process_audio(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<ProcessAudioResponse>> {
    let mut staged: Option<StagedUpload> = None;
    let mut task_name: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(FILE_FIELD) => {
                if staged.is_some() {
                    return Err(ApiError::BadRequest(format!(
                        "Only one '{}' field is accepted",
                        FILE_FIELD
                    )));
                }
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::BadRequest("Uploaded file has no filename".to_string()))?;

                staged = Some(state.ingestor.stage(field, &filename).await?);
            }
            Some(TASK_FIELD) => {
                task_name = Some(field.text().await.map_err(malformed)?);
            }
            other => {
                tracing::debug!(field = ?other, "Ignoring unexpected multipart field");
            }
        }
    }

    let staged = staged.ok_or_else(|| {
        ApiError::BadRequest(format!("Missing '{}' file field", FILE_FIELD))
    })?;

    // An unsupported task drops (and deletes) the staged file
    let stem_config = match task_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.parse::<StemConfig>()?,
        _ => state.default_stems,
    };

    let receipt = state.ingestor.submit(staged, stem_config).await?;
    let task = receipt.task;

    let downloads = receipt
        .predicted_outputs
        .iter()
        .map(|(stem, path)| (stem.clone(), format!("/download/{}", path)))
        .collect();
    let output_files = task
        .stem_config
        .stem_names()
        .iter()
        .filter_map(|stem| receipt.predicted_outputs.get(*stem).cloned())
        .collect();

    Ok(Json(ProcessAudioResponse {
        message: "Audio accepted for processing".to_string(),
        task_id: task.id,
        status: task.status,
        status_url: format!("/status/{}", task.id),
        downloads,
        output_files,
        archive_url: format!("/download/{}/all", task.id),
    }))
}

fn malformed(e: MultipartError) -> ApiError {
    ApiError::BadRequest(format!("Malformed multipart body: {}", e))
}

/// Build upload routes
pub fn process_routes() -> Router<AppState> {
    Router::new()
        .route("/process-audio/", post(process_audio))
        .route("/process-audio", post(process_audio))
}
