//! Upload ingestion
//!
//! Streams an uploaded file into its own staging directory, records a
//! pending task and hands the job to the scheduler without waiting.
//! Staging and submission are separate steps so a caller can stage the file
//! before it knows the stem configuration.

use axum::body::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt};
use moonarch_common::events::{EventBus, SplitterEvent};
use moonarch_common::{Error, Result};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::job_runner::predicted_outputs;
use super::job_scheduler::{JobHandle, JobScheduler};
use super::path_normalizer;
use super::staging::StagingUpload;
use crate::models::{StemConfig, Task};
use crate::store::TaskStore;

/// Result of a successful ingest
pub struct IngestReceipt {
    /// The pending task record
    pub task: Task,
    /// Stem name → relative path, valid once the task is `completed`
    pub predicted_outputs: BTreeMap<String, String>,
    /// Handle to the scheduled job
    pub job: JobHandle,
}

/// An upload written to staging but not yet attached to a task
///
/// Dropping it deletes the staged file.
pub struct StagedUpload {
    filename: String,
    upload: StagingUpload,
    bytes: u64,
}

impl StagedUpload {
    /// Filename as supplied by the client
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn path(&self) -> &Path {
        self.upload.path()
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

pub struct UploadIngestor {
    store: Arc<dyn TaskStore>,
    scheduler: JobScheduler,
    staging_root: PathBuf,
    event_bus: EventBus,
}

impl UploadIngestor {
    pub fn new(
        store: Arc<dyn TaskStore>,
        scheduler: JobScheduler,
        staging_root: PathBuf,
        event_bus: EventBus,
    ) -> Self {
        Self {
            store,
            scheduler,
            staging_root,
            event_bus,
        }
    }

    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    /// Stage `stream` under `filename`, create the task and schedule it
    pub async fn ingest<S, E>(
        &self,
        stream: S,
        filename: &str,
        stem_config: StemConfig,
    ) -> Result<IngestReceipt>
    where
        S: Stream<Item = std::result::Result<Bytes, E>>,
        E: Display,
    {
        let staged = self.stage(stream, filename).await?;
        self.submit(staged, stem_config).await
    }

    /// Write an upload into its own staging directory
    ///
    /// The filename is validated before anything touches the disk. Nothing
    /// is recorded in the task store until [`UploadIngestor::submit`].
    pub async fn stage<S, E>(&self, stream: S, filename: &str) -> Result<StagedUpload>
    where
        S: Stream<Item = std::result::Result<Bytes, E>>,
        E: Display,
    {
        let upload_id = Uuid::new_v4();
        let staged_name = path_normalizer::staging_file_name(upload_id, filename)?;
        path_normalizer::normalize(filename)?;

        // Directory and file are both keyed by the upload id, so two uploads
        // of one filename never share a staging file or an engine output dir
        let upload_dir = self.staging_root.join(upload_id.to_string());
        tokio::fs::create_dir_all(&upload_dir).await?;
        let upload = StagingUpload::new(upload_dir.join(&staged_name), &self.staging_root);

        let bytes = write_stream(upload.path(), stream).await?;
        tracing::info!(
            filename = %filename,
            staging_path = %upload.path().display(),
            bytes,
            "Upload staged"
        );

        Ok(StagedUpload {
            filename: filename.to_string(),
            upload,
            bytes,
        })
    }

    /// Create the pending task for a staged upload and schedule its job
    pub async fn submit(&self, staged: StagedUpload, stem_config: StemConfig) -> Result<IngestReceipt> {
        let task = self.store.create(&staged.filename, stem_config).await?;

        self.event_bus.emit_lossy(SplitterEvent::TaskCreated {
            task_id: task.id,
            source_filename: task.source_filename.clone(),
            canonical_name: task.canonical_name.clone(),
            timestamp: Utc::now(),
        });

        // The job owns the staged file from here on
        let job = self.scheduler.submit(task.id, staged.upload.release());
        let predicted_outputs = predicted_outputs(&task.canonical_name, task.stem_config);

        tracing::info!(
            task_id = %task.id,
            canonical_name = %task.canonical_name,
            stem_config = %task.stem_config,
            "Task scheduled"
        );

        Ok(IngestReceipt {
            task,
            predicted_outputs,
            job,
        })
    }
}

/// Write every chunk of `stream` to `path`, returning the byte count
async fn write_stream<S, E>(path: &Path, stream: S) -> Result<u64>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: Display,
{
    let mut file = tokio::fs::File::create(path).await?;
    let mut written: u64 = 0;

    futures::pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| Error::InvalidInput(format!("Failed to read upload: {}", e)))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    if written == 0 {
        return Err(Error::InvalidInput("Uploaded file is empty".to_string()));
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::job_runner::JobRunner;
    use crate::services::stem_engine::{EngineError, StemEngine};
    use crate::store::InMemoryTaskStore;
    use async_trait::async_trait;
    use std::convert::Infallible;

    struct NoopEngine;

    #[async_trait]
    impl StemEngine for NoopEngine {
        async fn separate(&self, _: &Path, _: &Path, _: StemConfig) -> std::result::Result<(), EngineError> {
            Err(EngineError::SeparationFailed("noop".to_string()))
        }

        fn name(&self) -> &str {
            "noop"
        }
    }

    fn ingestor(root: &Path) -> (Arc<InMemoryTaskStore>, UploadIngestor) {
        let store = Arc::new(InMemoryTaskStore::new());
        let bus = EventBus::new(16);
        let runner = Arc::new(JobRunner::new(
            store.clone(),
            Arc::new(NoopEngine),
            root.join("outputs"),
            root.join("staging"),
            bus.clone(),
        ));
        let scheduler = JobScheduler::new(runner, 1);
        let ingestor = UploadIngestor::new(store.clone(), scheduler, root.join("staging"), bus);
        (store, ingestor)
    }

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = std::result::Result<Bytes, Infallible>> {
        let parts: Vec<_> = parts.iter().map(|p| Ok(Bytes::from_static(p))).collect();
        futures::stream::iter(parts)
    }

    fn staging_is_empty(root: &Path) -> bool {
        match std::fs::read_dir(root.join("staging")) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => true,
        }
    }

    #[tokio::test]
    async fn test_stage_writes_all_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let (store, ingestor) = ingestor(dir.path());

        let staged = ingestor
            .stage(chunks(&[b"RIFF", b"data"]), "My Song.wav")
            .await
            .unwrap();

        assert_eq!(staged.bytes(), 8);
        assert_eq!(staged.filename(), "My Song.wav");
        assert_eq!(std::fs::read(staged.path()).unwrap(), b"RIFFdata");

        let stem = staged.path().file_stem().unwrap().to_string_lossy().to_string();
        let upload_dir = staged.path().parent().unwrap().file_name().unwrap();
        assert_eq!(stem, upload_dir.to_string_lossy());
        assert!(Uuid::parse_str(&stem).is_ok());
        assert_eq!(staged.path().extension().unwrap(), "wav");
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_stage_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let (_store, ingestor) = ingestor(dir.path());

        let staged = ingestor.stage(chunks(&[b"RIFF"]), "song.wav").await.unwrap();
        drop(staged);

        assert!(staging_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_empty_upload_rejected_and_cleaned() {
        let dir = tempfile::tempdir().unwrap();
        let (_store, ingestor) = ingestor(dir.path());

        let err = ingestor
            .ingest(chunks(&[]), "song.wav", StemConfig::TwoStems)
            .await
            .err()
            .unwrap();

        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(staging_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_invalid_filename_rejected_before_staging() {
        let dir = tempfile::tempdir().unwrap();
        let (_store, ingestor) = ingestor(dir.path());

        let err = ingestor
            .ingest(chunks(&[b"RIFF"]), "..", StemConfig::TwoStems)
            .await
            .err()
            .unwrap();

        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(!dir.path().join("staging").exists());
    }

    #[tokio::test]
    async fn test_ingest_returns_pending_task_and_predicted_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let (store, ingestor) = ingestor(dir.path());

        let receipt = ingestor
            .ingest(chunks(&[b"RIFF"]), "Track.MP3", StemConfig::FourStems)
            .await
            .unwrap();

        assert_eq!(receipt.task.canonical_name, "track");
        assert_eq!(receipt.predicted_outputs.len(), 4);
        assert_eq!(receipt.predicted_outputs["drums"], "track/drums.wav");

        let task_id = receipt.task.id;
        receipt.job.wait().await.unwrap();

        // The no-op engine fails; staging is cleaned either way
        let task = store.get(task_id).await.unwrap();
        assert_eq!(task.status, crate::models::TaskStatus::Error);
        assert!(staging_is_empty(dir.path()));
    }
}
