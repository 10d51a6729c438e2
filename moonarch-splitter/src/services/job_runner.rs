//! Job runner: drives one task through separation
//!
//! Stages, strictly in order:
//! 1. pending → processing
//! 2. run the separation engine into the output root; it writes to a
//!    directory named after the staged file, which is private to the task
//! 3. collect per-stem outputs inside that directory
//! 4. normalize-on-write: rename the directory to the task's canonical
//!    name (last write wins if it already exists) → completed
//! 5. any failure in 2-4 → error
//!
//! The staging upload is removed before the terminal state is recorded, or
//! by its guard if the job panics or is dropped.

use chrono::Utc;
use moonarch_common::events::{EventBus, SplitterEvent};
use moonarch_common::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::path_normalizer::resolve_case_insensitive;
use super::staging::StagingUpload;
use super::stem_engine::{EngineError, StemEngine};
use crate::models::{StemConfig, Task, TaskStatus};
use crate::store::TaskStore;

/// Why a job failed; the message becomes the task's `error_message`
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Separation engine produced no output directory for '{0}'")]
    MissingOutputDir(String),

    #[error("Separation output is missing stem '{0}'")]
    MissingStem(String),

    #[error("Failed to relocate separation output: {0}")]
    Relocate(std::io::Error),
}

/// Relative artifact path for one stem of a task
pub fn artifact_relative_path(canonical_name: &str, stem: &str) -> String {
    format!("{}/{}.wav", canonical_name, stem)
}

/// Stem name → relative artifact path a completed task will advertise
pub fn predicted_outputs(canonical_name: &str, stem_config: StemConfig) -> BTreeMap<String, String> {
    stem_config
        .stem_names()
        .iter()
        .map(|stem| (stem.to_string(), artifact_relative_path(canonical_name, stem)))
        .collect()
}

pub struct JobRunner {
    store: Arc<dyn TaskStore>,
    engine: Arc<dyn StemEngine>,
    output_root: PathBuf,
    staging_root: PathBuf,
    event_bus: EventBus,
    /// Held while an output directory is moved into its canonical place
    relocations: Mutex<()>,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn TaskStore>,
        engine: Arc<dyn StemEngine>,
        output_root: PathBuf,
        staging_root: PathBuf,
        event_bus: EventBus,
    ) -> Self {
        Self {
            store,
            engine,
            output_root,
            staging_root,
            event_bus,
            relocations: Mutex::new(()),
        }
    }

    /// Process one task to a terminal state and return the final record
    ///
    /// Only store failures are returned as `Err`; separation failures are
    /// recorded on the task.
    pub async fn run(&self, task_id: Uuid, staging_path: &Path) -> Result<Task> {
        let staging = StagingUpload::new(staging_path, &self.staging_root);

        let task = self
            .store
            .update(task_id, Box::new(|task: &mut Task| task.begin_processing()))
            .await?;

        tracing::info!(
            task_id = %task_id,
            canonical_name = %task.canonical_name,
            stem_config = %task.stem_config,
            engine = self.engine.name(),
            "Task processing started"
        );
        self.event_bus.emit_lossy(SplitterEvent::TaskStarted {
            task_id,
            timestamp: Utc::now(),
        });

        let outcome = self.process(&task, staging.path()).await;
        staging.remove().await;

        self.finish(task_id, outcome).await
    }

    /// Record the outcome of a job as the task's terminal state
    async fn finish(
        &self,
        task_id: Uuid,
        outcome: std::result::Result<BTreeMap<String, String>, JobError>,
    ) -> Result<Task> {
        match outcome {
            Ok(outputs) => {
                let advertised = outputs.clone();
                let task = self
                    .store
                    .update(
                        task_id,
                        Box::new(move |task: &mut Task| task.complete(outputs.clone())),
                    )
                    .await?;

                tracing::info!(
                    task_id = %task_id,
                    stems = task.outputs.len(),
                    "Task completed"
                );
                self.event_bus.emit_lossy(SplitterEvent::TaskCompleted {
                    task_id,
                    outputs: advertised,
                    timestamp: Utc::now(),
                });
                Ok(task)
            }
            Err(e) => self.record_failure(task_id, e.to_string()).await,
        }
    }

    /// Move a task to `error`, starting it first if it never left `pending`
    pub async fn record_failure(&self, task_id: Uuid, message: String) -> Result<Task> {
        tracing::error!(task_id = %task_id, error = %message, "Task failed");

        let reason = message.clone();
        let task = self
            .store
            .update(
                task_id,
                Box::new(move |task: &mut Task| {
                    if task.status == TaskStatus::Pending {
                        task.begin_processing()?;
                    }
                    task.fail(reason.clone())
                }),
            )
            .await?;

        self.event_bus.emit_lossy(SplitterEvent::TaskFailed {
            task_id,
            error: message,
            timestamp: Utc::now(),
        });
        Ok(task)
    }

    async fn process(
        &self,
        task: &Task,
        staging_path: &Path,
    ) -> std::result::Result<BTreeMap<String, String>, JobError> {
        self.engine
            .separate(staging_path, &self.output_root, task.stem_config)
            .await?;

        let produced = self.locate_output_dir(staging_path).await?;
        let outputs = self.collect_outputs(&produced, task).await?;

        let _relocating = self.relocations.lock().await;
        self.relocate(&produced, &task.canonical_name).await?;
        Ok(outputs)
    }

    /// Find the directory the engine created for the staged file
    ///
    /// The staged file's stem is the upload id, so only an exact match can
    /// belong to this task.
    async fn locate_output_dir(&self, staging_path: &Path) -> std::result::Result<PathBuf, JobError> {
        let basename = staging_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let produced = self.output_root.join(&basename);
        match tokio::fs::metadata(&produced).await {
            Ok(meta) if !basename.is_empty() && meta.is_dir() => Ok(produced),
            _ => Err(JobError::MissingOutputDir(basename)),
        }
    }

    /// Rename the engine's output directory to the canonical name
    async fn relocate(
        &self,
        produced: &Path,
        canonical_name: &str,
    ) -> std::result::Result<PathBuf, JobError> {
        let destination = self.output_root.join(canonical_name);
        if produced == destination.as_path() {
            return Ok(destination);
        }

        if tokio::fs::try_exists(&destination)
            .await
            .map_err(JobError::Relocate)?
        {
            tracing::info!(
                destination = %destination.display(),
                "Replacing existing output directory"
            );
            tokio::fs::remove_dir_all(&destination)
                .await
                .map_err(JobError::Relocate)?;
        }

        tokio::fs::rename(produced, &destination)
            .await
            .map_err(JobError::Relocate)?;

        tracing::debug!(
            from = %produced.display(),
            to = %destination.display(),
            "Output directory relocated"
        );
        Ok(destination)
    }

    /// Map each expected stem to its canonical relative path, lowercasing
    /// the file names inside `produced`
    async fn collect_outputs(
        &self,
        produced: &Path,
        task: &Task,
    ) -> std::result::Result<BTreeMap<String, String>, JobError> {
        let mut outputs = BTreeMap::new();

        for stem in task.stem_config.stem_names() {
            let file_name = format!("{}.wav", stem);
            let found = resolve_case_insensitive(produced, Path::new(&file_name))
                .filter(|path| path.is_file())
                .ok_or_else(|| JobError::MissingStem(stem.to_string()))?;

            let expected = produced.join(&file_name);
            if found.file_name() != expected.file_name() {
                tokio::fs::rename(&found, &expected)
                    .await
                    .map_err(JobError::Relocate)?;
            }

            outputs.insert(
                stem.to_string(),
                artifact_relative_path(&task.canonical_name, stem),
            );
        }

        Ok(outputs)
    }
}
