//! Artifact resolution and bulk archives
//!
//! Every lookup stays inside the output root. Paths that would escape it are
//! rejected as invalid input before the filesystem is consulted.

use moonarch_common::{Error, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{NamedTempFile, TempPath};
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::path_normalizer::{is_within, parse_relative_path, resolve_case_insensitive};
use crate::models::{Task, TaskStatus};
use crate::store::TaskStore;

/// A zip of a task's stems, deleted from disk when dropped
#[derive(Debug)]
pub struct ArchiveFile {
    /// Suggested download name (`<canonical_name>.zip`)
    pub file_name: String,
    /// Archive size in bytes
    pub size: u64,
    /// Temp-file guard; the archive is removed when this is dropped
    pub path: TempPath,
}

pub struct ArtifactServer {
    store: Arc<dyn TaskStore>,
    output_root: PathBuf,
    archive_root: PathBuf,
}

impl ArtifactServer {
    pub fn new(store: Arc<dyn TaskStore>, output_root: PathBuf, archive_root: PathBuf) -> Self {
        Self {
            store,
            output_root,
            archive_root,
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Resolve a client-supplied relative path to an artifact file
    ///
    /// `Error::InvalidInput` if the path escapes the output root,
    /// `Error::NotFound` if no file matches even ignoring case.
    pub async fn resolve(&self, relative_path: &str) -> Result<PathBuf> {
        let relative = parse_relative_path(relative_path)?;
        let output_root = self.output_root.clone();
        let requested = relative_path.to_string();

        tokio::task::spawn_blocking(move || resolve_file(&output_root, &relative, &requested))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }

    /// Resolve one stem of a task by id, e.g. `vocals` or `Vocals.wav`
    ///
    /// `Error::NotReady` unless the task is `completed`, `Error::NotFound`
    /// if the task or stem is unknown.
    pub async fn resolve_task_stem(&self, task_id: Uuid, stem: &str) -> Result<PathBuf> {
        let task = self.completed_task(task_id).await?;

        let wanted = stem.to_lowercase();
        let wanted = wanted.strip_suffix(".wav").unwrap_or(&wanted);
        let relative = task.outputs.get(wanted).ok_or_else(|| {
            Error::NotFound(format!("Task {} has no stem '{}'", task_id, stem))
        })?;

        self.resolve(relative).await
    }

    /// Build a zip of every output of a completed task
    ///
    /// `Error::NotReady` unless the task is `completed`.
    pub async fn archive(&self, task_id: Uuid) -> Result<ArchiveFile> {
        let task = self.completed_task(task_id).await?;
        tokio::fs::create_dir_all(&self.archive_root).await?;

        let output_root = self.output_root.clone();
        let archive_root = self.archive_root.clone();
        let archive = tokio::task::spawn_blocking(move || build_archive(&task, &output_root, &archive_root))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))??;

        tracing::info!(
            task_id = %task_id,
            file_name = %archive.file_name,
            size = archive.size,
            "Archive built"
        );
        Ok(archive)
    }

    async fn completed_task(&self, task_id: Uuid) -> Result<Task> {
        let task = self.store.get(task_id).await?;
        if task.status != TaskStatus::Completed {
            return Err(Error::NotReady(format!(
                "Processing not complete for task {} (status: {})",
                task_id, task.status
            )));
        }
        Ok(task)
    }
}

fn resolve_file(output_root: &Path, relative: &Path, requested: &str) -> Result<PathBuf> {
    let not_found = || Error::NotFound(format!("File not found: {}", requested));

    let direct = output_root.join(relative);
    if !is_within(output_root, &direct) {
        return Err(Error::InvalidInput(format!("Invalid download path: {}", requested)));
    }
    if direct.is_file() {
        return Ok(direct);
    }

    let fallback = resolve_case_insensitive(output_root, relative).ok_or_else(not_found)?;
    if !is_within(output_root, &fallback) {
        return Err(Error::InvalidInput(format!("Invalid download path: {}", requested)));
    }
    if !fallback.is_file() {
        return Err(not_found());
    }

    tracing::debug!(
        requested = %requested,
        resolved = %fallback.display(),
        "Resolved artifact by case-insensitive match"
    );
    Ok(fallback)
}

fn build_archive(task: &Task, output_root: &Path, archive_root: &Path) -> Result<ArchiveFile> {
    let temp = NamedTempFile::new_in(archive_root)?;
    let zip_error = |e: zip::result::ZipError| Error::Internal(format!("Failed to build archive: {}", e));

    {
        let mut zip = ZipWriter::new(temp.as_file());
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for relative in task.outputs.values() {
            let source = resolve_file(output_root, &parse_relative_path(relative)?, relative)?;
            zip.start_file(relative.as_str(), options).map_err(zip_error)?;
            let mut reader = File::open(&source)?;
            std::io::copy(&mut reader, &mut zip)?;
        }

        zip.finish().map_err(zip_error)?;
    }

    let size = temp.as_file().metadata()?.len();
    Ok(ArchiveFile {
        file_name: format!("{}.zip", task.canonical_name),
        size,
        path: temp.into_temp_path(),
    })
}
