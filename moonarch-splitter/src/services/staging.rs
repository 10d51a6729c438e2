//! Staged uploads
//!
//! An uploaded file lives in `<staging_root>/<upload id>/<upload id>.<ext>`
//! until its job reaches a terminal state. `StagingUpload` owns that file.
//! Owners on the normal path call [`StagingUpload::remove`]; dropping an
//! armed guard removes it synchronously instead (panic, cancellation or an
//! early `?` return).

use std::path::{Path, PathBuf};

pub struct StagingUpload {
    path: PathBuf,
    staging_root: PathBuf,
    armed: bool,
}

impl StagingUpload {
    pub fn new(path: impl Into<PathBuf>, staging_root: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            staging_root: staging_root.into(),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hand the file over to a new owner without deleting it
    pub fn release(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }

    /// Delete the file and its upload directory on the blocking pool
    pub async fn remove(mut self) {
        self.armed = false;
        let path = std::mem::take(&mut self.path);
        let staging_root = std::mem::take(&mut self.staging_root);

        if let Err(e) =
            tokio::task::spawn_blocking(move || remove_staged(&path, &staging_root)).await
        {
            tracing::warn!(error = %e, "Staging cleanup task failed");
        }
    }
}

impl Drop for StagingUpload {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        // Runs inline, possibly on a runtime worker: one unlink and one rmdir
        remove_staged(&self.path, &self.staging_root);
    }
}

fn remove_staged(path: &Path, staging_root: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "Staging upload removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to remove staging upload"
            );
        }
    }

    // Per-upload directory under the staging root; left alone if not empty
    if let Some(parent) = path.parent() {
        if parent != staging_root && parent.starts_with(staging_root) {
            let _ = std::fs::remove_dir(parent);
        }
    }
}
