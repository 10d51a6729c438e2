//! Stem separation engine adapter
//!
//! The separation engine is an external program. Given an input file, an
//! output directory and a stem configuration it writes
//! `<output_dir>/<input_basename>/<stem>.wav` for every stem.
//!
//! `SpleeterEngine` drives the `spleeter` command-line tool.

use async_trait::async_trait;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

use crate::models::StemConfig;

/// Separation engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine binary not found in PATH
    #[error("Separation engine binary not found: {0}")]
    BinaryNotFound(String),

    /// Failed to execute the engine
    #[error("Failed to execute separation engine: {0}")]
    Execution(String),

    /// Engine ran but reported failure
    #[error("Separation failed: {0}")]
    SeparationFailed(String),

    /// Input audio file missing
    #[error("Input audio file not found: {0}")]
    InputNotFound(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio-to-stems transform
#[async_trait]
pub trait StemEngine: Send + Sync {
    /// Separate `input` into stems under `output_dir/<input_basename>/`
    async fn separate(
        &self,
        input: &Path,
        output_dir: &Path,
        stem_config: StemConfig,
    ) -> Result<(), EngineError>;

    /// Short name for logs
    fn name(&self) -> &str;
}

/// Spleeter command-line engine
#[derive(Debug, Clone)]
pub struct SpleeterEngine {
    binary_path: String,
    extra_args: Vec<String>,
}

impl SpleeterEngine {
    pub fn new(binary_path: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            extra_args,
        }
    }

    pub fn binary_path(&self) -> &str {
        &self.binary_path
    }

    /// Check whether the engine binary can be launched
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary_path).arg("--help").output().is_ok()
    }

    /// Arguments for one separation run
    fn build_args(&self, input: &Path, output_dir: &Path, stem_config: StemConfig) -> Vec<String> {
        let mut args = vec![
            "separate".to_string(),
            "-p".to_string(),
            stem_config.engine_model().to_string(),
            "-o".to_string(),
            output_dir.display().to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());
        args.push(input.display().to_string());
        args
    }
}

#[async_trait]
impl StemEngine for SpleeterEngine {
    async fn separate(
        &self,
        input: &Path,
        output_dir: &Path,
        stem_config: StemConfig,
    ) -> Result<(), EngineError> {
        if !input.exists() {
            return Err(EngineError::InputNotFound(input.display().to_string()));
        }
        tokio::fs::create_dir_all(output_dir).await?;

        let args = self.build_args(input, output_dir, stem_config);
        tracing::debug!(
            binary = %self.binary_path,
            args = ?args,
            "Running separation engine"
        );

        // Separation is CPU/GPU heavy and can take minutes
        let output = tokio::task::spawn_blocking({
            let binary = self.binary_path.clone();
            move || Command::new(&binary).args(&args).output()
        })
        .await
        .map_err(|e| EngineError::Execution(format!("Task join error: {}", e)))?
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::BinaryNotFound(self.binary_path.clone())
            } else {
                EngineError::Execution(e.to_string())
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::SeparationFailed(format!(
                "Exit code: {:?}, stderr: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        tracing::info!(
            input = %input.display(),
            model = stem_config.engine_model(),
            "Separation engine finished"
        );

        Ok(())
    }

    fn name(&self) -> &str {
        "spleeter"
    }
}
