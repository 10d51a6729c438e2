//! Service configuration for the splitter
//!
//! Command-line flags (each with an environment fallback) win over the TOML
//! file, which wins over compiled defaults. The root folder follows the
//! same order through [`RootFolderResolver`].

use clap::Parser;
use moonarch_common::config::{CompiledDefaults, RootFolderResolver, TomlConfig};
use moonarch_common::{Error, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;

use crate::models::StemConfig;

/// Command-line arguments
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "moonarch-splitter", version, about = "Audio stem separation service")]
pub struct CliArgs {
    /// Path to the TOML config file
    #[arg(long, env = "MOONARCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Root folder for outputs, staging uploads and the task database
    #[arg(long)]
    pub root_folder: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "MOONARCH_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "MOONARCH_PORT")]
    pub port: Option<u16>,

    /// Separation engine executable
    #[arg(long, env = "MOONARCH_ENGINE")]
    pub engine: Option<String>,

    /// Maximum concurrent separation jobs
    #[arg(long, env = "MOONARCH_MAX_JOBS")]
    pub max_jobs: Option<usize>,

    /// Stem configuration for uploads that do not name one
    #[arg(long)]
    pub default_stems: Option<String>,

    /// Task store backend: "memory" or "sqlite"
    #[arg(long)]
    pub task_store: Option<String>,
}

/// Where task records live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStoreKind {
    /// Lost on restart
    Memory,
    /// `<root>/tasks.db`
    Sqlite,
}

impl FromStr for TaskStoreKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(TaskStoreKind::Memory),
            "sqlite" => Ok(TaskStoreKind::Sqlite),
            other => Err(Error::Config(format!(
                "Unknown task store '{}' (expected \"memory\" or \"sqlite\")",
                other
            ))),
        }
    }
}

impl fmt::Display for TaskStoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStoreKind::Memory => write!(f, "memory"),
            TaskStoreKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub root_folder: PathBuf,
    pub host: String,
    pub port: u16,
    pub engine_binary: String,
    pub engine_args: Vec<String>,
    pub default_stems: StemConfig,
    pub max_concurrent_jobs: usize,
    pub max_upload_bytes: usize,
    pub task_store: TaskStoreKind,
    pub log_level: String,
}

impl ServiceConfig {
    /// Merge CLI arguments over the TOML file over compiled defaults
    pub fn resolve(cli: &CliArgs, toml: &TomlConfig) -> Result<Self> {
        let defaults = CompiledDefaults::for_current_platform();

        let root_folder = RootFolderResolver::new()
            .with_cli_arg(cli.root_folder.clone())
            .with_toml(toml)
            .resolve();

        let default_stems = cli
            .default_stems
            .clone()
            .or_else(|| toml.engine.default_stems.clone())
            .unwrap_or(defaults.default_stems)
            .parse::<StemConfig>()
            .map_err(|e| Error::Config(format!("Invalid default stems: {}", e)))?;

        let task_store = cli
            .task_store
            .clone()
            .or_else(|| toml.storage.task_store.clone())
            .unwrap_or(defaults.task_store)
            .parse::<TaskStoreKind>()?;

        let max_concurrent_jobs = cli
            .max_jobs
            .or(toml.jobs.max_concurrent)
            .unwrap_or(defaults.max_concurrent_jobs);
        if max_concurrent_jobs == 0 {
            return Err(Error::Config("max_concurrent jobs must be at least 1".to_string()));
        }

        let max_upload_bytes = toml.jobs.max_upload_bytes.unwrap_or(defaults.max_upload_bytes);
        if max_upload_bytes == 0 {
            return Err(Error::Config("max_upload_bytes must be greater than 0".to_string()));
        }

        Ok(Self {
            root_folder,
            host: cli
                .host
                .clone()
                .or_else(|| toml.server.host.clone())
                .unwrap_or(defaults.host),
            port: cli.port.or(toml.server.port).unwrap_or(defaults.port),
            engine_binary: cli
                .engine
                .clone()
                .or_else(|| toml.engine.binary.clone())
                .unwrap_or(defaults.engine_binary),
            engine_args: toml.engine.extra_args.clone(),
            default_stems,
            max_concurrent_jobs,
            max_upload_bytes,
            task_store,
            log_level: toml.logging.level.clone(),
        })
    }

    /// Defaults rooted at `root_folder`, ignoring CLI, environment and TOML
    pub fn with_root(root_folder: impl Into<PathBuf>) -> Self {
        let defaults = CompiledDefaults::for_current_platform();
        Self {
            root_folder: root_folder.into(),
            host: defaults.host,
            port: defaults.port,
            engine_binary: defaults.engine_binary,
            engine_args: Vec::new(),
            default_stems: StemConfig::TwoStems,
            max_concurrent_jobs: defaults.max_concurrent_jobs,
            max_upload_bytes: defaults.max_upload_bytes,
            task_store: TaskStoreKind::Memory,
            log_level: defaults.log_level,
        }
    }

    /// Separated stems, one directory per canonical name
    pub fn output_dir(&self) -> PathBuf {
        self.root_folder.join("outputs")
    }

    /// Uploads waiting for (or undergoing) separation
    pub fn staging_dir(&self) -> PathBuf {
        self.root_folder.join("staging")
    }

    /// Temporary zip archives
    pub fn archive_dir(&self) -> PathBuf {
        self.root_folder.join("archives")
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join("tasks.db")
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Create the root folder and every derived directory
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            self.root_folder.clone(),
            self.output_dir(),
            self.staging_dir(),
            self.archive_dir(),
        ] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir)?;
                info!("Created directory: {}", dir.display());
            }
        }
        Ok(())
    }
}
