//! moonarch-splitter - audio stem separation service
//!
//! Accepts audio uploads over HTTP, separates them into stems with an
//! external engine in the background and serves the results.

use anyhow::{Context, Result};
use clap::Parser;
use moonarch_common::config::{default_config_path, load_toml_config, TomlConfig};
use moonarch_common::events::EventBus;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use moonarch_splitter::config::{CliArgs, ServiceConfig, TaskStoreKind};
use moonarch_splitter::services::SpleeterEngine;
use moonarch_splitter::store::{InMemoryTaskStore, SqliteTaskStore, TaskStore};
use moonarch_splitter::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CliArgs::parse();

    // Config is read before logging exists, so a load failure is reported
    // through the returned error
    let toml_config = match cli.config.clone().or_else(default_config_path) {
        Some(path) => load_toml_config(&path)?,
        None => TomlConfig::default(),
    };
    let config = ServiceConfig::resolve(&cli, &toml_config)?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting moonarch-splitter (stem separation) service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Root folder: {}", config.root_folder.display());

    config
        .ensure_directories()
        .context("Failed to initialize root folder")?;
    info!("Outputs: {}", config.output_dir().display());
    info!("Staging: {}", config.staging_dir().display());

    let store: Arc<dyn TaskStore> = match config.task_store {
        TaskStoreKind::Memory => Arc::new(InMemoryTaskStore::new()),
        TaskStoreKind::Sqlite => {
            let db_path = config.database_path();
            info!("Task database: {}", db_path.display());
            Arc::new(SqliteTaskStore::connect(&db_path).await?)
        }
    };
    info!("Task store: {}", config.task_store);

    let engine = SpleeterEngine::new(config.engine_binary.clone(), config.engine_args.clone());
    if engine.is_available() {
        info!("Separation engine: {}", engine.binary_path());
    } else {
        warn!(
            "Separation engine '{}' could not be launched; jobs will fail until it is installed",
            engine.binary_path()
        );
    }
    info!(
        "Max concurrent jobs: {}, default stems: {}",
        config.max_concurrent_jobs, config.default_stems
    );

    let event_bus = EventBus::new(100);
    let state = AppState::new(&config, store, Arc::new(engine), event_bus);
    let app = moonarch_splitter::build_router(state);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("Listening on http://{}", address);
    info!("Health check: http://{}/health", address);

    axum::serve(listener, app).await?;

    Ok(())
}
