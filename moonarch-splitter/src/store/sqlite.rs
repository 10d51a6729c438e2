//! SQLite-backed task store
//!
//! One row per task holding the JSON-serialized record and a `revision`
//! counter. Updates are compare-and-swap on `revision`: a writer that lost
//! a race re-reads the row and re-applies its mutator, so concurrent writers
//! to one task are serialized while each single-row UPDATE keeps readers
//! from ever seeing a partial record.

use async_trait::async_trait;
use chrono::SecondsFormat;
use moonarch_common::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use super::{new_task, TaskMutator, TaskStore};
use crate::models::{StemConfig, Task};
use crate::utils::retry_on_lock;

/// Default upper bound on lock/conflict retries
const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

pub struct SqliteTaskStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteTaskStore {
    /// Open (creating if needed) the task database at `db_path`
    pub async fn connect(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        tracing::debug!("Connecting to task database: {}", db_url);

        let options = SqliteConnectOptions::from_str(&db_url)?
            .busy_timeout(Duration::from_millis(DEFAULT_MAX_LOCK_WAIT_MS));
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        Self::new(pool).await
    }

    /// Wrap an existing pool and create the tasks table
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        init_tables(&pool).await?;
        Ok(Self {
            pool,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        })
    }

    async fn load(&self, task_id: Uuid) -> Result<(Task, i64)> {
        let row = sqlx::query("SELECT record, revision FROM tasks WHERE task_id = ?")
            .bind(task_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Task not found: {}", task_id)))?;

        let record: String = row.get("record");
        let revision: i64 = row.get("revision");
        Ok((decode(&record)?, revision))
    }

    async fn try_update(&self, task_id: Uuid, mutator: &TaskMutator) -> Result<Task> {
        let (mut task, revision) = self.load(task_id).await?;
        mutator(&mut task)?;

        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = ?, record = ?, revision = revision + 1
            WHERE task_id = ? AND revision = ?
            "#,
        )
        .bind(task.status.as_str())
        .bind(encode(&task)?)
        .bind(task_id.to_string())
        .bind(revision)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::Conflict(format!(
                "Task {} changed concurrently (revision {})",
                task_id, revision
            )));
        }

        Ok(task)
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn create(&self, source_filename: &str, stem_config: StemConfig) -> Result<Task> {
        let task = new_task(source_filename, stem_config)?;
        let record = encode(&task)?;

        sqlx::query(
            r#"
            INSERT INTO tasks (task_id, status, record, revision, created_at)
            VALUES (?, ?, ?, 0, ?)
            "#,
        )
        .bind(task.id.to_string())
        .bind(task.status.as_str())
        .bind(record)
        .bind(task.created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(&self.pool)
        .await?;

        Ok(task)
    }

    async fn get(&self, task_id: Uuid) -> Result<Task> {
        self.load(task_id).await.map(|(task, _)| task)
    }

    async fn update(&self, task_id: Uuid, mutator: TaskMutator) -> Result<Task> {
        let mutator = &mutator;
        retry_on_lock("update_task", self.max_lock_wait_ms, move || {
            self.try_update(task_id, mutator)
        })
        .await
    }

    async fn list(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query("SELECT record FROM tasks ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| decode(&row.get::<String, _>("record")))
            .collect()
    }
}

/// Create the tasks table if it does not exist
async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            task_id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            record TEXT NOT NULL,
            revision INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (tasks)");
    Ok(())
}

fn encode(task: &Task) -> Result<String> {
    serde_json::to_string(task)
        .map_err(|e| Error::Internal(format!("Failed to serialize task: {}", e)))
}

fn decode(record: &str) -> Result<Task> {
    serde_json::from_str(record)
        .map_err(|e| Error::Internal(format!("Failed to deserialize task: {}", e)))
}
