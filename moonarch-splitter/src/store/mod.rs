//! Task persistence
//!
//! The `TaskStore` is the single source of truth for task state. Job
//! runners and HTTP handlers only ever see it through this trait, so the
//! backing storage can change without touching lifecycle rules.
//!
//! Guarantees every backend provides:
//! - `update` is an atomic read-modify-write; readers never observe a
//!   half-applied mutation
//! - updates to one task are serialized, updates to different tasks do not
//!   block each other
//! - a mutator returning `Err` leaves the stored record untouched

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryTaskStore;
pub use sqlite::SqliteTaskStore;

use async_trait::async_trait;
use moonarch_common::Result;
use uuid::Uuid;

use crate::models::{StemConfig, Task};
use crate::services::path_normalizer;

/// Read-modify-write closure applied by `TaskStore::update`
///
/// Persisted backends may apply it more than once when a concurrent writer
/// wins the race, so it must only depend on the task it is given.
pub type TaskMutator = Box<dyn Fn(&mut Task) -> Result<()> + Send + Sync>;

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Record a new pending task for an uploaded file
    async fn create(&self, source_filename: &str, stem_config: StemConfig) -> Result<Task>;

    /// Fetch a snapshot of a task (`Error::NotFound` if unknown)
    async fn get(&self, task_id: Uuid) -> Result<Task>;

    /// Atomically apply `mutator` and return the updated task
    async fn update(&self, task_id: Uuid, mutator: TaskMutator) -> Result<Task>;

    /// All tasks, newest first
    async fn list(&self) -> Result<Vec<Task>>;
}

/// Build the pending record shared by every backend's `create`
pub(crate) fn new_task(source_filename: &str, stem_config: StemConfig) -> Result<Task> {
    let canonical_name = path_normalizer::normalize(source_filename)?;
    Ok(Task::new(source_filename.to_string(), canonical_name, stem_config))
}
