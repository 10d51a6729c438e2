//! In-memory task store
//!
//! Each task lives behind its own `RwLock`; the outer map lock is only held
//! long enough to find or insert an entry.

use async_trait::async_trait;
use moonarch_common::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{new_task, TaskMutator, TaskStore};
use crate::models::{StemConfig, Task};

#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<Uuid, Arc<RwLock<Task>>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, task_id: Uuid) -> Result<Arc<RwLock<Task>>> {
        self.tasks
            .read()
            .await
            .get(&task_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Task not found: {}", task_id)))
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, source_filename: &str, stem_config: StemConfig) -> Result<Task> {
        let task = new_task(source_filename, stem_config)?;
        self.tasks
            .write()
            .await
            .insert(task.id, Arc::new(RwLock::new(task.clone())));
        Ok(task)
    }

    async fn get(&self, task_id: Uuid) -> Result<Task> {
        let entry = self.entry(task_id).await?;
        let task = entry.read().await.clone();
        Ok(task)
    }

    async fn update(&self, task_id: Uuid, mutator: TaskMutator) -> Result<Task> {
        let entry = self.entry(task_id).await?;
        let mut guard = entry.write().await;

        // Mutate a copy so a failing mutator leaves the record untouched
        let mut updated = guard.clone();
        mutator(&mut updated)?;
        *guard = updated.clone();

        Ok(updated)
    }

    async fn list(&self) -> Result<Vec<Task>> {
        let entries: Vec<Arc<RwLock<Task>>> = self.tasks.read().await.values().cloned().collect();

        let mut tasks = Vec::with_capacity(entries.len());
        for entry in entries {
            tasks.push(entry.read().await.clone());
        }
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }
}
