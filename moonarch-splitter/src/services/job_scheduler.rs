//! Background job scheduling
//!
//! Each submitted job runs on its own tokio task so uploads return
//! immediately. A semaphore bounds how many separation engines run at once;
//! jobs beyond the limit wait (still `pending`) for a permit.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use uuid::Uuid;

use super::job_runner::JobRunner;

/// Handle to one scheduled job
pub struct JobHandle {
    handle: JoinHandle<()>,
}

impl JobHandle {
    /// Wait until the job has reached a terminal state
    pub async fn wait(self) -> Result<(), JoinError> {
        self.handle.await
    }
}

#[derive(Clone)]
pub struct JobScheduler {
    runner: Arc<JobRunner>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl JobScheduler {
    pub fn new(runner: Arc<JobRunner>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            runner,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Jobs currently holding an engine slot
    pub fn active_jobs(&self) -> usize {
        self.max_concurrent - self.permits.available_permits()
    }

    /// Schedule `task_id` for processing without waiting for it
    pub fn submit(&self, task_id: Uuid, staging_path: PathBuf) -> JobHandle {
        let runner = self.runner.clone();
        let permits = self.permits.clone();

        let handle = tokio::spawn(async move {
            // The semaphore is never closed, so this only waits
            let _permit = permits.acquire_owned().await.ok();

            tracing::debug!(task_id = %task_id, "Job acquired engine slot");

            let outcome = AssertUnwindSafe(runner.run(task_id, &staging_path))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(task)) => {
                    tracing::debug!(task_id = %task_id, status = %task.status, "Job finished");
                }
                Ok(Err(e)) => {
                    tracing::error!(task_id = %task_id, error = %e, "Job could not update task store");
                    // Best effort so pollers still see a terminal state
                    let message = format!("Failed to record job outcome: {}", e);
                    if let Err(e) = runner.record_failure(task_id, message).await {
                        tracing::error!(
                            task_id = %task_id,
                            error = %e,
                            "Failed to record job outcome failure"
                        );
                    }
                }
                Err(panic) => {
                    let message = format!("Job panicked: {}", panic_message(panic.as_ref()));
                    if let Err(e) = runner.record_failure(task_id, message).await {
                        tracing::error!(
                            task_id = %task_id,
                            error = %e,
                            "Failed to record panicked job"
                        );
                    }
                }
            }
        });

        JobHandle { handle }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
