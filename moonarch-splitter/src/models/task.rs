//! Task lifecycle state machine
//!
//! A task progresses through four states:
//! PENDING → PROCESSING → COMPLETED | ERROR
//!
//! Transitions only move forward. `completed` and `error` are terminal and
//! reject every further mutation.

use chrono::{DateTime, Utc};
use moonarch_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::StemConfig;

/// Task workflow state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Upload staged, waiting for a worker
    Pending,
    /// Separation engine running
    Processing,
    /// Outputs available for download
    Completed,
    /// Separation or post-processing failed
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One separation request and its tracked lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier
    pub id: Uuid,

    /// Current workflow state
    pub status: TaskStatus,

    /// Uploaded filename, for display only
    pub source_filename: String,

    /// Lowercase filesystem-safe name used for every on-disk path
    pub canonical_name: String,

    /// Stem set requested for this task
    pub stem_config: StemConfig,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Stem name → artifact path relative to the output root
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,

    /// Failure reason, only set in the `error` state
    pub error_message: Option<String>,
}

impl Task {
    /// Create a new pending task
    pub fn new(source_filename: String, canonical_name: String, stem_config: StemConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: TaskStatus::Pending,
            source_filename,
            canonical_name,
            stem_config,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            outputs: BTreeMap::new(),
            error_message: None,
        }
    }

    /// pending → processing
    pub fn begin_processing(&mut self) -> Result<()> {
        self.check_transition(TaskStatus::Processing)?;
        self.status = TaskStatus::Processing;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// processing → completed
    ///
    /// `outputs` must not be empty: a completed task always advertises at
    /// least one artifact.
    pub fn complete(&mut self, outputs: BTreeMap<String, String>) -> Result<()> {
        self.check_transition(TaskStatus::Completed)?;
        if outputs.is_empty() {
            return Err(Error::InvalidInput(
                "A completed task requires at least one output".to_string(),
            ));
        }
        self.status = TaskStatus::Completed;
        self.outputs = outputs;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// processing → error
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.check_transition(TaskStatus::Error)?;
        let mut message = message.into();
        if message.trim().is_empty() {
            message = "Unknown error".to_string();
        }
        self.status = TaskStatus::Error;
        self.error_message = Some(message);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn check_transition(&self, to: TaskStatus) -> Result<()> {
        let allowed = matches!(
            (self.status, to),
            (TaskStatus::Pending, TaskStatus::Processing)
                | (TaskStatus::Processing, TaskStatus::Completed)
                | (TaskStatus::Processing, TaskStatus::Error)
        );
        if allowed {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            })
        }
    }
}
