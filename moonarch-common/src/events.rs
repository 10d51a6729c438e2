//! Event types and EventBus
//!
//! Task lifecycle notifications published by the splitter service and
//! forwarded to SSE clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Splitter event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SplitterEvent {
    /// Upload accepted and task recorded as pending
    TaskCreated {
        task_id: Uuid,
        source_filename: String,
        canonical_name: String,
        timestamp: DateTime<Utc>,
    },

    /// Job runner picked the task up
    TaskStarted {
        task_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Separation finished and outputs are downloadable
    TaskCompleted {
        task_id: Uuid,
        /// Stem name → relative artifact path
        outputs: BTreeMap<String, String>,
        timestamp: DateTime<Utc>,
    },

    /// Separation failed; the task is terminal
    TaskFailed {
        task_id: Uuid,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl SplitterEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            SplitterEvent::TaskCreated { .. } => "TaskCreated",
            SplitterEvent::TaskStarted { .. } => "TaskStarted",
            SplitterEvent::TaskCompleted { .. } => "TaskCompleted",
            SplitterEvent::TaskFailed { .. } => "TaskFailed",
        }
    }

    /// Task the event refers to
    pub fn task_id(&self) -> Uuid {
        match self {
            SplitterEvent::TaskCreated { task_id, .. }
            | SplitterEvent::TaskStarted { task_id, .. }
            | SplitterEvent::TaskCompleted { task_id, .. }
            | SplitterEvent::TaskFailed { task_id, .. } => *task_id,
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use moonarch_common::events::{EventBus, SplitterEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(SplitterEvent::TaskStarted {
///     task_id: uuid::Uuid::new_v4(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SplitterEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SplitterEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SplitterEvent,
    ) -> Result<usize, broadcast::error::SendError<SplitterEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SplitterEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
