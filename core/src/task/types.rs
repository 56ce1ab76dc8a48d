use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Caller-chosen identifier of a supervised task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Random id for fire-and-forget work.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Future on the tokio runtime; forced termination aborts at the next await.
    Async,
    /// Closure on the blocking pool; forced termination can only detach it.
    Blocking,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Completed,
    Failed(String),
    /// The future was dropped before finishing (forced termination).
    Aborted,
}

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// How a task ended when it was asked to stop.
///
/// `forced` tasks gave no guarantee about the resources they held: locks,
/// files or sockets owned by the work may not have been released. `detached`
/// means even forced termination did not end it within the grace period; it
/// keeps running unsupervised until its body returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopOutcome {
    pub id: TaskId,
    pub stopped_cleanly: bool,
    pub forced: bool,
    pub detached: bool,
    pub elapsed_ms: u64,
}

impl StopOutcome {
    pub(crate) fn clean(id: TaskId, elapsed: Duration) -> Self {
        Self {
            id,
            stopped_cleanly: true,
            forced: false,
            detached: false,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub(crate) fn forced(id: TaskId, ended: bool, elapsed: Duration) -> Self {
        Self {
            id,
            stopped_cleanly: false,
            forced: true,
            detached: !ended,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

/// Task notifications, published on the manager's broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    Started {
        id: TaskId,
        kind: TaskKind,
        timestamp: DateTime<Utc>,
    },
    Completed {
        id: TaskId,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    Failed {
        id: TaskId,
        error: String,
        timestamp: DateTime<Utc>,
    },
    Stopped {
        outcome: StopOutcome,
        timestamp: DateTime<Utc>,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> &TaskId {
        match self {
            Self::Started { id, .. } | Self::Completed { id, .. } | Self::Failed { id, .. } => id,
            Self::Stopped { outcome, .. } => &outcome.id,
        }
    }
}

/// Result of `TaskManager::cleanup_all`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub outcomes: Vec<StopOutcome>,
    pub elapsed_ms: u64,
}

impl CleanupReport {
    pub fn clean_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.stopped_cleanly).count()
    }

    pub fn forced_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.forced).count()
    }

    pub fn detached_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.detached).count()
    }

    pub fn outcome(&self, id: &TaskId) -> Option<&StopOutcome> {
        self.outcomes.iter().find(|o| &o.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}
