//! Supervised background tasks and their registry.

mod manager;
mod safe_task;
mod signal;
mod types;

pub use manager::{RejectedTask, TaskManager};
pub use safe_task::{SafeTask, TaskHooks, DEFAULT_FORCE_GRACE};
pub use signal::StopToken;
pub use types::{CleanupReport, StopOutcome, TaskEvent, TaskId, TaskKind, TaskStatus};
