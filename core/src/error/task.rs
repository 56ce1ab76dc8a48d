use thiserror::Error;

use crate::task::TaskId;

/// Task supervision errors.
///
/// Faults raised by task bodies are not represented here: they are captured
/// inside the task boundary and surface as `TaskEvent::Failed`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task '{id}' is already registered and still running")]
    DuplicateRegistration { id: TaskId },

    #[error("no tokio runtime available to spawn task '{id}'")]
    NoRuntime { id: TaskId },

    #[error("task '{id}' not found")]
    NotFound { id: TaskId },
}

impl TaskError {
    pub fn task_id(&self) -> &TaskId {
        match self {
            Self::DuplicateRegistration { id } | Self::NoRuntime { id } | Self::NotFound { id } => {
                id
            }
        }
    }
}
