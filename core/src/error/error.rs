use thiserror::Error;

use crate::state::{AppState, Transition};

use super::task::TaskError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
    #[error("task error: {0}")]
    Task(#[from] TaskError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// A rejected trigger. Never fatal: `StateMachine::trigger` turns it into `false`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("state machine not started, ignoring {transition}")]
    NotStarted { transition: Transition },
    #[error("invalid transition {transition} from state {from}")]
    InvalidTransition {
        from: AppState,
        transition: Transition,
    },
}

impl LifecycleError {
    pub fn transition(&self) -> Transition {
        match self {
            Self::NotStarted { transition } | Self::InvalidTransition { transition, .. } => {
                *transition
            }
        }
    }
}
