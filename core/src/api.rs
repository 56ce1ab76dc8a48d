//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `lifeline_core::api` instead of reaching into internal modules.

pub use crate::config::{
    load_default, load_from_path, AppConfig, CrashConfig, CrashReporterProvider, EventsConfig,
    JsonlReporterConfig, LoggingConfig, TasksConfig,
};
pub use crate::context::AppContext;
pub use crate::crash::{install_panic_hook, CrashReporter, FaultKind, NoopCrashReporter, TaskFault};
pub use crate::error::{CliError, LifecycleError, TaskError};
pub use crate::state::{
    AppState, Edge, EdgeScope, HistoryEntry, LifecycleEvent, RejectReason, StateMachine,
    SubscriptionId, Transition, TransitionTable,
};
pub use crate::task::{
    CleanupReport, RejectedTask, SafeTask, StopOutcome, StopToken, TaskEvent, TaskHooks, TaskId,
    TaskKind, TaskManager, TaskStatus,
};
