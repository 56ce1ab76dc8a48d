//! Crash reporting seam.
//!
//! Faults captured at a task boundary, and panics anywhere else once
//! `install_panic_hook` ran, are handed to a `CrashReporter` together with a
//! flat context map. The transport behind the reporter is not this crate's
//! concern.

use crate::task::TaskId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// The work returned `Err`
    Error,
    /// The work panicked
    Panic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFault {
    pub task_id: Option<TaskId>,
    pub kind: FaultKind,
    pub message: String,
    /// Outermost error first.
    pub chain: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl TaskFault {
    pub fn from_error(task_id: Option<TaskId>, err: &anyhow::Error) -> Self {
        Self {
            task_id,
            kind: FaultKind::Error,
            message: err.to_string(),
            chain: err.chain().map(|e| e.to_string()).collect(),
            timestamp: Utc::now(),
        }
    }

    pub fn from_panic(task_id: Option<TaskId>, payload: &(dyn Any + Send)) -> Self {
        let message = panic_message(payload);
        Self {
            task_id,
            kind: FaultKind::Panic,
            chain: vec![message.clone()],
            message,
            timestamp: Utc::now(),
        }
    }
}

pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[async_trait::async_trait]
pub trait CrashReporter: Send + Sync {
    fn name(&self) -> &str;

    /// Must not block for long and must not panic.
    fn report(&self, fault: &TaskFault, context: &HashMap<String, String>);

    /// Push out anything buffered. Called once before process exit.
    async fn flush(&self) {}
}

/// Drops every fault. Used when crash reporting is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCrashReporter;

#[async_trait::async_trait]
impl CrashReporter for NoopCrashReporter {
    fn name(&self) -> &str {
        "noop"
    }

    fn report(&self, _fault: &TaskFault, _context: &HashMap<String, String>) {}
}

tokio::task_local! {
    static SUPERVISED_TASK: TaskId;
}

thread_local! {
    static SUPERVISED_THREAD: RefCell<Option<TaskId>> = const { RefCell::new(None) };
}

/// Run `fut` marked as supervised by `id`; panics inside it are reported by
/// the task boundary, so the global hook skips them.
pub(crate) async fn supervised<F: Future>(id: TaskId, fut: F) -> F::Output {
    SUPERVISED_TASK.scope(id, fut).await
}

pub(crate) fn supervised_blocking<R>(id: TaskId, f: impl FnOnce() -> R) -> R {
    struct Reset;
    impl Drop for Reset {
        fn drop(&mut self) {
            SUPERVISED_THREAD.with(|slot| slot.borrow_mut().take());
        }
    }

    SUPERVISED_THREAD.with(|slot| *slot.borrow_mut() = Some(id));
    let _reset = Reset;
    f()
}

fn current_supervised() -> Option<TaskId> {
    SUPERVISED_TASK
        .try_with(|id| id.clone())
        .ok()
        .or_else(|| SUPERVISED_THREAD.with(|slot| slot.borrow().clone()))
}

/// Forward unsupervised panics to `reporter`, then run the previous hook.
pub fn install_panic_hook(reporter: Arc<dyn CrashReporter>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if current_supervised().is_none() {
            let fault = TaskFault::from_panic(None, info.payload());
            let mut context = HashMap::new();
            if let Some(location) = info.location() {
                context.insert("location".to_string(), location.to_string());
            }
            if let Some(name) = std::thread::current().name() {
                context.insert("thread".to_string(), name.to_string());
            }
            reporter.report(&fault, &context);
        }
        previous(info);
    }));
    tracing::debug!("panic hook installed");
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Keeps every report for assertions.
    #[derive(Default)]
    pub struct RecordingReporter {
        pub faults: Mutex<Vec<(TaskFault, HashMap<String, String>)>>,
    }

    impl RecordingReporter {
        pub fn count(&self) -> usize {
            self.faults.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl CrashReporter for RecordingReporter {
        fn name(&self) -> &str {
            "recording"
        }

        fn report(&self, fault: &TaskFault, context: &HashMap<String, String>) {
            self.faults
                .lock()
                .unwrap()
                .push((fault.clone(), context.clone()));
        }
    }
}
