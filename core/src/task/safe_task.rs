//! Supervised unit of background work.
//!
//! Whatever the body does (return `Err`, panic, ignore the stop flag) stays
//! inside the task boundary: faults are reported and turned into a
//! `TaskEvent::Failed`, and a body that will not stop is aborted.

use super::signal::StopToken;
use super::types::{StopOutcome, TaskEvent, TaskId, TaskKind, TaskStatus};
use crate::crash::{self, CrashReporter, FaultKind, TaskFault};
use crate::error::TaskError;
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::AbortHandle;

pub const DEFAULT_FORCE_GRACE: Duration = Duration::from_millis(1000);

/// Collaborators every task boundary reports to.
#[derive(Clone)]
pub struct TaskHooks {
    pub reporter: Arc<dyn CrashReporter>,
    pub events: broadcast::Sender<TaskEvent>,
    /// Wait after forced termination before declaring the task detached.
    pub force_grace: Duration,
}

impl TaskHooks {
    pub fn new(reporter: Arc<dyn CrashReporter>, events: broadcast::Sender<TaskEvent>) -> Self {
        Self {
            reporter,
            events,
            force_grace: DEFAULT_FORCE_GRACE,
        }
    }

    pub fn with_force_grace(mut self, grace: Duration) -> Self {
        self.force_grace = grace;
        self
    }

    fn publish(&self, event: TaskEvent) {
        let _ = self.events.send(event);
    }
}

type Caught = Result<anyhow::Result<()>, Box<dyn Any + Send>>;

/// Owned by the running body; records how it ended.
struct Boundary {
    id: TaskId,
    kind: TaskKind,
    hooks: TaskHooks,
    stop: StopToken,
    status_tx: watch::Sender<TaskStatus>,
    started_at: Instant,
    finished: bool,
}

impl Boundary {
    fn finish(mut self, caught: Caught) {
        self.finished = true;
        let duration_ms = self.started_at.elapsed().as_millis() as u64;

        let fault = match caught {
            Ok(Ok(())) => {
                tracing::debug!(task.id = %self.id, duration_ms, "task completed");
                self.status_tx.send_replace(TaskStatus::Completed);
                self.hooks.publish(TaskEvent::Completed {
                    id: self.id.clone(),
                    duration_ms,
                    timestamp: Utc::now(),
                });
                return;
            }
            Ok(Err(err)) => TaskFault::from_error(Some(self.id.clone()), &err),
            Err(payload) => TaskFault::from_panic(Some(self.id.clone()), payload.as_ref()),
        };

        tracing::error!(
            task.id = %self.id,
            fault.kind = ?fault.kind,
            error = %fault.message,
            "task fault captured"
        );
        self.hooks.reporter.report(&fault, &self.context(duration_ms, fault.kind));
        self.status_tx
            .send_replace(TaskStatus::Failed(fault.message.clone()));
        self.hooks.publish(TaskEvent::Failed {
            id: self.id.clone(),
            error: fault.message,
            timestamp: Utc::now(),
        });
    }

    fn context(&self, duration_ms: u64, kind: FaultKind) -> HashMap<String, String> {
        let mut context = HashMap::new();
        context.insert("task_id".to_string(), self.id.to_string());
        context.insert(
            "task_kind".to_string(),
            match self.kind {
                TaskKind::Async => "async",
                TaskKind::Blocking => "blocking",
            }
            .to_string(),
        );
        context.insert(
            "fault_kind".to_string(),
            match kind {
                FaultKind::Error => "error",
                FaultKind::Panic => "panic",
            }
            .to_string(),
        );
        context.insert("elapsed_ms".to_string(), duration_ms.to_string());
        context.insert(
            "stop_requested".to_string(),
            self.stop.is_stopping().to_string(),
        );
        context
    }
}

impl Drop for Boundary {
    fn drop(&mut self) {
        if !self.finished {
            // Future dropped mid-flight: the runtime aborted it.
            tracing::debug!(task.id = %self.id, "task aborted before finishing");
            self.status_tx.send_replace(TaskStatus::Aborted);
        }
    }
}

pub struct SafeTask {
    id: TaskId,
    kind: TaskKind,
    stop: StopToken,
    status: watch::Receiver<TaskStatus>,
    abort: AbortHandle,
    hooks: TaskHooks,
}

impl SafeTask {
    /// Run `work` on the current tokio runtime.
    pub fn spawn<F, Fut>(id: impl Into<TaskId>, hooks: &TaskHooks, work: F) -> Result<Self, TaskError>
    where
        F: FnOnce(StopToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = id.into();
        let runtime = Handle::try_current().map_err(|_| TaskError::NoRuntime { id: id.clone() })?;
        let (stop, status, boundary) = Self::prepare(&id, TaskKind::Async, hooks);

        let token = stop.clone();
        let scope_id = id.clone();
        let handle = runtime.spawn(async move {
            let body = AssertUnwindSafe(async move { work(token).await }).catch_unwind();
            let caught = crash::supervised(scope_id, body).await;
            boundary.finish(caught);
        });

        Ok(Self::started(id, TaskKind::Async, stop, status, handle.abort_handle(), hooks))
    }

    /// Run blocking `work` on the runtime's blocking pool.
    ///
    /// Forced termination cannot interrupt a running closure; a body that
    /// ignores its `StopToken` ends up detached.
    pub fn spawn_blocking<F>(id: impl Into<TaskId>, hooks: &TaskHooks, work: F) -> Result<Self, TaskError>
    where
        F: FnOnce(StopToken) -> anyhow::Result<()> + Send + 'static,
    {
        let id = id.into();
        let runtime = Handle::try_current().map_err(|_| TaskError::NoRuntime { id: id.clone() })?;
        let (stop, status, boundary) = Self::prepare(&id, TaskKind::Blocking, hooks);

        let token = stop.clone();
        let scope_id = id.clone();
        let handle = runtime.spawn_blocking(move || {
            let caught = crash::supervised_blocking(scope_id, || {
                catch_unwind(AssertUnwindSafe(|| work(token)))
            });
            boundary.finish(caught);
        });

        Ok(Self::started(id, TaskKind::Blocking, stop, status, handle.abort_handle(), hooks))
    }

    fn prepare(
        id: &TaskId,
        kind: TaskKind,
        hooks: &TaskHooks,
    ) -> (StopToken, watch::Receiver<TaskStatus>, Boundary) {
        let stop = StopToken::new();
        let (status_tx, status_rx) = watch::channel(TaskStatus::Running);
        // Published before the body can run, so Started always precedes the end event.
        tracing::debug!(task.id = %id, task.kind = ?kind, "task started");
        hooks.publish(TaskEvent::Started {
            id: id.clone(),
            kind,
            timestamp: Utc::now(),
        });
        let boundary = Boundary {
            id: id.clone(),
            kind,
            hooks: hooks.clone(),
            stop: stop.clone(),
            status_tx,
            started_at: Instant::now(),
            finished: false,
        };
        (stop, status_rx, boundary)
    }

    fn started(
        id: TaskId,
        kind: TaskKind,
        stop: StopToken,
        status: watch::Receiver<TaskStatus>,
        abort: AbortHandle,
        hooks: &TaskHooks,
    ) -> Self {
        Self {
            id,
            kind,
            stop,
            status,
            abort,
            hooks: hooks.clone(),
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.is_stopping()
    }

    pub fn is_running(&self) -> bool {
        !self.status.borrow().is_finished()
    }

    pub fn status(&self) -> TaskStatus {
        self.status.borrow().clone()
    }

    /// Wait up to `timeout` for the body to end. Returns whether it did.
    pub async fn join_or_timeout(&self, timeout: Duration) -> bool {
        let mut status = self.status.clone();
        // A closed channel means the boundary is gone, so the task has ended.
        let wait = async move {
            let _ = status.wait_for(TaskStatus::is_finished).await;
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    /// Best-effort unconditional termination. Resources held by the body are
    /// not guaranteed to be released.
    pub fn force_terminate(&self) {
        tracing::warn!(task.id = %self.id, task.kind = ?self.kind, "forcing task termination");
        self.abort.abort();
    }

    /// Ask the task to stop, wait up to `timeout`, then force it and wait
    /// the fixed grace period.
    pub async fn safe_stop(&self, timeout: Duration) -> StopOutcome {
        let started = Instant::now();
        self.request_stop();

        let outcome = if self.join_or_timeout(timeout).await {
            StopOutcome::clean(self.id.clone(), started.elapsed())
        } else {
            tracing::warn!(
                task.id = %self.id,
                timeout_ms = timeout.as_millis() as u64,
                "task did not stop within timeout, terminating"
            );
            self.force_terminate();
            let ended = self.join_or_timeout(self.hooks.force_grace).await;
            StopOutcome::forced(self.id.clone(), ended, started.elapsed())
        };

        self.publish_stopped(outcome.clone());
        outcome
    }

    pub(crate) fn force_grace(&self) -> Duration {
        self.hooks.force_grace
    }

    pub(crate) fn publish_stopped(&self, outcome: StopOutcome) {
        if outcome.detached {
            tracing::error!(task.id = %self.id, "task still running after forced termination; detached");
        }
        self.hooks.publish(TaskEvent::Stopped {
            outcome,
            timestamp: Utc::now(),
        });
    }
}

impl fmt::Debug for SafeTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeTask")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("status", &*self.status.borrow())
            .field("stopping", &self.stop.is_stopping())
            .finish()
    }
}
