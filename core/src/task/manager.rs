//! Registry of live tasks and bulk shutdown.
//!
//! The registry mutex is only held to read or edit the map; every wait in
//! `cleanup_all` runs on a snapshot with the lock released.

use super::safe_task::{SafeTask, TaskHooks};
use super::signal::StopToken;
use super::types::{CleanupReport, StopOutcome, TaskEvent, TaskId};
use crate::crash::CrashReporter;
use crate::error::TaskError;
use crate::util::lock_unpoisoned;
use futures::future::join_all;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::broadcast;

const DEFAULT_EVENT_CAPACITY: usize = 256;

/// `register` refused the task; it is handed back so the caller can stop it.
#[derive(Error, Debug)]
#[error("{reason}")]
pub struct RejectedTask {
    pub task: SafeTask,
    pub reason: TaskError,
}

impl RejectedTask {
    /// The task that was refused, still running.
    pub fn into_task(self) -> SafeTask {
        self.task
    }
}

impl From<RejectedTask> for TaskError {
    fn from(rejected: RejectedTask) -> Self {
        rejected.reason
    }
}

pub struct TaskManager {
    tasks: Mutex<HashMap<TaskId, Arc<SafeTask>>>,
    hooks: TaskHooks,
}

impl TaskManager {
    /// Empty registry reporting faults to `reporter`.
    pub fn new(reporter: Arc<dyn CrashReporter>) -> Self {
        Self::with_options(reporter, DEFAULT_EVENT_CAPACITY, super::DEFAULT_FORCE_GRACE)
    }

    /// Like `new`, with an explicit event channel size and force grace period.
    pub fn with_options(
        reporter: Arc<dyn CrashReporter>,
        event_capacity: usize,
        force_grace: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            tasks: Mutex::new(HashMap::new()),
            hooks: TaskHooks::new(reporter, events).with_force_grace(force_grace),
        }
    }

    /// Hooks to build `SafeTask`s that report like the manager's own.
    pub fn hooks(&self) -> &TaskHooks {
        &self.hooks
    }

    /// Receiver for task lifecycle events of every managed task.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.hooks.events.subscribe()
    }

    /// Take ownership of `task`. Finished entries are pruned first; a live
    /// entry with the same id makes this a rejection.
    pub fn register(&self, task: SafeTask) -> Result<(), RejectedTask> {
        let mut tasks = lock_unpoisoned(&self.tasks);
        Self::prune(&mut tasks);

        if tasks.contains_key(task.id()) {
            tracing::warn!(task.id = %task.id(), "duplicate task registration rejected");
            let reason = TaskError::DuplicateRegistration {
                id: task.id().clone(),
            };
            return Err(RejectedTask { task, reason });
        }

        tracing::debug!(task.id = %task.id(), live = tasks.len() + 1, "task registered");
        tasks.insert(task.id().clone(), Arc::new(task));
        Ok(())
    }

    /// Spawn async `work` under `id` and register it. The id is checked
    /// before spawning, so a duplicate never starts running.
    pub fn spawn<F, Fut>(&self, id: impl Into<TaskId>, work: F) -> Result<TaskId, TaskError>
    where
        F: FnOnce(StopToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = id.into();
        self.insert_with(id, |id, hooks| SafeTask::spawn(id, hooks, work))
    }

    /// Spawn fire-and-forget async `work` under a generated id.
    pub fn submit<F, Fut>(&self, work: F) -> Result<TaskId, TaskError>
    where
        F: FnOnce(StopToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.spawn(TaskId::generate(), work)
    }

    /// Blocking counterpart of `spawn`; `work` runs on the blocking pool.
    pub fn spawn_blocking<F>(&self, id: impl Into<TaskId>, work: F) -> Result<TaskId, TaskError>
    where
        F: FnOnce(StopToken) -> anyhow::Result<()> + Send + 'static,
    {
        let id = id.into();
        self.insert_with(id, |id, hooks| SafeTask::spawn_blocking(id, hooks, work))
    }

    fn insert_with(
        &self,
        id: TaskId,
        start: impl FnOnce(TaskId, &TaskHooks) -> Result<SafeTask, TaskError>,
    ) -> Result<TaskId, TaskError> {
        let mut tasks = lock_unpoisoned(&self.tasks);
        Self::prune(&mut tasks);

        if tasks.contains_key(&id) {
            tracing::warn!(task.id = %id, "duplicate task registration rejected");
            return Err(TaskError::DuplicateRegistration { id });
        }

        let task = start(id.clone(), &self.hooks)?;
        tasks.insert(id.clone(), Arc::new(task));
        Ok(id)
    }

    fn prune(tasks: &mut HashMap<TaskId, Arc<SafeTask>>) {
        let before = tasks.len();
        tasks.retain(|_, task| task.is_running());
        let pruned = before - tasks.len();
        if pruned > 0 {
            tracing::debug!(pruned, "pruned finished tasks");
        }
    }

    /// Registered tasks, including any that finished since the last prune.
    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.tasks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &TaskId) -> bool {
        lock_unpoisoned(&self.tasks).contains_key(id)
    }

    /// Ids of registered tasks that are still running.
    pub fn live_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = lock_unpoisoned(&self.tasks)
            .iter()
            .filter(|(_, task)| task.is_running())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Stop one task and drop it from the registry.
    pub async fn stop(&self, id: &TaskId, timeout: Duration) -> Result<StopOutcome, TaskError> {
        let task = lock_unpoisoned(&self.tasks)
            .remove(id)
            .ok_or_else(|| TaskError::NotFound { id: id.clone() })?;
        Ok(task.safe_stop(timeout).await)
    }

    /// Stop every registered task and empty the registry.
    ///
    /// All tasks are asked to stop before any wait begins. Each gets up to
    /// `timeout_per_task`; stragglers are then force-terminated together and
    /// given the grace period. Safe to call repeatedly.
    pub async fn cleanup_all(&self, timeout_per_task: Duration) -> CleanupReport {
        let started = Instant::now();
        let snapshot: Vec<Arc<SafeTask>> = lock_unpoisoned(&self.tasks).values().cloned().collect();

        if snapshot.is_empty() {
            lock_unpoisoned(&self.tasks).clear();
            return CleanupReport::default();
        }

        tracing::info!(
            tasks = snapshot.len(),
            timeout_ms = timeout_per_task.as_millis() as u64,
            "cleaning up tasks"
        );

        for task in &snapshot {
            task.request_stop();
        }

        let graceful = join_all(snapshot.iter().map(|task| async move {
            let ended = task.join_or_timeout(timeout_per_task).await;
            (ended, started.elapsed())
        }))
        .await;

        let stragglers: Vec<&Arc<SafeTask>> = snapshot
            .iter()
            .zip(&graceful)
            .filter(|(_, (stopped, _))| !*stopped)
            .map(|(task, _)| task)
            .collect();

        for task in &stragglers {
            tracing::warn!(task.id = %task.id(), "task ignored stop request within timeout");
            task.force_terminate();
        }

        let after_force = join_all(stragglers.iter().map(|task| async move {
            let ended = task.join_or_timeout(task.force_grace()).await;
            (ended, started.elapsed())
        }))
        .await;

        let elapsed = started.elapsed();
        let mut forced_ended = after_force.into_iter();
        let mut outcomes = Vec::with_capacity(snapshot.len());
        for (task, (stopped, waited)) in snapshot.iter().zip(&graceful) {
            let outcome = if *stopped {
                StopOutcome::clean(task.id().clone(), *waited)
            } else {
                let (ended, waited) = forced_ended.next().unwrap_or((false, elapsed));
                StopOutcome::forced(task.id().clone(), ended, waited)
            };
            task.publish_stopped(outcome.clone());
            outcomes.push(outcome);
        }

        {
            let mut tasks = lock_unpoisoned(&self.tasks);
            for (id, late) in tasks.iter() {
                if !snapshot.iter().any(|t| t.id() == id) && late.is_running() {
                    tracing::warn!(task.id = %id, "task registered during cleanup; forcing");
                    late.request_stop();
                    late.force_terminate();
                }
            }
            tasks.clear();
        }

        let report = CleanupReport {
            outcomes,
            elapsed_ms: elapsed.as_millis() as u64,
        };
        tracing::info!(
            clean = report.clean_count(),
            forced = report.forced_count(),
            detached = report.detached_count(),
            elapsed_ms = report.elapsed_ms,
            "task cleanup finished"
        );
        report
    }
}
