use crate::config::AppConfig;
use crate::crash::{self, CrashReporter};
use crate::error::TaskError;
use crate::state::StateMachine;
use crate::task::{CleanupReport, StopOutcome, StopToken, TaskId, TaskManager};
use std::future::Future;
use std::sync::Arc;

/// Process-wide collaborators, created once at startup and passed down
/// explicitly.
#[derive(Clone)]
pub struct AppContext {
    cfg: AppConfig,
    machine: Arc<StateMachine>,
    tasks: Arc<TaskManager>,
    reporter: Arc<dyn CrashReporter>,
}

impl AppContext {
    pub fn new(cfg: AppConfig, reporter: Arc<dyn CrashReporter>) -> Self {
        let machine = Arc::new(StateMachine::with_capacity(cfg.events.channel_capacity));
        let tasks = Arc::new(TaskManager::with_options(
            reporter.clone(),
            cfg.tasks.event_channel_capacity,
            cfg.tasks.force_grace(),
        ));
        tracing::debug!(reporter = reporter.name(), "app context created");
        Self {
            cfg,
            machine,
            tasks,
            reporter,
        }
    }

    /// A fresh, isolated context with the same config and reporter.
    pub fn reset(&self) -> Self {
        Self::new(self.cfg.clone(), self.reporter.clone())
    }

    /// Forward panics outside supervised tasks to this context's reporter.
    pub fn install_panic_hook(&self) {
        if self.cfg.crash.enabled && self.cfg.crash.install_panic_hook {
            crash::install_panic_hook(self.reporter.clone());
        }
    }

    pub fn cfg(&self) -> &AppConfig {
        &self.cfg
    }

    pub fn machine(&self) -> &Arc<StateMachine> {
        &self.machine
    }

    pub fn tasks(&self) -> &Arc<TaskManager> {
        &self.tasks
    }

    pub fn reporter(&self) -> &Arc<dyn CrashReporter> {
        &self.reporter
    }

    pub fn spawn_task<F, Fut>(&self, id: impl Into<TaskId>, work: F) -> Result<TaskId, TaskError>
    where
        F: FnOnce(StopToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.tasks.spawn(id, work)
    }

    /// Stop one task using the configured `tasks.stop_timeout_ms`.
    pub async fn stop_task(&self, id: &TaskId) -> Result<StopOutcome, TaskError> {
        self.tasks.stop(id, self.cfg.tasks.stop_timeout()).await
    }

    /// Move to SHUTTING_DOWN, stop every task within the configured
    /// timeout, then flush the reporter.
    pub async fn shutdown(&self) -> CleanupReport {
        if !self.machine.trigger_shutdown() {
            tracing::warn!(
                target: "lifeline.flow",
                state = %self.machine.current_state(),
                "shutdown requested on a machine that is not running"
            );
        }

        let report = self.tasks.cleanup_all(self.cfg.tasks.cleanup_timeout()).await;
        self.machine.stop();
        self.reporter.flush().await;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crash::testing::RecordingReporter;
    use crate::state::AppState;
    use std::time::Duration;

    fn context() -> AppContext {
        let mut cfg = AppConfig::default();
        cfg.tasks.cleanup_timeout_ms = 50;
        cfg.tasks.force_grace_ms = 100;
        AppContext::new(cfg, Arc::new(RecordingReporter::default()))
    }

    #[tokio::test]
    async fn test_shutdown_moves_state_and_drains_tasks() {
        let ctx = context();
        ctx.machine().start();
        ctx.machine().trigger_init_complete();
        ctx.spawn_task("watcher", |stop| async move {
            stop.cancelled().await;
            Ok(())
        })
        .unwrap();

        let report = ctx.shutdown().await;

        assert_eq!(ctx.machine().current_state(), AppState::ShuttingDown);
        assert!(!ctx.machine().is_running());
        assert_eq!(report.clean_count(), 1);
        assert!(ctx.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_stop_task_uses_configured_timeout() {
        let mut cfg = AppConfig::default();
        cfg.tasks.stop_timeout_ms = 30;
        cfg.tasks.force_grace_ms = 100;
        let ctx = AppContext::new(cfg, Arc::new(RecordingReporter::default()));
        let id = ctx
            .spawn_task("deaf", |_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .unwrap();

        let outcome = ctx.stop_task(&id).await.unwrap();

        assert!(outcome.forced);
        assert!(outcome.elapsed_ms < 1000, "stop took {}ms", outcome.elapsed_ms);
        assert!(!ctx.tasks().contains(&id));
        assert_eq!(
            ctx.stop_task(&id).await.unwrap_err(),
            TaskError::NotFound { id }
        );
    }

    #[tokio::test]
    async fn test_reset_is_isolated() {
        let ctx = context();
        ctx.machine().start();
        ctx.machine().trigger_init_complete();
        ctx.spawn_task("long", |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .unwrap();

        let fresh = ctx.reset();
        assert_eq!(fresh.machine().current_state(), AppState::Initializing);
        assert_eq!(fresh.machine().history_len(), 0);
        assert!(fresh.tasks().is_empty());

        ctx.tasks().cleanup_all(Duration::from_millis(10)).await;
    }
}
