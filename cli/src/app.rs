//! `simulate`: walk the lifecycle end to end. Each phase starts a background
//! task and the task's completion event triggers the next transition.
use std::time::Duration;

use lifeline_core::api::{
    AppContext, AppState, CleanupReport, CliError, HistoryEntry, StateMachine, TaskEvent,
    Transition,
};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

use crate::commands::cli::SimulateArgs;

/// No phase may sit idle longer than this.
const PHASE_IDLE_TIMEOUT: Duration = Duration::from_secs(5);
/// How long MAIN runs before shutdown is requested.
const MAIN_DWELL: Duration = Duration::from_millis(100);
/// Recoveries allowed before the simulation gives up.
const MAX_RECOVERIES: u32 = 1;

const TASK_BOOT: &str = "boot";
const TASK_SPLASH: &str = "splash";
const TASK_CREDENTIALS: &str = "credentials";
const TASK_AUTHENTICATE: &str = "authenticate";
const TASK_LOAD_WORKSPACE: &str = "load-workspace";
const TASK_RECOVER: &str = "recover";
const TASK_HEARTBEAT: &str = "heartbeat";
const TASK_STUBBORN: &str = "stubborn-sync";

#[derive(Debug, Serialize)]
pub struct SimulationSummary {
    pub final_state: AppState,
    pub history: Vec<HistoryEntry>,
    pub cleanup: CleanupReport,
}

impl SimulationSummary {
    /// History as JSON lines followed by the cleanup report.
    pub fn to_jsonl(&self) -> Result<String, CliError> {
        let mut out = String::new();
        for entry in &self.history {
            out.push_str(&to_json(entry)?);
            out.push('\n');
        }
        out.push_str(&to_json(&self.cleanup)?);
        out.push('\n');
        Ok(out)
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string(value).map_err(|e| CliError::Command(format!("serialize output: {e}")))
}

struct PhasePlan {
    fail_login: bool,
    stubborn_task: bool,
    login_attempts: u32,
    recoveries: u32,
}

impl PhasePlan {
    fn new(args: &SimulateArgs) -> Self {
        Self {
            fail_login: args.fail_login,
            stubborn_task: args.stubborn_task,
            login_attempts: 0,
            recoveries: 0,
        }
    }

    /// Start the work that belongs to `state`.
    fn enter(&mut self, ctx: &AppContext, state: AppState) -> Result<(), CliError> {
        tracing::debug!(target: "lifeline.flow", state = %state, "phase entered");
        match state {
            AppState::Initializing => spawn_step(ctx, TASK_BOOT, 20),
            AppState::Splash => spawn_step(ctx, TASK_SPLASH, 30),
            AppState::Login => spawn_step(ctx, TASK_CREDENTIALS, 10),
            AppState::Authenticating => {
                self.login_attempts += 1;
                let reject = self.fail_login && self.login_attempts == 1;
                ctx.spawn_task(TASK_AUTHENTICATE, move |_| async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    if reject {
                        anyhow::bail!("invalid credentials");
                    }
                    Ok(())
                })?;
                Ok(())
            }
            AppState::Transitioning => spawn_step(ctx, TASK_LOAD_WORKSPACE, 20),
            AppState::Main => self.start_background(ctx),
            AppState::Error => {
                if self.recoveries >= MAX_RECOVERIES {
                    return Err(CliError::Command(
                        "simulation entered ERROR again after recovery".to_string(),
                    ));
                }
                self.recoveries += 1;
                spawn_step(ctx, TASK_RECOVER, 10)
            }
            AppState::ShuttingDown => Ok(()),
        }
    }

    fn start_background(&self, ctx: &AppContext) -> Result<(), CliError> {
        ctx.spawn_task(TASK_HEARTBEAT, |stop| async move {
            let mut beats = 0u64;
            while !stop.is_stopping() {
                tokio::time::sleep(Duration::from_millis(25)).await;
                beats += 1;
            }
            tracing::debug!(beats, "heartbeat stopped");
            Ok(())
        })?;

        if self.stubborn_task {
            ctx.spawn_task(TASK_STUBBORN, |_| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })?;
        }
        Ok(())
    }

    /// The transition a finished phase task asks for.
    fn next_transition(&self, event: &TaskEvent) -> Option<Transition> {
        match event {
            TaskEvent::Completed { id, .. } => match id.as_str() {
                TASK_BOOT => Some(Transition::InitComplete),
                TASK_SPLASH => Some(Transition::SplashDone),
                TASK_CREDENTIALS => Some(Transition::LoginSubmit),
                TASK_AUTHENTICATE => Some(Transition::LoginSuccess),
                TASK_LOAD_WORKSPACE => Some(Transition::TransitionComplete),
                TASK_RECOVER => Some(Transition::ErrorRecovered),
                _ => None,
            },
            TaskEvent::Failed { id, .. } if id.as_str() == TASK_AUTHENTICATE => {
                Some(Transition::LoginFailed)
            }
            TaskEvent::Failed { .. } => Some(Transition::ErrorOccurred),
            TaskEvent::Started { .. } | TaskEvent::Stopped { .. } => None,
        }
    }
}

fn spawn_step(ctx: &AppContext, id: &str, millis: u64) -> Result<(), CliError> {
    ctx.spawn_task(id, move |stop| async move {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(millis)) => Ok(()),
            _ = stop.cancelled() => Ok(()),
        }
    })?;
    Ok(())
}

#[tracing::instrument(name = "cli.simulate", skip(ctx, args))]
pub async fn run_simulate(ctx: &AppContext, args: &SimulateArgs) -> Result<SimulationSummary, CliError> {
    let machine = ctx.machine().clone();
    let (state_tx, mut state_rx) = mpsc::unbounded_channel();
    let subscription = machine.on_state_entered(move |state| {
        let _ = state_tx.send(state);
    });
    let mut task_rx = ctx.tasks().subscribe();
    let mut plan = PhasePlan::new(args);

    machine.start();
    let driven = drive(ctx, &machine, &mut plan, &mut state_rx, &mut task_rx).await;
    machine.unsubscribe(subscription);

    if let Err(e) = &driven {
        tracing::error!(error = %e, "simulation aborted");
        machine.trigger_error();
    }

    let cleanup = ctx.shutdown().await;
    driven?;

    Ok(SimulationSummary {
        final_state: machine.current_state(),
        history: machine.get_history(),
        cleanup,
    })
}

async fn drive(
    ctx: &AppContext,
    machine: &StateMachine,
    plan: &mut PhasePlan,
    state_rx: &mut mpsc::UnboundedReceiver<AppState>,
    task_rx: &mut broadcast::Receiver<TaskEvent>,
) -> Result<(), CliError> {
    // `start` does not emit an entered event for the initial state.
    plan.enter(ctx, machine.current_state())?;

    loop {
        tokio::select! {
            Some(state) = state_rx.recv() => {
                plan.enter(ctx, state)?;
                if state == AppState::Main {
                    tokio::time::sleep(MAIN_DWELL).await;
                    return Ok(());
                }
            }
            event = task_rx.recv() => match event {
                Ok(event) => {
                    if let Some(transition) = plan.next_transition(&event) {
                        machine.try_trigger(transition)?;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "task events lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(CliError::Command("task event channel closed".to_string()));
                }
            },
            _ = tokio::time::sleep(PHASE_IDLE_TIMEOUT) => {
                return Err(CliError::Command(format!(
                    "phase {} made no progress within {}ms",
                    machine.current_state(),
                    PHASE_IDLE_TIMEOUT.as_millis()
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifeline_core::api::{AppConfig, NoopCrashReporter};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn context() -> AppContext {
        let mut cfg = AppConfig::default();
        cfg.tasks.cleanup_timeout_ms = 50;
        cfg.tasks.force_grace_ms = 200;
        AppContext::new(cfg, Arc::new(NoopCrashReporter))
    }

    fn transitions(summary: &SimulationSummary) -> Vec<Transition> {
        summary.history.iter().map(|h| h.transition).collect()
    }

    #[tokio::test]
    async fn happy_path_ends_shutting_down() {
        let ctx = context();
        let summary = run_simulate(&ctx, &SimulateArgs::default()).await.unwrap();

        assert_eq!(summary.final_state, AppState::ShuttingDown);
        assert_eq!(
            transitions(&summary),
            vec![
                Transition::InitComplete,
                Transition::SplashDone,
                Transition::LoginSubmit,
                Transition::LoginSuccess,
                Transition::TransitionComplete,
                Transition::ShutdownRequest,
            ]
        );
        assert_eq!(summary.cleanup.forced_count(), 0);
        assert!(ctx.tasks().is_empty());
    }

    #[tokio::test]
    async fn failed_login_retries_once() {
        let ctx = context();
        let args = SimulateArgs {
            fail_login: true,
            ..SimulateArgs::default()
        };
        let summary = run_simulate(&ctx, &args).await.unwrap();

        let seen = transitions(&summary);
        assert_eq!(
            &seen[2..6],
            &[
                Transition::LoginSubmit,
                Transition::LoginFailed,
                Transition::LoginSubmit,
                Transition::LoginSuccess,
            ]
        );
        assert_eq!(summary.final_state, AppState::ShuttingDown);
    }

    #[tokio::test]
    async fn stubborn_task_is_forced_at_shutdown() {
        let ctx = context();
        let args = SimulateArgs {
            stubborn_task: true,
            ..SimulateArgs::default()
        };
        let summary = run_simulate(&ctx, &args).await.unwrap();

        assert_eq!(summary.cleanup.forced_count(), 1);
        assert!(summary.cleanup.outcome(&TASK_STUBBORN.into()).unwrap().forced);
        assert!(summary.cleanup.outcome(&TASK_HEARTBEAT.into()).unwrap().stopped_cleanly);
    }

    #[tokio::test]
    async fn output_is_json_lines() {
        let ctx = context();
        let summary = run_simulate(&ctx, &SimulateArgs::default()).await.unwrap();
        let out = summary.to_jsonl().unwrap();

        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), summary.history.len() + 1);
        assert_eq!(lines[0]["transition"], "INIT_COMPLETE");
        assert!(lines.last().unwrap()["outcomes"].is_array());
    }
}
