//! Lifecycle walkthrough: drive the state machine through a login, run a
//! background task per phase and shut everything down.

use anyhow::Result;
use lifeline_core::api::{
    AppConfig, AppContext, LifecycleEvent, NoopCrashReporter, TaskEvent, Transition,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    // 1. One context for the whole process
    let ctx = AppContext::new(AppConfig::default(), Arc::new(NoopCrashReporter));
    let machine = ctx.machine().clone();

    // 2. Synchronous observer, called in commit order
    machine.on_state_changed(|from, to| println!("→ {from} → {to}"));

    // 3. Async listeners for lifecycle and task events
    let mut lifecycle_rx = machine.subscribe_channel();
    tokio::spawn(async move {
        while let Ok(ev) = lifecycle_rx.recv().await {
            if let LifecycleEvent::TransitionFailed { message, .. } = ev {
                println!("✗ {message}");
            }
        }
    });

    let mut task_rx = ctx.tasks().subscribe();
    tokio::spawn(async move {
        while let Ok(ev) = task_rx.recv().await {
            match ev {
                TaskEvent::Completed { id, duration_ms, .. } => {
                    println!("✓ task {id} finished in {duration_ms}ms")
                }
                TaskEvent::Stopped { outcome, .. } => println!(
                    "■ task {} stopped (clean={}, forced={})",
                    outcome.id, outcome.stopped_cleanly, outcome.forced
                ),
                _ => {}
            }
        }
    });

    machine.start();
    machine.trigger_init_complete();

    // 4. Splash work, then advance when it is done
    let done = ctx.tasks().subscribe();
    ctx.spawn_task("load-assets", |_| async {
        tokio::time::sleep(Duration::from_millis(150)).await;
        Ok(())
    })?;
    wait_for_completion(done, "load-assets").await;
    machine.trigger_splash_done();

    // 5. A rejected trigger changes nothing
    machine.trigger(Transition::LogoutRequest);

    machine.trigger_login_submit();
    machine.trigger_login_success();
    machine.trigger_transition_complete();

    // 6. Long-running work in MAIN, stopped at shutdown
    ctx.spawn_task("heartbeat", |stop| async move {
        while !stop.is_stopping() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Ok(())
    })?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let report = ctx.shutdown().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    println!("\n📊 History:");
    for entry in machine.get_history() {
        println!("   {} --{}--> {}", entry.from, entry.transition, entry.to);
    }
    println!(
        "\n✅ {} task(s) stopped cleanly, {} forced",
        report.clean_count(),
        report.forced_count()
    );

    Ok(())
}

async fn wait_for_completion(mut rx: tokio::sync::broadcast::Receiver<TaskEvent>, id: &str) {
    while let Ok(ev) = rx.recv().await {
        if matches!(&ev, TaskEvent::Completed { .. } | TaskEvent::Failed { .. })
            && ev.task_id().as_str() == id
        {
            return;
        }
    }
}
