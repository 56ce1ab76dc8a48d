#![allow(dead_code)]

use lifeline_core::api::{
    AppState, CrashReporter, LifecycleEvent, StateMachine, TaskFault, Transition,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Shortest trigger path from INITIALIZING to `state`.
pub fn path_to(state: AppState) -> Vec<Transition> {
    use Transition::*;
    match state {
        AppState::Initializing => vec![],
        AppState::Splash => vec![InitComplete],
        AppState::Login => vec![InitComplete, SplashDone],
        AppState::Authenticating => vec![InitComplete, SplashDone, LoginSubmit],
        AppState::Transitioning => vec![InitComplete, SplashDone, LoginSubmit, LoginSuccess],
        AppState::Main => vec![
            InitComplete,
            SplashDone,
            LoginSubmit,
            LoginSuccess,
            TransitionComplete,
        ],
        AppState::Error => vec![ErrorOccurred],
        AppState::ShuttingDown => vec![ShutdownRequest],
    }
}

/// A started machine already sitting in `state`.
pub fn machine_in(state: AppState) -> StateMachine {
    let sm = StateMachine::new();
    sm.start();
    for t in path_to(state) {
        assert!(sm.trigger(t), "setup trigger {t} failed on the way to {state}");
    }
    assert_eq!(sm.current_state(), state);
    sm
}

/// Records every lifecycle event kind an observer sees.
pub fn record_kinds(sm: &StateMachine) -> Arc<Mutex<Vec<&'static str>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    sm.subscribe(move |ev: &LifecycleEvent| sink.lock().unwrap().push(ev.kind()));
    seen
}

#[derive(Default)]
pub struct RecordingReporter {
    pub faults: Mutex<Vec<(TaskFault, HashMap<String, String>)>>,
}

impl RecordingReporter {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

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
