mod common;

use common::{machine_in, record_kinds};
use lifeline_core::api::{AppState, StateMachine, Transition};
use pretty_assertions::assert_eq;

#[test]
fn illegal_event_after_init_keeps_splash() {
    let sm = StateMachine::new();
    sm.start();

    assert!(sm.trigger(Transition::InitComplete));
    assert_eq!(sm.current_state(), AppState::Splash);
    assert_eq!(sm.history_len(), 1);

    assert!(!sm.trigger(Transition::LoginSuccess));
    assert_eq!(sm.current_state(), AppState::Splash);
    assert_eq!(sm.history_len(), 1);
}

#[test]
fn happy_path_through_logout() {
    let sm = StateMachine::new();
    sm.start();

    let steps = [
        (Transition::InitComplete, AppState::Splash),
        (Transition::SplashDone, AppState::Login),
        (Transition::LoginSubmit, AppState::Authenticating),
        (Transition::LoginSuccess, AppState::Transitioning),
        (Transition::TransitionComplete, AppState::Main),
        (Transition::LogoutRequest, AppState::Login),
    ];

    let mut prior = sm.current_state();
    for (transition, expected) in steps {
        assert!(sm.trigger(transition), "{transition} from {prior}");
        assert_eq!(sm.current_state(), expected);
        assert_eq!(sm.previous_state(), Some(prior));
        prior = expected;
    }

    let history = sm.get_history();
    assert_eq!(history.len(), steps.len());
    let recorded: Vec<_> = history.iter().map(|h| (h.transition, h.to)).collect();
    assert_eq!(recorded, steps.to_vec());
}

#[test]
fn failed_login_returns_to_login() {
    let sm = machine_in(AppState::Authenticating);
    assert!(sm.trigger_login_failed());
    assert_eq!(sm.current_state(), AppState::Login);
    assert_eq!(sm.previous_state(), Some(AppState::Authenticating));
}

#[test]
fn error_and_recovery_from_login() {
    let sm = machine_in(AppState::Login);

    assert!(sm.trigger(Transition::ErrorOccurred));
    assert_eq!(sm.current_state(), AppState::Error);

    assert!(sm.trigger(Transition::ErrorRecovered));
    assert_eq!(sm.current_state(), AppState::Login);

    for transition in Transition::ALL {
        let allowed = matches!(
            transition,
            Transition::ErrorRecovered | Transition::ErrorOccurred | Transition::ShutdownRequest
        );
        let sm = machine_in(AppState::Error);
        assert_eq!(sm.trigger(transition), allowed, "{transition} from ERROR");
    }
}

#[test]
fn observers_see_ordered_notifications() {
    let sm = machine_in(AppState::Login);
    let seen = record_kinds(&sm);

    sm.trigger(Transition::LoginSubmit);
    sm.trigger(Transition::TransitionComplete);

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            "transition_started",
            "state_exited",
            "state_entered",
            "state_changed",
            "transition_completed",
            "transition_failed",
        ]
    );
}

#[test]
fn history_serializes_as_json_lines() {
    let sm = machine_in(AppState::Main);
    let lines: Vec<String> = sm
        .get_history()
        .iter()
        .map(|h| serde_json::to_string(h).unwrap())
        .collect();

    assert_eq!(lines.len(), 5);
    assert!(lines[0].contains("\"transition\":\"INIT_COMPLETE\""));
    assert!(lines[4].contains("\"to\":\"MAIN\""));
}
