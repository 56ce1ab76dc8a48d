//! Application lifecycle state machine.
//!
//! Current state, previous state and the history log sit behind one mutex.
//! `trigger` validates, mutates and records inside that critical section and
//! queues the resulting notifications there too, so observers see events in
//! exactly the order triggers committed.

use super::bus::{EventBus, Observer, SubscriptionId};
use super::history::{HistoryEntry, HistoryLog};
use super::transitions::TransitionTable;
use super::types::{AppState, LifecycleEvent, RejectReason, Transition};
use crate::error::LifecycleError;
use crate::util::lock_unpoisoned;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const DEFAULT_EVENT_CAPACITY: usize = 1000;

struct Snapshot {
    current: AppState,
    previous: Option<AppState>,
    running: bool,
    history: HistoryLog,
}

pub struct StateMachine {
    inner: Mutex<Snapshot>,
    bus: EventBus,
}

impl StateMachine {
    /// Unstarted machine in INITIALIZING with the default event capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// `event_capacity` bounds the broadcast channel used by async listeners.
    pub fn with_capacity(event_capacity: usize) -> Self {
        tracing::debug!(target: "lifeline.flow", "state machine created");
        Self {
            inner: Mutex::new(Snapshot {
                current: AppState::Initializing,
                previous: None,
                running: false,
                history: HistoryLog::new(),
            }),
            bus: EventBus::new(event_capacity),
        }
    }

    /// Start accepting triggers from INITIALIZING. Calling it again puts the
    /// machine back in INITIALIZING; history is kept.
    pub fn start(&self) {
        let mut snap = lock_unpoisoned(&self.inner);
        if snap.running {
            tracing::debug!(target: "lifeline.flow", state = %snap.current, "state machine restarted");
        }
        snap.running = true;
        snap.current = AppState::Initializing;
        snap.previous = None;
        tracing::info!(target: "lifeline.flow", "state machine started");
    }

    /// Stop accepting triggers. State and history are kept for inspection.
    pub fn stop(&self) {
        lock_unpoisoned(&self.inner).running = false;
        tracing::info!(target: "lifeline.flow", "state machine stopped");
    }

    /// Whether triggers are currently accepted.
    pub fn is_running(&self) -> bool {
        lock_unpoisoned(&self.inner).running
    }

    /// Back to a never-started machine with empty history. Observers stay
    /// subscribed.
    pub fn reset(&self) {
        let mut snap = lock_unpoisoned(&self.inner);
        snap.current = AppState::Initializing;
        snap.previous = None;
        snap.running = false;
        snap.history = HistoryLog::new();
        tracing::debug!(target: "lifeline.flow", "state machine reset");
    }

    /// State as of the last committed transition.
    pub fn current_state(&self) -> AppState {
        lock_unpoisoned(&self.inner).current
    }

    /// Source state of the last committed transition; `None` before any.
    pub fn previous_state(&self) -> Option<AppState> {
        lock_unpoisoned(&self.inner).previous
    }

    /// Whether `trigger(transition)` would succeed right now. Always false
    /// while the machine is not running.
    pub fn can_transition(&self, transition: Transition) -> bool {
        let snap = lock_unpoisoned(&self.inner);
        snap.running && TransitionTable::is_valid(snap.current, transition)
    }

    /// Transitions `trigger` would accept now; empty while not running.
    pub fn get_valid_transitions(&self) -> BTreeSet<Transition> {
        let snap = lock_unpoisoned(&self.inner);
        if !snap.running {
            return BTreeSet::new();
        }
        TransitionTable::valid_transitions(snap.current)
    }

    /// Copy of every applied transition, oldest first.
    pub fn get_history(&self) -> Vec<HistoryEntry> {
        lock_unpoisoned(&self.inner).history.entries().to_vec()
    }

    /// Number of applied transitions.
    pub fn history_len(&self) -> usize {
        lock_unpoisoned(&self.inner).history.len()
    }

    /// Apply `transition` if legal. Returns `false` (and emits
    /// `TransitionFailed`) when it is not; that is an expected outcome.
    pub fn trigger(&self, transition: Transition) -> bool {
        self.try_trigger(transition).is_ok()
    }

    /// Same as `trigger`, but reports the new state or the rejection.
    pub fn try_trigger(&self, transition: Transition) -> Result<AppState, LifecycleError> {
        let committed = self.commit(transition);
        self.bus.drain();

        match committed {
            Ok((from, to)) => {
                tracing::info!(
                    target: "lifeline.flow",
                    transition = %transition,
                    from = %from,
                    to = %to,
                    "state entered"
                );
                Ok(to)
            }
            Err(reason @ RejectReason::NotStarted) => {
                tracing::warn!(
                    target: "lifeline.flow",
                    transition = %transition,
                    "state machine not started, ignoring trigger"
                );
                Err(rejection_error(transition, reason))
            }
            Err(reason @ RejectReason::InvalidTransition { from }) => {
                tracing::warn!(
                    target: "lifeline.flow",
                    transition = %transition,
                    state = %from,
                    "invalid transition"
                );
                Err(rejection_error(transition, reason))
            }
        }
    }

    fn commit(&self, transition: Transition) -> Result<(AppState, AppState), RejectReason> {
        let mut snap = lock_unpoisoned(&self.inner);
        let now = Utc::now();

        let rejection = if !snap.running {
            Some(RejectReason::NotStarted)
        } else if !TransitionTable::is_valid(snap.current, transition) {
            Some(RejectReason::InvalidTransition { from: snap.current })
        } else {
            None
        };
        if let Some(reason) = rejection {
            self.bus.enqueue([LifecycleEvent::TransitionFailed {
                transition,
                reason,
                message: rejection_error(transition, reason).to_string(),
                timestamp: now,
            }]);
            return Err(reason);
        }

        let from = snap.current;
        let to = TransitionTable::target(from, transition)
            .ok_or(RejectReason::InvalidTransition { from })?;

        self.bus.enqueue([
            LifecycleEvent::TransitionStarted {
                transition,
                timestamp: now,
            },
            LifecycleEvent::StateExited {
                state: from,
                timestamp: now,
            },
        ]);

        snap.previous = Some(from);
        snap.current = to;

        self.bus.enqueue([
            LifecycleEvent::StateEntered {
                state: to,
                timestamp: now,
            },
            LifecycleEvent::StateChanged {
                from,
                to,
                timestamp: now,
            },
        ]);

        snap.history.append(HistoryEntry {
            timestamp: now,
            from,
            to,
            transition,
        });

        self.bus.enqueue([LifecycleEvent::TransitionCompleted {
            transition,
            timestamp: now,
        }]);

        Ok((from, to))
    }

    // Observers

    /// Register a synchronous observer for every lifecycle event.
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(Arc::new(observer) as Observer)
    }

    /// Remove an observer. Returns `false` if `id` was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Receiver for async listeners; it lags rather than blocking triggers.
    pub fn subscribe_channel(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.bus.subscribe_channel()
    }

    /// Called with `(old, new)` after every committed transition.
    pub fn on_state_changed<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(AppState, AppState) + Send + Sync + 'static,
    {
        self.subscribe(move |ev| {
            if let LifecycleEvent::StateChanged { from, to, .. } = ev {
                f(*from, *to);
            }
        })
    }

    /// Called with the new state after every committed transition.
    pub fn on_state_entered<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(AppState) + Send + Sync + 'static,
    {
        self.subscribe(move |ev| {
            if let LifecycleEvent::StateEntered { state, .. } = ev {
                f(*state);
            }
        })
    }

    /// Called with the event before the state changes.
    pub fn on_transition_started<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(Transition) + Send + Sync + 'static,
    {
        self.subscribe(move |ev| {
            if let LifecycleEvent::TransitionStarted { transition, .. } = ev {
                f(*transition);
            }
        })
    }

    /// Called for every rejected trigger.
    pub fn on_transition_failed<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(Transition, RejectReason) + Send + Sync + 'static,
    {
        self.subscribe(move |ev| {
            if let LifecycleEvent::TransitionFailed {
                transition, reason, ..
            } = ev
            {
                f(*transition, *reason);
            }
        })
    }

    // Shortcuts

    /// INITIALIZING to SPLASH.
    pub fn trigger_init_complete(&self) -> bool {
        self.trigger(Transition::InitComplete)
    }

    /// SPLASH to LOGIN.
    pub fn trigger_splash_done(&self) -> bool {
        self.trigger(Transition::SplashDone)
    }

    /// LOGIN to AUTHENTICATING.
    pub fn trigger_login_submit(&self) -> bool {
        self.trigger(Transition::LoginSubmit)
    }

    /// AUTHENTICATING to TRANSITIONING.
    pub fn trigger_login_success(&self) -> bool {
        self.trigger(Transition::LoginSuccess)
    }

    /// AUTHENTICATING back to LOGIN.
    pub fn trigger_login_failed(&self) -> bool {
        self.trigger(Transition::LoginFailed)
    }

    /// TRANSITIONING to MAIN.
    pub fn trigger_transition_complete(&self) -> bool {
        self.trigger(Transition::TransitionComplete)
    }

    /// MAIN back to LOGIN.
    pub fn trigger_logout(&self) -> bool {
        self.trigger(Transition::LogoutRequest)
    }

    /// Any state to ERROR.
    pub fn trigger_error(&self) -> bool {
        self.trigger(Transition::ErrorOccurred)
    }

    /// ERROR back to LOGIN.
    pub fn trigger_recovery(&self) -> bool {
        self.trigger(Transition::ErrorRecovered)
    }

    /// Any state to SHUTTING_DOWN.
    pub fn trigger_shutdown(&self) -> bool {
        self.trigger(Transition::ShutdownRequest)
    }
}

fn rejection_error(transition: Transition, reason: RejectReason) -> LifecycleError {
    match reason {
        RejectReason::NotStarted => LifecycleError::NotStarted { transition },
        RejectReason::InvalidTransition { from } => {
            LifecycleError::InvalidTransition { from, transition }
        }
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn started() -> StateMachine {
        let sm = StateMachine::new();
        sm.start();
        sm
    }

    fn record(sm: &StateMachine) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        sm.subscribe(move |ev| sink.lock().unwrap().push(ev.kind().to_string()));
        seen
    }

    #[test]
    fn test_initial_state() {
        let sm = started();
        assert_eq!(sm.current_state(), AppState::Initializing);
        assert_eq!(sm.previous_state(), None);
        assert!(sm.get_history().is_empty());
    }

    #[test]
    fn test_trigger_before_start_is_rejected() {
        let sm = StateMachine::new();
        let seen = record(&sm);

        assert!(!sm.trigger(Transition::InitComplete));
        assert_eq!(
            sm.try_trigger(Transition::InitComplete),
            Err(LifecycleError::NotStarted {
                transition: Transition::InitComplete
            })
        );
        assert_eq!(sm.current_state(), AppState::Initializing);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["transition_failed", "transition_failed"]
        );
    }

    #[test]
    fn test_start_returns_to_initializing() {
        let sm = started();
        assert!(sm.trigger_init_complete());
        sm.start();
        assert_eq!(sm.current_state(), AppState::Initializing);
        assert_eq!(sm.previous_state(), None);
        assert_eq!(sm.history_len(), 1);
        assert!(sm.is_running());

        sm.start();
        assert_eq!(sm.current_state(), AppState::Initializing);
        assert!(sm.trigger_init_complete());
    }

    #[test]
    fn test_stop_then_start_reenters_initializing() {
        let sm = started();
        assert!(sm.trigger_init_complete());
        sm.stop();
        assert!(!sm.trigger_splash_done());

        sm.start();
        assert_eq!(sm.current_state(), AppState::Initializing);
        assert_eq!(sm.previous_state(), None);
        assert_eq!(sm.history_len(), 1);
    }

    #[test]
    fn test_successful_trigger_event_order() {
        let sm = started();
        let seen = record(&sm);

        assert!(sm.trigger(Transition::InitComplete));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "transition_started",
                "state_exited",
                "state_entered",
                "state_changed",
                "transition_completed",
            ]
        );
    }

    #[test]
    fn test_invalid_trigger_emits_only_failure() {
        let sm = started();
        let seen = record(&sm);
        let failed = Arc::new(Mutex::new(None));
        let slot = failed.clone();
        sm.on_transition_failed(move |t, reason| *slot.lock().unwrap() = Some((t, reason)));

        assert!(!sm.trigger(Transition::LoginSuccess));

        assert_eq!(*seen.lock().unwrap(), vec!["transition_failed"]);
        assert_eq!(
            *failed.lock().unwrap(),
            Some((
                Transition::LoginSuccess,
                RejectReason::InvalidTransition {
                    from: AppState::Initializing
                }
            ))
        );
        assert_eq!(sm.history_len(), 0);
    }

    #[test]
    fn test_failure_event_carries_message() {
        let sm = started();
        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = messages.clone();
        sm.subscribe(move |ev| {
            if let LifecycleEvent::TransitionFailed { message, .. } = ev {
                sink.lock().unwrap().push(message.clone());
            }
        });

        assert!(!sm.trigger(Transition::LogoutRequest));
        sm.stop();
        assert!(!sm.trigger(Transition::InitComplete));

        assert_eq!(
            *messages.lock().unwrap(),
            vec![
                "invalid transition LOGOUT_REQUEST from state INITIALIZING".to_string(),
                "state machine not started, ignoring INIT_COMPLETE".to_string(),
            ]
        );
    }

    #[test]
    fn test_typed_observers() {
        let sm = started();
        let changes = Arc::new(Mutex::new(Vec::new()));
        let entered = Arc::new(Mutex::new(Vec::new()));
        let started_with = Arc::new(Mutex::new(Vec::new()));

        let c = changes.clone();
        sm.on_state_changed(move |from, to| c.lock().unwrap().push((from, to)));
        let e = entered.clone();
        sm.on_state_entered(move |s| e.lock().unwrap().push(s));
        let s = started_with.clone();
        sm.on_transition_started(move |t| s.lock().unwrap().push(t));

        assert!(sm.trigger_init_complete());

        assert_eq!(
            *changes.lock().unwrap(),
            vec![(AppState::Initializing, AppState::Splash)]
        );
        assert_eq!(*entered.lock().unwrap(), vec![AppState::Splash]);
        assert_eq!(*started_with.lock().unwrap(), vec![Transition::InitComplete]);
    }

    #[test]
    fn test_observer_can_trigger_reentrantly() {
        let sm = Arc::new(started());
        let weak = Arc::downgrade(&sm);
        sm.on_state_entered(move |state| {
            if state == AppState::Splash {
                if let Some(sm) = weak.upgrade() {
                    sm.trigger(Transition::SplashDone);
                }
            }
        });

        assert!(sm.trigger_init_complete());

        assert_eq!(sm.current_state(), AppState::Login);
        let history: Vec<_> = sm.get_history().iter().map(|e| e.transition).collect();
        assert_eq!(
            history,
            vec![Transition::InitComplete, Transition::SplashDone]
        );
    }

    #[test]
    fn test_unsubscribed_observer_not_called() {
        let sm = started();
        let seen = Arc::new(Mutex::new(0usize));
        let s = seen.clone();
        let id = sm.subscribe(move |_| *s.lock().unwrap() += 1);
        assert!(sm.unsubscribe(id));

        sm.trigger_init_complete();
        assert_eq!(*seen.lock().unwrap(), 0);
    }

    #[test]
    fn test_valid_transitions_follow_current_state() {
        let sm = started();
        sm.trigger_init_complete();
        let valid = sm.get_valid_transitions();
        assert!(valid.contains(&Transition::SplashDone));
        assert!(valid.contains(&Transition::ErrorOccurred));
        assert!(valid.contains(&Transition::ShutdownRequest));
        assert!(!valid.contains(&Transition::LoginSubmit));
        assert!(sm.can_transition(Transition::SplashDone));
        assert!(!sm.can_transition(Transition::LoginSubmit));
    }

    #[test]
    fn test_nothing_is_valid_while_not_running() {
        let sm = StateMachine::new();
        assert!(!sm.can_transition(Transition::InitComplete));
        assert!(sm.get_valid_transitions().is_empty());

        sm.start();
        assert!(sm.can_transition(Transition::InitComplete));
        sm.stop();
        assert!(!sm.can_transition(Transition::InitComplete));
        assert!(sm.get_valid_transitions().is_empty());
    }

    #[test]
    fn test_concurrent_triggers_serialize() {
        let sm = Arc::new(started());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sm = sm.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|_| sm.trigger(Transition::ErrorOccurred))
                        .count()
                })
            })
            .collect();

        let applied: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(applied, 400);
        assert_eq!(sm.history_len(), 400);
        assert_eq!(sm.current_state(), AppState::Error);
    }

    #[test]
    fn test_racing_triggers_are_observed_in_history_order() {
        let sm = Arc::new(started());
        let observed = Arc::new(Mutex::new(Vec::new()));
        let sink = observed.clone();
        sm.on_state_changed(move |from, to| sink.lock().unwrap().push((from, to)));

        let racers = [
            Transition::ErrorOccurred,
            Transition::ErrorRecovered,
            Transition::ShutdownRequest,
            Transition::InitComplete,
        ];
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let sm = sm.clone();
                std::thread::spawn(move || {
                    for n in 0..50 {
                        sm.trigger(racers[(i + n) % racers.len()]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let history: Vec<_> = sm.get_history().iter().map(|e| (e.from, e.to)).collect();
        assert!(!history.is_empty());
        assert_eq!(*observed.lock().unwrap(), history);
    }

    #[tokio::test]
    async fn test_channel_listener_sees_commit_order() {
        let sm = started();
        let mut rx = sm.subscribe_channel();

        sm.trigger_init_complete();
        sm.trigger_splash_done();

        let mut entered = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if let LifecycleEvent::StateEntered { state, .. } = ev {
                entered.push(state);
            }
        }
        assert_eq!(entered, vec![AppState::Splash, AppState::Login]);
    }

    #[test]
    fn test_reset_forgets_history_and_start() {
        let sm = started();
        sm.trigger_init_complete();
        sm.reset();

        assert!(!sm.is_running());
        assert_eq!(sm.current_state(), AppState::Initializing);
        assert_eq!(sm.previous_state(), None);
        assert_eq!(sm.history_len(), 0);
        assert!(!sm.trigger_init_complete());
    }
}
