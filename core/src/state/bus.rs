//! Ordered delivery of lifecycle events.
//!
//! Producers push events while they still hold the state mutex, so the queue
//! order is the commit order. Whoever finds the queue idle after releasing that
//! mutex becomes the drainer and hands events to observers one at a time with no
//! lock held. A trigger issued from inside an observer only enqueues; the
//! running drainer picks it up after the current event.

use super::types::LifecycleEvent;
use crate::util::lock_unpoisoned;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

pub type Observer = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct DispatchQueue {
    pending: VecDeque<LifecycleEvent>,
    draining: bool,
}

pub struct EventBus {
    observers: Mutex<Vec<(SubscriptionId, Observer)>>,
    next_id: AtomicU64,
    queue: Mutex<DispatchQueue>,
    event_tx: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    pub fn new(channel_capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            queue: Mutex::new(DispatchQueue::default()),
            event_tx,
        }
    }

    pub fn subscribe(&self, observer: Observer) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock_unpoisoned(&self.observers).push((id, observer));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = lock_unpoisoned(&self.observers);
        let before = observers.len();
        observers.retain(|(sid, _)| *sid != id);
        observers.len() != before
    }

    /// Receiver for async listeners; sees the same sequence as observers.
    pub fn subscribe_channel(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.event_tx.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        lock_unpoisoned(&self.observers).len()
    }

    pub(crate) fn enqueue<I>(&self, events: I)
    where
        I: IntoIterator<Item = LifecycleEvent>,
    {
        lock_unpoisoned(&self.queue).pending.extend(events);
    }

    pub(crate) fn drain(&self) {
        {
            let mut queue = lock_unpoisoned(&self.queue);
            if queue.draining {
                return;
            }
            queue.draining = true;
        }

        loop {
            let next = {
                let mut queue = lock_unpoisoned(&self.queue);
                match queue.pending.pop_front() {
                    Some(event) => event,
                    None => {
                        queue.draining = false;
                        return;
                    }
                }
            };
            self.deliver(&next);
        }
    }

    fn deliver(&self, event: &LifecycleEvent) {
        let observers: Vec<Observer> = lock_unpoisoned(&self.observers)
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();

        for observer in observers {
            if catch_unwind(AssertUnwindSafe(|| observer(event))).is_err() {
                tracing::error!(
                    target: "lifeline.flow",
                    kind = %event.kind(),
                    "lifecycle observer panicked; continuing delivery"
                );
            }
        }

        // No receivers is fine.
        let _ = self.event_tx.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::types::{AppState, Transition};
    use chrono::Utc;

    fn entered(state: AppState) -> LifecycleEvent {
        LifecycleEvent::StateEntered {
            state,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn delivers_in_enqueue_order() {
        let bus = EventBus::new(16);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(Arc::new(move |ev| {
            if let LifecycleEvent::StateEntered { state, .. } = ev {
                sink.lock().unwrap().push(*state);
            }
        }));

        bus.enqueue([entered(AppState::Splash), entered(AppState::Login)]);
        bus.drain();

        assert_eq!(*seen.lock().unwrap(), vec![AppState::Splash, AppState::Login]);
    }

    #[test]
    fn panicking_observer_does_not_stall_queue() {
        let bus = EventBus::new(16);
        let count = Arc::new(AtomicU64::new(0));
        let counter = count.clone();
        bus.subscribe(Arc::new(|_| panic!("observer bug")));
        bus.subscribe(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        bus.enqueue([entered(AppState::Splash)]);
        bus.drain();
        bus.enqueue([entered(AppState::Login)]);
        bus.drain();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_removes_observer() {
        let bus = EventBus::new(4);
        let id = bus.subscribe(Arc::new(|_| {}));
        assert_eq!(bus.observer_count(), 1);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.observer_count(), 0);
    }

    #[tokio::test]
    async fn channel_receives_same_sequence() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe_channel();

        bus.enqueue([
            LifecycleEvent::TransitionStarted {
                transition: Transition::InitComplete,
                timestamp: Utc::now(),
            },
            entered(AppState::Splash),
        ]);
        bus.drain();

        assert_eq!(rx.recv().await.unwrap().kind(), "transition_started");
        assert_eq!(rx.recv().await.unwrap().kind(), "state_entered");
    }
}
