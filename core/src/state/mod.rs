//! # Application lifecycle state
//!
//! Which operational phase the application is in and how it may move between
//! phases.
//!
//! - `types`: the closed `AppState` / `Transition` vocabulary and lifecycle events
//! - `transitions`: the static edge table
//! - `history`: append-only log of applied transitions
//! - `bus`: ordered, in-commit-order event delivery
//! - `machine`: the thread-safe `StateMachine`

pub mod bus;
pub mod history;
pub mod machine;
pub mod transitions;
pub mod types;

pub use bus::{EventBus, Observer, SubscriptionId};
pub use history::{HistoryEntry, HistoryLog};
pub use machine::StateMachine;
pub use transitions::{Edge, EdgeScope, TransitionTable};
pub use types::{AppState, LifecycleEvent, RejectReason, Transition};
