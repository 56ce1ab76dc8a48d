//! Transition table and validation rules

use super::types::{AppState, Transition};
use serde::Serialize;
use std::collections::BTreeSet;

/// Whether an edge is bound to one source state or legal everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeScope {
    Scoped(AppState),
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub scope: EdgeScope,
    pub transition: Transition,
    pub to: AppState,
}

const SCOPED_EDGES: [(AppState, Transition, AppState); 8] = [
    (AppState::Initializing, Transition::InitComplete, AppState::Splash),
    (AppState::Splash, Transition::SplashDone, AppState::Login),
    (AppState::Login, Transition::LoginSubmit, AppState::Authenticating),
    (AppState::Authenticating, Transition::LoginSuccess, AppState::Transitioning),
    (AppState::Authenticating, Transition::LoginFailed, AppState::Login),
    (AppState::Transitioning, Transition::TransitionComplete, AppState::Main),
    (AppState::Main, Transition::LogoutRequest, AppState::Login),
    (AppState::Error, Transition::ErrorRecovered, AppState::Login),
];

const GLOBAL_EDGES: [(Transition, AppState); 2] = [
    (Transition::ErrorOccurred, AppState::Error),
    (Transition::ShutdownRequest, AppState::ShuttingDown),
];

/// Static directed graph of legal moves.
pub struct TransitionTable;

impl TransitionTable {
    /// Target state for `transition` taken from `from`, if the edge exists.
    pub fn target(from: AppState, transition: Transition) -> Option<AppState> {
        SCOPED_EDGES
            .iter()
            .find(|(src, t, _)| *src == from && *t == transition)
            .map(|(_, _, to)| *to)
            .or_else(|| {
                GLOBAL_EDGES
                    .iter()
                    .find(|(t, _)| *t == transition)
                    .map(|(_, to)| *to)
            })
    }

    pub fn is_valid(from: AppState, transition: Transition) -> bool {
        Self::target(from, transition).is_some()
    }

    /// Every event legal from `from` (scoped plus global).
    pub fn valid_transitions(from: AppState) -> BTreeSet<Transition> {
        SCOPED_EDGES
            .iter()
            .filter(|(src, _, _)| *src == from)
            .map(|(_, t, _)| *t)
            .chain(GLOBAL_EDGES.iter().map(|(t, _)| *t))
            .collect()
    }

    /// Scoped edges in table order, then the global ones.
    pub fn edges() -> Vec<Edge> {
        SCOPED_EDGES
            .iter()
            .map(|(from, transition, to)| Edge {
                scope: EdgeScope::Scoped(*from),
                transition: *transition,
                to: *to,
            })
            .chain(GLOBAL_EDGES.iter().map(|(transition, to)| Edge {
                scope: EdgeScope::Global,
                transition: *transition,
                to: *to,
            }))
            .collect()
    }
}
