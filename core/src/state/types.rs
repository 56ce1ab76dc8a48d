//! State and transition vocabulary.
//!
//! Both enums serialize to their SCREAMING_SNAKE_CASE names. Those names are the
//! contract with view controllers, so they never change once released.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operational phase of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppState {
    /// Loading resources before anything is shown
    Initializing,
    /// Splash screen visible
    Splash,
    /// Waiting for credentials
    Login,
    /// Credentials submitted, waiting for the verdict
    Authenticating,
    /// Handing over from login to the main view
    Transitioning,
    /// Main application view
    Main,
    /// Critical error, recoverable back to login
    Error,
    /// Closing down; no scoped edges leave this state
    ShuttingDown,
}

impl AppState {
    pub const ALL: [AppState; 8] = [
        AppState::Initializing,
        AppState::Splash,
        AppState::Login,
        AppState::Authenticating,
        AppState::Transitioning,
        AppState::Main,
        AppState::Error,
        AppState::ShuttingDown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "INITIALIZING",
            Self::Splash => "SPLASH",
            Self::Login => "LOGIN",
            Self::Authenticating => "AUTHENTICATING",
            Self::Transitioning => "TRANSITIONING",
            Self::Main => "MAIN",
            Self::Error => "ERROR",
            Self::ShuttingDown => "SHUTTING_DOWN",
        }
    }

    /// Reaching a terminal state ends the lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ShuttingDown)
    }

    /// Short human-readable label, shown by `lifeline table`.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Initializing => "loading resources",
            Self::Splash => "splash screen visible",
            Self::Login => "waiting for login input",
            Self::Authenticating => "authentication in progress",
            Self::Transitioning => "switching to the main view",
            Self::Main => "main application",
            Self::Error => "critical error",
            Self::ShuttingDown => "shutting down",
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::Initializing
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Invalid app state: {s}"))
    }
}

/// Named request to move from the current state to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Transition {
    InitComplete,
    SplashDone,
    LoginSubmit,
    LoginSuccess,
    LoginFailed,
    TransitionComplete,
    LogoutRequest,
    ErrorOccurred,
    ErrorRecovered,
    ShutdownRequest,
}

impl Transition {
    pub const ALL: [Transition; 10] = [
        Transition::InitComplete,
        Transition::SplashDone,
        Transition::LoginSubmit,
        Transition::LoginSuccess,
        Transition::LoginFailed,
        Transition::TransitionComplete,
        Transition::LogoutRequest,
        Transition::ErrorOccurred,
        Transition::ErrorRecovered,
        Transition::ShutdownRequest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InitComplete => "INIT_COMPLETE",
            Self::SplashDone => "SPLASH_DONE",
            Self::LoginSubmit => "LOGIN_SUBMIT",
            Self::LoginSuccess => "LOGIN_SUCCESS",
            Self::LoginFailed => "LOGIN_FAILED",
            Self::TransitionComplete => "TRANSITION_COMPLETE",
            Self::LogoutRequest => "LOGOUT_REQUEST",
            Self::ErrorOccurred => "ERROR_OCCURRED",
            Self::ErrorRecovered => "ERROR_RECOVERED",
            Self::ShutdownRequest => "SHUTDOWN_REQUEST",
        }
    }

    /// Global transitions are legal from every state.
    pub fn is_global(&self) -> bool {
        matches!(self, Self::ErrorOccurred | Self::ShutdownRequest)
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Invalid transition: {s}"))
    }
}

/// Why a trigger was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    /// `trigger` was called before `start` or after `stop`
    NotStarted,
    /// No scoped or global edge for the event from `from`
    InvalidTransition { from: AppState },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => f.write_str("state machine not started"),
            Self::InvalidTransition { from } => write!(f, "cannot transition from {from}"),
        }
    }
}

/// Lifecycle notification, delivered to observers in commit order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    TransitionStarted {
        transition: Transition,
        timestamp: DateTime<Utc>,
    },
    StateExited {
        state: AppState,
        timestamp: DateTime<Utc>,
    },
    StateEntered {
        state: AppState,
        timestamp: DateTime<Utc>,
    },
    StateChanged {
        from: AppState,
        to: AppState,
        timestamp: DateTime<Utc>,
    },
    TransitionCompleted {
        transition: Transition,
        timestamp: DateTime<Utc>,
    },
    TransitionFailed {
        transition: Transition,
        reason: RejectReason,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::TransitionStarted { timestamp, .. }
            | Self::StateExited { timestamp, .. }
            | Self::StateEntered { timestamp, .. }
            | Self::StateChanged { timestamp, .. }
            | Self::TransitionCompleted { timestamp, .. }
            | Self::TransitionFailed { timestamp, .. } => *timestamp,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransitionStarted { .. } => "transition_started",
            Self::StateExited { .. } => "state_exited",
            Self::StateEntered { .. } => "state_entered",
            Self::StateChanged { .. } => "state_changed",
            Self::TransitionCompleted { .. } => "transition_completed",
            Self::TransitionFailed { .. } => "transition_failed",
        }
    }

    pub fn transition(&self) -> Option<Transition> {
        match self {
            Self::TransitionStarted { transition, .. }
            | Self::TransitionCompleted { transition, .. }
            | Self::TransitionFailed { transition, .. } => Some(*transition),
            _ => None,
        }
    }
}
