use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub tasks: TasksConfig,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default)]
    pub crash: CrashConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "lifeline.flow=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

/// Timeouts for stopping background tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    /// Per-task wait in `SafeTask::safe_stop` before forcing.
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    /// Per-task wait in `cleanup_all` at shutdown.
    #[serde(default = "default_cleanup_timeout_ms")]
    pub cleanup_timeout_ms: u64,

    #[serde(default = "default_force_grace_ms")]
    pub force_grace_ms: u64,

    #[serde(default = "default_task_event_capacity")]
    pub event_channel_capacity: usize,
}

fn default_stop_timeout_ms() -> u64 {
    3000
}

fn default_cleanup_timeout_ms() -> u64 {
    2000
}

fn default_force_grace_ms() -> u64 {
    1000
}

fn default_task_event_capacity() -> usize {
    256
}

impl TasksConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_millis(self.cleanup_timeout_ms)
    }

    pub fn force_grace(&self) -> Duration {
        Duration::from_millis(self.force_grace_ms)
    }
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            stop_timeout_ms: default_stop_timeout_ms(),
            cleanup_timeout_ms: default_cleanup_timeout_ms(),
            force_grace_ms: default_force_grace_ms(),
            event_channel_capacity: default_task_event_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Buffer of the lifecycle broadcast channel; slow listeners past this lag.
    #[serde(default = "default_event_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_event_channel_capacity() -> usize {
    1000
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_event_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashConfig {
    #[serde(default = "default_crash_enabled")]
    pub enabled: bool,

    /// Also forward panics outside supervised tasks.
    #[serde(default = "default_install_panic_hook")]
    pub install_panic_hook: bool,

    #[serde(default = "default_crash_reporter")]
    pub reporter: CrashReporterProvider,
}

fn default_crash_enabled() -> bool {
    true
}

fn default_install_panic_hook() -> bool {
    true
}

fn default_crash_reporter() -> CrashReporterProvider {
    CrashReporterProvider::Tracing
}

impl Default for CrashConfig {
    fn default() -> Self {
        Self {
            enabled: default_crash_enabled(),
            install_panic_hook: default_install_panic_hook(),
            reporter: default_crash_reporter(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider")]
pub enum CrashReporterProvider {
    /// Faults become `error!` records on the `lifeline.crash` target.
    #[serde(rename = "tracing")]
    Tracing,
    /// Faults are appended to a JSON lines file.
    #[serde(rename = "jsonl")]
    Jsonl(JsonlReporterConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonlReporterConfig {
    #[serde(default = "default_crash_path")]
    pub path: String,

    #[serde(default = "default_crash_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_crash_path() -> String {
    "./crash.jsonl".to_string()
}

fn default_crash_channel_capacity() -> usize {
    256
}

impl Default for JsonlReporterConfig {
    fn default() -> Self {
        Self {
            path: default_crash_path(),
            channel_capacity: default_crash_channel_capacity(),
        }
    }
}
