mod load;
mod types;

pub use load::{
    apply_env_overrides, get_lifeline_data_dir, load_default, load_from_path,
    ENV_CLEANUP_TIMEOUT_MS, ENV_LOG_LEVEL,
};
pub use types::{
    AppConfig, CrashConfig, CrashReporterProvider, EventsConfig, JsonlReporterConfig,
    LoggingConfig, TasksConfig,
};
