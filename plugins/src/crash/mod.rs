pub mod jsonl;
pub mod tracing_reporter;

pub use jsonl::JsonlCrashReporter;
pub use tracing_reporter::TracingCrashReporter;
