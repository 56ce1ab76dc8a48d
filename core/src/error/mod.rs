#[allow(clippy::module_inception)]
pub mod error;
pub mod task;

pub use error::{CliError, LifecycleError};
pub use task::TaskError;
