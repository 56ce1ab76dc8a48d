pub mod api;
pub mod config;
pub mod context;
pub mod crash;
pub mod error;
pub mod state;
pub mod task;
pub mod util;
