//! Shared utilities.

pub mod logging;

pub use logging::{cleanup_old_logs, init_logging, LogConfig};
