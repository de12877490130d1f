//! User-facing interfaces.

pub mod cli;

pub use cli::{Cli, Commands, ConfigAction, OutputFormat};
