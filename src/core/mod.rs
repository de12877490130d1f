//! Core types shared across leafscan: configuration and errors.

pub mod config;
pub mod error;

pub use config::Config;
pub use error::{Error, Result};
