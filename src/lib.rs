//! Leafscan: RedLeaves-family implant detection and configuration
//! extraction.
//!
//! This crate scans live process memory for signatures of the RedLeaves
//! implant family (RedLeaves, Himawari, Lavender, Armadill, zark20rk),
//! resolves the pointer to each implant's embedded configuration blob
//! from the surrounding code bytes, and decodes the blob into a
//! structured record.

pub mod core;
pub mod detection;
pub mod extract;
pub mod process;
pub mod report;
pub mod ui;
pub mod utils;

// Re-export commonly used types
pub use crate::core::config::Config;
pub use crate::core::error::{Error, Result};
pub use crate::detection::{FamilyId, RuleEngine};
pub use crate::extract::ConfigRecord;
pub use crate::process::{Detection, ImplantScanner};
