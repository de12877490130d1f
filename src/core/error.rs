//! Error types and result handling for leafscan.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for leafscan operations.
#[derive(Error, Debug)]
pub enum Error {
    // ===== Configuration Errors =====
    #[error("Failed to load configuration: {0}")]
    ConfigLoad(String),

    #[error("Failed to save configuration: {0}")]
    ConfigSave(String),

    #[error("Invalid configuration value: {field} - {message}")]
    ConfigInvalid { field: String, message: String },

    // ===== Process Errors =====
    #[error("Failed to enumerate processes: {0}")]
    ProcessEnumeration(String),

    #[error("Process not found: {0}")]
    ProcessNotFound(u32),

    #[error("Failed to enumerate memory regions for pid {pid}: {reason}")]
    RegionEnumeration { pid: u32, reason: String },

    /// A memory read touched an unmapped or paged-out range. Callers treat
    /// this as a per-hit skip, never a scan abort.
    #[error("Failed to read {length} bytes at {address:#x} from pid {pid}")]
    ReadFault { pid: u32, address: u64, length: u64 },

    // ===== Detection Errors =====
    #[error("Signature rule compilation failed: {0}")]
    RuleCompilation(String),

    // ===== Serialization Errors =====
    #[error("JSON serialization error")]
    JsonSerialize(#[from] serde_json::Error),

    // ===== I/O Errors =====
    #[error("Failed to access directory: {path}")]
    DirectoryAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(String),

    // ===== Generic Errors =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl Error {
    /// Create a read fault error.
    pub fn read_fault(pid: u32, address: u64, length: u64) -> Self {
        Self::ReadFault {
            pid,
            address,
            length,
        }
    }

    /// Check if this error is recoverable (the scan can move on to the
    /// next region or process).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ReadFault { .. }
                | Error::RegionEnumeration { .. }
                | Error::ProcessNotFound(_)
        )
    }

    /// Get the error category for logging and exit codes.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::ConfigLoad(_) | Error::ConfigSave(_) | Error::ConfigInvalid { .. } => {
                ErrorCategory::Configuration
            }

            Error::ProcessEnumeration(_)
            | Error::ProcessNotFound(_)
            | Error::RegionEnumeration { .. }
            | Error::ReadFault { .. } => ErrorCategory::Process,

            Error::RuleCompilation(_) => ErrorCategory::Detection,

            Error::JsonSerialize(_) => ErrorCategory::Serialization,

            Error::DirectoryAccess { .. } | Error::Io(_) => ErrorCategory::Io,

            Error::Other(_) => ErrorCategory::Other,
        }
    }
}

/// Error category for classification and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Io,
    Configuration,
    Process,
    Detection,
    Serialization,
    Other,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io => write!(f, "I/O"),
            Self::Configuration => write!(f, "Configuration"),
            Self::Process => write!(f, "Process"),
            Self::Detection => write!(f, "Detection"),
            Self::Serialization => write!(f, "Serialization"),
            Self::Other => write!(f, "Other"),
        }
    }
}

/// Map errors to appropriate exit codes.
pub fn error_to_exit_code(error: &Error) -> i32 {
    match error.category() {
        ErrorCategory::Io => 2,
        ErrorCategory::Configuration => 3,
        ErrorCategory::Process => 4,
        ErrorCategory::Detection => 5,
        ErrorCategory::Serialization => 6,
        ErrorCategory::Other => 1,
    }
}
