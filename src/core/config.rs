//! Configuration management for leafscan.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Scan-related settings
    pub scan: ScanConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigLoad(format!("Failed to read config file: {}", e)))?;

        serde_json::from_str(&contents)
            .map_err(|e| Error::ConfigLoad(format!("Failed to parse config file: {}", e)))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigSave(format!("Failed to create config directory: {}", e))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| Error::ConfigSave(format!("Failed to write config file: {}", e)))
    }

    /// Load configuration from default location, or create default if not exists.
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();

        if config_path.exists() {
            match Self::load(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    log::warn!("Failed to load config, using defaults: {}", e);
                }
            }
        }

        let config = Self::default();

        if let Err(e) = config.save(&config_path) {
            log::warn!("Failed to save default config: {}", e);
        }

        config
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        Self::data_dir().join("config.json")
    }

    /// Get the application data directory.
    pub fn data_dir() -> PathBuf {
        #[cfg(windows)]
        {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("C:\\ProgramData"))
                .join("Leafscan")
        }

        #[cfg(not(windows))]
        {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join("leafscan")
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.scan.max_region_mb == 0 {
            return Err(Error::ConfigInvalid {
                field: "scan.max_region_mb".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if self.logging.keep_logs_days == 0 {
            return Err(Error::ConfigInvalid {
                field: "logging.keep_logs_days".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Scan-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Skip memory regions larger than this size (MB) during signature
    /// scanning. The hit region is still re-read in full for extraction.
    pub max_region_mb: u64,
    /// Include processes without a resolvable executable path
    pub include_pathless: bool,
    /// Process names to exclude from scanning
    pub exclude_processes: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_region_mb: 10,
            include_pathless: true,
            exclude_processes: Vec::new(),
        }
    }
}

impl ScanConfig {
    /// Maximum region size in bytes for signature scanning.
    pub fn max_region_bytes(&self) -> u64 {
        self.max_region_mb * 1024 * 1024
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Days to keep log files
    pub keep_logs_days: u32,
    /// Path for log files
    pub log_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            keep_logs_days: 30,
            log_path: None,
        }
    }
}

impl LoggingConfig {
    /// Get the effective log directory.
    pub fn log_dir(&self) -> PathBuf {
        self.log_path
            .clone()
            .unwrap_or_else(|| Config::data_dir().join("logs"))
    }
}
