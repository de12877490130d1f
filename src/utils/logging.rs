//! Logging infrastructure for Leafscan.

use crate::core::config::Config;
use crate::core::error::Result;
use chrono::Local;
use env_logger::Builder;
use log::LevelFilter;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Logging configuration.
pub struct LogConfig {
    /// Log level
    pub level: LevelFilter,
    /// Show timestamps
    pub timestamps: bool,
    /// Show module path
    pub module_path: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            timestamps: true,
            module_path: false,
        }
    }
}

impl LogConfig {
    /// Create a log config from application config.
    pub fn from_config(config: &Config) -> Self {
        let level = match config.logging.log_level.to_lowercase().as_str() {
            "trace" => LevelFilter::Trace,
            "debug" => LevelFilter::Debug,
            "info" => LevelFilter::Info,
            "warn" | "warning" => LevelFilter::Warn,
            "error" => LevelFilter::Error,
            _ => LevelFilter::Info,
        };

        Self {
            level,
            timestamps: true,
            module_path: level == LevelFilter::Debug || level == LevelFilter::Trace,
        }
    }

    /// Create a verbose log config for CLI use.
    pub fn verbose() -> Self {
        Self {
            level: LevelFilter::Debug,
            timestamps: true,
            module_path: true,
        }
    }

    /// Create a quiet log config (errors only).
    pub fn quiet() -> Self {
        Self {
            level: LevelFilter::Error,
            timestamps: false,
            module_path: false,
        }
    }
}

/// Initialize the logging system.
pub fn init_logging(config: LogConfig) -> Result<()> {
    let mut builder = Builder::new();

    builder.filter_level(config.level);

    builder.format(move |buf, record| {
        let mut output = String::new();

        if config.timestamps {
            output.push_str(&format!("{} ", Local::now().format("%Y-%m-%d %H:%M:%S")));
        }

        let level_str = match record.level() {
            log::Level::Error => "\x1b[31mERROR\x1b[0m",
            log::Level::Warn => "\x1b[33mWARN\x1b[0m ",
            log::Level::Info => "\x1b[32mINFO\x1b[0m ",
            log::Level::Debug => "\x1b[34mDEBUG\x1b[0m",
            log::Level::Trace => "\x1b[35mTRACE\x1b[0m",
        };
        output.push_str(&format!("[{}] ", level_str));

        if config.module_path {
            if let Some(path) = record.module_path() {
                output.push_str(&format!("{}: ", path));
            }
        }

        output.push_str(&format!("{}", record.args()));

        writeln!(buf, "{}", output)
    });

    builder.init();

    log::debug!("Logging initialized with level: {:?}", config.level);
    Ok(())
}

/// Clean up old log files.
pub fn cleanup_old_logs(log_dir: &Path, keep_days: u32) -> Result<u32> {
    use std::time::{Duration, SystemTime};

    let cutoff = SystemTime::now() - Duration::from_secs(keep_days as u64 * 24 * 60 * 60);
    let mut deleted = 0u32;

    if !log_dir.exists() {
        return Ok(0);
    }

    let entries =
        fs::read_dir(log_dir).map_err(|e| crate::core::error::Error::DirectoryAccess {
            path: log_dir.to_path_buf(),
            source: e,
        })?;

    for entry in entries.flatten() {
        let path = entry.path();

        if path.extension().is_some_and(|ext| ext == "log") {
            if let Ok(metadata) = entry.metadata() {
                if let Ok(modified) = metadata.modified() {
                    if modified < cutoff && fs::remove_file(&path).is_ok() {
                        log::debug!("Deleted old log file: {:?}", path);
                        deleted += 1;
                    }
                }
            }
        }
    }

    if deleted > 0 {
        log::info!("Cleaned up {} old log file(s)", deleted);
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.level, LevelFilter::Info);
        assert!(config.timestamps);
    }

    #[test]
    fn test_log_config_verbose() {
        let config = LogConfig::verbose();
        assert_eq!(config.level, LevelFilter::Debug);
        assert!(config.module_path);
    }

    #[test]
    fn test_log_config_quiet() {
        let config = LogConfig::quiet();
        assert_eq!(config.level, LevelFilter::Error);
        assert!(!config.timestamps);
    }

    #[test]
    fn test_log_config_from_config_levels() {
        let mut config = Config::default();
        config.logging.log_level = "warn".to_string();
        assert_eq!(LogConfig::from_config(&config).level, LevelFilter::Warn);

        config.logging.log_level = "bogus".to_string();
        assert_eq!(LogConfig::from_config(&config).level, LevelFilter::Info);
    }

    #[test]
    fn test_cleanup_missing_dir_is_a_noop() {
        let dir = std::env::temp_dir().join("leafscan-no-such-dir");
        assert_eq!(cleanup_old_logs(&dir, 7).unwrap(), 0);
    }
}
