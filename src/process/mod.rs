//! Process scanning orchestration.
//!
//! Walks candidate processes, runs the signature engine over their
//! readable memory, and hands matched regions to the extraction
//! pipeline. Failures on individual processes or regions are logged and
//! skipped; only setup errors abort a scan.

pub mod enumerate;
pub mod memory;

pub use enumerate::{ProcessEnumerator, ProcessInfo};
pub use memory::{MemoryReader, MemoryRegion};

use log::{debug, warn};
use serde::Serialize;

use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::detection::{RuleEngine, FamilyId};
use crate::extract::{extract_config, ConfigRecord, ExtractError};
use memory::{find_region, region_end, MappedRegion};

/// A signature match in one process, with the decoded configuration
/// when extraction succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub pid: u32,
    pub name: String,
    pub family: FamilyId,
    /// Base address of the region the signature matched in
    pub region_base: u64,
    /// Absolute address of the first matched pattern
    pub hit_address: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigRecord>,
    /// Why extraction produced no configuration, when it did not
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Scans process memory for implant signatures and extracts their
/// configuration blobs.
pub struct ImplantScanner {
    enumerator: ProcessEnumerator,
    reader: MemoryReader,
    engine: RuleEngine,
    max_scan_size: u64,
    extract: bool,
    exclude: Vec<String>,
}

impl ImplantScanner {
    /// Build a scanner from the application config. Fails only if the
    /// signature rules do not compile.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            enumerator: ProcessEnumerator::new()
                .with_pathless_processes(config.scan.include_pathless),
            reader: MemoryReader::new(),
            engine: RuleEngine::with_family_rules()?,
            max_scan_size: config.scan.max_region_bytes(),
            extract: false,
            exclude: config.scan.exclude_processes.clone(),
        })
    }

    /// Enable configuration extraction for matched processes.
    pub fn with_extraction(mut self, extract: bool) -> Self {
        self.extract = extract;
        self
    }

    pub fn rule_engine(&self) -> &RuleEngine {
        &self.engine
    }

    /// Scan every process on the system.
    pub fn scan_all(&self) -> Result<Vec<Detection>> {
        let own_pid = std::process::id();
        let mut detections = Vec::new();

        for process in self.enumerator.enumerate()? {
            // The signature strings live in our own memory too.
            if process.pid == own_pid {
                continue;
            }
            if is_excluded(&process.name, &self.exclude) {
                debug!("skipping excluded process {} ({})", process.name, process.pid);
                continue;
            }

            match self.scan_process(&process) {
                Ok(Some(detection)) => detections.push(detection),
                Ok(None) => {}
                Err(e) if e.is_recoverable() => {
                    debug!("skipping {} ({}): {}", process.name, process.pid, e);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(detections)
    }

    /// Scan a single process by PID.
    pub fn scan_pid(&self, pid: u32) -> Result<Vec<Detection>> {
        let process = self
            .enumerator
            .get_process(pid)?
            .ok_or(Error::ProcessNotFound(pid))?;
        Ok(self.scan_process(&process)?.into_iter().collect())
    }

    /// Scan every process whose name contains `name`
    /// (case-insensitive).
    pub fn scan_name(&self, name: &str) -> Result<Vec<Detection>> {
        let own_pid = std::process::id();
        let needle = name.to_ascii_lowercase();
        let mut detections = Vec::new();

        for process in self.enumerator.enumerate()? {
            if process.pid == own_pid {
                continue;
            }
            if !process.name.to_ascii_lowercase().contains(&needle) {
                continue;
            }
            match self.scan_process(&process) {
                Ok(Some(detection)) => detections.push(detection),
                Ok(None) => {}
                Err(e) if e.is_recoverable() => {
                    debug!("skipping {} ({}): {}", process.name, process.pid, e);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(detections)
    }

    /// Scan one process. At most one detection is reported per process;
    /// the first matching region wins.
    fn scan_process(&self, process: &ProcessInfo) -> Result<Option<Detection>> {
        let mapped = self.reader.regions(process.pid)?;
        let regions: Vec<MemoryRegion> = mapped.iter().map(|m| m.region).collect();

        for entry in &mapped {
            if !entry.protection.is_scannable() || entry.region.is_empty() {
                continue;
            }

            let window = entry.region.len().min(self.max_scan_size) as usize;
            let data = match self.reader.read(process.pid, entry.region.base, window) {
                Ok(data) => data,
                Err(e) => {
                    debug!(
                        "read failed in {} ({}) at {:#x}: {}",
                        process.name, process.pid, entry.region.base, e
                    );
                    continue;
                }
            };

            let hits = self.engine.scan(&data, entry.region.base);
            let Some(hit) = hits.first() else {
                continue;
            };

            debug!(
                "{} signature at {:#x} in {} ({})",
                hit.family, hit.address, process.name, process.pid
            );
            let detection =
                self.build_detection(process, &regions, entry, hit.family, hit.address);
            return Ok(Some(detection));
        }

        Ok(None)
    }

    /// Assemble the detection record, running extraction over the full
    /// region when enabled.
    fn build_detection(
        &self,
        process: &ProcessInfo,
        regions: &[MemoryRegion],
        matched: &MappedRegion,
        family: FamilyId,
        hit_address: u64,
    ) -> Detection {
        let mut detection = Detection {
            pid: process.pid,
            name: process.name.clone(),
            family,
            region_base: matched.region.base,
            hit_address,
            config: None,
            failure: None,
        };

        if !self.extract {
            return detection;
        }

        // Re-read the whole region; the signature window may have been
        // clipped to the scan limit.
        let Some(region) = find_region(regions, hit_address) else {
            detection.failure = Some(
                ExtractError::RegionNotFound {
                    address: hit_address,
                }
                .to_string(),
            );
            return detection;
        };
        let end = region_end(regions, region.base).unwrap_or(region.end);
        let full = MemoryRegion::new(region.base, end);

        let data = match self.reader.read(process.pid, full.base, full.len() as usize) {
            Ok(data) => data,
            Err(e) => {
                warn!(
                    "region re-read failed in {} ({}): {}",
                    process.name, process.pid, e
                );
                detection.failure = Some(e.to_string());
                return detection;
            }
        };

        match extract_config(family, &full, &data) {
            Ok(config) => detection.config = Some(config),
            Err(e) if e.is_skip() => {
                debug!(
                    "extraction skipped for {} ({}): {}",
                    process.name, process.pid, e
                );
                detection.failure = Some(e.to_string());
            }
            Err(e) => {
                warn!(
                    "extraction failed for {} ({}): {}",
                    process.name, process.pid, e
                );
                detection.failure = Some(e.to_string());
            }
        }

        detection
    }
}

fn is_excluded(name: &str, exclude: &[String]) -> bool {
    exclude.iter().any(|e| e.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusion_is_case_insensitive() {
        let exclude = vec!["svchost.exe".to_string()];
        assert!(is_excluded("SvcHost.EXE", &exclude));
        assert!(!is_excluded("explorer.exe", &exclude));
        assert!(!is_excluded("svchost", &exclude));
    }

    #[test]
    fn test_scanner_from_default_config() {
        let scanner = ImplantScanner::new(&Config::default()).unwrap();
        assert_eq!(scanner.max_scan_size, 10 * 1024 * 1024);
        assert!(!scanner.extract);
        assert_eq!(scanner.rule_engine().rule_count(), 5);
    }

    #[test]
    fn test_detection_serializes_without_empty_fields() {
        let detection = Detection {
            pid: 42,
            name: "victim".to_string(),
            family: FamilyId::RedLeaves,
            region_base: 0x400000,
            hit_address: 0x401234,
            config: None,
            failure: None,
        };
        let json = serde_json::to_value(&detection).unwrap();
        assert_eq!(json["pid"], 42);
        assert!(json.get("config").is_none());
        assert!(json.get("failure").is_none());
    }
}
