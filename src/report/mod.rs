//! Detection and configuration reports.
//!
//! Text output mirrors a triage listing: a summary table of matched
//! processes, then one configuration section per detection. JSON output
//! serializes the detection records as-is.

use crate::core::error::Result;
use crate::extract::{ConfigRecord, HimawariConfig, RedLeavesConfig};
use crate::process::Detection;

const DELIM_WIDTH: usize = 70;

/// Renders the detection summary table and per-detection configuration
/// sections as plain text.
pub fn render_text(detections: &[Detection]) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "{:<20} {:<8} {:<18} {}\n",
        "Name", "PID", "Data VA", "Malware Name"
    ));
    for detection in detections {
        out.push_str(&format!(
            "{:<20} {:<8} {:<#18x} {}\n",
            detection.name, detection.pid, detection.region_base, detection.family
        ));
    }

    for detection in detections {
        out.push('\n');
        out.push_str(&"-".repeat(DELIM_WIDTH));
        out.push('\n');
        out.push_str(&format!("{} Settings:\n", detection.family));
        out.push_str(&format!(
            "Process: {} ({})\n",
            detection.name, detection.pid
        ));

        match (&detection.config, &detection.failure) {
            (Some(config), _) => {
                out.push_str("[Config Info]\n");
                render_config(&mut out, config);
            }
            (None, Some(failure)) => {
                out.push_str(&format!("Config not extracted: {}\n", failure));
            }
            (None, None) => {
                out.push_str("Config extraction disabled\n");
            }
        }
    }

    out
}

/// Renders the detections as pretty-printed JSON.
pub fn render_json(detections: &[Detection]) -> Result<String> {
    Ok(serde_json::to_string_pretty(detections)?)
}

fn render_config(out: &mut String, config: &ConfigRecord) {
    match config {
        ConfigRecord::RedLeaves(c) => render_redleaves(out, c),
        ConfigRecord::Himawari(c) => render_himawari(out, c),
    }
}

fn line(out: &mut String, label: &str, value: impl std::fmt::Display) {
    out.push_str(&format!("{:<17}: {}\n", label, value));
}

fn render_redleaves(out: &mut String, config: &RedLeavesConfig) {
    line(out, "Server1", &config.server1);
    line(out, "Server2", &config.server2);
    line(out, "Server3", &config.server3);
    line(out, "Port", config.port);
    line(
        out,
        "Mode",
        format!("{} ({})", config.mode.raw(), config.mode.label()),
    );
    line(out, "ID", &config.id);
    line(out, "Mutex", &config.mutex);
    line(out, "Injection Process", &config.injection);
    line(out, "RC4 Key", &config.rc4_key);
}

fn render_himawari(out: &mut String, config: &HimawariConfig) {
    line(out, "Server1", &config.server1);
    line(out, "Server2", &config.server2);
    line(out, "Server3", &config.server3);
    line(out, "Server4", &config.server4);
    line(out, "Port", config.port);
    line(out, "Sleep1", config.sleep1);
    line(out, "Sleep2", config.sleep2);
    line(out, "Mode", config.mode);
    line(out, "ID", &config.id);
    line(out, "Sleep3", config.sleep3);
    line(out, "Mutex", &config.mutex);
    line(out, "Key", &config.key);
    line(out, "UserAgent", &config.user_agent);
    // Unknown fields are raw bytes; render them escaped.
    line(out, "Unknown1", config.unknown1.escape_ascii());
    line(out, "Unknown2", config.unknown2.escape_ascii());
    line(out, "Unknown3", config.unknown3.escape_ascii());
}
