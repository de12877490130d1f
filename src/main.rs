//! Leafscan: RedLeaves-family implant detection and config extraction.
//!
//! This is the main entry point for the CLI application.

use leafscan::core::config::Config;
use leafscan::core::error::{error_to_exit_code, Result};
use leafscan::process::{Detection, ImplantScanner};
use leafscan::report;
use leafscan::ui::cli::{Cli, Commands, ConfigAction, OutputFormat};
use leafscan::utils::logging::{cleanup_old_logs, init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(error_to_exit_code(&e) as u8)
        }
    }
}

fn run() -> Result<()> {
    // Parse command-line arguments
    let cli = Cli::parse_args();

    // Load configuration before logging so the config can set the level
    let config = Config::load_or_default();

    let log_config = if cli.quiet {
        LogConfig::quiet()
    } else if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::from_config(&config)
    };
    init_logging(log_config)?;

    log::info!("Leafscan v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = cleanup_old_logs(&config.logging.log_dir(), config.logging.keep_logs_days) {
        log::warn!("Log cleanup failed: {}", e);
    }

    match cli.command {
        Some(Commands::Detect { pid, name, output }) => {
            run_scan(&config, pid, name, output, cli.format, false)
        }
        Some(Commands::Extract { pid, name, output }) => {
            run_scan(&config, pid, name, output, cli.format, true)
        }
        Some(Commands::Rules) => run_rules(&config),
        Some(Commands::Config { action }) => run_config(action, &config),
        Some(Commands::Info) => run_info(&config),
        None => {
            println!("Leafscan - RedLeaves-family implant scanner");
            println!();
            println!("Use --help for usage information");
            println!();
            println!("Quick start:");
            println!("  leafscan detect              Scan all processes for signatures");
            println!("  leafscan extract             Scan and decode implant configs");
            println!("  leafscan extract --pid 1234  Scan one process");
            println!("  leafscan rules               List the built-in signature rules");
            Ok(())
        }
    }
}

/// Run a detection or extraction scan.
fn run_scan(
    config: &Config,
    pid: Option<u32>,
    name: Option<String>,
    output: Option<PathBuf>,
    format: OutputFormat,
    extract: bool,
) -> Result<()> {
    let scanner = ImplantScanner::new(config)?.with_extraction(extract);

    let detections = if let Some(pid) = pid {
        log::info!("Scanning process {}...", pid);
        scanner.scan_pid(pid)?
    } else if let Some(name) = name {
        log::info!("Scanning processes matching '{}'...", name);
        scanner.scan_name(&name)?
    } else {
        log::info!("Scanning all processes...");
        scanner.scan_all()?
    };

    if detections.is_empty() {
        log::info!("No implant signatures found");
    } else {
        log::warn!("{} process(es) matched implant signatures", detections.len());
    }

    let rendered = render(&detections, format)?;

    if let Some(path) = output {
        std::fs::write(&path, &rendered)?;
        log::info!("Results written to {}", path.display());
    } else {
        println!("{}", rendered);
    }

    Ok(())
}

fn render(detections: &[Detection], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(report::render_text(detections)),
        OutputFormat::Json => report::render_json(detections),
    }
}

/// List the built-in signature rules.
fn run_rules(config: &Config) -> Result<()> {
    let scanner = ImplantScanner::new(config)?;

    println!("{:<12} {:<9} {}", "Rule", "Strings", "Description");
    for rule in scanner.rule_engine().list_rules() {
        println!(
            "{:<12} {:<9} {}",
            rule.name,
            rule.strings.len(),
            rule.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

/// Handle configuration commands.
fn run_config(action: ConfigAction, config: &Config) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        ConfigAction::Reset { yes } => {
            if !yes {
                println!("Pass --yes to confirm resetting the configuration.");
                return Ok(());
            }
            let default_config = Config::default();
            default_config.save(&Config::default_config_path())?;
            println!("Configuration reset to defaults.");
        }
        ConfigAction::Path => {
            println!("{}", Config::default_config_path().display());
        }
    }
    Ok(())
}

/// Show application information.
fn run_info(config: &Config) -> Result<()> {
    println!("Leafscan - RedLeaves-family implant scanner");
    println!();
    println!("Version:          {}", env!("CARGO_PKG_VERSION"));
    println!("Config Path:      {}", Config::default_config_path().display());
    println!("Data Directory:   {}", Config::data_dir().display());
    println!("Log Directory:    {}", config.logging.log_dir().display());
    println!();
    println!("Scan Settings:");
    println!("  Max Region:     {} MB", config.scan.max_region_mb);
    println!("  Pathless Procs: {}", config.scan.include_pathless);
    println!("  Excluded:       {}", config.scan.exclude_processes.len());
    Ok(())
}
