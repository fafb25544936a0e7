//! Domain Geo CLI Application
//!
//! A command-line interface that turns a domain top-list into a country
//! ruleset using DNS-over-HTTPS and a MaxMind country database.
//! This CLI application is a thin front end to the domain-geo-lib library.

mod ui;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::Parser;
use domain_geo_lib::{
    load_env_config, parse_duration, validate_concurrency, validate_country,
    validate_resolver_url, ConfigManager, GeoScanError, GeoScanner,
    ScanCancellation, ScanConfig, ScanPaths,
};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::ui::{print_header, print_summary, ProgressLine};

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

/// CLI arguments for domain-geo
#[derive(Parser, Debug)]
#[command(name = "domain-geo")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build a country domain ruleset from a domain top-list")]
#[command(
    long_about = "Resolve every domain of a popularity top-list over DNS-over-HTTPS, locate the first address with a MaxMind country database and write the domains hosted in the target country as a domain_suffix ruleset.\n\nMatches are appended to a checkpoint log as they are found, so an interrupted run resumes where it stopped."
)]
#[command(styles = STYLES)]
pub struct Args {
    /// Domain top-list, one domain per line (first line is a header)
    #[arg(long = "input", value_name = "FILE", help_heading = "Input")]
    pub input: Option<PathBuf>,

    /// Geosite reference list whose domains are skipped (repeatable)
    #[arg(long = "geosite", value_name = "FILE", action = clap::ArgAction::Append, help_heading = "Input")]
    pub geosite: Vec<PathBuf>,

    /// MaxMind country database
    #[arg(long = "geoip-db", value_name = "FILE", help_heading = "Input")]
    pub geoip_db: Option<PathBuf>,

    /// Append-only log of matches used to resume interrupted runs
    #[arg(long = "checkpoint", value_name = "FILE", help_heading = "Output")]
    pub checkpoint: Option<PathBuf>,

    /// Ruleset JSON written at the end of a successful run
    #[arg(long = "output", value_name = "FILE", help_heading = "Output")]
    pub output: Option<PathBuf>,

    /// Flush the checkpoint log to disk after every match
    #[arg(long = "sync-checkpoint", help_heading = "Output")]
    pub sync_checkpoint: bool,

    /// Do not draw the progress line
    #[arg(long = "no-progress", help_heading = "Output")]
    pub no_progress: bool,

    /// Max domains resolved at once (1-256, default: CPU count)
    #[arg(short = 'c', long = "concurrency", value_name = "N", help_heading = "Resolution")]
    pub concurrency: Option<usize>,

    /// Timeout per resolution attempt (e.g. 10s, 2m, 30)
    #[arg(long = "timeout", value_name = "DURATION", help_heading = "Resolution")]
    pub timeout: Option<String>,

    /// Country code of the ruleset (default: CN)
    #[arg(long = "country", value_name = "CODE", help_heading = "Resolution")]
    pub country: Option<String>,

    /// DNS-over-HTTPS JSON endpoint
    #[arg(long = "resolver", value_name = "URL", help_heading = "Resolution")]
    pub resolver: Option<String>,

    /// Attempts per domain before giving up (0 = unlimited)
    #[arg(long = "max-attempts", value_name = "N", help_heading = "Resolution")]
    pub max_attempts: Option<u32>,

    /// Use specific config file instead of automatic discovery
    #[arg(long = "config", value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<PathBuf>,

    /// Show detailed debug information
    #[arg(short = 'd', long = "debug", help_heading = "Configuration")]
    pub debug: bool,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose", help_heading = "Configuration")]
    pub verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Validate arguments
    if let Err(e) = validate_args(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    init_logging(&args);

    if let Err(e) = run_scan(args).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Install the stderr log subscriber. `RUST_LOG` wins over the flags.
fn init_logging(args: &Args) {
    let level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Validate command line arguments
fn validate_args(args: &Args) -> Result<(), String> {
    if let Some(concurrency) = args.concurrency {
        validate_concurrency(concurrency).map_err(|e| e.to_string())?;
    }
    if let Some(timeout) = &args.timeout {
        parse_duration(timeout).map_err(|e| e.to_string())?;
    }
    if let Some(country) = &args.country {
        validate_country(country).map_err(|e| e.to_string())?;
    }
    if let Some(resolver) = &args.resolver {
        validate_resolver_url(resolver).map_err(|e| e.to_string())?;
    }
    Ok(())
}

async fn run_scan(args: Args) -> Result<(), GeoScanError> {
    let (config, paths) = build_config(&args)?;

    let cancel = ScanCancellation::new();
    cancel.cancel_on_ctrl_c();

    let scanner = GeoScanner::open(config, &paths.geoip_db)?.with_cancellation(cancel);
    print_header(scanner.config(), &paths);

    let progress = ProgressLine::stderr(!args.no_progress);
    match scanner.run(&paths, &progress).await {
        Ok(summary) => {
            print_summary(&summary, &paths);
            Ok(())
        }
        Err(e) => {
            progress.clear();
            Err(e)
        }
    }
}

/// Build configuration with proper precedence.
///
/// Precedence order (highest to lowest):
/// 1. CLI arguments
/// 2. Environment variables (DG_*)
/// 3. Config file (--config, DG_CONFIG, or discovered)
/// 4. Built-in defaults
fn build_config(args: &Args) -> Result<(ScanConfig, ScanPaths), GeoScanError> {
    let config_manager = ConfigManager::new(args.verbose);
    let env_config = load_env_config(args.verbose);

    let file_config = if let Some(explicit_config_path) = &args.config {
        tracing::info!(
            "Using explicit config file (CLI --config): {}",
            explicit_config_path.display()
        );
        config_manager.load_file(explicit_config_path)?
    } else if let Some(env_config_path) = &env_config.config_file {
        tracing::info!(
            "Using explicit config file (DG_CONFIG env var): {}",
            env_config_path.display()
        );
        config_manager.load_file(env_config_path)?
    } else {
        config_manager.discover_and_load()?
    };

    let config = file_config.apply_to(ScanConfig::default())?;
    let config = env_config.apply_to(config);
    let config = apply_cli_args_to_config(config, args)?;

    let paths = apply_cli_args_to_paths(file_config.apply_paths(ScanPaths::default()), args);
    paths.validate()?;

    Ok((config, paths))
}

/// Apply CLI arguments to config (highest precedence).
fn apply_cli_args_to_config(
    mut config: ScanConfig,
    args: &Args,
) -> Result<ScanConfig, GeoScanError> {
    if let Some(concurrency) = args.concurrency {
        config = config.with_concurrency(concurrency);
    }
    if let Some(timeout) = &args.timeout {
        config = config.with_attempt_timeout(parse_duration(timeout)?);
    }
    if let Some(country) = &args.country {
        config = config.with_target_country(country.trim());
    }
    if let Some(resolver) = &args.resolver {
        config = config.with_resolver_url(resolver.trim());
    }
    if let Some(max_attempts) = args.max_attempts {
        let retry = config.retry.clone().with_max_attempts(max_attempts);
        config = config.with_retry(retry);
    }
    // Only override when the flag is passed; false would clobber the file value.
    if args.sync_checkpoint {
        config = config.with_sync_checkpoint(true);
    }

    Ok(config)
}

fn apply_cli_args_to_paths(mut paths: ScanPaths, args: &Args) -> ScanPaths {
    if let Some(input) = &args.input {
        paths.input = input.clone();
    }
    if !args.geosite.is_empty() {
        paths.geosite = args.geosite.clone();
    }
    if let Some(geoip_db) = &args.geoip_db {
        paths.geoip_db = geoip_db.clone();
    }
    if let Some(checkpoint) = &args.checkpoint {
        paths.checkpoint = checkpoint.clone();
    }
    if let Some(output) = &args.output {
        paths.output = output.clone();
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    // Helper function with all required fields
    fn create_test_args() -> Args {
        Args {
            input: None,
            geosite: vec![],
            geoip_db: None,
            checkpoint: None,
            output: None,
            sync_checkpoint: false,
            no_progress: false,
            concurrency: None,
            timeout: None,
            country: None,
            resolver: None,
            max_attempts: None,
            config: None,
            debug: false,
            verbose: false,
        }
    }

    #[test]
    fn test_validate_args_defaults_ok() {
        assert!(validate_args(&create_test_args()).is_ok());
    }

    #[test]
    fn test_validate_args_concurrency_bounds() {
        let mut args = create_test_args();
        args.concurrency = Some(0);
        assert!(validate_args(&args).is_err());

        args.concurrency = Some(257);
        assert!(validate_args(&args).is_err());

        args.concurrency = Some(256);
        assert!(validate_args(&args).is_ok());
    }

    #[test]
    fn test_validate_args_rejects_bad_values() {
        let mut args = create_test_args();
        args.timeout = Some("0s".to_string());
        assert!(validate_args(&args).is_err());

        let mut args = create_test_args();
        args.country = Some("C1".to_string());
        assert!(validate_args(&args).is_err());

        let mut args = create_test_args();
        args.resolver = Some("dns.alidns.com/resolve".to_string());
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_build_config_rejects_output_on_checkpoint() {
        let mut args = create_test_args();
        args.output = Some(PathBuf::from("same.json"));
        args.checkpoint = Some(PathBuf::from("same.json"));
        assert!(matches!(
            build_config(&args),
            Err(GeoScanError::ConfigError { .. })
        ));

        // Output from the file, checkpoint from the flag.
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[paths]\noutput = \"run.log\"\n").unwrap();
        file.flush().unwrap();
        let mut args = create_test_args();
        args.config = Some(file.path().to_path_buf());
        args.checkpoint = Some(PathBuf::from("run.log"));
        assert!(build_config(&args).is_err());
    }

    #[test]
    fn test_cli_args_override_config() {
        let mut args = create_test_args();
        args.concurrency = Some(12);
        args.timeout = Some("3s".to_string());
        args.country = Some("jp".to_string());
        args.max_attempts = Some(4);
        args.sync_checkpoint = true;

        let config = apply_cli_args_to_config(ScanConfig::default(), &args).unwrap();
        assert_eq!(config.concurrency, 12);
        assert_eq!(config.attempt_timeout, Duration::from_secs(3));
        assert_eq!(config.target_country, "JP");
        assert_eq!(config.retry.max_attempts, Some(4));
        assert!(config.sync_checkpoint);
    }

    #[test]
    fn test_absent_flags_keep_config_values() {
        let base = ScanConfig::default()
            .with_concurrency(7)
            .with_sync_checkpoint(true);
        let config = apply_cli_args_to_config(base.clone(), &create_test_args()).unwrap();
        assert_eq!(config, base);
    }

    #[test]
    fn test_zero_max_attempts_means_unlimited() {
        let mut args = create_test_args();
        args.max_attempts = Some(0);
        let base = ScanConfig::default().with_retry(
            ScanConfig::default().retry.with_max_attempts(3),
        );
        let config = apply_cli_args_to_config(base, &args).unwrap();
        assert_eq!(config.retry.max_attempts, None);
    }

    #[test]
    fn test_cli_paths_override_defaults() {
        let mut args = create_test_args();
        args.input = Some(PathBuf::from("top.csv"));
        args.geosite = vec![PathBuf::from("a.json"), PathBuf::from("b.json")];

        let paths = apply_cli_args_to_paths(ScanPaths::default(), &args);
        assert_eq!(paths.input, PathBuf::from("top.csv"));
        assert_eq!(paths.geosite.len(), 2);
        assert_eq!(paths.output, ScanPaths::default().output);
    }

    #[test]
    fn test_build_config_with_explicit_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            b"[scan]\nconcurrency = 40\ncountry = \"HK\"\n\n[paths]\noutput = \"hk.json\"\n",
        )
        .unwrap();
        file.flush().unwrap();

        let mut args = create_test_args();
        args.config = Some(file.path().to_path_buf());
        args.concurrency = Some(16);

        let (config, paths) = build_config(&args).unwrap();
        assert_eq!(config.concurrency, 16); // CLI wins
        assert_eq!(paths.output, PathBuf::from("hk.json"));
    }

    #[test]
    fn test_build_config_missing_explicit_file_fails() {
        let mut args = create_test_args();
        args.config = Some(PathBuf::from("/nonexistent/domain-geo.toml"));
        assert!(build_config(&args).is_err());
    }
}
