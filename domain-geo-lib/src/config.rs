//! Configuration file parsing and management.
//!
//! This module handles loading configuration from TOML files and the
//! `DG_*` environment variables, and folding both into a [`ScanConfig`]
//! and [`ScanPaths`].

use crate::error::GeoScanError;
use crate::types::{ScanConfig, ScanPaths, MAX_CONCURRENCY};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration loaded from TOML files.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FileConfig {
    /// Pool and resolver settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan: Option<ScanSection>,

    /// Retry behaviour for transient resolution failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetrySection>,

    /// Input and output locations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paths: Option<PathsSection>,
}

/// `[scan]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ScanSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Per-attempt timeout (as string, e.g., "10s", "1m")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Target country code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    /// DNS-over-HTTPS endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolver: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_checkpoint: Option<bool>,
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RetrySection {
    /// 0 means unlimited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_delay_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PathsSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub geosite: Option<Vec<PathBuf>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub geoip_db: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

impl FileConfig {
    /// Overlay the file's scan and retry settings onto `config`.
    pub fn apply_to(&self, mut config: ScanConfig) -> Result<ScanConfig, GeoScanError> {
        if let Some(scan) = &self.scan {
            if let Some(concurrency) = scan.concurrency {
                config = config.with_concurrency(concurrency);
            }
            if let Some(timeout) = &scan.timeout {
                config = config.with_attempt_timeout(parse_duration(timeout)?);
            }
            if let Some(country) = &scan.country {
                config = config.with_target_country(country.as_str());
            }
            if let Some(resolver) = &scan.resolver {
                config = config.with_resolver_url(resolver.as_str());
            }
            if let Some(sync) = scan.sync_checkpoint {
                config = config.with_sync_checkpoint(sync);
            }
        }

        if let Some(retry) = &self.retry {
            let mut policy = config.retry.clone();
            if let Some(attempts) = retry.max_attempts {
                policy = policy.with_max_attempts(attempts);
            }
            let base = retry
                .base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(policy.base_delay);
            let max = retry
                .max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(policy.max_delay);
            config = config.with_retry(policy.with_backoff(base, max));
        }

        Ok(config)
    }

    /// Overlay the file's paths onto `paths`.
    pub fn apply_paths(&self, mut paths: ScanPaths) -> ScanPaths {
        if let Some(section) = &self.paths {
            if let Some(input) = &section.input {
                paths.input = input.clone();
            }
            if let Some(geosite) = &section.geosite {
                paths.geosite = geosite.clone();
            }
            if let Some(geoip_db) = &section.geoip_db {
                paths.geoip_db = geoip_db.clone();
            }
            if let Some(checkpoint) = &section.checkpoint {
                paths.checkpoint = checkpoint.clone();
            }
            if let Some(output) = &section.output {
                paths.output = output.clone();
            }
        }
        paths
    }
}

/// Configuration discovery and loading functionality.
pub struct ConfigManager {
    /// Whether to emit warnings for config issues
    pub verbose: bool,
}

impl ConfigManager {
    /// Create a new configuration manager.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Load configuration from a specific file.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FileConfig, GeoScanError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(GeoScanError::file_error(
                path.to_string_lossy(),
                "Configuration file not found",
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            GeoScanError::file_error(
                path.to_string_lossy(),
                format!("Failed to read configuration file: {}", e),
            )
        })?;

        let config: FileConfig = toml::from_str(&content).map_err(|e| {
            GeoScanError::config(format!("Failed to parse TOML configuration: {}", e))
        })?;

        self.validate_config(&config)?;
        debug!("Loaded configuration from {}", path.display());

        Ok(config)
    }

    /// Discover and load configuration files in precedence order.
    ///
    /// XDG config is applied first, the local file last so it wins.
    pub fn discover_and_load(&self) -> Result<FileConfig, GeoScanError> {
        let mut merged_config = FileConfig::default();
        let mut loaded_files = Vec::new();

        for path in [self.get_xdg_config_path(), self.get_local_config_path()]
            .into_iter()
            .flatten()
        {
            let config = self.load_file(&path)?;
            merged_config = self.merge_configs(merged_config, config);
            loaded_files.push(path);
        }

        if self.verbose && loaded_files.len() > 1 {
            warn!(
                "Multiple config files found, later ones take precedence: {}",
                loaded_files
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        Ok(merged_config)
    }

    /// Get the local configuration file path.
    fn get_local_config_path(&self) -> Option<PathBuf> {
        let candidates = ["./domain-geo.toml", "./.domain-geo.toml"];

        candidates
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(Path::to_path_buf)
    }

    /// Get the XDG configuration file path.
    fn get_xdg_config_path(&self) -> Option<PathBuf> {
        let config_dir = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| Path::new(&home).join(".config")))?;

        let path = config_dir.join("domain-geo").join("config.toml");
        path.exists().then_some(path)
    }

    /// Merge two configs; values from `higher` win field by field.
    pub fn merge_configs(&self, lower: FileConfig, higher: FileConfig) -> FileConfig {
        FileConfig {
            scan: match (lower.scan, higher.scan) {
                (Some(lower), Some(higher)) => Some(ScanSection {
                    concurrency: higher.concurrency.or(lower.concurrency),
                    timeout: higher.timeout.or(lower.timeout),
                    country: higher.country.or(lower.country),
                    resolver: higher.resolver.or(lower.resolver),
                    sync_checkpoint: higher.sync_checkpoint.or(lower.sync_checkpoint),
                }),
                (lower, higher) => higher.or(lower),
            },
            retry: match (lower.retry, higher.retry) {
                (Some(lower), Some(higher)) => Some(RetrySection {
                    max_attempts: higher.max_attempts.or(lower.max_attempts),
                    base_delay_ms: higher.base_delay_ms.or(lower.base_delay_ms),
                    max_delay_ms: higher.max_delay_ms.or(lower.max_delay_ms),
                }),
                (lower, higher) => higher.or(lower),
            },
            paths: match (lower.paths, higher.paths) {
                (Some(lower), Some(higher)) => Some(PathsSection {
                    input: higher.input.or(lower.input),
                    geosite: higher.geosite.or(lower.geosite),
                    geoip_db: higher.geoip_db.or(lower.geoip_db),
                    checkpoint: higher.checkpoint.or(lower.checkpoint),
                    output: higher.output.or(lower.output),
                }),
                (lower, higher) => higher.or(lower),
            },
        }
    }

    /// Validate configuration values.
    fn validate_config(&self, config: &FileConfig) -> Result<(), GeoScanError> {
        if let Some(scan) = &config.scan {
            if let Some(concurrency) = scan.concurrency {
                validate_concurrency(concurrency)?;
            }
            if let Some(timeout) = &scan.timeout {
                parse_duration(timeout)?;
            }
            if let Some(country) = &scan.country {
                validate_country(country)?;
            }
            if let Some(resolver) = &scan.resolver {
                validate_resolver_url(resolver)?;
            }
        }

        if let Some(retry) = &config.retry {
            if let (Some(base), Some(max)) = (retry.base_delay_ms, retry.max_delay_ms) {
                if base > max {
                    return Err(GeoScanError::config(format!(
                        "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                        base, max
                    )));
                }
            }
        }

        if let Some(paths) = &config.paths {
            if paths.geosite.as_ref().is_some_and(|g| g.is_empty()) {
                return Err(GeoScanError::config(
                    "paths.geosite must list at least one reference file",
                ));
            }
        }

        Ok(())
    }
}

/// Settings taken from `DG_*` environment variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    pub concurrency: Option<usize>,
    pub timeout: Option<Duration>,
    pub country: Option<String>,
    pub resolver: Option<String>,
    /// Explicit config file (`DG_CONFIG`)
    pub config_file: Option<PathBuf>,
}

impl EnvConfig {
    /// Overlay the environment settings onto `config`.
    pub fn apply_to(&self, mut config: ScanConfig) -> ScanConfig {
        if let Some(concurrency) = self.concurrency {
            config = config.with_concurrency(concurrency);
        }
        if let Some(timeout) = self.timeout {
            config = config.with_attempt_timeout(timeout);
        }
        if let Some(country) = &self.country {
            config = config.with_target_country(country.as_str());
        }
        if let Some(resolver) = &self.resolver {
            config = config.with_resolver_url(resolver.as_str());
        }
        config
    }
}

/// Load configuration from environment variables.
///
/// Invalid values are reported (with `verbose`) and ignored.
pub fn load_env_config(verbose: bool) -> EnvConfig {
    load_env_config_from(|key| env::var(key).ok(), verbose)
}

/// Same as [`load_env_config`] with an injectable variable source.
pub fn load_env_config_from<F>(lookup: F, verbose: bool) -> EnvConfig
where
    F: Fn(&str) -> Option<String>,
{
    let mut env_config = EnvConfig::default();

    if let Some(val) = lookup("DG_CONCURRENCY") {
        match val
            .trim()
            .parse::<usize>()
            .map_err(|e| GeoScanError::config(e.to_string()))
            .and_then(|c| validate_concurrency(c).map(|_| c))
        {
            Ok(concurrency) => env_config.concurrency = Some(concurrency),
            Err(_) => report_invalid(verbose, "DG_CONCURRENCY", &val),
        }
    }

    if let Some(val) = lookup("DG_TIMEOUT") {
        match parse_duration(&val) {
            Ok(timeout) => env_config.timeout = Some(timeout),
            Err(_) => report_invalid(verbose, "DG_TIMEOUT", &val),
        }
    }

    if let Some(val) = lookup("DG_COUNTRY") {
        match validate_country(&val) {
            Ok(()) => env_config.country = Some(val.trim().to_ascii_uppercase()),
            Err(_) => report_invalid(verbose, "DG_COUNTRY", &val),
        }
    }

    if let Some(val) = lookup("DG_RESOLVER") {
        match validate_resolver_url(&val) {
            Ok(()) => env_config.resolver = Some(val.trim().to_string()),
            Err(_) => report_invalid(verbose, "DG_RESOLVER", &val),
        }
    }

    if let Some(val) = lookup("DG_CONFIG") {
        if !val.trim().is_empty() {
            env_config.config_file = Some(PathBuf::from(val.trim()));
        }
    }

    env_config
}

fn report_invalid(verbose: bool, key: &str, value: &str) {
    if verbose {
        warn!("Ignoring invalid {}='{}'", key, value);
    }
}

/// Parse a duration like "10s", "2m", "500ms" or a bare number of seconds.
pub fn parse_duration(value: &str) -> Result<Duration, GeoScanError> {
    let value = value.trim().to_lowercase();
    let invalid = || {
        GeoScanError::config(format!(
            "Invalid duration '{}', use a format like '10s', '2m' or '500ms'",
            value
        ))
    };

    let duration = if let Some(ms) = value.strip_suffix("ms") {
        ms.trim().parse::<u64>().map(Duration::from_millis).map_err(|_| invalid())?
    } else if let Some(secs) = value.strip_suffix('s') {
        secs.trim().parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())?
    } else if let Some(mins) = value.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .map(|m| Duration::from_secs(m * 60))
            .map_err(|_| invalid())?
    } else {
        value.parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())?
    };

    if duration.is_zero() {
        return Err(GeoScanError::config("Duration must be greater than zero"));
    }
    Ok(duration)
}

/// Concurrency must be within 1-256.
pub fn validate_concurrency(concurrency: usize) -> Result<(), GeoScanError> {
    if concurrency == 0 || concurrency > MAX_CONCURRENCY {
        return Err(GeoScanError::config(format!(
            "Concurrency must be between 1 and {}",
            MAX_CONCURRENCY
        )));
    }
    Ok(())
}

/// Country codes are two ASCII letters.
pub fn validate_country(country: &str) -> Result<(), GeoScanError> {
    let country = country.trim();
    if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(GeoScanError::config(format!(
            "Invalid country code '{}', expected two letters like 'CN'",
            country
        )));
    }
    Ok(())
}

/// Resolver endpoints must be http(s) URLs.
pub fn validate_resolver_url(url: &str) -> Result<(), GeoScanError> {
    let url = url.trim();
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(GeoScanError::config(format!(
            "Invalid resolver URL '{}', expected http(s)://host/path",
            url
        ))),
    }
}
