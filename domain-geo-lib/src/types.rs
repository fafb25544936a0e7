//! Core data types for the scan pipeline.
//!
//! This module defines the run configuration, the resume state recovered
//! from a checkpoint log, per-domain outcomes and the output ruleset shape.

use crate::error::GeoScanError;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default DNS-over-HTTPS JSON endpoint.
pub const DEFAULT_RESOLVER_URL: &str = "https://dns.alidns.com/resolve";

/// Default country whose domains end up in the ruleset.
pub const DEFAULT_TARGET_COUNTRY: &str = "CN";

/// Upper bound for the worker pool size.
pub const MAX_CONCURRENCY: usize = 256;

/// Version number written into every ruleset.
pub const RULESET_VERSION: u32 = 1;

/// Configuration for a scan run.
///
/// Passed explicitly into the worker pool; nothing in the pipeline reads
/// global settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    /// Maximum number of domains in flight at once.
    /// Default: available parallelism, Range: 1-256
    pub concurrency: usize,

    /// Deadline for a single resolution attempt.
    /// Default: 10 seconds
    pub attempt_timeout: Duration,

    /// ISO country code that marks a match (compared case-insensitively).
    /// Default: "CN"
    pub target_country: String,

    /// DNS-over-HTTPS JSON endpoint queried with `name=<domain>&type=1`
    pub resolver_url: String,

    /// Whether each checkpoint append is followed by `sync_data`
    /// Default: false
    pub sync_checkpoint: bool,

    /// Retry behaviour for transient resolution failures
    pub retry: RetryPolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            attempt_timeout: Duration::from_secs(10),
            target_country: DEFAULT_TARGET_COUNTRY.to_string(),
            resolver_url: DEFAULT_RESOLVER_URL.to_string(),
            sync_checkpoint: false,
            retry: RetryPolicy::default(),
        }
    }
}

impl ScanConfig {
    /// Set the pool size, clamped to 1-256.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        self
    }

    /// Set the per-attempt resolution deadline.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Set the target country code.
    pub fn with_target_country<C: Into<String>>(mut self, country: C) -> Self {
        self.target_country = country.into().to_ascii_uppercase();
        self
    }

    /// Set the DNS-over-HTTPS endpoint.
    pub fn with_resolver_url<U: Into<String>>(mut self, url: U) -> Self {
        self.resolver_url = url.into();
        self
    }

    /// Enable or disable `sync_data` after every checkpoint append.
    pub fn with_sync_checkpoint(mut self, enabled: bool) -> Self {
        self.sync_checkpoint = enabled;
        self
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(8)
        .clamp(1, MAX_CONCURRENCY)
}

/// File locations for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPaths {
    /// Newline-delimited domain top-list
    pub input: PathBuf,
    /// Reference lists whose domains are excluded
    pub geosite: Vec<PathBuf>,
    /// MaxMind country database
    pub geoip_db: PathBuf,
    /// Append-only log of matches
    pub checkpoint: PathBuf,
    /// Ruleset JSON written at the end
    pub output: PathBuf,
}

impl Default for ScanPaths {
    fn default() -> Self {
        Self {
            input: PathBuf::from("cloudflare-radar_top-1000000-domains.csv"),
            geosite: vec![PathBuf::from("geosite-geolocation-cn.json")],
            geoip_db: PathBuf::from("GeoLite2-Country.mmdb"),
            checkpoint: PathBuf::from("ext-cn-list.log"),
            output: PathBuf::from("ext-cn-list.json"),
        }
    }
}

impl ScanPaths {
    /// Reject layouts where the ruleset would overwrite the checkpoint log.
    pub fn validate(&self) -> Result<(), GeoScanError> {
        if same_file(&self.output, &self.checkpoint) {
            return Err(GeoScanError::config(format!(
                "Output and checkpoint must be different files: {}",
                self.output.display()
            )));
        }
        Ok(())
    }
}

/// Compare two paths that may not exist yet: the parent directories are
/// canonicalized when they exist, the file names are compared as given.
fn same_file(a: &Path, b: &Path) -> bool {
    fn resolved(path: &Path) -> Option<PathBuf> {
        let name = path.file_name()?;
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        Some(parent.canonicalize().ok()?.join(name))
    }

    if a.components().eq(b.components()) {
        return true;
    }
    match (resolved(a), resolved(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// What a previous run left behind in the checkpoint log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeState {
    /// Logged matches that are still not excluded, in log order
    pub matches: Vec<String>,
    /// Last kept log entry; empty means "start from the beginning"
    pub marker: String,
}

impl ResumeState {
    /// True when there is nothing to resume from.
    pub fn is_fresh(&self) -> bool {
        self.marker.is_empty()
    }
}

/// Result of processing one domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Resolved into the target country and recorded
    Matched,
    /// Resolved into another country
    OtherCountry(String),
    /// Resolved to an address the database has no country for
    Unlocated,
    /// The resolver returned no answer
    NoAnswer,
    /// The resolver returned something that is not an IP literal
    InvalidAddress(String),
}

impl UnitOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, UnitOutcome::Matched)
    }
}

impl std::fmt::Display for UnitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitOutcome::Matched => write!(f, "match"),
            UnitOutcome::OtherCountry(code) => write!(f, "country {}", code),
            UnitOutcome::Unlocated => write!(f, "no country record"),
            UnitOutcome::NoAnswer => write!(f, "no answer"),
            UnitOutcome::InvalidAddress(raw) => write!(f, "invalid address '{}'", raw),
        }
    }
}

/// Ruleset document written to the output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRuleset {
    pub version: u32,
    pub rules: RuleSet,
}

/// Rule body of an [`OutputRuleset`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub domain_suffix: Vec<String>,
}

/// Counters reported after a completed run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanSummary {
    /// Lines in the input list, blank ones included
    pub input_lines: usize,
    /// Lines skipped because a previous run already covered them
    pub skipped_resumed: usize,
    /// Lines skipped because they are excluded or blank
    pub skipped_excluded: usize,
    /// Domains that went through resolve and classify
    pub processed: usize,
    /// Matches carried over from the checkpoint log
    pub resumed_matches: usize,
    /// Matches found in this run
    pub new_matches: usize,
    /// Retries of transient resolution failures
    pub retries: u64,
    /// Entries in the written ruleset
    pub ruleset_size: usize,
    /// Wall time of the pool
    pub elapsed: Duration,
}
