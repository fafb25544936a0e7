//! # Domain Geo Library
//!
//! Builds a country-specific domain ruleset from a popularity-ranked domain
//! list. Every domain not already covered by the reference lists is resolved
//! over DNS-over-HTTPS, the first address is located with a MaxMind country
//! database, and domains hosted in the target country end up in a
//! `domain_suffix` ruleset.
//!
//! Runs are resumable: each match is appended to a checkpoint log as soon as
//! it is found, and the next run continues after the last logged domain.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use domain_geo_lib::{GeoScanner, NoProgress, ScanConfig, ScanPaths};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ScanConfig::default().with_concurrency(32);
//!     let paths = ScanPaths::default();
//!
//!     let scanner = GeoScanner::open(config, &paths.geoip_db)?;
//!     let summary = scanner.run(&paths, &NoProgress).await?;
//!
//!     println!("{} new matches", summary.new_matches);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Exclusion lists**: Skip domains already covered by geosite rulesets
//! - **Resumable runs**: Append-only checkpoint log of matches
//! - **Bounded concurrency**: Configurable worker pool with retry and backoff
//! - **Atomic output**: The ruleset is replaced in one rename

// Re-export main public API types and functions
pub use assemble::{assemble_ruleset, render_ruleset, write_ruleset};
pub use cancel::ScanCancellation;
pub use checkpoint::{parse_checkpoint, read_checkpoint, MatchSink};
pub use config::{
    load_env_config, load_env_config_from, parse_duration, validate_concurrency,
    validate_country, validate_resolver_url, ConfigManager, EnvConfig, FileConfig, PathsSection,
    RetrySection, ScanSection,
};
pub use error::GeoScanError;
pub use exclusion::{parse_reference_list, ExclusionSet};
pub use pool::{
    after_resume_marker, pending_domains, resume_offset, NoProgress, PoolReport,
    ProgressObserver, WorkerPool,
};
pub use protocols::{extract_answer, CountryLookup, DohResolver, MaxMindCountryDb, Resolver};
pub use retry::{retry_with_policy, RetryPolicy};
pub use scanner::GeoScanner;
pub use types::{
    OutputRuleset, ResumeState, RuleSet, ScanConfig, ScanPaths, ScanSummary, UnitOutcome,
    DEFAULT_RESOLVER_URL, DEFAULT_TARGET_COUNTRY, MAX_CONCURRENCY, RULESET_VERSION,
};
pub use utils::{format_count, read_domain_list, split_domain_list};

// Internal modules - these are not part of the public API
mod assemble;
mod cancel;
mod checkpoint;
mod config;
mod error;
mod exclusion;
mod pool;
mod protocols;
mod retry;
mod scanner;
mod types;
mod utils;

// Type alias for convenience
pub type Result<T> = std::result::Result<T, GeoScanError>;

// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
