//! Run orchestration.
//!
//! [`GeoScanner`] wires the pipeline stages together for one run: load the
//! exclusion set, read the checkpoint, walk the input through the pool and
//! write the ruleset.

use crate::assemble::{assemble_ruleset, write_ruleset};
use crate::cancel::ScanCancellation;
use crate::checkpoint::{read_checkpoint, MatchSink};
use crate::error::GeoScanError;
use crate::exclusion::ExclusionSet;
use crate::pool::{ProgressObserver, WorkerPool};
use crate::protocols::{CountryLookup, DohResolver, MaxMindCountryDb, Resolver};
use crate::types::{ScanConfig, ScanPaths, ScanSummary};
use crate::utils::read_domain_list;
use std::path::Path;
use tracing::info;

/// Coordinates one full scan run.
///
/// # Example
///
/// ```rust,no_run
/// use domain_geo_lib::{GeoScanner, NoProgress, ScanConfig, ScanPaths};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let paths = ScanPaths::default();
///     let scanner = GeoScanner::open(ScanConfig::default(), &paths.geoip_db)?;
///     let summary = scanner.run(&paths, &NoProgress).await?;
///     println!("{} domains in ruleset", summary.ruleset_size);
///     Ok(())
/// }
/// ```
pub struct GeoScanner<R, G> {
    pool: WorkerPool<R, G>,
}

impl GeoScanner<DohResolver, MaxMindCountryDb> {
    /// Create a scanner with the DoH resolver from `config` and the country
    /// database at `geoip_db`.
    pub fn open(config: ScanConfig, geoip_db: &Path) -> Result<Self, GeoScanError> {
        let resolver = DohResolver::new(config.resolver_url.clone(), config.attempt_timeout)?;
        let geo = MaxMindCountryDb::open(geoip_db)?;
        info!(
            "Opened {} database from {}",
            geo.database_type(),
            geoip_db.display()
        );
        Ok(Self::with_components(config, resolver, geo))
    }
}

impl<R: Resolver, G: CountryLookup> GeoScanner<R, G> {
    /// Create a scanner from explicit collaborators.
    pub fn with_components(config: ScanConfig, resolver: R, geo: G) -> Self {
        Self {
            pool: WorkerPool::new(config, resolver, geo),
        }
    }

    /// Share a cancellation signal with the caller.
    pub fn with_cancellation(mut self, cancel: ScanCancellation) -> Self {
        self.pool = self.pool.with_cancellation(cancel);
        self
    }

    pub fn config(&self) -> &ScanConfig {
        self.pool.config()
    }

    pub fn cancellation(&self) -> &ScanCancellation {
        self.pool.cancellation()
    }

    /// Execute the run.
    ///
    /// Startup failures (path layout, reference lists, input list, checkpoint
    /// log) abort before any domain is resolved. A fatal unit error aborts the pool and
    /// leaves the output file untouched; the checkpoint log keeps whatever
    /// was matched until then.
    pub async fn run(
        &self,
        paths: &ScanPaths,
        progress: &dyn ProgressObserver,
    ) -> Result<ScanSummary, GeoScanError> {
        paths.validate()?;
        let exclusion = ExclusionSet::load(&paths.geosite)?;
        let resume = read_checkpoint(&paths.checkpoint, &exclusion)?;
        let input = read_domain_list(&paths.input)?;
        info!(
            "{} input lines, {} excluded domains, {} carried-over matches",
            input.len(),
            exclusion.len(),
            resume.matches.len()
        );

        let sink = MatchSink::open(&paths.checkpoint, self.config().sync_checkpoint)?;
        let report = self
            .pool
            .run(&input, &exclusion, &resume, &sink, progress)
            .await?;
        let discovered = sink.into_matches()?;

        let ruleset = assemble_ruleset(&resume.matches, &discovered);
        write_ruleset(&paths.output, &ruleset)?;

        Ok(ScanSummary {
            input_lines: input.len(),
            skipped_resumed: report.skipped_resumed,
            skipped_excluded: report.skipped_excluded,
            processed: report.processed,
            resumed_matches: resume.matches.len(),
            new_matches: discovered.len(),
            retries: report.retries,
            ruleset_size: ruleset.rules.domain_suffix.len(),
            elapsed: report.elapsed,
        })
    }
}
