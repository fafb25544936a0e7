//! Resolution worker pool.
//!
//! The pool walks the input list, skips what a previous run already covered
//! and what the reference lists exclude, and runs resolve → classify →
//! record for everything else with at most `concurrency` domains in flight.
//!
//! A unit that fails transiently is retried under [`RetryPolicy`]. A unit
//! that fails fatally cancels the shared [`ScanCancellation`] and the whole
//! run returns that error; no ruleset is produced in that case.
//!
//! [`RetryPolicy`]: crate::retry::RetryPolicy

use crate::cancel::ScanCancellation;
use crate::checkpoint::MatchSink;
use crate::error::GeoScanError;
use crate::exclusion::ExclusionSet;
use crate::protocols::{CountryLookup, Resolver};
use crate::retry::retry_with_policy;
use crate::types::{ResumeState, ScanConfig, UnitOutcome};
use futures_util::stream::{self, StreamExt};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Receives progress as the pool walks the input.
///
/// `advance` is called once per completed unit and in bulk for skipped lines,
/// so the counter ends at the `total` passed to `begin`.
pub trait ProgressObserver: Send + Sync {
    fn begin(&self, _total: u64) {}
    fn advance(&self, delta: u64);
    fn finish(&self) {}
}

/// Progress observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn advance(&self, _delta: u64) {}
}

/// Counters of one pool run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolReport {
    pub skipped_resumed: usize,
    pub skipped_excluded: usize,
    pub processed: usize,
    pub matches: usize,
    pub retries: u64,
    pub elapsed: Duration,
}

/// Index of the first line after the resume marker, or `None` when the
/// marker never occurs.
///
/// Everything up to and including the first line equal to `marker` is
/// behind the offset. An empty marker skips just the first line, which in a
/// top-list CSV is the header.
pub fn resume_offset(input: &[String], marker: &str) -> Option<usize> {
    if marker.is_empty() {
        return Some(input.len().min(1));
    }
    input.iter().position(|domain| domain == marker).map(|i| i + 1)
}

/// Lines after the resume marker. A marker that never occurs drops everything.
pub fn after_resume_marker<'a>(
    input: &'a [String],
    marker: &str,
) -> impl Iterator<Item = &'a str> {
    let start = resume_offset(input, marker).unwrap_or(input.len());
    input[start..].iter().map(String::as_str)
}

/// Lines that need resolving: after the marker, not blank, not excluded.
pub fn pending_domains<'a>(
    input: &'a [String],
    exclusion: &'a ExclusionSet,
    marker: &'a str,
) -> impl Iterator<Item = &'a str> + 'a {
    after_resume_marker(input, marker)
        .filter(move |domain| !domain.is_empty() && !exclusion.contains(domain))
}

/// Bounded pool running resolve → classify → record.
pub struct WorkerPool<R, G> {
    config: ScanConfig,
    resolver: R,
    geo: G,
    cancel: ScanCancellation,
    retries: AtomicU64,
}

impl<R: Resolver, G: CountryLookup> WorkerPool<R, G> {
    pub fn new(config: ScanConfig, resolver: R, geo: G) -> Self {
        Self {
            config,
            resolver,
            geo,
            cancel: ScanCancellation::new(),
            retries: AtomicU64::new(0),
        }
    }

    /// Use an externally owned cancellation signal (e.g. one wired to Ctrl-C).
    pub fn with_cancellation(mut self, cancel: ScanCancellation) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &ScanCancellation {
        &self.cancel
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Walk `input` and process every pending domain.
    ///
    /// Returns once every unit finished, or with the first fatal error.
    pub async fn run(
        &self,
        input: &[String],
        exclusion: &ExclusionSet,
        resume: &ResumeState,
        sink: &MatchSink,
        progress: &dyn ProgressObserver,
    ) -> Result<PoolReport, GeoScanError> {
        let start = Instant::now();
        let retries_before = self.retries.load(Ordering::Relaxed);
        let marker = resume.marker.as_str();

        let offset = resume_offset(input, marker).unwrap_or_else(|| {
            warn!(
                "Resume marker '{}' does not occur in the input list; nothing will be processed",
                marker
            );
            input.len()
        });

        let mut report = PoolReport {
            skipped_resumed: offset,
            ..Default::default()
        };

        info!(
            "{} lines to walk ({} skipped by resume), concurrency {}",
            input.len() - offset,
            offset,
            self.config.concurrency
        );
        progress.begin(input.len() as u64);
        progress.advance(offset as u64);

        // Blank and excluded lines are counted as the stream pulls them.
        let excluded = AtomicUsize::new(0);
        let walk = input[offset..].iter().map(String::as_str).filter(|domain| {
            let pending = !domain.is_empty() && !exclusion.contains(domain);
            if !pending {
                excluded.fetch_add(1, Ordering::Relaxed);
                progress.advance(1);
            }
            pending
        });
        let mut units = stream::iter(walk)
            .map(move |domain| async move { (domain, self.process(domain, sink).await) })
            .buffer_unordered(self.config.concurrency.max(1));

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(GeoScanError::cancelled("scan interrupted"));
                }
                next = units.next() => next,
            };
            let Some((domain, result)) = next else {
                break;
            };

            progress.advance(1);
            match result {
                Ok(outcome) => {
                    report.processed += 1;
                    if outcome.is_match() {
                        report.matches += 1;
                        info!("{} resolves into {}", domain, self.config.target_country);
                    } else {
                        debug!("{}: {}", domain, outcome);
                    }
                }
                Err(e) => {
                    self.cancel.cancel();
                    if !e.is_cancelled() {
                        error!("Aborting scan, {} failed: {}", domain, e);
                    }
                    return Err(e);
                }
            }
        }

        report.skipped_excluded = excluded.load(Ordering::Relaxed);
        report.retries = self.retries.load(Ordering::Relaxed) - retries_before;
        report.elapsed = start.elapsed();
        progress.finish();
        Ok(report)
    }

    /// Resolve, classify and possibly record one domain.
    pub async fn process(
        &self,
        domain: &str,
        sink: &MatchSink,
    ) -> Result<UnitOutcome, GeoScanError> {
        let address = retry_with_policy(
            &self.config.retry,
            self.config.attempt_timeout,
            &self.cancel,
            domain,
            move || self.resolver.resolve(domain),
            move |attempt, err| {
                self.retries.fetch_add(1, Ordering::Relaxed);
                warn!("#{} {}: {}", attempt, domain, err);
            },
        )
        .await?;

        let address = address.trim();
        if address.is_empty() {
            return Ok(UnitOutcome::NoAnswer);
        }
        let ip: IpAddr = match address.parse() {
            Ok(ip) => ip,
            Err(_) => return Ok(UnitOutcome::InvalidAddress(address.to_string())),
        };

        match self.geo.country_code(ip)? {
            Some(code) if code.eq_ignore_ascii_case(&self.config.target_country) => {
                sink.record(domain)?;
                Ok(UnitOutcome::Matched)
            }
            Some(code) => Ok(UnitOutcome::OtherCountry(code)),
            None => Ok(UnitOutcome::Unlocated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use std::collections::HashMap;
    use std::fs;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn list(domains: &[&str]) -> Vec<String> {
        domains.iter().map(|d| d.to_string()).collect()
    }

    #[derive(Default)]
    struct StubResolver {
        answers: HashMap<String, String>,
        failures: Mutex<HashMap<String, u32>>,
        calls: Mutex<Vec<String>>,
    }

    impl StubResolver {
        fn with(answers: &[(&str, &str)]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(d, a)| (d.to_string(), a.to_string()))
                    .collect(),
                ..Default::default()
            }
        }

        fn failing(self, domain: &str, times: u32) -> Self {
            self.failures
                .lock()
                .unwrap()
                .insert(domain.to_string(), times);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Resolver for StubResolver {
        async fn resolve(&self, domain: &str) -> Result<String, GeoScanError> {
            self.calls.lock().unwrap().push(domain.to_string());
            if let Some(left) = self.failures.lock().unwrap().get_mut(domain) {
                if *left > 0 {
                    *left -= 1;
                    return Err(GeoScanError::network("connection reset"));
                }
            }
            Ok(self.answers.get(domain).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct StubGeo {
        countries: HashMap<IpAddr, String>,
        broken: Option<IpAddr>,
        lookups: AtomicUsize,
    }

    impl StubGeo {
        fn with(entries: &[(&str, &str)]) -> Self {
            Self {
                countries: entries
                    .iter()
                    .map(|(ip, cc)| (ip.parse().unwrap(), cc.to_string()))
                    .collect(),
                ..Default::default()
            }
        }
    }

    impl CountryLookup for StubGeo {
        fn country_code(&self, ip: IpAddr) -> Result<Option<String>, GeoScanError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.broken == Some(ip) {
                return Err(GeoScanError::geoip(Some(ip), "invalid node in search tree"));
            }
            Ok(self.countries.get(&ip).cloned())
        }
    }

    fn fast_config() -> ScanConfig {
        ScanConfig::default()
            .with_concurrency(4)
            .with_retry(RetryPolicy::unlimited().with_backoff(
                Duration::from_millis(1),
                Duration::from_millis(5),
            ))
    }

    #[test]
    fn test_fresh_walk_skips_header_line() {
        let input = list(&["domain", "a.com", "b.cn"]);
        let exclusion = ExclusionSet::new();
        let pending: Vec<_> = pending_domains(&input, &exclusion, "").collect();
        assert_eq!(pending, vec!["a.com", "b.cn"]);
    }

    #[test]
    fn test_walk_resumes_strictly_after_marker() {
        let input = list(&["domain", "a.com", "b.cn", "c.com", "d.cn"]);
        let exclusion = ExclusionSet::new();
        let pending: Vec<_> = pending_domains(&input, &exclusion, "b.cn").collect();
        assert_eq!(pending, vec!["c.com", "d.cn"]);
    }

    #[test]
    fn test_walk_with_unknown_marker_is_empty() {
        let input = list(&["domain", "a.com", "b.cn"]);
        let exclusion = ExclusionSet::new();
        assert_eq!(pending_domains(&input, &exclusion, "zzz.cn").count(), 0);
    }

    #[test]
    fn test_walk_filters_exclusions_and_blanks_only_after_marker() {
        let input = list(&["domain", "x.cn", "a.com", "", "x.cn", "b.cn", ""]);
        let exclusion: ExclusionSet = ["x.cn"].into_iter().collect();
        let pending: Vec<_> = pending_domains(&input, &exclusion, "").collect();
        assert_eq!(pending, vec!["a.com", "b.cn"]);

        // The marker is compared before the exclusion filter applies.
        let pending: Vec<_> = pending_domains(&input, &exclusion, "a.com").collect();
        assert_eq!(pending, vec!["b.cn"]);
    }

    #[test]
    fn test_resume_offset() {
        let input = list(&["domain", "a.com", "b.cn"]);
        assert_eq!(resume_offset(&input, ""), Some(1));
        assert_eq!(resume_offset(&input, "b.cn"), Some(3));
        assert_eq!(resume_offset(&input, "zzz.cn"), None);
        assert_eq!(resume_offset(&[], ""), Some(0));
    }

    #[test]
    fn test_marker_matches_first_occurrence() {
        let input = list(&["domain", "a.com", "b.cn", "a.com", "c.com"]);
        let exclusion = ExclusionSet::new();
        let pending: Vec<_> = pending_domains(&input, &exclusion, "a.com").collect();
        assert_eq!(pending, vec!["b.cn", "a.com", "c.com"]);
    }

    #[tokio::test]
    async fn test_process_outcomes() {
        let dir = tempdir().unwrap();
        let sink = MatchSink::open(&dir.path().join("log"), false).unwrap();
        let resolver = StubResolver::with(&[
            ("a.com", "1.1.1.1"),
            ("b.cn", "1.2.3.4"),
            ("c.com", ""),
            ("d.com", "not-an-ip"),
            ("e.com", "10.0.0.1"),
        ]);
        let geo = StubGeo::with(&[("1.1.1.1", "US"), ("1.2.3.4", "CN")]);
        let pool = WorkerPool::new(fast_config(), resolver, geo);

        assert_eq!(
            pool.process("a.com", &sink).await.unwrap(),
            UnitOutcome::OtherCountry("US".to_string())
        );
        assert_eq!(pool.process("b.cn", &sink).await.unwrap(), UnitOutcome::Matched);
        assert_eq!(pool.process("c.com", &sink).await.unwrap(), UnitOutcome::NoAnswer);
        assert_eq!(
            pool.process("d.com", &sink).await.unwrap(),
            UnitOutcome::InvalidAddress("not-an-ip".to_string())
        );
        assert_eq!(pool.process("e.com", &sink).await.unwrap(), UnitOutcome::Unlocated);

        // Empty and unparsable answers never reach the database.
        assert_eq!(pool.geo.lookups.load(Ordering::SeqCst), 3);
        assert_eq!(sink.into_matches().unwrap(), vec!["b.cn"]);
    }

    #[tokio::test]
    async fn test_run_records_matches_and_reports() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("log");
        let sink = MatchSink::open(&log, false).unwrap();
        let input = list(&["domain", "a.com", "b.cn", "c.com", "", "d.cn"]);
        let exclusion: ExclusionSet = ["d.cn"].into_iter().collect();
        let resolver = StubResolver::with(&[("a.com", "1.1.1.1"), ("b.cn", "1.2.3.4")]);
        let geo = StubGeo::with(&[("1.1.1.1", "US"), ("1.2.3.4", "CN")]);
        let pool = WorkerPool::new(fast_config(), resolver, geo);

        let report = pool
            .run(&input, &exclusion, &ResumeState::default(), &sink, &NoProgress)
            .await
            .unwrap();

        assert_eq!(report.skipped_resumed, 1);
        assert_eq!(report.skipped_excluded, 2);
        assert_eq!(report.processed, 3);
        assert_eq!(report.matches, 1);
        assert_eq!(fs::read_to_string(&log).unwrap(), "b.cn\n");

        let mut calls = pool.resolver.calls();
        calls.sort();
        assert_eq!(calls, vec!["a.com", "b.cn", "c.com"]);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let dir = tempdir().unwrap();
        let sink = MatchSink::open(&dir.path().join("log"), false).unwrap();
        let input = list(&["domain", "b.cn"]);
        let resolver = StubResolver::with(&[("b.cn", "1.2.3.4")]).failing("b.cn", 3);
        let geo = StubGeo::with(&[("1.2.3.4", "CN")]);
        let pool = WorkerPool::new(fast_config(), resolver, geo);

        let report = pool
            .run(&input, &ExclusionSet::new(), &ResumeState::default(), &sink, &NoProgress)
            .await
            .unwrap();

        assert_eq!(report.retries, 3);
        assert_eq!(report.matches, 1);
        assert_eq!(pool.resolver.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_geoip_failure_aborts_and_cancels() {
        let dir = tempdir().unwrap();
        let sink = MatchSink::open(&dir.path().join("log"), false).unwrap();
        let input = list(&["domain", "a.com", "b.cn"]);
        let resolver = StubResolver::with(&[("a.com", "6.6.6.6"), ("b.cn", "1.2.3.4")]);
        let geo = StubGeo {
            broken: Some("6.6.6.6".parse().unwrap()),
            ..StubGeo::with(&[("1.2.3.4", "CN")])
        };
        let pool = WorkerPool::new(fast_config().with_concurrency(1), resolver, geo);

        let result = pool
            .run(&input, &ExclusionSet::new(), &ResumeState::default(), &sink, &NoProgress)
            .await;

        assert!(matches!(result, Err(GeoScanError::GeoIpError { .. })));
        assert!(pool.cancellation().is_cancelled());
    }

    #[tokio::test]
    async fn test_external_cancellation_stops_retrying_run() {
        let dir = tempdir().unwrap();
        let sink = MatchSink::open(&dir.path().join("log"), false).unwrap();
        let input = list(&["domain", "down.com"]);
        let resolver = StubResolver::default().failing("down.com", u32::MAX);
        let pool = WorkerPool::new(fast_config(), resolver, StubGeo::default());

        let trigger = pool.cancellation().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = pool
            .run(&input, &ExclusionSet::new(), &ResumeState::default(), &sink, &NoProgress)
            .await;
        assert!(result.unwrap_err().is_cancelled());
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_progress_reaches_total() {
        struct Counting(AtomicU64, AtomicU64);
        impl ProgressObserver for Counting {
            fn begin(&self, total: u64) {
                self.0.store(total, Ordering::SeqCst);
            }
            fn advance(&self, delta: u64) {
                self.1.fetch_add(delta, Ordering::SeqCst);
            }
        }

        let dir = tempdir().unwrap();
        let sink = MatchSink::open(&dir.path().join("log"), false).unwrap();
        let input = list(&["domain", "a.com", "x.cn", "b.cn", ""]);
        let exclusion: ExclusionSet = ["x.cn"].into_iter().collect();
        let pool = WorkerPool::new(fast_config(), StubResolver::default(), StubGeo::default());
        let progress = Counting(AtomicU64::new(0), AtomicU64::new(0));

        pool.run(&input, &exclusion, &ResumeState::default(), &sink, &progress)
            .await
            .unwrap();

        assert_eq!(progress.0.load(Ordering::SeqCst), 5);
        assert_eq!(progress.1.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_resumed_run_counts_every_line_once() {
        let dir = tempdir().unwrap();
        let sink = MatchSink::open(&dir.path().join("log"), false).unwrap();
        let input = list(&["domain", "a.com", "b.cn", "x.cn", "", "c.com", "x.cn"]);
        let exclusion: ExclusionSet = ["x.cn"].into_iter().collect();
        let resume = ResumeState {
            matches: vec!["b.cn".to_string()],
            marker: "b.cn".to_string(),
        };
        let pool = WorkerPool::new(fast_config(), StubResolver::default(), StubGeo::default());

        let report = pool
            .run(&input, &exclusion, &resume, &sink, &NoProgress)
            .await
            .unwrap();

        assert_eq!(report.skipped_resumed, 3);
        assert_eq!(report.skipped_excluded, 3);
        assert_eq!(report.processed, 1);
        assert_eq!(
            report.skipped_resumed + report.skipped_excluded + report.processed,
            input.len()
        );
        assert_eq!(pool.resolver.calls(), vec!["c.com"]);
    }

    #[tokio::test]
    async fn test_unknown_marker_skips_whole_list() {
        let dir = tempdir().unwrap();
        let sink = MatchSink::open(&dir.path().join("log"), false).unwrap();
        let input = list(&["domain", "a.com", "b.cn"]);
        let resume = ResumeState {
            matches: vec!["gone.cn".to_string()],
            marker: "gone.cn".to_string(),
        };
        let pool = WorkerPool::new(fast_config(), StubResolver::default(), StubGeo::default());

        let report = pool
            .run(&input, &ExclusionSet::new(), &resume, &sink, &NoProgress)
            .await
            .unwrap();

        assert_eq!(report.skipped_resumed, 3);
        assert_eq!(report.skipped_excluded, 0);
        assert!(pool.resolver.calls().is_empty());
    }
}
