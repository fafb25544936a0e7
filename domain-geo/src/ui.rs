//! Terminal display logic for the domain-geo CLI.
//!
//! Header and summary go to stdout. The live progress line is drawn on
//! stderr and only when stderr is a terminal, so redirected output stays
//! clean. Uses only the `console` crate.

use console::{style, Term};
use domain_geo_lib::{format_count, ProgressObserver, ScanConfig, ScanPaths, ScanSummary};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

// ── Progress line ────────────────────────────────────────────────────────────

const REDRAW_INTERVAL_MS: u64 = 100;

/// Single-line progress counter, redrawn at most every 100ms.
pub struct ProgressLine {
    term: Term,
    enabled: bool,
    started: Instant,
    total: AtomicU64,
    done: AtomicU64,
    last_draw_ms: AtomicU64,
}

impl ProgressLine {
    /// Create a progress line on stderr; disabled when stderr is not a tty.
    pub fn stderr(enabled: bool) -> Self {
        let term = Term::stderr();
        let enabled = enabled && term.is_term();
        Self {
            term,
            enabled,
            started: Instant::now(),
            total: AtomicU64::new(0),
            done: AtomicU64::new(0),
            last_draw_ms: AtomicU64::new(0),
        }
    }

    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    /// Wipe a half-drawn line, e.g. before printing an error.
    pub fn clear(&self) {
        if self.enabled {
            let _ = self.term.clear_line();
        }
    }

    fn draw(&self) {
        let total = self.total.load(Ordering::Relaxed);
        let done = self.done.load(Ordering::Relaxed).min(total);
        let line = render_progress(done, total, self.started.elapsed());
        let _ = self.term.clear_line();
        let _ = self.term.write_str(&line);
    }
}

impl ProgressObserver for ProgressLine {
    fn begin(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        if self.enabled {
            self.draw();
        }
    }

    fn advance(&self, delta: u64) {
        self.done.fetch_add(delta, Ordering::Relaxed);
        if !self.enabled {
            return;
        }

        let now_ms = self.started.elapsed().as_millis() as u64;
        let last = self.last_draw_ms.load(Ordering::Relaxed);
        if now_ms.saturating_sub(last) >= REDRAW_INTERVAL_MS
            && self
                .last_draw_ms
                .compare_exchange(last, now_ms, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            self.draw();
        }
    }

    fn finish(&self) {
        if self.enabled {
            self.draw();
            let _ = self.term.write_line("");
        }
    }
}

/// "[#####-----]  52.0%  520,000/1,000,000  1m 12s"
pub fn render_progress(done: u64, total: u64, elapsed: Duration) -> String {
    const WIDTH: usize = 30;
    let ratio = if total == 0 {
        1.0
    } else {
        done as f64 / total as f64
    };
    let filled = ((ratio * WIDTH as f64).round() as usize).min(WIDTH);

    format!(
        "{}{}{}  {:>5.1}%  {}/{}  {}",
        style("[").dim(),
        style(format!("{}{}", "#".repeat(filled), "-".repeat(WIDTH - filled))).cyan(),
        style("]").dim(),
        ratio * 100.0,
        format_count(done as usize),
        format_count(total as usize),
        style(format_elapsed(elapsed)).dim(),
    )
}

// ── Header ───────────────────────────────────────────────────────────────────

/// Print a styled header at the start of a run.
pub fn print_header(config: &ScanConfig, paths: &ScanPaths) {
    println!(
        "{} {} {}",
        style("domain-geo").bold(),
        style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim(),
        style(format!(
            "- Scanning {} for {} domains",
            paths.input.display(),
            config.target_country
        ))
        .dim(),
    );

    let retries = match config.retry.max_attempts {
        Some(max) => format!("Attempts: {}", max),
        None => "Attempts: unlimited".to_string(),
    };
    let meta_parts = [
        format!("Resolver: {}", config.resolver_url),
        format!("Concurrency: {}", config.concurrency),
        format!("Timeout: {}s", config.attempt_timeout.as_secs_f64()),
        retries,
    ];
    println!("{}", style(meta_parts.join(" | ")).dim());
    println!();
}

// ── Summary ──────────────────────────────────────────────────────────────────

/// Print the final summary bar with colored counts.
pub fn print_summary(summary: &ScanSummary, paths: &ScanPaths) {
    println!(
        "  {}",
        style("────────────────────────────────────────────────────").dim()
    );
    println!(
        "  {} processed in {}  {}  {}  {}  {}  {}  {}",
        style(format_count(summary.processed)).bold(),
        format_elapsed(summary.elapsed),
        style("|").dim(),
        style(format!("{} new", format_count(summary.new_matches))).green(),
        style("|").dim(),
        style(format!("{} resumed", format_count(summary.resumed_matches))).cyan(),
        style("|").dim(),
        style(format!(
            "{} retr{}",
            summary.retries,
            if summary.retries == 1 { "y" } else { "ies" }
        ))
        .yellow(),
    );
    println!(
        "  {} {} skipped by resume, {} excluded or blank",
        style("•").dim(),
        format_count(summary.skipped_resumed),
        format_count(summary.skipped_excluded),
    );
    println!(
        "  {} {} domain{} written to {}",
        style("•").dim(),
        style(format_count(summary.ruleset_size)).bold(),
        if summary.ruleset_size == 1 { "" } else { "s" },
        paths.output.display(),
    );
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Format a duration as "850ms", "12.3s", "4m 05s" or "2h 03m".
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 3600 {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else if secs >= 1 {
        format!("{:.1}s", elapsed.as_secs_f64())
    } else {
        format!("{}ms", elapsed.as_millis())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
