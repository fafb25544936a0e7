use crate::error::GeoScanError;
use crate::exclusion::ExclusionSet;
use crate::types::ResumeState;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{info, warn};

/// Read the checkpoint log at `path`.
///
/// A missing file means there was no previous run. Any other read failure
/// is fatal.
pub fn read_checkpoint(path: &Path, exclusion: &ExclusionSet) -> Result<ResumeState, GeoScanError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No checkpoint log at {}, starting fresh", path.display());
            return Ok(ResumeState::default());
        }
        Err(e) => {
            return Err(GeoScanError::file_error(
                path.to_string_lossy(),
                format!("Failed to read checkpoint log: {}", e),
            ))
        }
    };

    let state = parse_checkpoint(&content, exclusion);
    info!(
        "Checkpoint log {}: {} matches carried over, resuming after '{}'",
        path.display(),
        state.matches.len(),
        state.marker
    );
    Ok(state)
}

/// Turn log content into a [`ResumeState`].
///
/// Excluded entries are dropped and never become the marker. Every entry is
/// written with its newline in one call, so text after the final newline is
/// a write torn by a crash and is dropped as well.
pub fn parse_checkpoint(content: &str, exclusion: &ExclusionSet) -> ResumeState {
    let mut state = ResumeState::default();
    let mut excluded = 0usize;
    let mut excluded_after_marker = false;

    let complete = match content.rfind('\n') {
        Some(end) => &content[..=end],
        None => "",
    };
    let torn = content[complete.len()..].trim();
    if !torn.is_empty() {
        warn!("Dropping torn checkpoint entry '{}'", torn);
    }

    for line in complete.lines() {
        let domain = line.trim();
        if domain.is_empty() {
            continue;
        }

        if exclusion.contains(domain) {
            excluded += 1;
            excluded_after_marker = true;
            continue;
        }

        state.matches.push(domain.to_string());
        state.marker = domain.to_string();
        excluded_after_marker = false;
    }

    if excluded > 0 {
        info!("Dropped {} checkpoint entries now covered by reference lists", excluded);
    }
    if excluded_after_marker {
        if state.marker.is_empty() {
            warn!("Every checkpoint entry is excluded now; the walk restarts from the top");
        } else {
            warn!(
                "Last checkpoint entries are excluded now; resuming from earlier entry '{}'",
                state.marker
            );
        }
    }

    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    fn no_exclusions() -> ExclusionSet {
        ExclusionSet::new()
    }

    #[test]
    fn test_missing_log_is_fresh_start() {
        let dir = tempdir().unwrap();
        let state = read_checkpoint(&dir.path().join("none.log"), &no_exclusions()).unwrap();
        assert_eq!(state, ResumeState::default());
    }

    #[test]
    fn test_reads_entries_and_marker() {
        let mut log = NamedTempFile::new().unwrap();
        log.write_all(b"a.cn\nb.cn\nc.cn\n").unwrap();
        log.flush().unwrap();

        let state = read_checkpoint(log.path(), &no_exclusions()).unwrap();
        assert_eq!(state.matches, vec!["a.cn", "b.cn", "c.cn"]);
        assert_eq!(state.marker, "c.cn");
    }

    #[test]
    fn test_excluded_entries_are_dropped() {
        let exclusion: ExclusionSet = ["b.cn"].into_iter().collect();
        let state = parse_checkpoint("a.cn\nb.cn\nc.cn\n", &exclusion);
        assert_eq!(state.matches, vec!["a.cn", "c.cn"]);
        assert_eq!(state.marker, "c.cn");
    }

    #[test]
    fn test_marker_falls_back_when_last_entry_excluded() {
        let exclusion: ExclusionSet = ["c.cn"].into_iter().collect();
        let state = parse_checkpoint("a.cn\nb.cn\nc.cn\n", &exclusion);
        assert_eq!(state.marker, "b.cn");

        let exclusion: ExclusionSet = ["b.cn"].into_iter().collect();
        let state = parse_checkpoint("b.cn\n", &exclusion);
        assert!(state.is_fresh());
        assert!(state.matches.is_empty());
    }

    #[test]
    fn test_torn_tail_is_dropped() {
        let state = parse_checkpoint("a.cn\nb.cn\nexamp", &no_exclusions());
        assert_eq!(state.matches, vec!["a.cn", "b.cn"]);
        assert_eq!(state.marker, "b.cn");

        let state = parse_checkpoint("exa", &no_exclusions());
        assert!(state.is_fresh());
    }

    #[test]
    fn test_blank_lines_are_ignored() {
        let state = parse_checkpoint("\na.cn\n\n\n", &no_exclusions());
        assert_eq!(state.matches, vec!["a.cn"]);
        assert_eq!(state.marker, "a.cn");
    }

    #[test]
    fn test_duplicate_entries_are_kept() {
        // Dedup happens when the ruleset is assembled.
        let state = parse_checkpoint("a.cn\na.cn\n", &no_exclusions());
        assert_eq!(state.matches.len(), 2);
    }
}
