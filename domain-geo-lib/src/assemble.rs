//! Final ruleset assembly and serialization.

use crate::error::GeoScanError;
use crate::types::{OutputRuleset, RuleSet, RULESET_VERSION};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::info;

/// Combine carried-over and new matches into the output ruleset.
///
/// Resumed matches come first, then this run's matches. Exact duplicates
/// are dropped, keeping the first occurrence.
pub fn assemble_ruleset(resumed: &[String], discovered: &[String]) -> OutputRuleset {
    let mut seen = HashSet::with_capacity(resumed.len() + discovered.len());
    let domain_suffix = resumed
        .iter()
        .chain(discovered)
        .filter(|domain| seen.insert(domain.as_str()))
        .cloned()
        .collect();

    OutputRuleset {
        version: RULESET_VERSION,
        rules: RuleSet { domain_suffix },
    }
}

/// Serialize as 4-space indented JSON with a trailing newline.
///
/// serde_json never HTML-escapes, so `<`, `>` and `&` are written as is.
pub fn render_ruleset(ruleset: &OutputRuleset) -> Result<Vec<u8>, GeoScanError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    ruleset.serialize(&mut serializer)?;
    buf.push(b'\n');
    Ok(buf)
}

/// Write the ruleset to `path`, replacing any previous file.
///
/// The document goes to a sibling temporary file first and is renamed into
/// place, so readers never see a half-written ruleset.
pub fn write_ruleset(path: &Path, ruleset: &OutputRuleset) -> Result<(), GeoScanError> {
    let bytes = render_ruleset(ruleset)?;

    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).ok_or_else(|| {
        GeoScanError::file_error(path.to_string_lossy(), "Output path has no file name")
    })?;
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let to_file_error = |e: std::io::Error| {
        GeoScanError::file_error(
            path.to_string_lossy(),
            format!("Failed to write ruleset: {}", e),
        )
    };
    fs::write(&tmp_path, &bytes).map_err(to_file_error)?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        to_file_error(e)
    })?;

    info!(
        "Wrote {} domains to {}",
        ruleset.rules.domain_suffix.len(),
        path.display()
    );
    Ok(())
}
