//! Utility functions for input handling.

use crate::error::GeoScanError;
use std::fs;
use std::path::Path;

/// Read the newline-delimited domain list.
///
/// Every line becomes one entry, blank ones included, so positions in the
/// list match line numbers in the file. Surrounding whitespace (a trailing
/// `\r` from CRLF files among it) is trimmed. The empty remainder after a
/// final newline is kept as a blank entry.
pub fn read_domain_list(path: &Path) -> Result<Vec<String>, GeoScanError> {
    if !path.exists() {
        return Err(GeoScanError::file_error(
            path.to_string_lossy(),
            "Domain list not found",
        ));
    }

    let content = fs::read_to_string(path).map_err(|e| {
        GeoScanError::file_error(
            path.to_string_lossy(),
            format!("Failed to read domain list: {}", e),
        )
    })?;

    Ok(split_domain_list(&content))
}

/// Split list content into trimmed lines.
pub fn split_domain_list(content: &str) -> Vec<String> {
    content
        .split('\n')
        .map(|line| line.trim().to_string())
        .collect()
}

/// Format an element count with thousands separators ("1,000,000").
pub fn format_count(count: usize) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
