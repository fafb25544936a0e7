//! Exclusion set loading.
//!
//! Reference lists are geosite rule-set documents; the domains to skip sit
//! at `rules[0].domain`. Several lists are unioned into one set.

use crate::error::GeoScanError;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::info;

/// Domains that are already classified elsewhere and must never be resolved.
///
/// Membership is exact string equality; there is no suffix matching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    domains: HashSet<String>,
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and union every reference file.
    ///
    /// Any missing or malformed file fails the whole load.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self, GeoScanError> {
        let mut set = Self::new();
        for path in paths {
            let path = path.as_ref();
            let before = set.len();
            let added = set.extend_from_file(path)?;
            info!(
                "Loaded {} reference domains from {} ({} new)",
                added,
                path.display(),
                set.len() - before
            );
        }
        Ok(set)
    }

    /// Add the domains of one reference file, returning how many were listed.
    pub fn extend_from_file(&mut self, path: &Path) -> Result<usize, GeoScanError> {
        let content = fs::read_to_string(path).map_err(|e| {
            GeoScanError::file_error(
                path.to_string_lossy(),
                format!("Failed to read reference list: {}", e),
            )
        })?;

        let domains = parse_reference_list(&content).map_err(|e| {
            GeoScanError::file_error(path.to_string_lossy(), e.to_string())
        })?;
        let count = domains.len();
        self.domains.extend(domains);
        Ok(count)
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.domains.contains(domain)
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ExclusionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            domains: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Extract the `rules[0].domain` string list from a reference document.
///
/// Non-string entries in the list are ignored.
pub fn parse_reference_list(content: &str) -> Result<Vec<String>, GeoScanError> {
    let json: serde_json::Value = serde_json::from_str(content)?;

    let list = json
        .get("rules")
        .and_then(|rules| rules.as_array())
        .and_then(|rules| rules.first())
        .and_then(|rule| rule.get("domain"))
        .and_then(|domain| domain.as_array())
        .ok_or_else(|| GeoScanError::parse("Reference list has no rules[0].domain array"))?;

    Ok(list
        .iter()
        .filter_map(|item| item.as_str())
        .map(String::from)
        .collect())
}
