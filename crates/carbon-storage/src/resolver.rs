//! `StorageResolver`: maps a metric key to its retention schedule,
//! aggregation method, and x-files-factor by scanning two ordered rule
//! files, first match wins.
//!
//! Rules are validated when the files are read, not lazily on every lookup,
//! so a malformed config fails the daemon at startup instead of dropping
//! metrics silently once traffic starts.

use std::path::Path;

use carbon_rrd::{parse_retention_defs, AggregationMethod, Retention};
use regex::Regex;

use crate::error::{Result, StorageError};
use crate::ini;

/// Everything a live `HandlePool` entry needs to create or open a key's
/// archive file.
#[derive(Debug, Clone)]
pub struct StoragePolicy {
    /// Finest-to-coarsest retention schedule.
    pub retentions: Vec<Retention>,
    /// Aggregation method for combining samples within a slot.
    pub aggregation_method: AggregationMethod,
    /// Minimum fraction of non-null inputs required to aggregate.
    pub x_files_factor: f32,
}

/// Resolves metric keys to storage policies using two ordered rule files.
#[derive(Debug)]
pub struct StorageResolver {
    retention_rules: Vec<CompiledRetentionRule>,
    aggregation_rules: Vec<CompiledAggregationRule>,
}

#[derive(Debug)]
struct CompiledRetentionRule {
    pattern: Regex,
    retentions: Vec<Retention>,
}

#[derive(Debug)]
struct CompiledAggregationRule {
    pattern: Regex,
    aggregation_method: AggregationMethod,
    x_files_factor: f32,
}

impl StorageResolver {
    /// Load and compile both rule files.
    pub fn from_files(schemas_path: &Path, aggregation_path: &Path) -> Result<Self> {
        let schemas_text = std::fs::read_to_string(schemas_path).map_err(|e| {
            StorageError::InvalidConfig(format!(
                "cannot read {}: {e}",
                schemas_path.display()
            ))
        })?;
        let aggregation_text = std::fs::read_to_string(aggregation_path).map_err(|e| {
            StorageError::InvalidConfig(format!(
                "cannot read {}: {e}",
                aggregation_path.display()
            ))
        })?;
        Self::from_strs(&schemas_text, &aggregation_text)
    }

    /// Build a resolver directly from rule-file contents (used by tests and
    /// by `from_files`).
    pub fn from_strs(schemas_text: &str, aggregation_text: &str) -> Result<Self> {
        let retention_rules = ini::parse(schemas_text)
            .into_iter()
            .filter_map(|section| section.get("pattern").map(|p| (section, p.to_string())))
            .map(|(section, pattern)| {
                let retentions_str = section.get("retentions").ok_or_else(|| {
                    StorageError::InvalidConfig(format!(
                        "section [{}] has a pattern but no retentions",
                        section.name
                    ))
                })?;
                let retentions = parse_retention_defs(retentions_str).map_err(|e| {
                    StorageError::InvalidConfig(format!(
                        "section [{}]: {e}",
                        section.name
                    ))
                })?;
                let pattern = Regex::new(&pattern).map_err(|e| {
                    StorageError::InvalidConfig(format!(
                        "section [{}] has an invalid pattern: {e}",
                        section.name
                    ))
                })?;
                Ok(CompiledRetentionRule { pattern, retentions })
            })
            .collect::<Result<Vec<_>>>()?;

        let aggregation_rules = ini::parse(aggregation_text)
            .into_iter()
            .filter_map(|section| section.get("pattern").map(|p| (section, p.to_string())))
            .map(|(section, pattern)| {
                let method_str = section.get("aggregationMethod").ok_or_else(|| {
                    StorageError::InvalidConfig(format!(
                        "section [{}] has a pattern but no aggregationMethod",
                        section.name
                    ))
                })?;
                let aggregation_method = AggregationMethod::parse(method_str).map_err(|e| {
                    StorageError::InvalidConfig(format!("section [{}]: {e}", section.name))
                })?;
                let x_files_factor: f32 = section
                    .get("xFilesFactor")
                    .ok_or_else(|| {
                        StorageError::InvalidConfig(format!(
                            "section [{}] has a pattern but no xFilesFactor",
                            section.name
                        ))
                    })?
                    .parse()
                    .map_err(|_| {
                        StorageError::InvalidConfig(format!(
                            "section [{}] has a non-numeric xFilesFactor",
                            section.name
                        ))
                    })?;
                let pattern = Regex::new(&pattern).map_err(|e| {
                    StorageError::InvalidConfig(format!(
                        "section [{}] has an invalid pattern: {e}",
                        section.name
                    ))
                })?;
                Ok(CompiledAggregationRule {
                    pattern,
                    aggregation_method,
                    x_files_factor,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            retention_rules,
            aggregation_rules,
        })
    }

    /// Resolve a key to its storage policy. The first matching rule in each
    /// file wins; both files must have a match or the lookup fails with
    /// [`StorageError::ResolverNotFound`].
    pub fn find(&self, key: &str) -> Result<StoragePolicy> {
        let retentions = self
            .retention_rules
            .iter()
            .find(|rule| rule.pattern.is_match(key))
            .map(|rule| rule.retentions.clone())
            .ok_or_else(|| StorageError::ResolverNotFound { key: key.to_string() })?;

        let aggregation = self
            .aggregation_rules
            .iter()
            .find(|rule| rule.pattern.is_match(key))
            .ok_or_else(|| StorageError::ResolverNotFound { key: key.to_string() })?;

        Ok(StoragePolicy {
            retentions,
            aggregation_method: aggregation.aggregation_method,
            x_files_factor: aggregation.x_files_factor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SCHEMAS: &str = "\
[fine]
pattern = ^high\\.
retentions = 1s:5m,1m:30m

[default]
pattern = .*
retentions = 10s:1d
";

    const AGGREGATION: &str = "\
[sums]
pattern = ^counters\\.
aggregationMethod = sum
xFilesFactor = 0.0

[default]
pattern = .*
aggregationMethod = average
xFilesFactor = 0.5
";

    #[test]
    fn first_match_wins() {
        let resolver = StorageResolver::from_strs(SCHEMAS, AGGREGATION).unwrap();
        let policy = resolver.find("high.cpu.user").unwrap();
        assert_eq!(policy.retentions[0].seconds_per_point, 1);
        assert_eq!(policy.aggregation_method, AggregationMethod::Average);
    }

    #[test]
    fn falls_back_to_default_section() {
        let resolver = StorageResolver::from_strs(SCHEMAS, AGGREGATION).unwrap();
        let policy = resolver.find("counters.requests").unwrap();
        assert_eq!(policy.retentions[0].seconds_per_point, 10);
        assert_eq!(policy.aggregation_method, AggregationMethod::Sum);
        assert_eq!(policy.x_files_factor, 0.0);
    }

    #[test]
    fn no_match_is_resolver_not_found() {
        let resolver = StorageResolver::from_strs(
            "[only]\npattern = ^nevermatch$\nretentions = 10s:1d\n",
            "[only]\npattern = ^nevermatch$\naggregationMethod = sum\nxFilesFactor = 0.0\n",
        )
        .unwrap();
        let err = resolver.find("anything").unwrap_err();
        assert!(matches!(err, StorageError::ResolverNotFound { .. }));
    }

    #[test]
    fn load_fails_fast_on_missing_retentions_key() {
        let err = StorageResolver::from_strs(
            "[broken]\npattern = .*\n",
            AGGREGATION,
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::InvalidConfig(_)));
    }
}
