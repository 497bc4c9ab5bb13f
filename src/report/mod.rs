//! Report snapshots and their comparison.
//!
//! A [`Report`] captures one collection run for a repository at a given ref
//! and commit: line coverage, code-to-test ratio, test execution time and any
//! number of custom [`MetricSet`]s.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │ Report          │────>│ MetricSet        │────>│ Metric          │
//! │ repo/ref/commit │     │ key, name        │     │ key, value, unit│
//! └─────────────────┘     └──────────────────┘     └─────────────────┘
//!         │                       │
//!         v                       v
//! ┌─────────────────┐     ┌──────────────────┐
//! │ ReportDiff      │────>│ MetricDiff       │──> Renderer (markdown)
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use covtrack::{Metric, MetricSet, Report};
//!
//! let timestamp = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
//! let report = Report::new("owner/repo", "main", "1234567890", timestamp)
//!     .with_coverage(100, 80)
//!     .with_metric_set(
//!         MetricSet::new("benchmark_0").with_metric(Metric::new("N", 1000.0)),
//!     );
//!
//! assert!(report.validate().is_ok());
//! assert_eq!(report.coverage_percent(), Some(80.0));
//! ```

pub mod diff;
pub mod format;
pub mod metric;
pub mod render;
pub mod repository;

pub use diff::{DiffEntry, DiffStatus, MetricDiff, ReportDiff};
pub use metric::{Metric, MetricSet};
pub use render::{RenderConfig, Renderer};
pub use repository::split_repository;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CovtrackError, Result};

/// Key of the synthetic set holding a report's built-in measurements.
pub const SUMMARY_SET_KEY: &str = "summary";

// ============================================================================
// Report Context
// ============================================================================

/// The ref and commit of a report, copied onto its metric sets.
///
/// This is what a metric set knows about its owner. It is used only to
/// render links and never takes part in identity or equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportContext {
    /// Branch or tag name.
    pub ref_name: String,

    /// Commit SHA.
    pub commit: String,
}

impl ReportContext {
    /// Create a context from a ref and commit.
    #[must_use]
    pub fn new(ref_name: impl Into<String>, commit: impl Into<String>) -> Self {
        Self {
            ref_name: ref_name.into(),
            commit: commit.into(),
        }
    }

    /// The commit abbreviated to seven characters.
    #[must_use]
    pub fn short_commit(&self) -> &str {
        format::short_commit(&self.commit)
    }
}

// ============================================================================
// Built-in Measurements
// ============================================================================

/// Total and covered line counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    /// Number of measurable lines.
    pub total: u64,

    /// Number of lines hit by tests.
    pub covered: u64,
}

impl Coverage {
    /// Covered lines as a percentage of total, rounded to one decimal.
    ///
    /// Returns `0.0` when there are no measurable lines.
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        round_tenths(self.covered as f64 / self.total as f64 * 100.0)
    }
}

/// Lines of production code and lines of test code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeToTestRatio {
    /// Lines of production code.
    pub code: u64,

    /// Lines of test code.
    pub test: u64,
}

impl CodeToTestRatio {
    /// Test lines per line of code, rounded to one decimal (`1:ratio`).
    ///
    /// Returns `0.0` when there is no production code.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        if self.code == 0 {
            return 0.0;
        }
        round_tenths(self.test as f64 / self.code as f64)
    }
}

/// Insert a set keyed by its key, replacing an existing one in place.
fn insert_metric_set(sets: &mut Vec<MetricSet>, set: MetricSet) {
    match sets.iter_mut().find(|s| s.key == set.key) {
        Some(existing) => *existing = set,
        None => sets.push(set),
    }
}

fn deserialize_metric_sets<'de, D>(deserializer: D) -> std::result::Result<Vec<MetricSet>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Vec::<MetricSet>::deserialize(deserializer)?;
    let mut sets = Vec::with_capacity(raw.len());
    for set in raw {
        insert_metric_set(&mut sets, set);
    }
    Ok(sets)
}

fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ============================================================================
// Report
// ============================================================================

/// A metrics snapshot of one repository at one commit.
///
/// Identity fields are fixed at construction; optional measurements and
/// metric sets are added through the `with_*` builders, which keep each
/// set's [`ReportContext`] in sync with the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    repository: String,

    #[serde(rename = "ref")]
    ref_name: String,

    commit: String,

    timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    coverage: Option<Coverage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    code_to_test_ratio: Option<CodeToTestRatio>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    test_execution_time: Option<f64>,

    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "deserialize_metric_sets"
    )]
    custom_metrics: Vec<MetricSet>,
}

impl Report {
    /// Create a report with its identity and no measurements.
    #[must_use]
    pub fn new(
        repository: impl Into<String>,
        ref_name: impl Into<String>,
        commit: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            repository: repository.into(),
            ref_name: ref_name.into(),
            commit: commit.into(),
            timestamp,
            coverage: None,
            code_to_test_ratio: None,
            test_execution_time: None,
            custom_metrics: Vec::new(),
        }
    }

    /// Set line coverage.
    #[must_use]
    pub fn with_coverage(mut self, total: u64, covered: u64) -> Self {
        self.coverage = Some(Coverage { total, covered });
        self
    }

    /// Set the code-to-test ratio line counts.
    #[must_use]
    pub fn with_code_to_test_ratio(mut self, code: u64, test: u64) -> Self {
        self.code_to_test_ratio = Some(CodeToTestRatio { code, test });
        self
    }

    /// Set the test execution time in seconds.
    #[must_use]
    pub fn with_test_execution_time(mut self, seconds: f64) -> Self {
        self.test_execution_time = Some(seconds);
        self
    }

    /// Add a metric set, replacing any set with the same key in place.
    #[must_use]
    pub fn with_metric_set(mut self, mut set: MetricSet) -> Self {
        set.set_report_context(Some(self.context()));
        insert_metric_set(&mut self.custom_metrics, set);
        self
    }

    /// Parse a report from JSON and attach its metric sets.
    ///
    /// Sets sharing a key collapse into one: the last occurrence replaces
    /// the first in place, as [`Report::with_metric_set`] does.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut report: Report = serde_json::from_str(json)?;
        report.attach_metric_sets();
        Ok(report)
    }

    /// Load a report from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid report.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read report: {}", path.display()))?;
        let report = Self::from_json(&content)
            .with_context(|| format!("Failed to parse report: {}", path.display()))?;
        tracing::debug!(
            path = %path.display(),
            sets = report.custom_metrics.len(),
            "Loaded report"
        );
        Ok(report)
    }

    fn attach_metric_sets(&mut self) {
        let context = self.context();
        for set in &mut self.custom_metrics {
            set.set_report_context(Some(context.clone()));
        }
    }

    /// Repository as `owner/repo`.
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Owner and repository name split from [`Self::repository`].
    pub fn owner_repo(&self) -> Result<(&str, &str)> {
        split_repository(&self.repository)
    }

    /// Branch or tag name.
    #[must_use]
    pub fn ref_name(&self) -> &str {
        &self.ref_name
    }

    /// Commit SHA.
    #[must_use]
    pub fn commit(&self) -> &str {
        &self.commit
    }

    /// Snapshot time.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    #[must_use]
    pub fn coverage(&self) -> Option<Coverage> {
        self.coverage
    }

    #[must_use]
    pub fn code_to_test_ratio(&self) -> Option<CodeToTestRatio> {
        self.code_to_test_ratio
    }

    #[must_use]
    pub fn test_execution_time(&self) -> Option<f64> {
        self.test_execution_time
    }

    /// Coverage percentage, if coverage was measured.
    #[must_use]
    pub fn coverage_percent(&self) -> Option<f64> {
        self.coverage.map(|c| c.percent())
    }

    /// Custom metric sets in insertion order.
    #[must_use]
    pub fn metric_sets(&self) -> &[MetricSet] {
        &self.custom_metrics
    }

    /// Look up a custom metric set by key.
    #[must_use]
    pub fn metric_set(&self, key: &str) -> Option<&MetricSet> {
        self.custom_metrics.iter().find(|s| s.key == key)
    }

    /// The ref/commit pair handed to metric sets.
    #[must_use]
    pub fn context(&self) -> ReportContext {
        ReportContext::new(&self.ref_name, &self.commit)
    }

    /// Built-in measurements as a metric set.
    ///
    /// Holds coverage (`%`), code-to-test ratio and test execution time
    /// (`s`), each only when measured. May be empty.
    #[must_use]
    pub fn summary_set(&self) -> MetricSet {
        let mut set = MetricSet::new(SUMMARY_SET_KEY)
            .with_name("Summary")
            .with_report_context(self.context());
        if let Some(coverage) = self.coverage {
            set.metrics.push(
                Metric::new("coverage", coverage.percent())
                    .with_name("Coverage")
                    .with_unit("%"),
            );
        }
        if let Some(ratio) = self.code_to_test_ratio {
            set.metrics
                .push(Metric::new("code_to_test_ratio", ratio.ratio()).with_name("Code to Test Ratio"));
        }
        if let Some(seconds) = self.test_execution_time {
            set.metrics.push(
                Metric::new("test_execution_time", seconds)
                    .with_name("Test Execution Time")
                    .with_unit("s"),
            );
        }
        set
    }

    /// Serialized JSON form of the whole report, kept as an audit payload.
    pub fn raw(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Check required fields and every metric set.
    ///
    /// Repository, ref and commit must be non-empty and the timestamp must
    /// not be the Unix epoch. Metric set failures are wrapped with the set key.
    pub fn validate(&self) -> Result<()> {
        if self.repository.is_empty() {
            return Err(CovtrackError::RepositoryRequired);
        }
        if self.ref_name.is_empty() {
            return Err(CovtrackError::RefRequired);
        }
        if self.commit.is_empty() {
            return Err(CovtrackError::CommitRequired);
        }
        if self.timestamp == DateTime::<Utc>::default() {
            return Err(CovtrackError::TimestampRequired);
        }
        for set in &self.custom_metrics {
            set.validate()
                .map_err(|e| CovtrackError::invalid_metric_set(&set.key, e))?;
        }
        Ok(())
    }

    /// Compare this report against a previous one.
    ///
    /// `previous` is the "before" side. Without it every measurement shows
    /// as added.
    #[must_use]
    pub fn compare(&self, previous: Option<&Report>) -> ReportDiff {
        ReportDiff::between(previous, Some(self))
    }
}
