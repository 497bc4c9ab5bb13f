//! Metric set and report comparison.
//!
//! [`MetricDiff`] lines up two metric sets by metric key and records the
//! before/after values and delta for each. [`ReportDiff`] does the same for
//! whole reports: the built-in summary plus every custom set.
//!
//! Comparison never fails. A missing side turns every entry into an
//! addition or removal.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use super::format::rounded_delta;
use super::{Metric, MetricSet, Report, ReportContext};
use crate::error::{CovtrackError, Result};

// ============================================================================
// Diff Entry
// ============================================================================

/// How a metric appears across the two sides of a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    /// Present on both sides.
    Compared,
    /// Present only on the after side.
    Added,
    /// Present only on the before side.
    Removed,
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiffStatus::Compared => "compared",
            DiffStatus::Added => "added",
            DiffStatus::Removed => "removed",
        };
        write!(f, "{}", s)
    }
}

/// One metric's before/after comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
    /// Metric key.
    pub key: String,

    /// Display name, preferring the after side.
    pub name: String,

    /// Value on the before side.
    pub before: Option<f64>,

    /// Value on the after side.
    pub after: Option<f64>,

    /// Unit from the after side, or the before side when after has none.
    pub unit: String,

    pub status: DiffStatus,
}

impl DiffEntry {
    fn new(before: Option<&Metric>, after: Option<&Metric>) -> Self {
        let status = match (before, after) {
            (Some(_), Some(_)) => DiffStatus::Compared,
            (None, _) => DiffStatus::Added,
            (Some(_), None) => DiffStatus::Removed,
        };
        let pick = |f: fn(&Metric) -> &str| -> String {
            after
                .map(f)
                .filter(|s| !s.is_empty())
                .or_else(|| before.map(f).filter(|s| !s.is_empty()))
                .unwrap_or_default()
                .to_string()
        };
        Self {
            key: pick(|m| m.key.as_str()),
            name: pick(Metric::display_name),
            before: before.map(|m| m.value),
            after: after.map(|m| m.value),
            unit: pick(|m| m.unit.as_str()),
            status,
        }
    }

    /// `after - before`, only when both sides exist.
    ///
    /// Rounded by [`rounded_delta`] so float noise never reaches output.
    #[must_use]
    pub fn delta(&self) -> Option<f64> {
        match (self.before, self.after) {
            (Some(before), Some(after)) => Some(rounded_delta(before, after)),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_added(&self) -> bool {
        self.status == DiffStatus::Added
    }

    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.status == DiffStatus::Removed
    }
}

// ============================================================================
// Metric Diff
// ============================================================================

/// Ordered comparison of two metric sets, either of which may be absent.
///
/// # Example
///
/// ```
/// use covtrack::{Metric, MetricDiff, MetricSet};
///
/// let before = MetricSet::new("bench").with_metric(Metric::new("N", 1000.0));
/// let after = MetricSet::new("bench").with_metric(Metric::new("N", 9393.0));
///
/// let diff = MetricDiff::between(Some(&before), Some(&after));
/// assert_eq!(diff.entries[0].delta(), Some(8393.0));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDiff {
    /// Set key, preferring the after side.
    pub key: String,

    /// Set display name, preferring the after side.
    pub name: String,

    /// Key of the before set, if any.
    pub before_key: Option<String>,

    /// Key of the after set, if any.
    pub after_key: Option<String>,

    /// Report context of the before set.
    pub before_context: Option<ReportContext>,

    /// Report context of the after set.
    pub after_context: Option<ReportContext>,

    /// One entry per distinct metric key.
    pub entries: Vec<DiffEntry>,
}

impl MetricDiff {
    /// Compare two metric sets by metric key.
    ///
    /// Entries follow the before set's order, then metrics that exist only
    /// in the after set in the after set's order. A key repeated within a
    /// set appears once, at its first position, with its last value.
    /// Sets with different keys are compared anyway; see
    /// [`MetricDiff::between_strict`].
    #[must_use]
    pub fn between(before: Option<&MetricSet>, after: Option<&MetricSet>) -> Self {
        let before_metrics = before.map(|s| s.metrics.as_slice()).unwrap_or_default();
        let after_metrics = after.map(|s| s.metrics.as_slice()).unwrap_or_default();

        let before_index = last_by_key(before_metrics);
        let after_index = last_by_key(after_metrics);

        let mut seen: HashSet<&str> = HashSet::new();
        let mut entries = Vec::with_capacity(before_metrics.len().max(after_metrics.len()));

        for metric in before_metrics {
            if !seen.insert(metric.key.as_str()) {
                continue;
            }
            let b = before_index.get(metric.key.as_str()).copied();
            let a = after_index.get(metric.key.as_str()).copied();
            entries.push(DiffEntry::new(b, a));
        }
        for metric in after_metrics {
            if !seen.insert(metric.key.as_str()) {
                continue;
            }
            let a = after_index.get(metric.key.as_str()).copied();
            entries.push(DiffEntry::new(None, a));
        }

        let (key, name) = match (before, after) {
            (_, Some(set)) | (Some(set), None) => (set.key.clone(), set.display_name().to_string()),
            (None, None) => (String::new(), String::new()),
        };

        Self {
            key,
            name,
            before_key: before.map(|s| s.key.clone()),
            after_key: after.map(|s| s.key.clone()),
            before_context: before.and_then(|s| s.report_context().cloned()),
            after_context: after.and_then(|s| s.report_context().cloned()),
            entries,
        }
    }

    /// Like [`MetricDiff::between`], but both present sets must share a key.
    pub fn between_strict(before: Option<&MetricSet>, after: Option<&MetricSet>) -> Result<Self> {
        if let (Some(b), Some(a)) = (before, after) {
            if b.key != a.key {
                return Err(CovtrackError::KeyMismatch {
                    before: b.key.clone(),
                    after: a.key.clone(),
                });
            }
        }
        Ok(Self::between(before, after))
    }

    /// Whether both sides exist and carry the same set key.
    #[must_use]
    pub fn keys_match(&self) -> bool {
        matches!((&self.before_key, &self.after_key), (Some(b), Some(a)) if b == a)
    }

    /// Whether every compared entry has a zero delta and nothing was added
    /// or removed.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.entries
            .iter()
            .all(|e| e.status == DiffStatus::Compared && e.delta() == Some(0.0))
    }

    /// Entries present only on the after side.
    pub fn added(&self) -> impl Iterator<Item = &DiffEntry> {
        self.entries.iter().filter(|e| e.is_added())
    }

    /// Entries present only on the before side.
    pub fn removed(&self) -> impl Iterator<Item = &DiffEntry> {
        self.entries.iter().filter(|e| e.is_removed())
    }
}

fn last_by_key(metrics: &[Metric]) -> HashMap<&str, &Metric> {
    metrics.iter().map(|m| (m.key.as_str(), m)).collect()
}

impl MetricSet {
    /// Compare this set (before) with another (after).
    ///
    /// Passing `None` marks every metric of this set as removed.
    #[must_use]
    pub fn compare(&self, other: Option<&MetricSet>) -> MetricDiff {
        MetricDiff::between(Some(self), other)
    }

    /// Compare with another set that must have the same key.
    pub fn compare_strict(&self, other: Option<&MetricSet>) -> Result<MetricDiff> {
        MetricDiff::between_strict(Some(self), other)
    }
}

// ============================================================================
// Report Diff
// ============================================================================

/// Comparison of two reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDiff {
    /// Repository, preferring the after side.
    pub repository: String,

    pub before_context: Option<ReportContext>,

    pub after_context: Option<ReportContext>,

    /// Coverage, code-to-test ratio and test execution time.
    pub summary: MetricDiff,

    /// One diff per custom set key.
    pub metric_sets: Vec<MetricDiff>,
}

impl ReportDiff {
    /// Compare two reports.
    ///
    /// Custom sets are paired by key: before's sets in order, then sets that
    /// only exist after.
    #[must_use]
    pub fn between(before: Option<&Report>, after: Option<&Report>) -> Self {
        let before_summary = before.map(Report::summary_set);
        let after_summary = after.map(Report::summary_set);
        let summary = MetricDiff::between(before_summary.as_ref(), after_summary.as_ref());

        let before_sets = before.map(Report::metric_sets).unwrap_or_default();
        let after_sets = after.map(Report::metric_sets).unwrap_or_default();

        let mut metric_sets = Vec::with_capacity(before_sets.len().max(after_sets.len()));
        for set in before_sets {
            let other = after.and_then(|r| r.metric_set(&set.key));
            metric_sets.push(MetricDiff::between(Some(set), other));
        }
        for set in after_sets {
            if before.and_then(|r| r.metric_set(&set.key)).is_none() {
                metric_sets.push(MetricDiff::between(None, Some(set)));
            }
        }

        let repository = after
            .or(before)
            .map(|r| r.repository().to_string())
            .unwrap_or_default();

        tracing::debug!(
            repository = %repository,
            sets = metric_sets.len(),
            "Compared reports"
        );

        Self {
            repository,
            before_context: before.map(Report::context),
            after_context: after.map(Report::context),
            summary,
            metric_sets,
        }
    }

    /// Diff of a single custom set by key.
    #[must_use]
    pub fn metric_set(&self, key: &str) -> Option<&MetricDiff> {
        self.metric_sets.iter().find(|d| d.key == key)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn benchmark(values: (f64, f64), commit: &str) -> MetricSet {
        MetricSet::new("benchmark_0")
            .with_name("Benchmark-0")
            .with_metric(Metric::new("N", values.0).with_name("Number of iterations"))
            .with_metric(
                Metric::new("NsPerOp", values.1)
                    .with_name("Nanoseconds per iteration")
                    .with_unit(" ns/op"),
            )
            .with_report_context(ReportContext::new("main", commit))
    }

    // ------------------------------------------------------------------------
    // MetricDiff
    // ------------------------------------------------------------------------

    #[test]
    fn test_compare_benchmark_scenario() {
        let a = benchmark((1000.0, 676.5), "1234567890");
        let b = benchmark((9393.0, 456.0), "2345678901");

        let diff = a.compare(Some(&b));

        assert_eq!(diff.entries.len(), 2);
        let n = &diff.entries[0];
        assert_eq!(n.key, "N");
        assert_eq!(n.before, Some(1000.0));
        assert_eq!(n.after, Some(9393.0));
        assert_eq!(n.delta(), Some(8393.0));

        let ns = &diff.entries[1];
        assert_eq!(ns.key, "NsPerOp");
        assert_eq!(ns.before, Some(676.5));
        assert_eq!(ns.after, Some(456.0));
        assert_eq!(ns.delta(), Some(-220.5));
        assert_eq!(ns.unit, " ns/op");
    }

    #[test]
    fn test_compare_identical_sets_has_zero_deltas() {
        let a = benchmark((1000.0, 676.5), "1234567890");
        let b = benchmark((1000.0, 676.5), "2345678901");

        let diff = a.compare(Some(&b));

        assert!(diff.entries.iter().all(|e| e.delta() == Some(0.0)));
        assert!(diff.is_unchanged());
    }

    #[test]
    fn test_compare_without_after_marks_removed() {
        let a = benchmark((1000.0, 676.5), "1234567890");

        let diff = a.compare(None);

        assert_eq!(diff.entries.len(), 2);
        for entry in &diff.entries {
            assert!(entry.is_removed());
            assert!(entry.after.is_none());
            assert!(entry.delta().is_none());
        }
        assert_eq!(diff.key, "benchmark_0");
        assert!(diff.after_context.is_none());
        assert_eq!(diff.before_context.as_ref().map(|c| c.commit.as_str()), Some("1234567890"));
    }

    #[test]
    fn test_compare_without_before_marks_added() {
        let b = benchmark((9393.0, 456.0), "2345678901");

        let diff = MetricDiff::between(None, Some(&b));

        assert_eq!(diff.added().count(), 2);
        assert!(diff.entries.iter().all(|e| e.before.is_none()));
        assert!(!diff.is_unchanged());
    }

    #[test]
    fn test_compare_both_absent_is_empty() {
        let diff = MetricDiff::between(None, None);
        assert!(diff.entries.is_empty());
        assert!(diff.key.is_empty());
    }

    #[test]
    fn test_compare_order_before_then_after_only() {
        let a = MetricSet::new("k")
            .with_metric(Metric::new("z", 1.0))
            .with_metric(Metric::new("gone", 2.0))
            .with_metric(Metric::new("a", 3.0));
        let b = MetricSet::new("k")
            .with_metric(Metric::new("new2", 9.0))
            .with_metric(Metric::new("a", 4.0))
            .with_metric(Metric::new("new1", 8.0))
            .with_metric(Metric::new("z", 1.0));

        let diff = a.compare(Some(&b));
        let keys: Vec<_> = diff.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["z", "gone", "a", "new2", "new1"]);

        let statuses: Vec<_> = diff.entries.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            [
                DiffStatus::Compared,
                DiffStatus::Removed,
                DiffStatus::Compared,
                DiffStatus::Added,
                DiffStatus::Added
            ]
        );
        assert_eq!(diff.removed().count(), 1);
    }

    #[test]
    fn test_compare_duplicate_keys_last_write_wins() {
        let a = MetricSet::new("k")
            .with_metric(Metric::new("n", 1.0))
            .with_metric(Metric::new("m", 5.0))
            .with_metric(Metric::new("n", 2.0));
        let b = MetricSet::new("k").with_metric(Metric::new("n", 10.0));

        let diff = a.compare(Some(&b));
        let keys: Vec<_> = diff.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["n", "m"]);
        assert_eq!(diff.entries[0].before, Some(2.0));
        assert_eq!(diff.entries[0].delta(), Some(8.0));
    }

    #[test]
    fn test_compare_unit_falls_back_to_before() {
        let a = MetricSet::new("k").with_metric(Metric::new("t", 1.0).with_unit("ms"));
        let b = MetricSet::new("k").with_metric(Metric::new("t", 2.0));

        let diff = a.compare(Some(&b));
        assert_eq!(diff.entries[0].unit, "ms");

        let c = MetricSet::new("k").with_metric(Metric::new("t", 2.0).with_unit("s"));
        assert_eq!(a.compare(Some(&c)).entries[0].unit, "s");
    }

    #[test]
    fn test_compare_different_keys_is_permitted() {
        let a = MetricSet::new("one").with_metric(Metric::new("n", 1.0));
        let b = MetricSet::new("two").with_metric(Metric::new("n", 3.0));

        let diff = a.compare(Some(&b));
        assert!(!diff.keys_match());
        assert_eq!(diff.entries[0].delta(), Some(2.0));

        let err = a.compare_strict(Some(&b)).unwrap_err();
        assert!(matches!(err, CovtrackError::KeyMismatch { .. }));
        assert!(a.compare_strict(Some(&a)).unwrap().keys_match());
    }

    #[test]
    fn test_compare_does_not_mutate_inputs() {
        let a = benchmark((1000.0, 676.5), "1234567890");
        let b = benchmark((9393.0, 456.0), "2345678901");
        let (a_copy, b_copy) = (a.clone(), b.clone());

        let _ = a.compare(Some(&b));

        assert_eq!(a, a_copy);
        assert_eq!(b, b_copy);
    }

    #[test]
    fn test_metric_diff_is_json_serializable() {
        let a = benchmark((1000.0, 676.5), "1234567890");
        let diff = a.compare(None);

        let json = serde_json::to_string(&diff).expect("serialize to JSON");
        assert!(json.contains(r#""status":"removed""#));

        let restored: MetricDiff = serde_json::from_str(&json).expect("deserialize from JSON");
        assert_eq!(restored, diff);
    }

    // ------------------------------------------------------------------------
    // ReportDiff
    // ------------------------------------------------------------------------

    fn report(commit: &str) -> Report {
        use chrono::{TimeZone, Utc};
        Report::new(
            "owner/repo",
            "main",
            commit,
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_report_diff_summary_and_sets() {
        let before = report("1234567890")
            .with_coverage(100, 80)
            .with_metric_set(benchmark((1000.0, 676.5), "ignored"))
            .with_metric_set(MetricSet::new("old").with_metric(Metric::new("x", 1.0)));
        let after = report("2345678901")
            .with_coverage(200, 170)
            .with_test_execution_time(3.5)
            .with_metric_set(MetricSet::new("fresh").with_metric(Metric::new("y", 1.0)))
            .with_metric_set(benchmark((9393.0, 456.0), "ignored"));

        let diff = after.compare(Some(&before));

        let coverage = &diff.summary.entries[0];
        assert_eq!(coverage.key, "coverage");
        assert_eq!(coverage.delta(), Some(5.0));
        assert!(diff.summary.entries[1].is_added());

        let keys: Vec<_> = diff.metric_sets.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, ["benchmark_0", "old", "fresh"]);
        assert!(diff.metric_set("old").unwrap().entries[0].is_removed());
        assert!(diff.metric_set("fresh").unwrap().entries[0].is_added());

        let bench = diff.metric_set("benchmark_0").unwrap();
        assert_eq!(bench.before_context.as_ref().unwrap().commit, "1234567890");
        assert_eq!(bench.after_context.as_ref().unwrap().commit, "2345678901");
        assert_eq!(diff.repository, "owner/repo");
    }

    #[test]
    fn test_report_diff_without_previous() {
        let after = report("2345678901")
            .with_coverage(10, 5)
            .with_metric_set(benchmark((1.0, 2.0), "x"));

        let diff = after.compare(None);

        assert!(diff.before_context.is_none());
        assert!(diff.summary.entries.iter().all(DiffEntry::is_added));
        assert!(diff.metric_sets[0].entries.iter().all(DiffEntry::is_added));
    }

    #[test]
    fn test_report_diff_repeated_set_key_pairs_once() {
        let json = |commit: &str, last: f64| {
            format!(
                r#"{{
                    "repository": "owner/repo",
                    "ref": "main",
                    "commit": "{commit}",
                    "timestamp": "2024-01-15T10:00:00Z",
                    "custom_metrics": [
                        {{"key": "b", "metrics": [{{"key": "n", "value": 1}}]}},
                        {{"key": "b", "metrics": [{{"key": "n", "value": {last}}}]}}
                    ]
                }}"#
            )
        };
        let before = Report::from_json(&json("c1", 2.0)).unwrap();
        let after = Report::from_json(&json("c2", 2.0)).unwrap();

        let diff = after.compare(Some(&before));
        assert_eq!(diff.metric_sets.len(), 1);
        let entry = &diff.metric_set("b").unwrap().entries[0];
        assert_eq!((entry.before, entry.after), (Some(2.0), Some(2.0)));
        assert_eq!(entry.delta(), Some(0.0));
    }

    #[test]
    fn test_delta_is_rounded_to_operand_precision() {
        let before = MetricSet::new("s").with_metric(Metric::new("x", 0.1));
        let after = MetricSet::new("s").with_metric(Metric::new("x", 0.3));
        let diff = before.compare(Some(&after));
        assert_eq!(diff.entries[0].delta(), Some(0.2));

        let covered = |n: u64| report("abc").with_coverage(1000, n);
        let diff = covered(803).compare(Some(&covered(801)));
        assert_eq!(diff.summary.entries[0].delta(), Some(0.2));
    }
}
