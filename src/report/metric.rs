//! Custom metrics and metric sets.
//!
//! A [`MetricSet`] is a keyed, ordered group of [`Metric`]s, typically one
//! benchmark's results. Sets carry an optional [`ReportContext`] copied from
//! the owning report so renderers can link to the ref and commit.

use serde::{Deserialize, Serialize};

use super::ReportContext;
use crate::error::{CovtrackError, Result};

// ============================================================================
// Metric
// ============================================================================

/// A single named measurement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Machine identifier, unique within the owning set.
    pub key: String,

    /// Human label. Empty means "display the key".
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// The measured value.
    pub value: f64,

    /// Display suffix appended to the value, e.g. `" ns/op"`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,
}

impl Metric {
    /// Create a metric with no name and no unit.
    ///
    /// # Example
    ///
    /// ```
    /// use covtrack::Metric;
    ///
    /// let metric = Metric::new("count", 1000.0);
    /// assert_eq!(metric.display_name(), "count");
    /// ```
    #[must_use]
    pub fn new(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value,
            ..Self::default()
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the display unit.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// The name to render, falling back to the key.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.key
        } else {
            &self.name
        }
    }
}

// ============================================================================
// Metric Set
// ============================================================================

/// An ordered, keyed collection of metrics.
///
/// Equality ignores the report context: two sets with the same key, name and
/// metrics are equal no matter which report they came from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricSet {
    /// Identifier of the set within a report (e.g. a benchmark name).
    pub key: String,

    /// Display name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Metrics in insertion order.
    #[serde(default)]
    pub metrics: Vec<Metric>,

    #[serde(skip)]
    report: Option<ReportContext>,
}

impl PartialEq for MetricSet {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.name == other.name && self.metrics == other.metrics
    }
}

impl MetricSet {
    /// Create an empty set with the given key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Append a metric.
    #[must_use]
    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metrics.push(metric);
        self
    }

    /// Attach the ref/commit context of the report this set belongs to.
    #[must_use]
    pub fn with_report_context(mut self, context: ReportContext) -> Self {
        self.report = Some(context);
        self
    }

    pub(crate) fn set_report_context(&mut self, context: Option<ReportContext>) {
        self.report = context;
    }

    /// Context of the owning report, if the set is attached to one.
    #[must_use]
    pub fn report_context(&self) -> Option<&ReportContext> {
        self.report.as_ref()
    }

    /// The title to render: name, then key.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.key
        } else {
            &self.name
        }
    }

    /// Look up a metric by key.
    ///
    /// Keys are not required to be unique; when they repeat, the last
    /// metric with the key wins.
    #[must_use]
    pub fn metric(&self, key: &str) -> Option<&Metric> {
        self.metrics.iter().rev().find(|m| m.key == key)
    }

    /// Check that the set is well formed.
    ///
    /// Rules are checked in order and the first failure is returned:
    /// the set key must be non-empty, the set must hold at least one metric,
    /// and every metric must have a key.
    ///
    /// # Example
    ///
    /// ```
    /// use covtrack::{Metric, MetricSet};
    ///
    /// assert!(MetricSet::default().validate().is_err());
    /// assert!(MetricSet::new("key").validate().is_err());
    ///
    /// let set = MetricSet::new("key").with_metric(Metric::new("count", 1000.0));
    /// assert!(set.validate().is_ok());
    /// ```
    pub fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            return Err(CovtrackError::KeyRequired);
        }
        if self.metrics.is_empty() {
            return Err(CovtrackError::MetricsRequired);
        }
        if let Some(index) = self.metrics.iter().position(|m| m.key.is_empty()) {
            return Err(CovtrackError::MetricKeyRequired { index });
        }
        Ok(())
    }
}
