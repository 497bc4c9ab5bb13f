//! Persistence of flattened reports.
//!
//! A [`Report`] is flattened into a [`ReportRecord`]: one row with stable
//! column names where every optional measurement stays optional, so "0%
//! coverage" and "coverage not measured" remain distinguishable.
//!
//! Records are written to a named sink through the [`Datastore`] trait.
//! [`store_report`] ties validation, flattening and the bounded store call
//! together.
//!
//! # Example
//!
//! ```rust,ignore
//! use covtrack::datastore::{store_report, LocalDatastore};
//! use std::time::Duration;
//!
//! let datastore = LocalDatastore::new(".covtrack/datastore");
//! datastore.create_sink("reports").await?;
//! let outcome = store_report(&datastore, "reports", &report, Duration::from_secs(30)).await?;
//! ```

pub mod local;

pub use local::LocalDatastore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{CovtrackError, Result};
use crate::report::Report;

// ============================================================================
// Schema
// ============================================================================

/// Column type of a sink field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Timestamp,
}

/// One column of a sink schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSchema {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
}

const fn field(name: &'static str, field_type: FieldType, required: bool) -> FieldSchema {
    FieldSchema {
        name,
        field_type,
        required,
    }
}

/// Columns of a report sink, in order.
pub const REPORT_SCHEMA: &[FieldSchema] = &[
    field("id", FieldType::String, true),
    field("owner", FieldType::String, true),
    field("repo", FieldType::String, true),
    field("ref", FieldType::String, true),
    field("commit", FieldType::String, true),
    field("coverage_total", FieldType::Integer, false),
    field("coverage_covered", FieldType::Integer, false),
    field("code_to_test_ratio_code", FieldType::Integer, false),
    field("code_to_test_ratio_test", FieldType::Integer, false),
    field("test_execution_time", FieldType::Float, false),
    field("timestamp", FieldType::Timestamp, true),
    field("raw", FieldType::String, true),
];

// ============================================================================
// Record ID
// ============================================================================

/// Identifier of a stored record.
///
/// Wraps a UUID v7 string. The leading timestamp makes ids sort in
/// creation order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(String);

impl RecordId {
    /// Generate a new time-ordered id.
    ///
    /// # Example
    ///
    /// ```
    /// use covtrack::datastore::RecordId;
    ///
    /// let id = RecordId::generate();
    /// assert_eq!(id.as_str().len(), 36);
    /// assert_ne!(id, RecordId::generate());
    /// ```
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Report Record
// ============================================================================

/// A report flattened into a single row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub id: RecordId,
    pub owner: String,
    pub repo: String,
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub commit: String,
    pub coverage_total: Option<i64>,
    pub coverage_covered: Option<i64>,
    pub code_to_test_ratio_code: Option<i64>,
    pub code_to_test_ratio_test: Option<i64>,
    pub test_execution_time: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub raw: String,
}

impl ReportRecord {
    /// Flatten a report with a freshly generated id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRepository` if the repository is not `owner/repo`,
    /// `ValueOutOfRange` if a line count does not fit an integer column, or
    /// a JSON error if the raw payload cannot be serialized.
    pub fn from_report(report: &Report) -> Result<Self> {
        let (owner, repo) = report.owner_repo()?;
        let coverage = report.coverage();
        let ratio = report.code_to_test_ratio();

        Ok(Self {
            id: RecordId::generate(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            ref_name: report.ref_name().to_string(),
            commit: report.commit().to_string(),
            coverage_total: coverage.map(|c| to_column("coverage_total", c.total)).transpose()?,
            coverage_covered: coverage
                .map(|c| to_column("coverage_covered", c.covered))
                .transpose()?,
            code_to_test_ratio_code: ratio
                .map(|r| to_column("code_to_test_ratio_code", r.code))
                .transpose()?,
            code_to_test_ratio_test: ratio
                .map(|r| to_column("code_to_test_ratio_test", r.test))
                .transpose()?,
            test_execution_time: report.test_execution_time(),
            timestamp: report.timestamp(),
            raw: report.raw()?,
        })
    }
}

fn to_column(field: &'static str, value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| CovtrackError::ValueOutOfRange { field, value })
}

// ============================================================================
// Datastore
// ============================================================================

/// A destination for flattened report records.
///
/// Implementations wrap a concrete store (a warehouse table, a file). Calls
/// may block on the network; callers bound them with [`store_report`]'s
/// timeout.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Create the named sink with [`REPORT_SCHEMA`].
    ///
    /// Creating a sink that already exists with the same schema succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the schema.
    async fn create_sink(&self, name: &str) -> Result<()>;

    /// Append one record to the named sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink does not exist or the write fails.
    async fn store(&self, sink: &str, record: &ReportRecord) -> Result<()>;
}

/// Result of [`store_report`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOutcome {
    /// The record was appended.
    Stored { id: RecordId },
    /// The report was not stored because its repository could not be split.
    Skipped { reason: String },
}

impl StoreOutcome {
    #[must_use]
    pub fn is_stored(&self) -> bool {
        matches!(self, StoreOutcome::Stored { .. })
    }
}

/// Validate, flatten and store a report.
///
/// A repository that is not `owner/repo` does not fail the call: collection
/// should not be blocked by a malformed slug, so the report is skipped with a
/// warning and a [`StoreOutcome::Skipped`] carrying the reason. Every other
/// failure, including the timeout, is returned.
///
/// Each call generates a new record id, so retrying after an ambiguous
/// failure may store the report twice.
pub async fn store_report(
    datastore: &dyn Datastore,
    sink: &str,
    report: &Report,
    timeout: Duration,
) -> Result<StoreOutcome> {
    report.validate()?;

    let record = match ReportRecord::from_report(report) {
        Ok(record) => record,
        Err(e @ CovtrackError::InvalidRepository { .. }) => {
            warn!("Skipping report store (non-fatal): {}", e);
            return Ok(StoreOutcome::Skipped {
                reason: e.to_string(),
            });
        }
        Err(e) => return Err(e),
    };

    debug!(sink, id = %record.id, "Storing report record");
    tokio::time::timeout(timeout, datastore.store(sink, &record))
        .await
        .map_err(|_| CovtrackError::Timeout {
            operation: format!("store into sink '{}'", sink),
            secs: timeout.as_secs(),
        })??;

    info!(
        sink,
        id = %record.id,
        repository = report.repository(),
        commit = report.commit(),
        "Stored report"
    );
    Ok(StoreOutcome::Stored { id: record.id })
}

// ============================================================================
// Tests
// ============================================================================
