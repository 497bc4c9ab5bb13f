//! covtrack - coverage and custom metric reports
//!
//! Validates report snapshots collected in CI, compares them across commits,
//! renders the comparison as markdown and persists flattened records.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`report`] - Reports, metric sets, diffs and markdown rendering
//! - [`datastore`] - Flattened records and the sinks that store them
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Custom error types and handling
//!
//! # Example
//!
//! ```rust,ignore
//! use covtrack::{Renderer, RenderConfig, Report};
//!
//! let before = Report::load("before.json")?;
//! let after = Report::load("after.json")?;
//! after.validate()?;
//!
//! let diff = after.compare(Some(&before));
//! let renderer = Renderer::new(RenderConfig::new("https://github.com", "owner/repo"));
//! renderer.write_report_diff(&diff, &mut std::io::stdout())?;
//! ```

pub mod config;
pub mod datastore;
pub mod error;
pub mod report;

// Re-export commonly used types
pub use error::{CovtrackError, Result};

// Re-export config types
pub use config::{Config, DatastoreConfig, CONFIG_FILE};

// Re-export report types
pub use report::{
    split_repository, CodeToTestRatio, Coverage, DiffEntry, DiffStatus, Metric, MetricDiff,
    MetricSet, RenderConfig, Renderer, Report, ReportContext, ReportDiff, SUMMARY_SET_KEY,
};

// Re-export datastore types
pub use datastore::{
    store_report, Datastore, LocalDatastore, RecordId, ReportRecord, StoreOutcome, REPORT_SCHEMA,
};
