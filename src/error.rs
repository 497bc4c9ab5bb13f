//! Custom error types for covtrack.
//!
//! Validation failures, repository identity problems, datastore failures and
//! wrapped I/O errors all flow through [`CovtrackError`] so callers can decide
//! whether to drop, log or reject upstream data.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for covtrack operations
#[derive(Error, Debug)]
pub enum CovtrackError {
    // =========================================================================
    // Validation Errors
    // =========================================================================
    /// Metric set has no key
    #[error("metric set key is required")]
    KeyRequired,

    /// Metric set has no metrics
    #[error("metric set must contain at least one metric")]
    MetricsRequired,

    /// A metric inside a set has no key
    #[error("metric key is required (metric #{index})")]
    MetricKeyRequired { index: usize },

    /// Report has no repository
    #[error("report repository is required")]
    RepositoryRequired,

    /// Report has no ref
    #[error("report ref is required")]
    RefRequired,

    /// Report has no commit
    #[error("report commit is required")]
    CommitRequired,

    /// Report timestamp is the zero value
    #[error("report timestamp is required")]
    TimestampRequired,

    /// One of the report's metric sets is invalid
    #[error("invalid metric set '{key}': {source}")]
    InvalidMetricSet {
        key: String,
        #[source]
        source: Box<CovtrackError>,
    },

    // =========================================================================
    // Identity and Comparison Errors
    // =========================================================================
    /// Repository string is not of the form owner/repo
    #[error("invalid repository '{repository}': expected owner/repo")]
    InvalidRepository { repository: String },

    /// Strict comparison of two sets with different keys
    #[error("cannot compare metric set '{before}' with '{after}'")]
    KeyMismatch { before: String, after: String },

    /// Value does not fit the record column type
    #[error("{field} value {value} is out of range")]
    ValueOutOfRange { field: &'static str, value: u64 },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    // =========================================================================
    // Datastore Errors
    // =========================================================================
    /// Sink has not been created
    #[error("sink '{name}' does not exist")]
    SinkNotFound { name: String },

    /// Existing sink carries a different schema
    #[error("sink '{name}' exists with an incompatible schema")]
    SchemaMismatch { name: String },

    /// Datastore call did not finish in time
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML error wrapper
    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CovtrackError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid repository error
    pub fn invalid_repository(repository: impl Into<String>) -> Self {
        Self::InvalidRepository {
            repository: repository.into(),
        }
    }

    /// Wrap a metric set validation failure with the set key
    pub fn invalid_metric_set(key: impl Into<String>, source: CovtrackError) -> Self {
        Self::InvalidMetricSet {
            key: key.into(),
            source: Box::new(source),
        }
    }

    /// Check if this error came from validating a report or metric set
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::KeyRequired
                | Self::MetricsRequired
                | Self::MetricKeyRequired { .. }
                | Self::RepositoryRequired
                | Self::RefRequired
                | Self::CommitRequired
                | Self::TimestampRequired
                | Self::InvalidMetricSet { .. }
        )
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            e if e.is_validation() => 2,
            Self::InvalidRepository { .. } | Self::KeyMismatch { .. } => 3,
            Self::Config { .. } | Self::InvalidConfig { .. } | Self::Toml(_) => 7,
            Self::SinkNotFound { .. } | Self::SchemaMismatch { .. } | Self::Timeout { .. } => 8,
            _ => 1,
        }
    }
}

/// Type alias for covtrack results
pub type Result<T> = std::result::Result<T, CovtrackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CovtrackError::MetricKeyRequired { index: 3 };
        assert!(err.to_string().contains("#3"));

        let err = CovtrackError::invalid_repository("nope");
        assert!(err.to_string().contains("nope"));
        assert!(err.to_string().contains("owner/repo"));
    }

    #[test]
    fn test_invalid_metric_set_keeps_source() {
        let err = CovtrackError::invalid_metric_set("bench", CovtrackError::MetricsRequired);
        assert!(err.to_string().contains("bench"));
        assert!(err.to_string().contains("at least one metric"));

        let source = std::error::Error::source(&err).expect("source");
        assert!(source.to_string().contains("at least one metric"));
    }

    #[test]
    fn test_is_validation() {
        assert!(CovtrackError::KeyRequired.is_validation());
        assert!(CovtrackError::TimestampRequired.is_validation());
        assert!(CovtrackError::invalid_metric_set("k", CovtrackError::KeyRequired).is_validation());
        assert!(!CovtrackError::invalid_repository("x").is_validation());
        assert!(!CovtrackError::config("x").is_validation());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(CovtrackError::MetricsRequired.exit_code(), 2);
        assert_eq!(CovtrackError::invalid_repository("x").exit_code(), 3);
        assert_eq!(CovtrackError::config("test").exit_code(), 7);
        assert_eq!(
            CovtrackError::SinkNotFound {
                name: "reports".into()
            }
            .exit_code(),
            8
        );
    }

    #[test]
    fn test_config_with_path() {
        let path = PathBuf::from("/test/covtrack.toml");
        let err = CovtrackError::config_with_path("failed to parse", path.clone());
        if let CovtrackError::Config {
            message,
            path: opt_path,
        } = err
        {
            assert_eq!(message, "failed to parse");
            assert_eq!(opt_path, Some(path));
        } else {
            panic!("Wrong error variant");
        }
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: CovtrackError = io_err.into();
        assert!(matches!(err, CovtrackError::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }
}
