//! Configuration for covtrack.
//!
//! Settings live in `covtrack.toml`. A missing file yields the defaults;
//! command line flags override individual values afterwards.
//!
//! ```toml
//! [render]
//! server_url = "https://github.com"
//! repository = "owner/repo"
//!
//! [datastore]
//! path = ".covtrack/datastore"
//! sink = "reports"
//! timeout_secs = 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{CovtrackError, Result};
use crate::report::RenderConfig;

/// Default configuration file name.
pub const CONFIG_FILE: &str = "covtrack.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub datastore: DatastoreConfig,
}

/// Where and how reports are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatastoreConfig {
    /// Directory holding the local sinks.
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Sink used when none is given on the command line.
    #[serde(default = "default_sink")]
    pub sink: String,

    /// Upper bound for a single store call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_path() -> PathBuf {
    PathBuf::from(".covtrack/datastore")
}

fn default_sink() -> String {
    "reports".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            sink: default_sink(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl DatastoreConfig {
    /// Store timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// A missing file is not an error and returns [`Config::default`].
    ///
    /// # Errors
    ///
    /// Returns a `Config` error carrying the path if the file cannot be read
    /// or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            CovtrackError::config_with_path(format!("failed to read: {}", e), path.to_path_buf())
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            CovtrackError::config_with_path(format!("failed to parse: {}", e), path.to_path_buf())
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Check values that parse but cannot be used.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a zero timeout or a blank sink name.
    pub fn validate(&self) -> Result<()> {
        if self.datastore.timeout_secs == 0 {
            return Err(CovtrackError::invalid_config(
                "datastore.timeout_secs",
                "must be greater than zero",
            ));
        }
        if self.datastore.sink.trim().is_empty() {
            return Err(CovtrackError::invalid_config(
                "datastore.sink",
                "must not be blank",
            ));
        }
        Ok(())
    }

    /// Override the render settings that were given explicitly.
    #[must_use]
    pub fn with_render_overrides(
        mut self,
        server_url: Option<String>,
        repository: Option<String>,
    ) -> Self {
        if server_url.is_some() {
            self.render.server_url = server_url;
        }
        if repository.is_some() {
            self.render.repository = repository;
        }
        self
    }
}
