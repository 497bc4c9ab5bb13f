//! File-backed datastore.
//!
//! Each sink is a pair of files in the storage directory: `<name>.schema.json`
//! holding the column schema and `<name>.jsonl` holding one record per line.

use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::{Datastore, ReportRecord, REPORT_SCHEMA};
use crate::error::{CovtrackError, Result};
use crate::report::Report;

/// Datastore writing JSON Lines files into a directory.
#[derive(Debug, Clone)]
pub struct LocalDatastore {
    storage_dir: PathBuf,
}

impl LocalDatastore {
    /// Create a datastore rooted at `storage_dir`.
    ///
    /// The directory is created when the first sink is.
    #[must_use]
    pub fn new(storage_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: storage_dir.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    fn schema_path(&self, sink: &str) -> PathBuf {
        self.storage_dir.join(format!("{}.schema.json", sink))
    }

    fn data_path(&self, sink: &str) -> PathBuf {
        self.storage_dir.join(format!("{}.jsonl", sink))
    }

    /// Read every record of a sink in insertion order.
    ///
    /// Lines that fail to parse are skipped with a warning.
    pub async fn records(&self, sink: &str) -> Result<Vec<ReportRecord>> {
        validate_sink_name(sink)?;
        self.ensure_sink(sink).await?;

        let path = self.data_path(sink);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to read sink: {}", path.display()))
                    .into())
            }
        };

        let mut records = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ReportRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping corrupted record {}:{}: {}", path.display(), line_no + 1, e),
            }
        }
        Ok(records)
    }

    /// Most recent stored report for the same owner, repository and ref.
    ///
    /// Records are ordered by snapshot timestamp, then by id.
    pub async fn latest_for(&self, sink: &str, report: &Report) -> Result<Option<Report>> {
        let (owner, repo) = report.owner_repo()?;
        let latest = self
            .records(sink)
            .await?
            .into_iter()
            .filter(|r| r.owner == owner && r.repo == repo && r.ref_name == report.ref_name())
            .max_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

        latest.map(|record| Report::from_json(&record.raw)).transpose()
    }

    async fn ensure_sink(&self, sink: &str) -> Result<()> {
        if fs::try_exists(self.schema_path(sink)).await? {
            Ok(())
        } else {
            Err(CovtrackError::SinkNotFound {
                name: sink.to_string(),
            })
        }
    }
}

fn validate_sink_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(CovtrackError::invalid_config(
            "sink",
            format!("'{}' must be non-empty and use only [A-Za-z0-9_-]", name),
        ))
    }
}

#[async_trait]
impl Datastore for LocalDatastore {
    async fn create_sink(&self, name: &str) -> Result<()> {
        validate_sink_name(name)?;
        fs::create_dir_all(&self.storage_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create datastore directory: {}",
                    self.storage_dir.display()
                )
            })?;

        let schema = serde_json::to_value(REPORT_SCHEMA)?;
        let path = self.schema_path(name);
        if fs::try_exists(&path).await? {
            let existing: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).await?)?;
            if existing != schema {
                return Err(CovtrackError::SchemaMismatch {
                    name: name.to_string(),
                });
            }
            debug!("Sink already exists: {}", name);
            return Ok(());
        }

        fs::write(&path, serde_json::to_string_pretty(&schema)?).await?;
        info!("Created sink {} in {}", name, self.storage_dir.display());
        Ok(())
    }

    async fn store(&self, sink: &str, record: &ReportRecord) -> Result<()> {
        validate_sink_name(sink)?;
        self.ensure_sink(sink).await?;

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let path = self.data_path(sink);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open sink: {}", path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::{store_report, StoreOutcome};
    use chrono::{DateTime, TimeZone, Utc};
    use std::time::Duration;
    use tempfile::TempDir;

    fn report_at(commit: &str, hour: u32) -> Report {
        Report::new(
            "owner/repo",
            "main",
            commit,
            Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap(),
        )
        .with_coverage(100, 80)
    }

    #[tokio::test]
    async fn test_create_sink_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let datastore = LocalDatastore::new(temp.path().join("store"));

        datastore.create_sink("reports").await.unwrap();
        datastore.create_sink("reports").await.unwrap();

        assert!(temp.path().join("store/reports.schema.json").exists());
    }

    #[tokio::test]
    async fn test_create_sink_rejects_different_schema() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("reports.schema.json"), r#"[{"name":"id"}]"#).unwrap();
        let datastore = LocalDatastore::new(temp.path());

        let err = datastore.create_sink("reports").await.unwrap_err();
        assert!(matches!(err, CovtrackError::SchemaMismatch { .. }));
    }

    #[tokio::test]
    async fn test_create_sink_rejects_bad_names() {
        let temp = TempDir::new().unwrap();
        let datastore = LocalDatastore::new(temp.path());
        for name in ["", "../escape", "a b"] {
            let err = datastore.create_sink(name).await.unwrap_err();
            assert!(matches!(err, CovtrackError::InvalidConfig { .. }), "{name:?}");
        }
    }

    #[tokio::test]
    async fn test_store_requires_sink() {
        let temp = TempDir::new().unwrap();
        let datastore = LocalDatastore::new(temp.path());
        let record = ReportRecord::from_report(&report_at("abc", 10)).unwrap();

        let err = datastore.store("reports", &record).await.unwrap_err();
        assert!(matches!(err, CovtrackError::SinkNotFound { .. }));
    }

    #[tokio::test]
    async fn test_store_appends_lines() {
        let temp = TempDir::new().unwrap();
        let datastore = LocalDatastore::new(temp.path());
        datastore.create_sink("reports").await.unwrap();

        for (commit, hour) in [("aaa", 10), ("bbb", 11)] {
            let outcome = store_report(
                &datastore,
                "reports",
                &report_at(commit, hour),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
            assert!(outcome.is_stored());
        }

        let records = datastore.records("reports").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].commit, "aaa");
        assert_eq!(records[1].coverage_total, Some(100));

        let content = std::fs::read_to_string(temp.path().join("reports.jsonl")).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_records_skips_corrupted_lines() {
        let temp = TempDir::new().unwrap();
        let datastore = LocalDatastore::new(temp.path());
        datastore.create_sink("reports").await.unwrap();
        let record = ReportRecord::from_report(&report_at("abc", 10)).unwrap();
        datastore.store("reports", &record).await.unwrap();

        let path = temp.path().join("reports.jsonl");
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("not json\n");
        std::fs::write(&path, content).unwrap();

        let records = datastore.records("reports").await.unwrap();
        assert_eq!(records, vec![record]);
    }

    #[tokio::test]
    async fn test_latest_for_matches_repository_and_ref() {
        let temp = TempDir::new().unwrap();
        let datastore = LocalDatastore::new(temp.path());
        datastore.create_sink("reports").await.unwrap();

        let other_ref = Report::new(
            "owner/repo",
            "feature",
            "fff",
            Utc.with_ymd_and_hms(2024, 1, 15, 23, 0, 0).unwrap(),
        );
        for report in [report_at("late", 12), report_at("early", 9), other_ref] {
            let record = ReportRecord::from_report(&report).unwrap();
            datastore.store("reports", &record).await.unwrap();
        }

        let current = report_at("current", 13);
        let previous = datastore.latest_for("reports", &current).await.unwrap().unwrap();
        assert_eq!(previous.commit(), "late");
        assert_eq!(previous.coverage_percent(), Some(80.0));

        let unseen = Report::new("other/repo", "main", "x", DateTime::<Utc>::default());
        assert!(datastore.latest_for("reports", &unseen).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_report_skip_leaves_sink_untouched() {
        let temp = TempDir::new().unwrap();
        let datastore = LocalDatastore::new(temp.path());
        datastore.create_sink("reports").await.unwrap();

        let malformed = Report::new(
            "noslash",
            "main",
            "abc",
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap(),
        );
        let outcome = store_report(&datastore, "reports", &malformed, Duration::from_secs(5))
            .await
            .unwrap();

        assert!(matches!(outcome, StoreOutcome::Skipped { .. }));
        assert!(datastore.records("reports").await.unwrap().is_empty());
    }
}
