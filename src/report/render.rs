//! Markdown rendering for metric sets, reports and diffs.
//!
//! Every projection is a pure function of its input. Tables never fail;
//! the `write_*` narrative forms fail only when the writer does.
//!
//! Link targets come from [`RenderConfig`] rather than the process
//! environment. Without a server URL and repository, refs and commits are
//! rendered as plain text.

use serde::{Deserialize, Serialize};
use std::io::Write;

use super::format::{escape_cell, format_delta, format_value, with_unit, ABSENT};
use super::{DiffEntry, MetricDiff, MetricSet, Report, ReportContext, ReportDiff};
use crate::error::Result;

// ============================================================================
// Render Configuration
// ============================================================================

/// Where rendered links point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Base URL of the code host, e.g. `https://github.com`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,

    /// Repository slug as `owner/repo`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

impl RenderConfig {
    /// Create a config that renders links into the given repository.
    #[must_use]
    pub fn new(server_url: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            server_url: Some(server_url.into()),
            repository: Some(repository.into()),
        }
    }

    fn base_url(&self) -> Option<String> {
        match (self.server_url.as_deref(), self.repository.as_deref()) {
            (Some(server), Some(repo)) if !server.is_empty() && !repo.is_empty() => {
                Some(format!("{}/{}", server.trim_end_matches('/'), repo))
            }
            _ => None,
        }
    }

    /// URL of a ref's tree, when links are configured.
    #[must_use]
    pub fn ref_url(&self, ref_name: &str) -> Option<String> {
        self.base_url().map(|base| format!("{}/tree/{}", base, ref_name))
    }

    /// URL of a commit, when links are configured.
    #[must_use]
    pub fn commit_url(&self, commit: &str) -> Option<String> {
        self.base_url().map(|base| format!("{}/commit/{}", base, commit))
    }

    /// URL comparing two commits, when links are configured.
    #[must_use]
    pub fn compare_url(&self, before: &str, after: &str) -> Option<String> {
        self.base_url()
            .map(|base| format!("{}/compare/{}...{}", base, before, after))
    }
}

// ============================================================================
// Markdown Table
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
}

/// Column-padded markdown table.
#[derive(Debug)]
struct MarkdownTable {
    headers: Vec<String>,
    align: Vec<Align>,
    rows: Vec<Vec<String>>,
}

impl MarkdownTable {
    fn new(headers: Vec<String>, align: Vec<Align>) -> Self {
        Self {
            headers,
            align,
            rows: Vec::new(),
        }
    }

    fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    fn render(&self) -> String {
        let widths: Vec<usize> = (0..self.headers.len())
            .map(|col| {
                self.rows
                    .iter()
                    .filter_map(|row| row.get(col))
                    .chain(std::iter::once(&self.headers[col]))
                    .map(|cell| cell.chars().count())
                    .max()
                    .unwrap_or(0)
                    .max(3)
            })
            .collect();

        let mut out = String::new();
        out.push_str(&self.render_row(&self.headers, &widths));

        let separator: Vec<String> = widths
            .iter()
            .zip(&self.align)
            .map(|(&width, align)| match align {
                Align::Left => "-".repeat(width + 2),
                Align::Right => format!("{}:", "-".repeat(width + 1)),
            })
            .collect();
        out.push('|');
        out.push_str(&separator.join("|"));
        out.push_str("|\n");

        for row in &self.rows {
            out.push_str(&self.render_row(row, &widths));
        }
        out
    }

    fn render_row(&self, cells: &[String], widths: &[usize]) -> String {
        let padded: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(col, &width)| {
                let cell = cells.get(col).map(String::as_str).unwrap_or("");
                let pad = " ".repeat(width.saturating_sub(cell.chars().count()));
                match self.align[col] {
                    Align::Left => format!(" {}{} ", cell, pad),
                    Align::Right => format!(" {}{} ", pad, cell),
                }
            })
            .collect();
        format!("|{}|\n", padded.join("|"))
    }
}

// ============================================================================
// Renderer
// ============================================================================

/// Renders metric sets, reports and diffs as markdown.
///
/// # Example
///
/// ```
/// use covtrack::{Metric, MetricSet, RenderConfig, Renderer};
///
/// let set = MetricSet::new("benchmark_0")
///     .with_metric(Metric::new("NsPerOp", 676.5).with_unit(" ns/op"));
/// let table = Renderer::new(RenderConfig::default()).metric_set_table(&set);
/// assert!(table.contains("676.5 ns/op"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    config: RenderConfig,
}

impl Renderer {
    #[must_use]
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Metric sets
    // ------------------------------------------------------------------------

    /// Table of a set's metrics in insertion order.
    ///
    /// An empty or invalid set renders the header and no rows.
    #[must_use]
    pub fn metric_set_table(&self, set: &MetricSet) -> String {
        let mut table = MarkdownTable::new(
            vec!["Metric".to_string(), "Value".to_string()],
            vec![Align::Left, Align::Right],
        );
        for metric in &set.metrics {
            table.push(vec![
                escape_cell(metric.display_name()),
                escape_cell(&with_unit(format_value(metric.value), &metric.unit)),
            ]);
        }
        table.render()
    }

    /// Title, table and report context of a set.
    pub fn write_metric_set(&self, set: &MetricSet, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "## {}", title(set.display_name()))?;
        writeln!(out)?;
        write!(out, "{}", self.metric_set_table(set))?;
        if let Some(context) = set.report_context() {
            writeln!(out)?;
            self.write_context(context, out)?;
        }
        Ok(())
    }

    fn write_context(&self, context: &ReportContext, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "Ref: {}  ", self.ref_label(context))?;
        writeln!(out, "Commit: {}", self.commit_label(context))?;
        Ok(())
    }

    fn ref_label(&self, context: &ReportContext) -> String {
        link(&context.ref_name, self.config.ref_url(&context.ref_name))
    }

    fn commit_label(&self, context: &ReportContext) -> String {
        link(context.short_commit(), self.config.commit_url(&context.commit))
    }

    /// Column header for one side of a diff: `ref (commit)`.
    fn side_label(&self, context: Option<&ReportContext>, fallback: &str) -> String {
        match context {
            Some(context) => format!(
                "{} ({})",
                self.ref_label(context),
                self.commit_label(context)
            ),
            None => fallback.to_string(),
        }
    }

    // ------------------------------------------------------------------------
    // Diffs
    // ------------------------------------------------------------------------

    /// Table with one row per diff entry: name, before, after and delta.
    ///
    /// Missing values and deltas of added or removed metrics render as `—`.
    #[must_use]
    pub fn diff_table(&self, diff: &MetricDiff) -> String {
        let mut table = MarkdownTable::new(
            vec![
                "Metric".to_string(),
                self.side_label(diff.before_context.as_ref(), "Before"),
                self.side_label(diff.after_context.as_ref(), "After"),
                "+/-".to_string(),
            ],
            vec![Align::Left, Align::Right, Align::Right, Align::Right],
        );
        for entry in &diff.entries {
            table.push(diff_row(entry));
        }
        table.render()
    }

    /// Title, compare link and table of a diff.
    pub fn write_diff(&self, diff: &MetricDiff, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "## {}", title(&diff.name))?;
        writeln!(out)?;
        if let Some(url) = self.compare_link(diff.before_context.as_ref(), diff.after_context.as_ref())
        {
            writeln!(out, "[Compare changes]({})", url)?;
            writeln!(out)?;
        }
        write!(out, "{}", self.diff_table(diff))?;
        Ok(())
    }

    fn compare_link(
        &self,
        before: Option<&ReportContext>,
        after: Option<&ReportContext>,
    ) -> Option<String> {
        match (before, after) {
            (Some(b), Some(a)) if b.commit != a.commit => {
                self.config.compare_url(&b.commit, &a.commit)
            }
            _ => None,
        }
    }

    // ------------------------------------------------------------------------
    // Reports
    // ------------------------------------------------------------------------

    /// Table of a report's coverage, code-to-test ratio and test time.
    #[must_use]
    pub fn report_table(&self, report: &Report) -> String {
        self.metric_set_table(&report.summary_set())
    }

    /// Headline, summary table and every custom set of a report.
    pub fn write_report(&self, report: &Report, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "# {}", title(report.repository()))?;
        writeln!(out)?;
        self.write_context(&report.context(), out)?;
        writeln!(
            out,
            "Timestamp: {}",
            report.timestamp().format("%Y-%m-%dT%H:%M:%SZ")
        )?;
        writeln!(out)?;
        write!(out, "{}", self.report_table(report))?;
        for set in report.metric_sets() {
            writeln!(out)?;
            self.write_metric_set(set, out)?;
        }
        Ok(())
    }

    /// Summary diff table of two reports.
    #[must_use]
    pub fn report_diff_table(&self, diff: &ReportDiff) -> String {
        self.diff_table(&diff.summary)
    }

    /// Headline, summary diff and every custom set diff.
    pub fn write_report_diff(&self, diff: &ReportDiff, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "# {}", title(&diff.repository))?;
        writeln!(out)?;
        if let Some(url) = self.compare_link(diff.before_context.as_ref(), diff.after_context.as_ref())
        {
            writeln!(out, "[Compare changes]({})", url)?;
            writeln!(out)?;
        }
        write!(out, "{}", self.report_diff_table(diff))?;
        for set in &diff.metric_sets {
            writeln!(out)?;
            writeln!(out, "## {}", title(&set.name))?;
            writeln!(out)?;
            write!(out, "{}", self.diff_table(set))?;
        }
        Ok(())
    }
}

fn diff_row(entry: &DiffEntry) -> Vec<String> {
    let side = |value: Option<f64>| {
        value
            .map(|v| with_unit(format_value(v), &entry.unit))
            .unwrap_or_else(|| ABSENT.to_string())
    };
    let delta = entry
        .delta()
        .map(|d| with_unit(format_delta(d), &entry.unit))
        .unwrap_or_else(|| ABSENT.to_string());
    vec![
        escape_cell(&entry.name),
        escape_cell(&side(entry.before)),
        escape_cell(&side(entry.after)),
        escape_cell(&delta),
    ]
}

fn link(text: &str, url: Option<String>) -> String {
    match url {
        Some(url) => format!("[{}]({})", text, url),
        None => text.to_string(),
    }
}

fn title(name: &str) -> &str {
    if name.is_empty() {
        "(unnamed)"
    } else {
        name
    }
}

// ============================================================================
// Tests
// ============================================================================
