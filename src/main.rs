//! covtrack - coverage and custom metric reports
//!
//! Validates, compares, renders and stores report snapshots produced in CI.

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::Write;
use std::path::{Path, PathBuf};

use covtrack::datastore::{store_report, Datastore, LocalDatastore, StoreOutcome};
use covtrack::{Config, CovtrackError, MetricDiff, Renderer, Report, CONFIG_FILE};

#[derive(Parser)]
#[command(name = "covtrack")]
#[command(version)]
#[command(about = "Validate, compare and store coverage and metric reports", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Code host base URL used for links
    #[arg(long, global = true, env = "GITHUB_SERVER_URL", value_name = "URL")]
    server_url: Option<String>,

    /// Repository slug (owner/repo) used for links
    #[arg(long, global = true, env = "GITHUB_REPOSITORY", value_name = "OWNER/REPO")]
    repository: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that report files are complete and well formed
    Validate {
        /// Report JSON files
        #[arg(required = true)]
        reports: Vec<PathBuf>,
    },

    /// Render a report as markdown
    Show {
        /// Report JSON file
        report: PathBuf,

        /// Only render the custom metric set with this key
        #[arg(long, value_name = "KEY")]
        set: Option<String>,
    },

    /// Compare two reports
    Diff {
        /// Earlier report
        before: PathBuf,

        /// Later report
        after: PathBuf,

        /// Only compare the custom metric set with this key
        #[arg(long, value_name = "KEY")]
        set: Option<String>,

        /// Output JSON instead of markdown
        #[arg(long)]
        json: bool,
    },

    /// Compare a report with the latest stored report for its ref
    Compare {
        /// Report JSON file
        report: PathBuf,

        /// Sink to read from (defaults to the configured sink)
        #[arg(long, value_name = "NAME")]
        sink: Option<String>,

        /// Output JSON instead of markdown
        #[arg(long)]
        json: bool,
    },

    /// Manage datastore sinks
    Sink {
        #[command(subcommand)]
        action: SinkAction,
    },

    /// Validate a report and append it to a sink
    Store {
        /// Report JSON file
        report: PathBuf,

        /// Sink to append to (defaults to the configured sink)
        #[arg(long, value_name = "NAME")]
        sink: Option<String>,
    },
}

#[derive(Subcommand)]
enum SinkAction {
    /// Create a sink with the report schema
    Create {
        /// Sink name (defaults to the configured sink)
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "covtrack=debug,info"
    } else {
        "covtrack=info,warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        let code = e
            .downcast_ref::<CovtrackError>()
            .map_or(1, CovtrackError::exit_code);
        std::process::exit(code);
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(&cli.config)?.with_render_overrides(cli.server_url, cli.repository);
    config.validate()?;
    let renderer = Renderer::new(config.render.clone());

    match cli.command {
        Commands::Validate { reports } => validate_reports(&reports),

        Commands::Show { report, set } => {
            let report = Report::load(&report)?;
            let mut out = std::io::stdout().lock();
            match set {
                Some(key) => {
                    let set = report
                        .metric_set(&key)
                        .with_context(|| format!("No metric set '{}' in report", key))?;
                    renderer.write_metric_set(set, &mut out)?;
                }
                None => renderer.write_report(&report, &mut out)?,
            }
            Ok(())
        }

        Commands::Diff {
            before,
            after,
            set,
            json,
        } => {
            let before = load_and_validate(&before)?;
            let after = load_and_validate(&after)?;
            match set {
                Some(key) => {
                    let diff = set_diff(&before, &after, &key)?;
                    print_diff(json, &diff, |out| renderer.write_diff(&diff, out))
                }
                None => {
                    let diff = after.compare(Some(&before));
                    print_diff(json, &diff, |out| renderer.write_report_diff(&diff, out))
                }
            }
        }

        Commands::Compare { report, sink, json } => {
            let report = load_and_validate(&report)?;
            let sink = sink.unwrap_or_else(|| config.datastore.sink.clone());
            let datastore = LocalDatastore::new(&config.datastore.path);
            let previous = datastore.latest_for(&sink, &report).await?;
            if previous.is_none() {
                eprintln!(
                    "{} No stored report for {} at {}",
                    "Note:".yellow(),
                    report.repository(),
                    report.ref_name()
                );
            }
            let diff = report.compare(previous.as_ref());
            print_diff(json, &diff, |out| renderer.write_report_diff(&diff, out))
        }

        Commands::Sink { action } => match action {
            SinkAction::Create { name } => {
                let name = name.unwrap_or_else(|| config.datastore.sink.clone());
                let datastore = LocalDatastore::new(&config.datastore.path);
                datastore.create_sink(&name).await?;
                println!(
                    "{} Sink {} ready in {}",
                    "OK".green().bold(),
                    name.bold(),
                    datastore.storage_dir().display()
                );
                Ok(())
            }
        },

        Commands::Store { report, sink } => {
            let report = Report::load(&report)?;
            let sink = sink.unwrap_or_else(|| config.datastore.sink.clone());
            let datastore = LocalDatastore::new(&config.datastore.path);
            let outcome =
                store_report(&datastore, &sink, &report, config.datastore.timeout()).await?;
            match outcome {
                StoreOutcome::Stored { id } => {
                    println!("{} Stored {} as {}", "OK".green().bold(), report.commit(), id);
                }
                StoreOutcome::Skipped { reason } => {
                    println!("{} Skipped: {}", "Warning:".yellow().bold(), reason);
                }
            }
            Ok(())
        }
    }
}

/// Validate every file, then fail with the first error's exit code.
fn validate_reports(paths: &[PathBuf]) -> anyhow::Result<()> {
    let mut first_failure: Option<CovtrackError> = None;
    for path in paths {
        match load_and_validate(path) {
            Ok(_) => println!("{} {}", "OK".green().bold(), path.display()),
            Err(e) => {
                println!("{} {}: {}", "FAIL".red().bold(), path.display(), e);
                first_failure.get_or_insert(e);
            }
        }
    }
    match first_failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn load_and_validate(path: &Path) -> covtrack::Result<Report> {
    let report = Report::load(path)?;
    report.validate()?;
    Ok(report)
}

fn set_diff(before: &Report, after: &Report, key: &str) -> anyhow::Result<MetricDiff> {
    let before_set = before.metric_set(key);
    let after_set = after.metric_set(key);
    if before_set.is_none() && after_set.is_none() {
        anyhow::bail!("No metric set '{}' in either report", key);
    }
    Ok(MetricDiff::between(before_set, after_set))
}

fn print_diff<T: serde::Serialize>(
    json: bool,
    diff: &T,
    markdown: impl FnOnce(&mut dyn Write) -> covtrack::Result<()>,
) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(diff)?)?;
    } else {
        markdown(&mut out)?;
    }
    Ok(())
}
