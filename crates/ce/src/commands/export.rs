//! `ce export` subcommand group.

use std::path::PathBuf;
use std::sync::Arc;

use ce_config::{CliSettings, Config, FallbackStrategy};
use ce_confluence::ConfluenceClient;
use ce_export::{ExportReport, Exporter, UnitStatus};
use ce_source::PageRef;
use clap::{Args, Subcommand};
use tracing::debug;

use crate::error::CliError;
use crate::output::Output;

/// Export commands.
#[derive(Subcommand)]
pub(crate) enum ExportCommand {
    /// Export a single page by id or `SPACE:Title`.
    Page(PageArgs),
    /// Export a page and its descendants as a directory tree.
    Tree(TreeArgs),
    /// Export several independent pages.
    Batch(BatchArgs),
}

impl ExportCommand {
    /// Execute the export subcommand.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        match self {
            Self::Page(args) => args.execute(),
            Self::Tree(args) => args.execute(),
            Self::Batch(args) => args.execute(),
        }
    }
}

/// Options shared by all export commands. Each overrides `ce.toml`.
#[derive(Args)]
pub(crate) struct ExportOptions {
    /// Output directory.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Replace existing files instead of picking a new name.
    #[arg(long)]
    overwrite: bool,

    /// Write YAML front matter with page metadata.
    #[arg(long)]
    metadata: bool,

    /// Download referenced attachments next to the Markdown.
    #[arg(long)]
    attachments: bool,

    /// Split pages into chapter files at this heading level (1-3).
    #[arg(long, value_name = "LEVEL", num_args = 0..=1, default_missing_value = "2")]
    split_chapters: Option<u8>,

    /// Number of pages processed in parallel.
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Stop dispatching new pages after this many seconds.
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Fallback for unsupported macros.
    #[arg(long)]
    fallback: Option<FallbackStrategy>,

    /// Path to configuration file (default: auto-discover ce.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl ExportOptions {
    fn settings(&self) -> CliSettings {
        CliSettings {
            output_dir: self.output_dir.clone(),
            overwrite: self.overwrite.then_some(true),
            include_metadata: self.metadata.then_some(true),
            preserve_attachments: self.attachments.then_some(true),
            split_chapters: self.split_chapters.map(|_| true),
            chapter_level: self.split_chapters,
            concurrency: self.concurrency,
            timeout_secs: self.timeout,
            fallback: self.fallback,
            ..Default::default()
        }
    }

    /// Load configuration and connect the exporter to Confluence.
    fn connect(&self, settings: &CliSettings) -> Result<(Config, Exporter), CliError> {
        let config = Config::load(self.config.as_deref(), Some(settings))?;
        let confluence = config.require_confluence()?;
        debug!(base_url = %confluence.base_url, "Connecting to Confluence");
        let client = ConfluenceClient::from_config(confluence);
        let exporter = Exporter::new(Arc::new(client), Arc::new(super::converter(&config)));
        Ok((config, exporter))
    }
}

/// Arguments for `ce export page`.
#[derive(Args)]
pub(crate) struct PageArgs {
    /// Page id, or `SPACE:Title`.
    page: String,

    /// Also export the page's descendants.
    #[arg(long)]
    children: bool,

    /// Maximum depth below the page when exporting children.
    #[arg(long)]
    max_depth: Option<usize>,

    #[command(flatten)]
    options: ExportOptions,
}

impl PageArgs {
    fn execute(self) -> Result<(), CliError> {
        let settings = CliSettings {
            include_children: self.children.then_some(true),
            max_depth: self.max_depth,
            ..self.options.settings()
        };
        let (config, exporter) = self.options.connect(&settings)?;
        let report = exporter.export_page(&PageRef::parse(&self.page), &config.export)?;
        finish(&report)
    }
}

/// Arguments for `ce export tree`.
#[derive(Args)]
pub(crate) struct TreeArgs {
    /// Root page id.
    root_id: String,

    /// Maximum depth below the root (root is depth 0).
    #[arg(long)]
    max_depth: Option<usize>,

    #[command(flatten)]
    options: ExportOptions,
}

impl TreeArgs {
    fn execute(self) -> Result<(), CliError> {
        let settings = CliSettings {
            max_depth: self.max_depth,
            ..self.options.settings()
        };
        let (config, exporter) = self.options.connect(&settings)?;
        let report = exporter.export_hierarchy(&self.root_id, &config.export)?;
        finish(&report)
    }
}

/// Arguments for `ce export batch`.
#[derive(Args)]
pub(crate) struct BatchArgs {
    /// Page ids.
    page_ids: Vec<String>,

    /// Read additional page ids from a file, one per line (`#` comments).
    #[arg(long, value_name = "FILE")]
    from_file: Option<PathBuf>,

    #[command(flatten)]
    options: ExportOptions,
}

impl BatchArgs {
    fn execute(self) -> Result<(), CliError> {
        let mut ids = self.page_ids;
        if let Some(path) = &self.from_file {
            ids.extend(parse_id_list(&std::fs::read_to_string(path)?));
        }
        let (config, exporter) = self.options.connect(&self.options.settings())?;
        let report = exporter.batch_export(&ids, &config.export)?;
        finish(&report)
    }
}

/// Page ids from a list file: one per line, blank lines and `#` comments
/// ignored.
fn parse_id_list(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Print the report and turn failed or skipped units into an error.
fn finish(report: &ExportReport) -> Result<(), CliError> {
    let output = Output::new();
    print_report(&output, report);
    if report.is_complete_success() {
        Ok(())
    } else {
        Err(CliError::Incomplete {
            failed: report.failed,
            skipped: report.skipped,
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn print_report(output: &Output, report: &ExportReport) {
    output.separator();
    output.highlight(&format!(
        "Export {} ({})",
        report.run_id,
        report.operation.as_str()
    ));
    for unit in &report.units {
        let name = unit.title.as_deref().unwrap_or(&unit.page_id);
        match &unit.status {
            UnitStatus::Succeeded => {
                output.success(&format!("  ok      {name}"));
                for file in &unit.files {
                    output.detail(&format!("          {}", file.path.display()));
                }
                if !unit.missing_attachments.is_empty() {
                    output.warning(&format!(
                        "          missing attachments: {}",
                        unit.missing_attachments.join(", ")
                    ));
                }
                for (kind, warning) in unit.recursion_warnings() {
                    output.warning(&format!("          {kind}: {}", warning.message));
                }
            }
            UnitStatus::Failed { kind, message } => {
                output.error(&format!("  failed  {name} [{kind}] {message}"));
            }
            UnitStatus::Skipped => output.warning(&format!("  skipped {name}")),
        }
    }
    output.separator();
    output.info(&format!(
        "{} succeeded, {} failed, {} skipped; {} files, {:.1} KB in {:.2}s (concurrency {})",
        report.succeeded,
        report.failed,
        report.skipped,
        report.files_written,
        report.total_bytes as f64 / 1024.0,
        report.elapsed.as_secs_f64(),
        report.concurrency
    ));
    if let Some(delta) = report.memory_delta() {
        output.detail(&format!(
            "Resident memory change: {:+.1} MB",
            delta as f64 / (1024.0 * 1024.0)
        ));
    }
}
