//! CE CLI - Confluence to Markdown export.
//!
//! Provides commands for:
//! - `convert`: Convert a storage-format file to Markdown
//! - `export page`: Export one page, optionally with its children
//! - `export tree`: Export a page hierarchy
//! - `export batch`: Export a list of pages

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{ConvertArgs, ExportCommand};
use output::Output;

/// CE - Confluence storage format to Markdown.
#[derive(Parser)]
#[command(name = "ce", version, about)]
struct Cli {
    /// Enable verbose output (page progress and fallback warnings).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a storage-format file to Markdown.
    Convert(ConvertArgs),
    /// Export pages from Confluence.
    #[command(subcommand)]
    Export(ExportCommand),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Convert(args) => args.execute(),
        Commands::Export(cmd) => cmd.execute(),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::try_parse_from(["ce", "export", "tree", "42", "-v"]).unwrap();
        assert!(cli.verbose);
    }
}
