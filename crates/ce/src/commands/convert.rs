//! `ce convert` command implementation.

use std::io::{Read, Write};
use std::path::PathBuf;

use ce_config::{CliSettings, Config, FallbackStrategy};
use ce_convert::{Conversion, PageInfo};
use clap::Args;

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the convert command.
#[derive(Args)]
pub(crate) struct ConvertArgs {
    /// Storage-format file to convert (`-` reads stdin).
    input: PathBuf,

    /// Write Markdown to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Convert as an inline fragment (no block structure).
    #[arg(long)]
    inline: bool,

    /// Page id, used for attachment download links.
    #[arg(long)]
    page_id: Option<String>,

    /// Space key of the page, used for page links.
    #[arg(long)]
    space: Option<String>,

    /// Wiki base URL for absolute page and attachment links.
    #[arg(long, env = "CONFLUENCE_BASE_URL")]
    base_url: Option<String>,

    /// Prefix for attachment links (e.g. `page.assets/`).
    #[arg(long)]
    attachment_prefix: Option<String>,

    /// Fallback for unsupported macros (overrides config).
    #[arg(long)]
    fallback: Option<FallbackStrategy>,

    /// Path to configuration file (default: auto-discover ce.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl ConvertArgs {
    /// Execute the convert command.
    ///
    /// # Errors
    ///
    /// Returns an error if the input cannot be read or is not well-formed.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            fallback: self.fallback,
            ..Default::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        let converter = super::converter(&config);

        let storage = self.read_input()?;
        let page = self.page_info();
        let result = converter.convert(&storage, &page)?;

        match &self.output {
            Some(path) => {
                std::fs::write(path, &result.markdown)?;
                output.success(&format!("Wrote {}", path.display()));
            }
            None => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(result.markdown.as_bytes())?;
                stdout.flush()?;
            }
        }
        print_warnings(&output, &result);
        Ok(())
    }

    fn read_input(&self) -> Result<String, CliError> {
        if self.input.as_os_str() == "-" {
            let mut storage = String::new();
            std::io::stdin().read_to_string(&mut storage)?;
            Ok(storage)
        } else {
            Ok(std::fs::read_to_string(&self.input)?)
        }
    }

    fn page_info(&self) -> PageInfo {
        let mut page = PageInfo::default();
        page.page_id.clone_from(&self.page_id);
        if let Some(space) = &self.space {
            page = page.with_space(space);
        }
        if let Some(base_url) = &self.base_url {
            page = page.with_base_url(base_url);
        }
        if let Some(prefix) = &self.attachment_prefix {
            page = page.with_attachment_prefix(prefix);
        }
        if self.inline {
            page = page.inline();
        }
        page
    }
}

fn print_warnings(output: &Output, result: &Conversion) {
    if result.warnings.is_empty() {
        return;
    }
    output.warning(&format!(
        "{} macro(s) fell back (session {}):",
        result.warnings.len(),
        result.session_id
    ));
    for warning in &result.warnings {
        output.detail(&format!(
            "  - {} [{}]: {}",
            warning.macro_type,
            warning.kind.label(),
            warning.message
        ));
    }
}
