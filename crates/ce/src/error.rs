//! CLI error types.

use ce_config::ConfigError;
use ce_convert::ConvertError;
use ce_export::ExportError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Convert(#[from] ConvertError),

    #[error("{0}")]
    Export(#[from] ExportError),

    #[error("{failed} page(s) failed, {skipped} skipped")]
    Incomplete { failed: usize, skipped: usize },
}
