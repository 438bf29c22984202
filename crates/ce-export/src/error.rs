//! Export error taxonomy.

use std::fmt;
use std::path::PathBuf;

use ce_config::ConfigError;
use ce_convert::{ConvertError, MacroErrorKind};
use ce_source::{SourceError, SourceErrorKind};

/// Classified reason reported for a failed unit or contained macro failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PageNotFound,
    PermissionDenied,
    NetworkError,
    Timeout,
    InvalidParameters,
    ConversionFailed,
    FileWriteError,
    RecursiveMacro,
    RecursionLimitExceeded,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PageNotFound => "PageNotFound",
            Self::PermissionDenied => "PermissionDenied",
            Self::NetworkError => "NetworkError",
            Self::Timeout => "Timeout",
            Self::InvalidParameters => "InvalidParameters",
            Self::ConversionFailed => "ConversionFailed",
            Self::FileWriteError => "FileWriteError",
            Self::RecursiveMacro => "RecursiveMacro",
            Self::RecursionLimitExceeded => "RecursionLimitExceeded",
        }
    }

    /// Report kind of a contained macro failure, for the recursion failures
    /// the taxonomy names.
    pub fn from_macro(kind: MacroErrorKind) -> Option<Self> {
        match kind {
            MacroErrorKind::Recursive => Some(Self::RecursiveMacro),
            MacroErrorKind::DepthExceeded => Some(Self::RecursionLimitExceeded),
            MacroErrorKind::Unsupported
            | MacroErrorKind::Blacklisted
            | MacroErrorKind::ProcessorFailed
            | MacroErrorKind::IncludeFailed => None,
        }
    }

    fn from_source(kind: SourceErrorKind) -> Self {
        match kind {
            SourceErrorKind::NotFound => Self::PageNotFound,
            SourceErrorKind::PermissionDenied => Self::PermissionDenied,
            SourceErrorKind::Timeout => Self::Timeout,
            _ => Self::NetworkError,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Export failure.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ExportError {
    /// Options or page references rejected before any I/O.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Page source failure.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Storage body could not be parsed.
    #[error("conversion failed: {0}")]
    Convert(#[from] ConvertError),

    /// Front matter could not be serialized.
    #[error("metadata serialization failed: {0}")]
    Metadata(#[from] serde_yaml::Error),

    /// File system write failure.
    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ExportError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParameters(_) => ErrorKind::InvalidParameters,
            Self::Source(err) => ErrorKind::from_source(err.kind),
            Self::Convert(_) | Self::Metadata(_) => ErrorKind::ConversionFailed,
            Self::Write { .. } => ErrorKind::FileWriteError,
        }
    }
}

impl From<ConfigError> for ExportError {
    fn from(err: ConfigError) -> Self {
        Self::InvalidParameters(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_source_classification() {
        let err = ExportError::from(SourceError::not_found("1"));
        assert_eq!(err.kind(), ErrorKind::PageNotFound);
        let err = ExportError::from(SourceError::new(SourceErrorKind::Timeout));
        assert_eq!(err.kind(), ErrorKind::Timeout);
        let err = ExportError::from(SourceError::new(SourceErrorKind::Other));
        assert_eq!(err.kind(), ErrorKind::NetworkError);
    }

    #[test]
    fn test_macro_classification() {
        assert_eq!(
            ErrorKind::from_macro(MacroErrorKind::Recursive),
            Some(ErrorKind::RecursiveMacro)
        );
        assert_eq!(
            ErrorKind::from_macro(MacroErrorKind::DepthExceeded),
            Some(ErrorKind::RecursionLimitExceeded)
        );
        assert_eq!(ErrorKind::from_macro(MacroErrorKind::Unsupported), None);
    }

    #[test]
    fn test_config_error_is_invalid_parameters() {
        let err = ExportError::from(ConfigError::Validation("bad".to_owned()));
        assert_eq!(err.kind(), ErrorKind::InvalidParameters);
        assert_eq!(err.to_string(), "invalid parameters: Configuration error: bad");
    }

    #[test]
    fn test_write_error_display() {
        let err = ExportError::Write {
            path: PathBuf::from("out/a.md"),
            source: std::io::Error::other("disk full"),
        };
        assert_eq!(err.kind(), ErrorKind::FileWriteError);
        assert_eq!(err.to_string(), "cannot write out/a.md: disk full");
    }
}
