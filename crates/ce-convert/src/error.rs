//! Error types for storage conversion.

use std::str::Utf8Error;

/// Catastrophic conversion failure: the storage body could not be parsed.
///
/// Macro-level problems never surface here; they are contained by the
/// fallback policy and reported as [`ConversionWarning`](crate::ConversionWarning)s.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConvertError {
    /// Storage markup is not well-formed XML.
    #[error("storage markup is not well-formed")]
    XmlParse(#[from] quick_xml::Error),

    /// UTF-8 decoding error.
    #[error("UTF-8 error")]
    Utf8(#[from] Utf8Error),

    /// Malformed attribute.
    #[error("XML attribute error")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    /// Encoding error during XML parsing.
    #[error("encoding error")]
    Encoding(#[from] quick_xml::encoding::EncodingError),

    /// Elements nest deeper than the parser accepts.
    #[error("storage markup nests elements deeper than {limit} levels")]
    TooDeep { limit: usize },
}

/// Classification of a contained macro failure.
///
/// Matched exhaustively wherever a fallback is applied so new failure modes
/// cannot slip through unlogged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacroErrorKind {
    /// No processor recognizes the macro.
    Unsupported,
    /// The macro type is blacklisted.
    Blacklisted,
    /// The macro instance is already being resolved further up the stack.
    Recursive,
    /// Macro nesting exceeded the configured depth.
    DepthExceeded,
    /// A processor rejected the element or failed while rendering it.
    ProcessorFailed,
    /// An include target could not be fetched.
    IncludeFailed,
}

impl MacroErrorKind {
    /// Short stable label used in logs and annotations.
    pub fn label(self) -> &'static str {
        match self {
            Self::Unsupported => "unsupported",
            Self::Blacklisted => "blacklisted",
            Self::Recursive => "recursive",
            Self::DepthExceeded => "depth-exceeded",
            Self::ProcessorFailed => "processor-failed",
            Self::IncludeFailed => "include-failed",
        }
    }
}

/// Failure while resolving a single macro.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MacroError {
    /// No processor recognizes the macro.
    #[error("no processor for macro '{0}'")]
    Unsupported(String),

    /// The macro type is blacklisted.
    #[error("macro '{0}' is blacklisted")]
    Blacklisted(String),

    /// The macro instance is already being resolved.
    #[error("recursive macro: '{0}' is already being resolved")]
    Recursive(String),

    /// Nesting exceeded the configured maximum.
    #[error("macro nesting depth {depth} exceeds limit {limit}")]
    DepthExceeded { depth: usize, limit: usize },

    /// Processor failure.
    #[error("{0}")]
    Failed(String),

    /// Include target could not be resolved.
    #[error("cannot include {target}: {message}")]
    Include { target: String, message: String },
}

impl MacroError {
    /// Processor failure with a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Include failure for the given target description.
    pub fn include(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Include {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Classify this failure.
    pub fn kind(&self) -> MacroErrorKind {
        match self {
            Self::Unsupported(_) => MacroErrorKind::Unsupported,
            Self::Blacklisted(_) => MacroErrorKind::Blacklisted,
            Self::Recursive(_) => MacroErrorKind::Recursive,
            Self::DepthExceeded { .. } => MacroErrorKind::DepthExceeded,
            Self::Failed(_) => MacroErrorKind::ProcessorFailed,
            Self::Include { .. } => MacroErrorKind::IncludeFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            MacroError::Recursive("include{pageId=1}".to_owned()).kind(),
            MacroErrorKind::Recursive
        );
        assert_eq!(
            MacroError::DepthExceeded { depth: 6, limit: 5 }.kind(),
            MacroErrorKind::DepthExceeded
        );
        assert_eq!(
            MacroError::include("page 7", "not found").kind(),
            MacroErrorKind::IncludeFailed
        );
    }

    #[test]
    fn test_display() {
        let err = MacroError::DepthExceeded { depth: 6, limit: 5 };
        assert_eq!(err.to_string(), "macro nesting depth 6 exceeds limit 5");
        let err = MacroError::include("page 7", "not found");
        assert_eq!(err.to_string(), "cannot include page 7: not found");
    }
}
