//! Classified page source errors.

/// Semantic error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SourceErrorKind {
    /// Page or attachment does not exist.
    NotFound,
    /// Credentials rejected or access denied.
    PermissionDenied,
    /// Transport failure or server-side error.
    Network,
    /// Request timed out.
    Timeout,
    /// Malformed response or other failure.
    Other,
}

impl SourceErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "Not found",
            Self::PermissionDenied => "Permission denied",
            Self::Network => "Network error",
            Self::Timeout => "Timeout",
            Self::Other => "Error",
        }
    }

    fn default_status(self) -> ErrorStatus {
        match self {
            Self::Timeout => ErrorStatus::Temporary,
            Self::Network => ErrorStatus::Persistent,
            Self::NotFound | Self::PermissionDenied | Self::Other => ErrorStatus::Permanent,
        }
    }
}

/// Retry guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorStatus {
    /// Don't retry (not found, permission denied, malformed data).
    #[default]
    Permanent,
    /// Retry immediately (timeout, connection reset).
    Temporary,
    /// Retry with backoff (rate limited, service unavailable).
    Persistent,
}

/// Page source error with semantic kind and backend-specific source.
#[derive(Debug)]
pub struct SourceError {
    /// Semantic error category.
    pub kind: SourceErrorKind,
    /// Retry guidance.
    pub status: ErrorStatus,
    /// Page the request was about (if applicable).
    pub page_id: Option<String>,
    /// Backend identifier (e.g., "Confluence", "Mock").
    pub backend: Option<&'static str>,
    message: Option<String>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl SourceError {
    /// Create an error of `kind` with the kind's default retry status.
    #[must_use]
    pub fn new(kind: SourceErrorKind) -> Self {
        Self {
            kind,
            status: kind.default_status(),
            page_id: None,
            backend: None,
            message: None,
            source: None,
        }
    }

    /// Attach page context.
    #[must_use]
    pub fn with_page(mut self, page_id: impl Into<String>) -> Self {
        self.page_id = Some(page_id.into());
        self
    }

    /// Attach backend identifier.
    #[must_use]
    pub fn with_backend(mut self, backend: &'static str) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set retry status.
    #[must_use]
    pub fn with_status(mut self, status: ErrorStatus) -> Self {
        self.status = status;
        self
    }

    /// Attach a human-readable detail.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach the underlying error source.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Downcast the source error to a concrete type.
    #[must_use]
    pub fn downcast_source<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.source.as_ref()?.downcast_ref()
    }

    /// Create a not found error for a page.
    #[must_use]
    pub fn not_found(page_id: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::NotFound).with_page(page_id)
    }

    /// Whether retrying the request may succeed.
    pub fn is_transient(&self) -> bool {
        self.status != ErrorStatus::Permanent
    }
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Format: "[Backend] Kind: detail (page: 123)"
        if let Some(backend) = self.backend {
            write!(f, "[{backend}] ")?;
        }
        write!(f, "{}", self.kind.as_str())?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        } else if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        if let Some(page_id) = &self.page_id {
            write!(f, " (page: {page_id})")?;
        }
        Ok(())
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_display_full() {
        let err = SourceError::not_found("42")
            .with_backend("Confluence")
            .with_message("no such page");
        assert_eq!(
            err.to_string(),
            "[Confluence] Not found: no such page (page: 42)"
        );
    }

    #[test]
    fn test_display_with_source() {
        let io = std::io::Error::other("connection reset");
        let err = SourceError::new(SourceErrorKind::Network).with_source(io);
        assert_eq!(err.to_string(), "Network error: connection reset");
        assert!(err.downcast_source::<std::io::Error>().is_some());
    }

    #[test]
    fn test_default_status_by_kind() {
        assert!(!SourceError::not_found("1").is_transient());
        assert!(!SourceError::new(SourceErrorKind::PermissionDenied).is_transient());
        assert!(SourceError::new(SourceErrorKind::Network).is_transient());
        assert_eq!(
            SourceError::new(SourceErrorKind::Timeout).status,
            ErrorStatus::Temporary
        );
    }

    #[test]
    fn test_status_override() {
        let err = SourceError::new(SourceErrorKind::Network).with_status(ErrorStatus::Permanent);
        assert!(!err.is_transient());
    }
}
