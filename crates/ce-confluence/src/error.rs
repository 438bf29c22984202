//! Error types for the Confluence client.

use ce_source::{SourceError, SourceErrorKind};

const BACKEND: &str = "Confluence";

/// Error from Confluence API operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfluenceError {
    /// HTTP request failed (network error, timeout, etc).
    #[error("HTTP request failed")]
    HttpRequest(#[from] ureq::Error),

    /// HTTP response error (server returned error status).
    #[error("HTTP error: {status} - {body}")]
    HttpResponse {
        /// HTTP status code.
        status: u16,
        /// Response body (may contain error details).
        body: String,
    },

    /// Response was well-formed but missing expected content.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl ConfluenceError {
    /// Semantic category of this error.
    pub fn kind(&self) -> SourceErrorKind {
        match self {
            Self::HttpResponse { status, .. } => match status {
                404 => SourceErrorKind::NotFound,
                401 | 403 => SourceErrorKind::PermissionDenied,
                408 | 504 => SourceErrorKind::Timeout,
                429 | 500..=599 => SourceErrorKind::Network,
                _ => SourceErrorKind::Other,
            },
            Self::HttpRequest(err) => match err {
                ureq::Error::Timeout(_) => SourceErrorKind::Timeout,
                ureq::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
                    SourceErrorKind::Timeout
                }
                ureq::Error::Io(_) | ureq::Error::ConnectionFailed | ureq::Error::HostNotFound => {
                    SourceErrorKind::Network
                }
                _ => SourceErrorKind::Other,
            },
            Self::UnexpectedResponse(_) => SourceErrorKind::Other,
        }
    }

    /// Convert into a classified [`SourceError`] about `page_id`.
    pub fn into_source_error(self, page_id: Option<&str>) -> SourceError {
        let mut error = SourceError::new(self.kind()).with_backend(BACKEND);
        if let Some(page_id) = page_id {
            error = error.with_page(page_id);
        }
        match self {
            Self::HttpResponse { status, body } => {
                error.with_message(format!("HTTP {status}: {}", summarize(&body)))
            }
            other => error.with_source(other),
        }
    }
}

/// First line of an error body, shortened for log output.
fn summarize(body: &str) -> String {
    const MAX: usize = 200;
    let line = body.lines().next().unwrap_or_default().trim();
    if line.chars().count() > MAX {
        let cut: String = line.chars().take(MAX).collect();
        format!("{cut}...")
    } else {
        line.to_owned()
    }
}
