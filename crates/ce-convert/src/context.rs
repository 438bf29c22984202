//! Per-document conversion state.

use crate::error::{MacroError, MacroErrorKind};

/// Page an include macro points at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludeTarget {
    pub page_id: Option<String>,
    pub title: Option<String>,
    pub space: Option<String>,
}

impl std::fmt::Display for IncludeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.page_id, &self.title, &self.space) {
            (Some(id), _, _) => write!(f, "page {id}"),
            (None, Some(title), Some(space)) => write!(f, "page '{title}' in {space}"),
            (None, Some(title), None) => write!(f, "page '{title}'"),
            (None, None, _) => f.write_str("unspecified page"),
        }
    }
}

/// Source of storage bodies for include macros.
///
/// Closures implement it, which keeps tests and embedders light.
pub trait IncludeResolver: Send + Sync {
    /// Storage body of the target page.
    fn resolve(&self, target: &IncludeTarget) -> Result<String, MacroError>;
}

impl<F> IncludeResolver for F
where
    F: Fn(&IncludeTarget) -> Result<String, MacroError> + Send + Sync,
{
    fn resolve(&self, target: &IncludeTarget) -> Result<String, MacroError> {
        self(target)
    }
}

/// Describes the page being converted and how links should be written.
#[derive(Debug, Clone, Default)]
pub struct PageInfo {
    /// Page identifier, used in logs and attachment download links.
    pub page_id: Option<String>,
    /// Space key, used for page links and title-based includes.
    pub space: Option<String>,
    /// Prefix prepended to attachment file names in links and images.
    pub attachment_prefix: String,
    /// Base URL of the wiki; page links point there when set.
    pub base_url: Option<String>,
    /// Top-level output mode.
    pub mode: crate::element::OutputMode,
    /// Correlation id to reuse; a fresh one is generated when absent.
    pub session_id: Option<String>,
}

impl PageInfo {
    pub fn new(page_id: impl Into<String>) -> Self {
        Self {
            page_id: Some(page_id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_space(mut self, space: impl Into<String>) -> Self {
        self.space = Some(space.into());
        self
    }

    #[must_use]
    pub fn with_attachment_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.attachment_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn inline(mut self) -> Self {
        self.mode = crate::element::OutputMode::Inline;
        self
    }

    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Recoverable problem recorded during conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionWarning {
    pub macro_type: String,
    pub kind: MacroErrorKind,
    pub message: String,
}

/// Mutable state of one top-level conversion.
///
/// Created per call and owned by it; never shared between conversions.
pub(crate) struct ConversionContext<'r> {
    pub(crate) page: &'r PageInfo,
    pub(crate) session_id: String,
    pub(crate) resolver: Option<&'r dyn IncludeResolver>,
    /// Number of macros currently being processed on the stack.
    pub(crate) depth: usize,
    guard: Vec<String>,
    pub(crate) warnings: Vec<ConversionWarning>,
    pub(crate) attachments: Vec<String>,
}

impl<'r> ConversionContext<'r> {
    pub(crate) fn new(page: &'r PageInfo, resolver: Option<&'r dyn IncludeResolver>) -> Self {
        let session_id = page
            .session_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Self {
            page,
            session_id,
            resolver,
            depth: 0,
            guard: Vec::new(),
            warnings: Vec::new(),
            attachments: Vec::new(),
        }
    }

    pub(crate) fn page_id(&self) -> &str {
        self.page.page_id.as_deref().unwrap_or("-")
    }

    pub(crate) fn is_resolving(&self, key: &str) -> bool {
        self.guard.iter().any(|k| k == key)
    }

    pub(crate) fn push_guard(&mut self, key: String) {
        self.guard.push(key);
    }

    pub(crate) fn pop_guard(&mut self) {
        self.guard.pop();
    }

    pub(crate) fn add_attachment(&mut self, filename: &str) {
        if !self.attachments.iter().any(|a| a == filename) {
            self.attachments.push(filename.to_owned());
        }
    }
}
