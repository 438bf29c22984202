//! Mock page source for testing.
//!
//! Provides [`MockSource`] for exercising the exporter without network access.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::time::Duration;

use crate::error::{SourceError, SourceErrorKind};
use crate::source::{Page, PageSource};

const BACKEND: &str = "Mock";

/// In-memory page source.
///
/// Use the builder methods to configure pages, attachments and injected
/// failures. Every `fetch_page` call is counted.
///
/// # Example
///
/// ```ignore
/// use ce_source::{MockSource, PageSource};
///
/// let source = MockSource::new()
///     .with_page("1", "Home", "<p>Welcome</p>")
///     .with_child_page("1", "2", "Setup", "<p>Install</p>");
///
/// assert_eq!(source.fetch_children("1").unwrap(), vec!["2".to_owned()]);
/// ```
#[derive(Debug, Default)]
pub struct MockSource {
    pages: RwLock<HashMap<String, Page>>,
    attachments: RwLock<HashMap<(String, String), Vec<u8>>>,
    failures: RwLock<HashMap<String, VecDeque<SourceErrorKind>>>,
    fetches: RwLock<HashMap<String, usize>>,
    space: Option<String>,
    base_url: Option<String>,
    delay: Option<Duration>,
}

impl MockSource {
    /// Create a new empty mock source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Space key given to pages added afterwards.
    #[must_use]
    pub fn with_space(mut self, space: impl Into<String>) -> Self {
        self.space = Some(space.into());
        self
    }

    /// Base URL reported by [`PageSource::base_url`].
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sleep this long in every `fetch_page` call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Add a top-level page.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_page(
        self,
        id: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let id = id.into();
        let page = Page {
            id: id.clone(),
            title: title.into(),
            body: body.into(),
            space: self.space.clone(),
            version: Some(1),
            ..Page::default()
        };
        self.pages.write().unwrap().insert(id, page);
        self
    }

    /// Add a page as the last child of `parent`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_child_page(
        self,
        parent: &str,
        id: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let id = id.into();
        let source = self.with_page(id.clone(), title, body);
        {
            let mut pages = source.pages.write().unwrap();
            if let Some(page) = pages.get_mut(&id) {
                page.parent_id = Some(parent.to_owned());
            }
            if let Some(parent) = pages.get_mut(parent) {
                parent.children.push(id);
            }
        }
        source
    }

    /// List the existing page `child` as an extra child of `parent`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_child_link(self, parent: &str, child: &str) -> Self {
        if let Some(parent) = self.pages.write().unwrap().get_mut(parent) {
            parent.children.push(child.to_owned());
        }
        self
    }

    /// Add an attachment to a page.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_attachment(
        self,
        page_id: impl Into<String>,
        filename: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        self.attachments
            .write()
            .unwrap()
            .insert((page_id.into(), filename.into()), data.into());
        self
    }

    /// Make the next `times` fetches of page `id` fail with `kind`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_failures(self, id: impl Into<String>, kind: SourceErrorKind, times: usize) -> Self {
        self.failures
            .write()
            .unwrap()
            .entry(id.into())
            .or_default()
            .extend(std::iter::repeat_n(kind, times));
        self
    }

    /// Number of `fetch_page` calls made for `id`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn fetch_count(&self, id: &str) -> usize {
        self.fetches.read().unwrap().get(id).copied().unwrap_or(0)
    }

    /// Total number of `fetch_page` calls.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn total_fetches(&self) -> usize {
        self.fetches.read().unwrap().values().sum()
    }

    fn take_failure(&self, id: &str) -> Option<SourceErrorKind> {
        self.failures
            .write()
            .unwrap()
            .get_mut(id)
            .and_then(VecDeque::pop_front)
    }

    fn lookup(&self, id: &str) -> Result<Page, SourceError> {
        self.pages
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| SourceError::not_found(id).with_backend(BACKEND))
    }
}

impl PageSource for MockSource {
    fn fetch_page(&self, id: &str) -> Result<Page, SourceError> {
        *self.fetches.write().unwrap().entry(id.to_owned()).or_insert(0) += 1;
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if let Some(kind) = self.take_failure(id) {
            return Err(SourceError::new(kind)
                .with_page(id)
                .with_backend(BACKEND)
                .with_message("injected failure"));
        }
        self.lookup(id)
    }

    fn fetch_children(&self, id: &str) -> Result<Vec<String>, SourceError> {
        self.lookup(id).map(|page| page.children)
    }

    fn find_page(&self, space: &str, title: &str) -> Result<String, SourceError> {
        self.pages
            .read()
            .unwrap()
            .values()
            .find(|p| p.title == title && p.space.as_deref().is_none_or(|s| s == space))
            .map(|p| p.id.clone())
            .ok_or_else(|| {
                SourceError::new(SourceErrorKind::NotFound)
                    .with_backend(BACKEND)
                    .with_message(format!("no page titled '{title}' in space {space}"))
            })
    }

    fn fetch_attachment(&self, page_id: &str, filename: &str) -> Result<Vec<u8>, SourceError> {
        self.attachments
            .read()
            .unwrap()
            .get(&(page_id.to_owned(), filename.to_owned()))
            .cloned()
            .ok_or_else(|| {
                SourceError::not_found(page_id)
                    .with_backend(BACKEND)
                    .with_message(format!("no attachment '{filename}'"))
            })
    }

    fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }
}
