//! Include resolution through a page source.

use ce_convert::{IncludeResolver, IncludeTarget, MacroError};
use ce_source::{PageSource, SourceError};
use tracing::debug;

use crate::retry::{Deadline, RetryPolicy};

/// Resolves include macros by fetching the target page.
///
/// Title-only targets are looked up in the target's space, falling back to
/// the space of the page being converted. Lookups and fetches are retried
/// on transient failures like page fetches.
pub(crate) struct SourceResolver<'a> {
    source: &'a dyn PageSource,
    space: Option<&'a str>,
    retry: RetryPolicy,
    deadline: Deadline,
}

impl<'a> SourceResolver<'a> {
    pub(crate) fn new(source: &'a dyn PageSource, space: Option<&'a str>) -> Self {
        Self {
            source,
            space,
            retry: RetryPolicy::default(),
            deadline: Deadline::default(),
        }
    }

    #[must_use]
    pub(crate) fn with_retry(mut self, retry: RetryPolicy, deadline: Deadline) -> Self {
        self.retry = retry;
        self.deadline = deadline;
        self
    }

    fn attempt<T>(
        &self,
        target: &IncludeTarget,
        key: &str,
        op: impl FnMut() -> Result<T, SourceError>,
    ) -> Result<T, MacroError> {
        let (result, attempts) = self.retry.run(self.deadline, key, op);
        result.map_err(|err| {
            let message = if err.is_transient() {
                format!("{err} (transient, {attempts} attempt(s))")
            } else {
                err.to_string()
            };
            MacroError::include(target.to_string(), message)
        })
    }
}

impl IncludeResolver for SourceResolver<'_> {
    fn resolve(&self, target: &IncludeTarget) -> Result<String, MacroError> {
        let id = match (&target.page_id, &target.title) {
            (Some(id), _) => id.clone(),
            (None, Some(title)) => {
                let Some(space) = target.space.as_deref().or(self.space) else {
                    return Err(MacroError::include(target.to_string(), "no space to search"));
                };
                self.attempt(target, title, || self.source.find_page(space, title))?
            }
            (None, None) => {
                return Err(MacroError::include(target.to_string(), "no page given"));
            }
        };
        debug!(page_id = %id, "Resolving include");
        self.attempt(target, &id, || self.source.fetch_page(&id))
            .map(|page| page.body)
    }
}

#[cfg(test)]
mod tests {
    use ce_convert::MacroErrorKind;
    use ce_source::{MockSource, SourceErrorKind};
    use pretty_assertions::assert_eq;

    use super::*;

    fn target(page_id: Option<&str>, title: Option<&str>, space: Option<&str>) -> IncludeTarget {
        IncludeTarget {
            page_id: page_id.map(str::to_owned),
            title: title.map(str::to_owned),
            space: space.map(str::to_owned),
        }
    }

    #[test]
    fn test_resolve_by_id_and_title() {
        let source = MockSource::new()
            .with_space("DOC")
            .with_page("5", "Snippet", "<p>shared</p>");
        let resolver = SourceResolver::new(&source, Some("DOC"));
        assert_eq!(resolver.resolve(&target(Some("5"), None, None)).unwrap(), "<p>shared</p>");
        assert_eq!(
            resolver.resolve(&target(None, Some("Snippet"), None)).unwrap(),
            "<p>shared</p>"
        );
    }

    #[test]
    fn test_missing_target_is_include_failure() {
        let source = MockSource::new();
        let resolver = SourceResolver::new(&source, None);
        let err = resolver.resolve(&target(Some("9"), None, None)).unwrap_err();
        assert_eq!(err.kind(), MacroErrorKind::IncludeFailed);
        let err = resolver
            .resolve(&target(None, Some("Snippet"), None))
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot include page 'Snippet': no space to search");
    }

    fn quick_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: std::time::Duration::from_millis(1),
        }
    }

    #[test]
    fn test_transient_include_failure_retried() {
        let source = MockSource::new()
            .with_page("5", "Snippet", "<p>shared</p>")
            .with_failures("5", SourceErrorKind::Network, 2);
        let resolver =
            SourceResolver::new(&source, None).with_retry(quick_retry(2), Deadline::default());
        assert_eq!(resolver.resolve(&target(Some("5"), None, None)).unwrap(), "<p>shared</p>");
        assert_eq!(source.fetch_count("5"), 3);
    }

    #[test]
    fn test_exhausted_include_retries_are_labelled_transient() {
        let source = MockSource::new()
            .with_page("5", "Snippet", "<p>shared</p>")
            .with_failures("5", SourceErrorKind::Timeout, 5);
        let resolver =
            SourceResolver::new(&source, None).with_retry(quick_retry(1), Deadline::default());
        let err = resolver.resolve(&target(Some("5"), None, None)).unwrap_err();
        assert_eq!(err.kind(), MacroErrorKind::IncludeFailed);
        assert!(err.to_string().contains("(transient, 2 attempt(s))"), "{err}");
        assert_eq!(source.fetch_count("5"), 2);
    }

    #[test]
    fn test_permanent_include_failure_not_retried() {
        let source = MockSource::new();
        let resolver =
            SourceResolver::new(&source, None).with_retry(quick_retry(3), Deadline::default());
        let err = resolver.resolve(&target(Some("9"), None, None)).unwrap_err();
        assert!(!err.to_string().contains("transient"), "{err}");
        assert_eq!(source.fetch_count("9"), 1);
    }
}
