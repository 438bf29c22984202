//! Page source trait and page types.

use std::fmt;

use tracing::debug;

use crate::error::SourceError;

/// A page as read from the source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Page {
    pub id: String,
    pub title: String,
    /// Body in storage format.
    pub body: String,
    /// Space key.
    pub space: Option<String>,
    pub parent_id: Option<String>,
    /// Child page ids in display order, when the source lists them along
    /// with the page. [`PageSource::fetch_children`] is authoritative.
    pub children: Vec<String>,
    pub version: Option<u32>,
}

/// Reference to a page by id or by space and title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRef {
    Id(String),
    Title { space: String, title: String },
}

impl PageRef {
    /// Parse `123456` as an id and `SPACE:Title` as a title reference.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        match input.split_once(':') {
            Some((space, title))
                if !space.is_empty()
                    && !title.trim().is_empty()
                    && !space.contains(char::is_whitespace) =>
            {
                Self::Title {
                    space: space.to_owned(),
                    title: title.trim().to_owned(),
                }
            }
            _ => Self::Id(input.to_owned()),
        }
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Title { space, title } => write!(f, "{space}:{title}"),
        }
    }
}

/// Read access to pages.
///
/// Implementations block the calling thread; the exporter runs them on a
/// worker pool.
pub trait PageSource: Send + Sync {
    /// Fetch one page with its storage body.
    fn fetch_page(&self, id: &str) -> Result<Page, SourceError>;

    /// Ids of the direct children of a page, in display order.
    fn fetch_children(&self, id: &str) -> Result<Vec<String>, SourceError>;

    /// Id of the page titled `title` in `space`.
    fn find_page(&self, space: &str, title: &str) -> Result<String, SourceError>;

    /// Download an attachment of a page.
    fn fetch_attachment(&self, page_id: &str, filename: &str) -> Result<Vec<u8>, SourceError>;

    /// Base URL of the site, used for absolute links.
    fn base_url(&self) -> Option<&str> {
        None
    }

    /// Resolve a reference to a page id.
    fn resolve(&self, page: &PageRef) -> Result<String, SourceError> {
        match page {
            PageRef::Id(id) => Ok(id.clone()),
            PageRef::Title { space, title } => {
                debug!(space = %space, title = %title, "Resolving page by title");
                self.find_page(space, title)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_id() {
        assert_eq!(PageRef::parse(" 12345 "), PageRef::Id("12345".to_owned()));
    }

    #[test]
    fn test_parse_title() {
        assert_eq!(
            PageRef::parse("DOC:Getting Started: Part 1"),
            PageRef::Title {
                space: "DOC".to_owned(),
                title: "Getting Started: Part 1".to_owned(),
            }
        );
    }

    #[test]
    fn test_parse_without_space_is_id() {
        assert_eq!(PageRef::parse(":x"), PageRef::Id(":x".to_owned()));
        assert_eq!(PageRef::parse("My Page: x"), PageRef::Id("My Page: x".to_owned()));
    }

    #[test]
    fn test_display_round_trip() {
        let page = PageRef::parse("DOC:Home");
        assert_eq!(page.to_string(), "DOC:Home");
    }
}
