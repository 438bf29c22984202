//! Page operations for Confluence API.

use ce_source::Page;
use tracing::{debug, info};

use super::{ConfluenceClient, encode};
use crate::error::ConfluenceError;
use crate::types::{Content, ContentSummary, ResultPage};

/// Child listing page size.
const CHILDREN_LIMIT: usize = 100;

impl ConfluenceClient {
    /// Get a page with its storage body, version, space and ancestors.
    ///
    /// Children are not listed; see [`Self::get_child_ids`].
    pub(crate) fn get_page(&self, page_id: &str) -> Result<Page, ConfluenceError> {
        let url = format!(
            "{}/content/{}?expand=body.storage,version,space,ancestors",
            self.api_url(),
            encode(page_id)
        );
        info!(page_id, "Fetching page");
        let content: Content = self.get_json(&url)?;
        Ok(into_page(content, Vec::new()))
    }

    /// Ids of the child pages, following pagination.
    pub(crate) fn get_child_ids(&self, page_id: &str) -> Result<Vec<String>, ConfluenceError> {
        let mut ids = Vec::new();
        let mut start = 0;
        loop {
            let url = format!(
                "{}/content/{}/child/page?limit={CHILDREN_LIMIT}&start={start}",
                self.api_url(),
                encode(page_id)
            );
            let page: ResultPage<ContentSummary> = self.get_json(&url)?;
            let count = page.results.len();
            let more = page.has_next() && count > 0;
            ids.extend(page.results.into_iter().map(|c| c.id));
            if !more {
                break;
            }
            start += count;
        }
        debug!(page_id, children = ids.len(), "Listed child pages");
        Ok(ids)
    }

    /// Find a page id by space key and exact title.
    pub(crate) fn find_page_id(&self, space: &str, title: &str) -> Result<String, ConfluenceError> {
        let url = format!(
            "{}/content?type=page&spaceKey={}&title={}",
            self.api_url(),
            encode(space),
            encode(title)
        );
        let page: ResultPage<ContentSummary> = self.get_json(&url)?;
        page.results
            .into_iter()
            .find(|c| c.title == title)
            .map(|c| c.id)
            .ok_or_else(|| ConfluenceError::HttpResponse {
                status: 404,
                body: format!("no page titled '{title}' in space {space}"),
            })
    }
}

fn into_page(content: Content, children: Vec<String>) -> Page {
    Page {
        id: content.id,
        title: content.title,
        body: content
            .body
            .and_then(|b| b.storage)
            .map(|s| s.value)
            .unwrap_or_default(),
        space: content.space.map(|s| s.key),
        parent_id: content.ancestors.last().map(|a| a.id.clone()),
        children,
        version: content.version.map(|v| v.number),
    }
}
