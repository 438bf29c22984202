//! Attachment downloads for Confluence API.

use tracing::info;

use super::{ConfluenceClient, encode};
use crate::error::ConfluenceError;
use crate::types::{Attachment, ResultPage};

/// Largest attachment the client will download.
const MAX_ATTACHMENT_BYTES: u64 = 100 * 1024 * 1024;

impl ConfluenceClient {
    /// Download an attachment of a page by file name.
    pub(crate) fn download_attachment(
        &self,
        page_id: &str,
        filename: &str,
    ) -> Result<Vec<u8>, ConfluenceError> {
        let url = format!(
            "{}/content/{}/child/attachment?filename={}",
            self.api_url(),
            encode(page_id),
            encode(filename)
        );
        let listing: ResultPage<Attachment> = self.get_json(&url)?;
        let download = listing
            .results
            .into_iter()
            .find(|a| a.title == filename)
            .and_then(|a| a.links.download)
            .ok_or_else(|| ConfluenceError::HttpResponse {
                status: 404,
                body: format!("no attachment '{filename}' on page {page_id}"),
            })?;

        let url = if download.starts_with("http://") || download.starts_with("https://") {
            download
        } else {
            format!("{}{download}", self.base_url)
        };
        info!(page_id, filename, "Downloading attachment");
        let data = self
            .get(&url, "*/*")?
            .with_config()
            .limit(MAX_ATTACHMENT_BYTES)
            .read_to_vec()?;
        Ok(data)
    }
}
