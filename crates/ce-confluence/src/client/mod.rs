//! Confluence REST API client.
//!
//! Provides a sync HTTP client for the Confluence Server/Data Center REST API.

mod attachments;
mod pages;

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ce_config::ConfluenceConfig;
use ce_source::{Page, PageSource, SourceError};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::de::DeserializeOwned;
use tracing::debug;
use ureq::Agent;

use crate::error::ConfluenceError;

/// Request authentication.
enum Auth {
    /// Personal access token.
    Bearer(String),
    /// Base64 of `username:token`.
    Basic(String),
}

impl Auth {
    fn header(&self) -> String {
        match self {
            Self::Bearer(token) => format!("Bearer {token}"),
            Self::Basic(credentials) => format!("Basic {credentials}"),
        }
    }
}

/// Confluence REST API client.
pub struct ConfluenceClient {
    agent: Agent,
    base_url: String,
    auth: Auth,
}

impl ConfluenceClient {
    /// Create a client for `base_url`.
    ///
    /// With a `username` the token is sent as basic auth credentials,
    /// otherwise as a bearer token.
    pub fn new(base_url: &str, token: &str, username: Option<&str>, timeout: Duration) -> Self {
        let auth = match username {
            Some(user) => Auth::Basic(STANDARD.encode(format!("{user}:{token}"))),
            None => Auth::Bearer(token.to_owned()),
        };
        let agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_owned(),
            auth,
        }
    }

    /// Create client from configuration.
    pub fn from_config(config: &ConfluenceConfig) -> Self {
        Self::new(
            &config.base_url,
            &config.token,
            config.username.as_deref(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Get the API base URL.
    fn api_url(&self) -> String {
        format!("{}/rest/api", self.base_url)
    }

    /// Perform a GET request, turning error statuses into
    /// [`ConfluenceError::HttpResponse`].
    fn get(&self, url: &str, accept: &str) -> Result<ureq::Body, ConfluenceError> {
        debug!(url, "GET");
        let response = self
            .agent
            .get(url)
            .header("Authorization", &self.auth.header())
            .header("Accept", accept)
            .call()?;

        let status = response.status().as_u16();
        let mut body_reader = response.into_body();

        if status >= 400 {
            let error_body = body_reader
                .read_to_string()
                .unwrap_or_else(|_| "(unable to read error body)".to_owned());
            return Err(ConfluenceError::HttpResponse {
                status,
                body: error_body,
            });
        }
        Ok(body_reader)
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ConfluenceError> {
        Ok(self.get(url, "application/json")?.read_json()?)
    }
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

impl PageSource for ConfluenceClient {
    fn fetch_page(&self, id: &str) -> Result<Page, SourceError> {
        self.get_page(id)
            .map_err(|e| e.into_source_error(Some(id)))
    }

    fn fetch_children(&self, id: &str) -> Result<Vec<String>, SourceError> {
        self.get_child_ids(id)
            .map_err(|e| e.into_source_error(Some(id)))
    }

    fn find_page(&self, space: &str, title: &str) -> Result<String, SourceError> {
        self.find_page_id(space, title)
            .map_err(|e| e.into_source_error(None))
    }

    fn fetch_attachment(&self, page_id: &str, filename: &str) -> Result<Vec<u8>, SourceError> {
        self.download_attachment(page_id, filename)
            .map_err(|e| e.into_source_error(Some(page_id)))
    }

    fn base_url(&self) -> Option<&str> {
        Some(&self.base_url)
    }
}
