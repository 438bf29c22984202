//! Read-only Confluence REST client.
//!
//! [`ConfluenceClient`] implements [`ce_source::PageSource`] over the
//! Confluence Server/Data Center REST API with bearer (personal access token)
//! or basic (username + API token) authentication.
//!
//! HTTP failures are classified for the exporter: 404 is not found, 401/403
//! permission denied, 408/504 timeout, 429 and 5xx retryable network errors.

mod client;
mod error;
mod types;

pub use client::ConfluenceClient;
pub use error::ConfluenceError;
