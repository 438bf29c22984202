//! Confluence REST response types.

use serde::Deserialize;

/// Page content with the expansions the exporter requests.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Content {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub version: Option<Version>,
    #[serde(default)]
    pub body: Option<Body>,
    #[serde(default)]
    pub space: Option<Space>,
    /// Root first; the last entry is the direct parent.
    #[serde(default)]
    pub ancestors: Vec<ContentSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Version {
    pub number: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Body {
    #[serde(default)]
    pub storage: Option<Storage>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Storage {
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Space {
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ContentSummary {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

/// One page of a paginated result list.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ResultPage<T> {
    pub results: Vec<T>,
    #[serde(rename = "_links", default)]
    pub links: Option<Links>,
}

impl<T> ResultPage<T> {
    pub fn has_next(&self) -> bool {
        self.links.as_ref().is_some_and(|l| l.next.is_some())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Links {
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub download: Option<String>,
}

/// Attachment entry of `child/attachment`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Attachment {
    pub title: String,
    #[serde(rename = "_links", default)]
    pub links: Links,
}
