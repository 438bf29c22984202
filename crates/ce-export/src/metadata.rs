//! YAML front matter for exported pages.

use ce_source::Page;
use serde::Serialize;

/// Page metadata written ahead of the Markdown body.
#[derive(Debug, Serialize)]
pub struct FrontMatter<'a> {
    pub title: &'a str,
    pub page_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub space: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<&'a str>,
    /// Link to the page on the wiki.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl<'a> FrontMatter<'a> {
    pub fn new(page: &'a Page, base_url: Option<&str>) -> Self {
        Self {
            title: &page.title,
            page_id: &page.id,
            space: page.space.as_deref(),
            version: page.version,
            parent_id: page.parent_id.as_deref(),
            source: base_url.map(|base| {
                format!(
                    "{}/pages/viewpage.action?pageId={}",
                    base.trim_end_matches('/'),
                    page.id
                )
            }),
        }
    }

    /// Render as a `---` delimited block followed by a blank line.
    pub fn render(&self) -> Result<String, serde_yaml::Error> {
        let yaml = serde_yaml::to_string(self)?;
        Ok(format!("---\n{yaml}---\n\n"))
    }

    /// Prepend the rendered block to `markdown`.
    pub fn apply(&self, markdown: &str) -> Result<String, serde_yaml::Error> {
        Ok(self.render()? + markdown)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_full_front_matter() {
        let page = Page {
            id: "42".to_owned(),
            title: "Setup: Linux".to_owned(),
            space: Some("DOC".to_owned()),
            parent_id: Some("7".to_owned()),
            version: Some(3),
            ..Page::default()
        };
        let rendered = FrontMatter::new(&page, Some("https://wiki.example.com/"))
            .render()
            .unwrap();
        assert!(rendered.starts_with("---\n"));
        assert!(rendered.ends_with("---\n\n"));

        let yaml: serde_yaml::Value = serde_yaml::from_str(rendered.trim_matches(['-', '\n'])).unwrap();
        assert_eq!(yaml["title"].as_str(), Some("Setup: Linux"));
        assert_eq!(yaml["page_id"].as_str(), Some("42"));
        assert_eq!(yaml["space"].as_str(), Some("DOC"));
        assert_eq!(yaml["version"].as_u64(), Some(3));
        assert_eq!(yaml["parent_id"].as_str(), Some("7"));
        assert_eq!(
            yaml["source"].as_str(),
            Some("https://wiki.example.com/pages/viewpage.action?pageId=42")
        );
    }

    #[test]
    fn test_optional_fields_omitted() {
        let page = Page {
            id: "1".to_owned(),
            title: "Home".to_owned(),
            ..Page::default()
        };
        let markdown = FrontMatter::new(&page, None).apply("# Home\n").unwrap();
        assert_eq!(markdown, "---\ntitle: Home\npage_id: '1'\n---\n\n# Home\n");
    }
}
