//! Embedded Markdown macro.
//!
//! The body may arrive in several shapes depending on how the page was
//! authored or exported, so extraction tries a fixed list of strategies and
//! keeps the first non-empty result.

use std::sync::LazyLock;

use regex::Regex;

use crate::cleanup::{inline_run, layout_block, normalize_embedded};
use crate::element::{MacroBody, MacroElement, OutputMode};
use crate::error::MacroError;
use crate::processor::{ContentProcessor, ProcessContext, ProcessorOutput};
use crate::tree::StorageNode;

/// Classes marking an element whose text is raw Markdown.
const CONTENT_MARKERS: &[&str] = &["markdown-content", "markdown-body", "md-content"];

static CDATA_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("invalid CDATA regex"));

static MARKDOWN_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:markdown|md)[ \t]*\n(.*?)\n[ \t]*```").expect("invalid fence regex")
});

type Strategy = fn(&MacroElement<'_>) -> Option<String>;

const STRATEGIES: &[(&str, Strategy)] = &[
    ("plain-body", plain_body),
    ("rich-body", rich_body),
    ("delimited-block", delimited_block),
    ("content-marker", content_marker),
    ("full-text", full_text),
];

/// Renders raw Markdown carried by a macro.
pub struct MarkdownProcessor;

impl ContentProcessor for MarkdownProcessor {
    fn name(&self) -> &str {
        "markdown"
    }

    fn can_handle(&self, element: &MacroElement<'_>) -> bool {
        let node = element.node();
        has_marker(node) || node.find(&has_marker).is_some()
    }

    fn process(
        &self,
        element: &MacroElement<'_>,
        ctx: &mut ProcessContext<'_, '_>,
    ) -> Result<ProcessorOutput, MacroError> {
        let Some((strategy, raw)) = extract(element) else {
            return Ok(ProcessorOutput::Skip);
        };
        tracing::trace!(strategy, "Extracted embedded markdown");

        let cleaned = normalize_embedded(&raw, ctx.tab_width());
        let rendered = match element.mode() {
            OutputMode::Block => layout_block(&cleaned),
            OutputMode::Inline => inline_run(&cleaned),
        };
        Ok(ProcessorOutput::Markdown(rendered))
    }
}

/// Raw body of the element together with the strategy that found it.
fn extract(element: &MacroElement<'_>) -> Option<(&'static str, String)> {
    STRATEGIES.iter().find_map(|(name, strategy)| {
        strategy(element)
            .filter(|text| !text.trim().is_empty())
            .map(|text| (*name, text))
    })
}

fn plain_body(element: &MacroElement<'_>) -> Option<String> {
    match element.body() {
        MacroBody::Plain(text) => Some(text.to_owned()),
        _ => None,
    }
}

fn rich_body(element: &MacroElement<'_>) -> Option<String> {
    match element.body() {
        MacroBody::Rich(node) => Some(strip_tags(node)),
        _ => None,
    }
}

fn delimited_block(element: &MacroElement<'_>) -> Option<String> {
    let text = element.node().body_text();
    CDATA_BLOCK
        .captures(&text)
        .or_else(|| MARKDOWN_FENCE.captures(&text))
        .map(|caps| caps[1].to_owned())
}

fn content_marker(element: &MacroElement<'_>) -> Option<String> {
    let node = element.node();
    if has_marker(node) {
        return Some(strip_tags(node));
    }
    node.find(&has_marker).map(strip_tags)
}

fn full_text(element: &MacroElement<'_>) -> Option<String> {
    Some(element.node().body_text())
}

fn has_marker(node: &StorageNode) -> bool {
    node.classes().any(|c| CONTENT_MARKERS.contains(&c))
}

/// Text of a node with markup removed. Paragraph-like elements and `br`
/// end a line; other whitespace is kept as authored.
fn strip_tags(node: &StorageNode) -> String {
    fn walk(node: &StorageNode, out: &mut String) {
        out.push_str(&node.text);
        for child in &node.children {
            match child.local_name() {
                "parameter" => {}
                "br" => out.push('\n'),
                "p" | "div" | "li" | "pre" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                    walk(child, out);
                    out.push('\n');
                }
                _ => walk(child, out),
            }
            out.push_str(&child.tail);
        }
    }
    let mut out = String::new();
    walk(node, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_storage;

    fn element_text(storage: &str) -> Option<(&'static str, String)> {
        let tree = parse_storage(storage).unwrap();
        let element = MacroElement::from_node(&tree.children[0], false);
        extract(&element)
    }

    #[test]
    fn test_plain_body_wins() {
        let found = element_text(
            r#"<ac:structured-macro ac:name="markdown"><ac:plain-text-body><![CDATA[# Hi]]></ac:plain-text-body></ac:structured-macro>"#,
        );
        assert_eq!(found, Some(("plain-body", "# Hi".to_owned())));
    }

    #[test]
    fn test_rich_body_stripped() {
        let found = element_text(
            r#"<ac:structured-macro ac:name="markdown"><ac:rich-text-body><p># Title</p><p>- <b>item</b></p></ac:rich-text-body></ac:structured-macro>"#,
        );
        assert_eq!(found, Some(("rich-body", "# Title\n- item\n".to_owned())));
    }

    #[test]
    fn test_delimited_fence() {
        let found = element_text(
            "<div class=\"conf-macro macro-markdown\">intro\n```markdown\n**x**\n```\n</div>",
        );
        assert_eq!(found, Some(("delimited-block", "**x**".to_owned())));
    }

    #[test]
    fn test_escaped_cdata_in_text() {
        let found = element_text(
            r#"<div data-macro-name="markdown">&lt;![CDATA[*y*]]&gt;</div>"#,
        );
        assert_eq!(found, Some(("delimited-block", "*y*".to_owned())));
    }

    #[test]
    fn test_content_marker() {
        let found = element_text(
            r#"<div class="conf-macro"><span class="md-content">_z_</span></div>"#,
        );
        assert_eq!(found, Some(("content-marker", "_z_".to_owned())));
    }

    #[test]
    fn test_full_text_last() {
        let found = element_text(r#"<div data-macro-name="markdown">plain words</div>"#);
        assert_eq!(found, Some(("full-text", "plain words".to_owned())));
    }

    #[test]
    fn test_empty_everywhere() {
        let found = element_text(r#"<ac:structured-macro ac:name="markdown" />"#);
        assert_eq!(found, None);
    }

    #[test]
    fn test_can_handle_marker_descendant() {
        let tree = parse_storage(r#"<div class="conf-macro"><div class="markdown-body">x</div></div>"#).unwrap();
        let element = MacroElement::from_node(&tree.children[0], false);
        assert!(MarkdownProcessor.can_handle(&element));

        let tree = parse_storage(r#"<div class="conf-macro">x</div>"#).unwrap();
        let element = MacroElement::from_node(&tree.children[0], false);
        assert!(!MarkdownProcessor.can_handle(&element));
    }
}
