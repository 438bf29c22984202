//! Anchor scanning and in-document link rewriting.

use std::collections::HashMap;
use std::sync::LazyLock;

use ce_convert::slugify;
use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use regex::Regex;

/// Explicit anchors emitted for `anchor` macros.
static HTML_ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<a\s+(?:id|name)="([^"]+)"\s*>"#).expect("invalid anchor regex")
});

pub(crate) fn parser_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_GFM
}

/// A heading found in the document.
#[derive(Debug)]
pub(crate) struct Heading {
    pub(crate) level: u8,
    /// Byte offset of the start of the heading line.
    pub(crate) start: usize,
    pub(crate) title: String,
    /// Outside any block quote or list.
    pub(crate) top_level: bool,
}

/// Headings and link anchors of a document.
#[derive(Debug, Default)]
pub(crate) struct Outline {
    pub(crate) headings: Vec<Heading>,
    /// Anchor id and the byte offset where it is defined.
    pub(crate) anchors: Vec<(String, usize)>,
}

/// GitHub-style anchor de-duplication: `intro`, `intro-1`, `intro-2`.
#[derive(Default)]
struct SlugCounter {
    seen: HashMap<String, usize>,
}

impl SlugCounter {
    fn next(&mut self, title: &str) -> String {
        let base = slugify(title);
        let count = self.seen.entry(base.clone()).or_insert(0);
        let slug = if *count == 0 {
            base
        } else {
            format!("{base}-{count}")
        };
        *count += 1;
        slug
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn line_start(text: &str, offset: usize) -> usize {
    text[..offset].rfind('\n').map_or(0, |pos| pos + 1)
}

/// Collect headings and anchors in document order.
pub(crate) fn outline(markdown: &str) -> Outline {
    let mut outline = Outline::default();
    let mut slugs = SlugCounter::default();
    let mut containers = 0usize;
    let mut current: Option<(u8, usize, String)> = None;

    for (event, range) in Parser::new_ext(markdown, parser_options()).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                current = Some((heading_level(level), range.start, String::new()));
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, start, title)) = current.take() {
                    let title = title.trim().to_owned();
                    outline.anchors.push((slugs.next(&title), start));
                    outline.headings.push(Heading {
                        level,
                        start: line_start(markdown, start),
                        title,
                        top_level: containers == 0,
                    });
                }
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, _, title)) = current.as_mut() {
                    title.push_str(&text);
                }
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                for caps in HTML_ANCHOR.captures_iter(&html) {
                    outline.anchors.push((caps[1].to_owned(), range.start));
                }
            }
            Event::Start(Tag::BlockQuote(_) | Tag::List(_) | Tag::FootnoteDefinition(_)) => {
                containers += 1;
            }
            Event::End(TagEnd::BlockQuote(_) | TagEnd::List(_) | TagEnd::FootnoteDefinition) => {
                containers = containers.saturating_sub(1);
            }
            _ => {}
        }
    }
    outline
}

/// Prefix `](#anchor)` link targets with the file `resolve` returns for the
/// anchor. Anchors it does not resolve stay in-document links.
pub(crate) fn rewrite_anchor_links(
    markdown: &str,
    resolve: impl Fn(&str) -> Option<String>,
) -> String {
    let mut edits: Vec<(usize, String)> = Vec::new();
    for (event, range) in Parser::new_ext(markdown, parser_options()).into_offset_iter() {
        let Event::Start(Tag::Link { dest_url, .. } | Tag::Image { dest_url, .. }) = event else {
            continue;
        };
        let Some(anchor) = dest_url.strip_prefix('#') else {
            continue;
        };
        let Some(file) = resolve(anchor) else {
            continue;
        };
        if let Some(pos) = markdown[range.clone()].rfind("(#") {
            edits.push((range.start + pos + 1, file));
        }
    }

    edits.sort_by_key(|(pos, _)| *pos);
    let mut out = markdown.to_owned();
    for (pos, file) in edits.into_iter().rev() {
        out.insert_str(pos, &file);
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_outline_dedups_slugs() {
        let outline = outline("# Intro\n\n## Intro\n\n## Intro\n");
        let anchors: Vec<&str> = outline.anchors.iter().map(|(a, _)| a.as_str()).collect();
        assert_eq!(anchors, vec!["intro", "intro-1", "intro-2"]);
    }

    #[test]
    fn test_outline_ignores_fenced_headings() {
        let outline = outline("## Real\n\n```\n## Fake\n```\n");
        assert_eq!(outline.headings.len(), 1);
        assert_eq!(outline.headings[0].title, "Real");
    }

    #[test]
    fn test_outline_marks_nested_headings() {
        let outline = outline("> ## Quoted\n\n## Plain\n");
        assert!(!outline.headings[0].top_level);
        assert!(outline.headings[1].top_level);
    }

    #[test]
    fn test_outline_heading_with_code() {
        let outline = outline("## Use `cargo`\n");
        assert_eq!(outline.headings[0].title, "Use cargo");
        assert_eq!(outline.anchors[0].0, "use-cargo");
    }

    #[test]
    fn test_outline_html_anchor() {
        let outline = outline("Text <a id=\"step-1\"></a> here.\n");
        assert_eq!(outline.anchors[0].0, "step-1");
    }

    #[test]
    fn test_rewrite_anchor_links() {
        let text = "See [a](#one) and [b](#two) and `[c](#one)`.";
        let out = rewrite_anchor_links(text, |anchor| {
            (anchor == "one").then(|| "01-one.md".to_owned())
        });
        assert_eq!(out, "See [a](01-one.md#one) and [b](#two) and `[c](#one)`.");
    }

    #[test]
    fn test_rewrite_nested_image_link() {
        let text = "[![i](#img)](#target)";
        let out = rewrite_anchor_links(text, |anchor| Some(format!("{anchor}.md")));
        assert_eq!(out, "[![i](img.md#img)](target.md#target)");
    }
}
