//! Storage markup parser.

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::entities::{convert_html_entities, decode_entity};
use crate::error::ConvertError;
use crate::tree::StorageNode;

/// Namespace prefixes used by storage markup.
const NAMESPACES: &[(&str, &str)] = &[
    ("ac", "http://www.atlassian.com/schema/confluence/4/ac/"),
    ("ri", "http://www.atlassian.com/schema/confluence/4/ri/"),
    ("at", "http://www.atlassian.com/schema/confluence/4/at/"),
];

/// Tag of the synthetic root wrapping every parsed fragment.
pub(crate) const ROOT_TAG: &str = "root";

/// Deepest element nesting accepted below the root.
pub const MAX_NESTING: usize = 256;

/// Parse a storage fragment into a tree rooted at a synthetic `root` element.
///
/// Fragments need not have a single top-level element. Namespace
/// declarations for the storage prefixes are added so prefixed tags parse.
///
/// # Errors
///
/// Returns an error when the markup is not well-formed XML or nests
/// elements deeper than [`MAX_NESTING`].
pub fn parse_storage(storage: &str) -> Result<StorageNode, ConvertError> {
    let storage = convert_html_entities(storage);
    let namespace_decls = NAMESPACES
        .iter()
        .map(|(prefix, uri)| format!(r#"xmlns:{prefix}="{uri}""#))
        .collect::<Vec<_>>()
        .join(" ");
    let wrapped = format!("<{ROOT_TAG} {namespace_decls}>{storage}</{ROOT_TAG}>");

    let mut reader = Reader::from_str(&wrapped);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(_) => return parse_children(&mut reader, ROOT_TAG, 0),
            Event::Eof => return Ok(StorageNode::new(ROOT_TAG)),
            _ => {}
        }
        buf.clear();
    }
}

fn parse_children(
    reader: &mut Reader<&[u8]>,
    tag: &str,
    depth: usize,
) -> Result<StorageNode, ConvertError> {
    let mut buf = Vec::new();
    let mut node = StorageNode::new(tag);

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                if depth >= MAX_NESTING {
                    return Err(ConvertError::TooDeep { limit: MAX_NESTING });
                }
                let child_tag = decode_name(reader, e.name().as_ref());
                let attrs = decode_attrs(reader, &e);
                let mut child = parse_children(reader, &child_tag, depth + 1)?;
                child.attrs = attrs;
                node.children.push(child);
            }
            Event::Empty(e) => {
                let mut child = StorageNode::new(decode_name(reader, e.name().as_ref()));
                child.attrs = decode_attrs(reader, &e);
                node.children.push(child);
            }
            Event::Text(e) => {
                let text = reader.decoder().decode(&e)?;
                append_text(&mut node, &text);
            }
            Event::GeneralRef(e) => {
                let entity = reader.decoder().decode(&e)?;
                append_text(&mut node, &decode_entity(&entity));
            }
            Event::CData(e) => {
                append_text(&mut node, &String::from_utf8_lossy(&e));
            }
            // The reader verifies that end tags match, so any End closes `tag`.
            Event::End(_) | Event::Eof => return Ok(node),
            Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
        }
        buf.clear();
    }
}

fn decode_name(reader: &Reader<&[u8]>, name: &[u8]) -> String {
    reader
        .decoder()
        .decode(name)
        .map_or_else(|_| String::from_utf8_lossy(name).into_owned(), Cow::into_owned)
}

fn decode_attrs(reader: &Reader<&[u8]>, e: &BytesStart) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    for attr in e.attributes().flatten() {
        let key = decode_name(reader, attr.key.as_ref());
        if key.starts_with("xmlns") {
            continue;
        }
        let value = attr
            .unescape_value()
            .map_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned(), Cow::into_owned);
        attrs.push((key, value));
    }
    attrs
}

fn append_text(node: &mut StorageNode, text: &str) {
    if let Some(last) = node.children.last_mut() {
        last.tail.push_str(text);
    } else {
        node.text.push_str(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fragment_with_siblings() {
        let tree = parse_storage("<p>one</p><p>two</p>").unwrap();
        assert_eq!(tree.tag, ROOT_TAG);
        assert_eq!(tree.children.len(), 2);
        assert_eq!(tree.children[1].text, "two");
    }

    #[test]
    fn test_parse_nested_with_tail() {
        let tree = parse_storage("<p><strong>Bold</strong> text</p>").unwrap();
        let p = &tree.children[0];
        assert!(p.text.is_empty());
        assert_eq!(p.children[0].text, "Bold");
        assert_eq!(p.children[0].tail, " text");
    }

    #[test]
    fn test_parse_macro_with_cdata() {
        let storage = r#"<ac:structured-macro ac:name="code"><ac:parameter ac:name="language">rust</ac:parameter><ac:plain-text-body><![CDATA[fn main() { a < b }]]></ac:plain-text-body></ac:structured-macro>"#;
        let tree = parse_storage(storage).unwrap();
        let m = &tree.children[0];
        assert_eq!(m.tag, "ac:structured-macro");
        assert_eq!(m.attr("ac:name"), Some("code"));
        assert_eq!(m.children[0].text, "rust");
        assert_eq!(m.children[1].text, "fn main() { a < b }");
    }

    #[test]
    fn test_parse_entities() {
        let tree = parse_storage("<p>a&nbsp;b &amp; c&#33;</p>").unwrap();
        assert_eq!(tree.children[0].text, "a\u{a0}b & c!");
    }

    #[test]
    fn test_parse_self_closing() {
        let tree = parse_storage(r#"<p>Before<br />After<ri:page ri:content-title="X" /></p>"#).unwrap();
        let p = &tree.children[0];
        assert_eq!(p.children[0].tag, "br");
        assert_eq!(p.children[0].tail, "After");
        assert_eq!(p.children[1].attr("ri:content-title"), Some("X"));
    }

    #[test]
    fn test_parse_empty_input() {
        let tree = parse_storage("").unwrap();
        assert!(tree.children.is_empty());
        assert!(tree.text.is_empty());
    }

    #[test]
    fn test_parse_mismatched_tags_fails() {
        assert!(parse_storage("<p><b>text</p>").is_err());
    }

    fn nested(levels: usize) -> String {
        format!("{}x{}", "<div>".repeat(levels), "</div>".repeat(levels))
    }

    #[test]
    fn test_parse_accepts_nesting_at_limit() {
        let mut node = &parse_storage(&nested(MAX_NESTING)).unwrap();
        let mut levels = 0;
        while let Some(child) = node.children.first() {
            node = child;
            levels += 1;
        }
        assert_eq!(levels, MAX_NESTING);
        assert_eq!(node.text, "x");
    }

    #[test]
    fn test_parse_rejects_excessive_nesting() {
        let err = parse_storage(&nested(5000)).unwrap_err();
        assert!(matches!(err, ConvertError::TooDeep { limit: MAX_NESTING }));
    }
}
