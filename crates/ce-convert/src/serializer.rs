//! Storage markup serializer, used to preserve unconverted macros verbatim.

use std::fmt::Write;

use crate::tree::StorageNode;

/// Serialize an element (without its tail) back to storage markup.
///
/// `ac:plain-text-body` content is written as CDATA, as the service stores it.
pub fn serialize_node(node: &StorageNode) -> String {
    let mut out = String::with_capacity(256);
    write_node(node, &mut out);
    out
}

/// Serialize the children of a container element, tails included.
pub fn serialize_children(node: &StorageNode) -> String {
    let mut out = String::with_capacity(256);
    out.push_str(&escape_xml(&node.text, false));
    for child in &node.children {
        write_node(child, &mut out);
        out.push_str(&escape_xml(&child.tail, false));
    }
    out
}

fn write_node(node: &StorageNode, out: &mut String) {
    out.push('<');
    out.push_str(&node.tag);
    for (key, value) in &node.attrs {
        let _ = write!(out, r#" {key}="{}""#, escape_xml(value, true));
    }

    if node.children.is_empty() && node.text.is_empty() {
        out.push_str(" />");
        return;
    }
    out.push('>');

    if node.local_name() == "plain-text-body" {
        // "]]>" cannot appear inside one CDATA section.
        let _ = write!(out, "<![CDATA[{}]]>", node.text.replace("]]>", "]]]]><![CDATA[>"));
    } else {
        out.push_str(&escape_xml(&node.text, false));
    }
    for child in &node.children {
        write_node(child, out);
        out.push_str(&escape_xml(&child.tail, false));
    }
    let _ = write!(out, "</{}>", node.tag);
}

fn escape_xml(text: &str, escape_quotes: bool) -> String {
    let mut result = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' if escape_quotes => result.push_str("&quot;"),
            _ => result.push(ch),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_storage;

    #[test]
    fn test_serialize_element_without_tail() {
        let p = StorageNode::new("p")
            .with_text("a < b")
            .with_children(vec![StorageNode::new("br").with_tail("after")])
            .with_tail("dropped");
        assert_eq!(serialize_node(&p), "<p>a &lt; b<br />after</p>");
    }

    #[test]
    fn test_serialize_attributes_in_order() {
        let node = StorageNode::new("ac:structured-macro")
            .with_attr("ac:name", "jira")
            .with_attr("ac:schema-version", "1");
        assert_eq!(
            serialize_node(&node),
            r#"<ac:structured-macro ac:name="jira" ac:schema-version="1" />"#
        );
    }

    #[test]
    fn test_plain_text_body_as_cdata() {
        let storage = r#"<ac:structured-macro ac:name="code"><ac:plain-text-body><![CDATA[if a < b {}]]></ac:plain-text-body></ac:structured-macro>"#;
        let tree = parse_storage(storage).unwrap();
        assert_eq!(serialize_node(&tree.children[0]), storage);
    }

    #[test]
    fn test_serialize_children() {
        let tree = parse_storage("<p>one</p> and <p>two</p>").unwrap();
        assert_eq!(serialize_children(&tree), "<p>one</p> and <p>two</p>");
    }
}
