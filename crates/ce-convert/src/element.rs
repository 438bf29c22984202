//! Typed view of a macro element.

use std::fmt;

use crate::tree::StorageNode;

/// Parameter carrying an explicit output-mode hint.
const OUTPUT_TYPE_PARAM: &str = "atlassian-macro-output-type";

/// Whether a fragment flows inside surrounding text or stands as a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    Inline,
    #[default]
    Block,
}

/// Typed macro parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ParamValue {
    fn parse(raw: &str) -> Self {
        match raw {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => raw
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map_or_else(|| Self::Text(raw.to_owned()), Self::Number),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// One named macro parameter. `raw` keeps the exact source text.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroParam {
    pub name: String,
    pub raw: String,
    pub value: ParamValue,
}

/// Macro body.
#[derive(Debug, Clone, Copy)]
pub enum MacroBody<'a> {
    Empty,
    /// Unformatted text, usually CDATA.
    Plain(&'a str),
    /// Container whose children are storage markup.
    Rich(&'a StorageNode),
}

/// A recognized macro within a parsed document.
///
/// Borrowed from the tree for the duration of one conversion and never
/// mutated.
#[derive(Debug, Clone)]
pub struct MacroElement<'a> {
    node: &'a StorageNode,
    type_id: Option<String>,
    params: Vec<MacroParam>,
    body: MacroBody<'a>,
    mode: OutputMode,
}

impl<'a> MacroElement<'a> {
    /// Whether an element should be treated as a macro.
    pub fn is_macro(node: &StorageNode) -> bool {
        matches!(node.tag.as_str(), "ac:structured-macro" | "ac:macro")
            || node.has_class("conf-macro")
            || node.attr("data-macro-name").is_some()
    }

    /// Build the typed view of `node`.
    ///
    /// `inline_context` is true when the element sits inside running text;
    /// an explicit output-type parameter overrides it.
    pub fn from_node(node: &'a StorageNode, inline_context: bool) -> Self {
        let params = collect_params(node);
        let mode = match params
            .iter()
            .find(|p| p.name == OUTPUT_TYPE_PARAM)
            .map(|p| p.raw.to_ascii_uppercase())
            .as_deref()
        {
            Some("INLINE") => OutputMode::Inline,
            Some("BLOCK") => OutputMode::Block,
            _ if inline_context => OutputMode::Inline,
            _ => OutputMode::Block,
        };

        Self {
            node,
            type_id: derive_type_id(node),
            params,
            body: derive_body(node),
            mode,
        }
    }

    /// Normalized (lowercase) type identifier, when one could be derived.
    pub fn type_id(&self) -> Option<&str> {
        self.type_id.as_deref()
    }

    /// Type identifier or `unknown`, for messages.
    pub fn display_type(&self) -> &str {
        self.type_id.as_deref().unwrap_or("unknown")
    }

    pub fn node(&self) -> &'a StorageNode {
        self.node
    }

    pub fn params(&self) -> &[MacroParam] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    /// Raw text of a parameter, trimmed, `None` when absent or empty.
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.raw.trim())
            .filter(|s| !s.is_empty())
    }

    pub fn body(&self) -> MacroBody<'a> {
        self.body
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Identity of this macro instance for cycle detection: the type plus
    /// its parameters in canonical (sorted) form, e.g. `include{pageId=42}`.
    pub fn instance_key(&self) -> String {
        let mut params: Vec<_> = self
            .params
            .iter()
            .filter(|p| p.name != OUTPUT_TYPE_PARAM)
            .map(|p| format!("{}={}", p.name, p.value))
            .collect();
        params.sort();
        format!("{}{{{}}}", self.display_type(), params.join(","))
    }
}

fn derive_type_id(node: &StorageNode) -> Option<String> {
    let structural = matches!(node.tag.as_str(), "ac:structured-macro" | "ac:macro")
        .then(|| node.attr("ac:name"))
        .flatten();
    let from_class = || {
        node.has_class("conf-macro")
            .then(|| node.classes().find_map(|c| c.strip_prefix("macro-")))
            .flatten()
    };
    structural
        .or_else(from_class)
        .or_else(|| node.attr("data-macro-name"))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_ascii_lowercase)
}

fn derive_body(node: &StorageNode) -> MacroBody<'_> {
    if let Some(plain) = node.child("plain-text-body") {
        return MacroBody::Plain(&plain.text);
    }
    if let Some(rich) = node.child("rich-text-body") {
        return MacroBody::Rich(rich);
    }
    MacroBody::Empty
}

fn collect_params(node: &StorageNode) -> Vec<MacroParam> {
    node.children
        .iter()
        .filter(|c| c.local_name() == "parameter")
        .map(|p| {
            let name = p.attr("ac:name").unwrap_or_default().to_owned();
            // Link-valued parameters carry their target in a child element.
            if let Some(page) = p.find(&|n| n.tag == "ri:page") {
                let title = page.attr("ri:content-title").unwrap_or_default().to_owned();
                return MacroParam {
                    name,
                    raw: title.clone(),
                    value: ParamValue::Text(title),
                };
            }
            if let Some(user) = p.find(&|n| n.tag == "ri:user") {
                let key = user
                    .attr("ri:userkey")
                    .or_else(|| user.attr("ri:account-id"))
                    .unwrap_or_default()
                    .to_owned();
                return MacroParam {
                    name,
                    raw: key.clone(),
                    value: ParamValue::Text(key),
                };
            }
            let raw = p.text_content();
            let value = ParamValue::parse(raw.trim());
            MacroParam { name, raw, value }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_storage;

    fn first(storage: &str) -> StorageNode {
        parse_storage(storage).unwrap().children.remove(0)
    }

    #[test]
    fn test_structural_type_id() {
        let node = first(r#"<ac:structured-macro ac:name="Info" />"#);
        assert!(MacroElement::is_macro(&node));
        assert_eq!(MacroElement::from_node(&node, false).type_id(), Some("info"));
    }

    #[test]
    fn test_class_type_id() {
        let node = first(r#"<div class="conf-macro macro-expand output-block">x</div>"#);
        assert!(MacroElement::is_macro(&node));
        assert_eq!(MacroElement::from_node(&node, false).type_id(), Some("expand"));
    }

    #[test]
    fn test_data_attribute_type_id() {
        let node = first(r#"<span data-macro-name="status">x</span>"#);
        assert_eq!(MacroElement::from_node(&node, false).type_id(), Some("status"));
    }

    #[test]
    fn test_structural_wins_over_data_attribute() {
        let node = first(r#"<ac:structured-macro ac:name="code" data-macro-name="other" />"#);
        assert_eq!(MacroElement::from_node(&node, false).type_id(), Some("code"));
    }

    #[test]
    fn test_no_type_id() {
        let node = first(r#"<div class="conf-macro">x</div>"#);
        assert_eq!(MacroElement::from_node(&node, false).type_id(), None);
    }

    #[test]
    fn test_typed_params() {
        let node = first(
            r#"<ac:structured-macro ac:name="x"><ac:parameter ac:name="collapse">true</ac:parameter><ac:parameter ac:name="first">12</ac:parameter><ac:parameter ac:name="language">rust</ac:parameter><ac:parameter ac:name=""><ri:page ri:content-title="Target" /></ac:parameter></ac:structured-macro>"#,
        );
        let element = MacroElement::from_node(&node, false);
        assert_eq!(element.param("collapse"), Some(&ParamValue::Bool(true)));
        assert_eq!(element.param("first"), Some(&ParamValue::Number(12.0)));
        assert_eq!(element.param_str("language"), Some("rust"));
        assert_eq!(element.param_str(""), Some("Target"));
    }

    #[test]
    fn test_output_mode() {
        let node = first(r#"<ac:structured-macro ac:name="x" />"#);
        assert_eq!(MacroElement::from_node(&node, false).mode(), OutputMode::Block);
        assert_eq!(MacroElement::from_node(&node, true).mode(), OutputMode::Inline);

        let node = first(
            r#"<ac:structured-macro ac:name="x"><ac:parameter ac:name="atlassian-macro-output-type">BLOCK</ac:parameter></ac:structured-macro>"#,
        );
        assert_eq!(MacroElement::from_node(&node, true).mode(), OutputMode::Block);
    }

    #[test]
    fn test_bodies() {
        let node = first(
            r#"<ac:structured-macro ac:name="code"><ac:plain-text-body><![CDATA[x = 1]]></ac:plain-text-body></ac:structured-macro>"#,
        );
        assert!(matches!(MacroElement::from_node(&node, false).body(), MacroBody::Plain("x = 1")));

        let node = first(
            r#"<ac:structured-macro ac:name="info"><ac:rich-text-body><p>hi</p></ac:rich-text-body></ac:structured-macro>"#,
        );
        assert!(matches!(MacroElement::from_node(&node, false).body(), MacroBody::Rich(_)));
    }

    #[test]
    fn test_instance_key_is_canonical() {
        let a = first(
            r#"<ac:structured-macro ac:name="include"><ac:parameter ac:name="pageId">42</ac:parameter><ac:parameter ac:name="b">x</ac:parameter></ac:structured-macro>"#,
        );
        let b = first(
            r#"<ac:structured-macro ac:name="Include"><ac:parameter ac:name="b">x</ac:parameter><ac:parameter ac:name="pageId">42</ac:parameter></ac:structured-macro>"#,
        );
        let key = MacroElement::from_node(&a, false).instance_key();
        assert_eq!(key, "include{b=x,pageId=42}");
        assert_eq!(key, MacroElement::from_node(&b, true).instance_key());
    }
}
