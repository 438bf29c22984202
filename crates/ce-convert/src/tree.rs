//! Element tree produced from storage markup.

/// Tags whose content starts on its own line when flattened to text.
const BLOCK_TAGS: &[&str] = &[
    "p",
    "div",
    "li",
    "tr",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "pre",
    "blockquote",
    "table",
    "ul",
    "ol",
    "br",
    "hr",
    "task",
];

/// One element of storage markup.
///
/// Text follows the element-tree convention: `text` is the content before
/// the first child, `tail` the content after this element's closing tag up
/// to the next sibling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageNode {
    /// Qualified tag name, e.g. `p` or `ac:structured-macro`.
    pub tag: String,
    /// Leading text content.
    pub text: String,
    /// Text following the closing tag.
    pub tail: String,
    /// Attributes in document order.
    pub attrs: Vec<(String, String)>,
    /// Child elements.
    pub children: Vec<StorageNode>,
}

impl StorageNode {
    /// Create an element with the given tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    #[must_use]
    pub fn with_tail(mut self, tail: impl Into<String>) -> Self {
        self.tail = tail.into();
        self
    }

    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_children(mut self, children: Vec<StorageNode>) -> Self {
        self.children = children;
        self
    }

    /// Tag name without namespace prefix.
    pub fn local_name(&self) -> &str {
        self.tag.rsplit_once(':').map_or(&self.tag, |(_, local)| local)
    }

    /// Whether the tag lives in the given namespace prefix (`ac`, `ri`).
    pub fn in_namespace(&self, prefix: &str) -> bool {
        self.tag
            .split_once(':')
            .is_some_and(|(ns, _)| ns == prefix)
    }

    /// Attribute value by qualified name, or by local name as a fallback.
    ///
    /// `attr("ac:name")` also finds an unprefixed `name` attribute.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .or_else(|| {
                let local = name.rsplit_once(':').map(|(_, l)| l)?;
                self.attrs.iter().find(|(key, _)| key == local)
            })
            .map(|(_, value)| value.as_str())
    }

    /// Whitespace-separated class tokens.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or_default().split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    /// First direct child with the given local name.
    pub fn child(&self, local_name: &str) -> Option<&StorageNode> {
        self.children.iter().find(|c| c.local_name() == local_name)
    }

    /// First descendant (depth-first, excluding self) matching the predicate.
    pub fn find(&self, pred: &dyn Fn(&StorageNode) -> bool) -> Option<&StorageNode> {
        for child in &self.children {
            if pred(child) {
                return Some(child);
            }
            if let Some(found) = child.find(pred) {
                return Some(found);
            }
        }
        None
    }

    /// Concatenated text of this element and its descendants, tails of
    /// descendants included, own tail excluded.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out, &|_| true);
        out
    }

    /// Like [`text_content`](Self::text_content) but skipping `ac:parameter`
    /// children, which carry macro configuration rather than content.
    pub fn body_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out, &|n| n.local_name() != "parameter");
        out
    }

    fn collect_text(&self, out: &mut String, keep: &dyn Fn(&StorageNode) -> bool) {
        out.push_str(&self.text);
        for child in &self.children {
            if keep(child) {
                child.collect_text(out, keep);
            }
            out.push_str(&child.tail);
        }
    }

    /// Readable plain text: block elements start new lines, runs of
    /// whitespace inside a line collapse to one space, parameters are dropped.
    pub fn plain_text(&self) -> String {
        let mut raw = String::new();
        self.collect_plain(&mut raw);
        raw.lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn collect_plain(&self, out: &mut String) {
        let block = BLOCK_TAGS.contains(&self.local_name());
        if block {
            out.push('\n');
        }
        if self.local_name() == "plain-text-body" {
            out.push_str(&self.text);
        } else {
            out.push_str(&self.text.replace('\n', " "));
        }
        for child in &self.children {
            if child.local_name() != "parameter" {
                child.collect_plain(out);
            }
            out.push_str(&child.tail.replace('\n', " "));
        }
        if block {
            out.push('\n');
        }
    }
}
