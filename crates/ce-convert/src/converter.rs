//! Document conversion: storage tree walk, macro dispatch, fallback.

use std::sync::Arc;

use ce_config::{ConvertConfig, FallbackStrategy};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use tracing::{debug, warn};

use crate::cleanup::{clean_document, inline_run, tidy_block, tighten_lists};
use crate::context::{ConversionContext, ConversionWarning, IncludeResolver, PageInfo};
use crate::element::{MacroElement, OutputMode};
use crate::error::{ConvertError, MacroError, MacroErrorKind};
use crate::parser::parse_storage;
use crate::processor::{ContentProcessor, ProcessContext, ProcessorOutput};
use crate::registry::{ProcessorRegistry, RegistrySnapshot};
use crate::serializer::serialize_node;
use crate::text::{
    code_fence, code_span, collapse_whitespace, escape_line_start, escape_markdown, slugify,
    wrap_inline,
};
use crate::tree::StorageNode;

/// Characters escaped in link targets. Parentheses would end a Markdown
/// link early.
const LINK_TARGET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'(')
    .add(b')');

/// Elements that always start a new block.
const BLOCK_ELEMENTS: &[&str] = &[
    "p",
    "div",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "ul",
    "ol",
    "table",
    "blockquote",
    "pre",
    "hr",
    "section",
    "article",
    "header",
    "footer",
    "main",
    "details",
    "task-list",
    "layout",
    "layout-section",
    "layout-cell",
    "rich-text-body",
];

/// Result of converting one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub markdown: String,
    /// Contained macro failures, in document order.
    pub warnings: Vec<ConversionWarning>,
    /// Attachment file names referenced by images and links, deduplicated.
    pub attachments: Vec<String>,
    /// Correlation id used in this conversion's log lines.
    pub session_id: String,
}

/// Converts storage documents to Markdown.
///
/// Cheap to share: one converter serves concurrent conversions, each taking
/// its own registry snapshot and [`ConversionContext`].
pub struct ContentConverter {
    registry: Arc<ProcessorRegistry>,
    config: ConvertConfig,
}

impl ContentConverter {
    pub fn new(registry: Arc<ProcessorRegistry>, config: ConvertConfig) -> Self {
        Self { registry, config }
    }

    /// Converter with the default processors and default settings.
    pub fn with_defaults() -> Self {
        Self::new(
            Arc::new(ProcessorRegistry::with_defaults()),
            ConvertConfig::default(),
        )
    }

    pub fn config(&self) -> &ConvertConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ProcessorRegistry> {
        &self.registry
    }

    /// Convert a storage body without include resolution.
    ///
    /// # Errors
    ///
    /// Fails only when the body is not well-formed markup. Macro failures are
    /// handled by the fallback policy and reported in
    /// [`Conversion::warnings`].
    pub fn convert(&self, storage: &str, page: &PageInfo) -> Result<Conversion, ConvertError> {
        self.convert_with(storage, page, None)
    }

    /// Convert a storage body, resolving include macros through `resolver`.
    pub fn convert_with(
        &self,
        storage: &str,
        page: &PageInfo,
        resolver: Option<&dyn IncludeResolver>,
    ) -> Result<Conversion, ConvertError> {
        let tree = parse_storage(storage)?;
        let mut walk = Walk {
            converter: self,
            registry: self.registry.snapshot(),
            ctx: ConversionContext::new(page, resolver),
        };
        debug!(
            page_id = walk.ctx.page_id(),
            session = %walk.ctx.session_id,
            mode = ?page.mode,
            "Converting document"
        );

        let body = walk.render_blocks(&tree);
        let markdown = match page.mode {
            OutputMode::Block => clean_document(&body),
            OutputMode::Inline => inline_run(&body),
        };

        let ConversionContext {
            session_id,
            warnings,
            attachments,
            ..
        } = walk.ctx;
        debug!(
            session = %session_id,
            warnings = warnings.len(),
            attachments = attachments.len(),
            "Document converted"
        );
        Ok(Conversion {
            markdown,
            warnings,
            attachments,
            session_id,
        })
    }
}

/// One depth-first pass over a document.
pub(crate) struct Walk<'r> {
    pub(crate) converter: &'r ContentConverter,
    registry: RegistrySnapshot,
    pub(crate) ctx: ConversionContext<'r>,
}

impl Walk<'_> {
    /// Markdown blocks for the children of a container, trimmed.
    pub(crate) fn render_blocks(&mut self, node: &StorageNode) -> String {
        let raw = self.render_children(node, false);
        tidy_block(&raw)
    }

    /// Children of a container flattened into one inline run.
    pub(crate) fn render_inline_run(&mut self, node: &StorageNode) -> String {
        inline_run(&self.render_blocks(node))
    }

    /// Render children. In block context, loose inline content between
    /// block elements is gathered into paragraphs.
    fn render_children(&mut self, node: &StorageNode, inline: bool) -> String {
        if inline {
            let mut out = text(&node.text);
            for child in &node.children {
                out.push_str(&self.render_node(child, true));
                out.push_str(&text(&child.tail));
            }
            return out;
        }

        let mut out = String::new();
        let mut run = text(&node.text);
        for child in &node.children {
            if is_block(child) {
                flush_paragraph(&mut run, &mut out);
                out.push_str(&self.render_node(child, false));
            } else {
                run.push_str(&self.render_node(child, true));
            }
            run.push_str(&text(&child.tail));
        }
        flush_paragraph(&mut run, &mut out);
        out
    }

    fn render_node(&mut self, node: &StorageNode, inline: bool) -> String {
        if MacroElement::is_macro(node) {
            return self.render_macro(node, inline);
        }

        match node.tag.as_str() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = usize::from(node.tag.as_bytes()[1] - b'0');
                let title = single_line(&self.render_children(node, true));
                if title.is_empty() {
                    String::new()
                } else {
                    format!("\n\n{} {title}\n\n", "#".repeat(level))
                }
            }
            "p" => {
                let mut run = self.render_children(node, true);
                let mut out = String::new();
                flush_paragraph(&mut run, &mut out);
                out
            }
            "strong" | "b" => wrap_inline(&self.render_children(node, true), "**"),
            "em" | "i" | "cite" => wrap_inline(&self.render_children(node, true), "*"),
            "s" | "del" | "strike" => wrap_inline(&self.render_children(node, true), "~~"),
            "code" | "tt" | "kbd" => code_span(collapse_whitespace(&node.text_content()).trim()),
            "sub" | "sup" => {
                let inner = self.render_children(node, true);
                format!("<{0}>{inner}</{0}>", node.tag)
            }
            "br" => "\\\n".to_owned(),
            "hr" => "\n\n---\n\n".to_owned(),
            "a" => self.render_anchor(node),
            "img" => {
                let alt = node.attr("alt").unwrap_or_default();
                node.attr("src").map_or_else(String::new, |src| {
                    format!("![{}]({})", escape_markdown(alt), encode_url(src))
                })
            }
            "ac:link" => self.render_link(node),
            "ac:image" => self.render_image(node),
            "ul" => self.render_list(node, false),
            "ol" => self.render_list(node, true),
            "ac:task-list" => self.render_task_list(node),
            "blockquote" => {
                let inner = self.render_blocks(node);
                format!("\n\n{}\n\n", quote_lines(&inner))
            }
            "pre" => {
                let language = node
                    .child("code")
                    .and_then(|c| c.classes().find_map(|cls| cls.strip_prefix("language-")));
                format!("\n\n{}\n\n", code_fence(&node.text_content(), language))
            }
            "table" => self.render_table(node),
            "ac:emoticon" => emoticon(node),
            "time" => node
                .attr("datetime")
                .map_or_else(|| text(&node.text_content()), str::to_owned),
            "ac:placeholder" | "ac:parameter" | "colgroup" | "col" | "script" | "style" => {
                String::new()
            }
            _ if node.in_namespace("ri") => String::new(),
            _ if BLOCK_ELEMENTS.contains(&node.local_name()) && !inline => {
                format!("\n\n{}\n\n", self.render_blocks(node))
            }
            _ => self.render_children(node, inline),
        }
    }

    fn render_anchor(&mut self, node: &StorageNode) -> String {
        let label = single_line(&self.render_children(node, true));
        match node.attr("href") {
            Some(href) if label.is_empty() => format!("<{href}>"),
            Some(href) => format!("[{label}]({})", encode_url(href)),
            None => label,
        }
    }

    fn render_link(&mut self, node: &StorageNode) -> String {
        let label = match (node.child("link-body"), node.child("plain-text-link-body")) {
            (Some(body), _) => single_line(&self.render_children(body, true)),
            (None, Some(body)) => escape_markdown(body.text.trim()),
            (None, None) => String::new(),
        };
        let anchor = node.attr("ac:anchor").filter(|a| !a.is_empty());

        if let Some(attachment) = node.child("attachment") {
            let filename = attachment.attr("ri:filename").unwrap_or_default();
            let label = or_default(label, filename);
            if filename.is_empty() {
                return label;
            }
            let target = self.attachment_target(attachment, filename);
            return format!("[{label}]({target})");
        }
        if let Some(page) = node.child("page") {
            let title = page.attr("ri:content-title").unwrap_or_default();
            let label = or_default(label, title);
            let space = page.attr("ri:space-key").or(self.ctx.page.space.as_deref());
            return match self.page_url(title, space, anchor) {
                Some(url) => format!("[{label}]({url})"),
                None => label,
            };
        }
        if let Some(url) = node.child("url").and_then(|u| u.attr("ri:value")) {
            let label = or_default(label, url);
            return format!("[{label}]({})", encode_url(url));
        }
        if let Some(anchor) = anchor {
            let label = or_default(label, anchor);
            return format!("[{label}](#{})", slugify(anchor));
        }
        label
    }

    fn render_image(&mut self, node: &StorageNode) -> String {
        let alt = node
            .attr("ac:alt")
            .or_else(|| node.attr("ac:title"))
            .unwrap_or_default();
        if let Some(attachment) = node.child("attachment") {
            let filename = attachment.attr("ri:filename").unwrap_or_default();
            if filename.is_empty() {
                return String::new();
            }
            let alt = if alt.is_empty() { filename } else { alt };
            let target = self.attachment_target(attachment, filename);
            return format!("![{}]({target})", escape_markdown(alt));
        }
        if let Some(url) = node.child("url").and_then(|u| u.attr("ri:value")) {
            return format!("![{}]({})", escape_markdown(alt), encode_url(url));
        }
        String::new()
    }

    /// Link target for an attachment. Attachments of the current page are
    /// recorded for download.
    fn attachment_target(&mut self, attachment: &StorageNode, filename: &str) -> String {
        let encoded = utf8_percent_encode(filename, LINK_TARGET).to_string();
        // Attachments of other pages are referenced by name only.
        if attachment.child("page").is_some() {
            return encoded;
        }
        self.ctx.add_attachment(filename);
        let page = self.ctx.page;
        if !page.attachment_prefix.is_empty() {
            return format!("{}{encoded}", page.attachment_prefix);
        }
        match (&page.base_url, &page.page_id) {
            (Some(base), Some(id)) => format!(
                "{}/download/attachments/{id}/{encoded}",
                base.trim_end_matches('/')
            ),
            _ => encoded,
        }
    }

    fn page_url(&self, title: &str, space: Option<&str>, anchor: Option<&str>) -> Option<String> {
        let base = self.ctx.page.base_url.as_deref()?;
        let space = space?;
        if title.is_empty() {
            return None;
        }
        let mut url = format!(
            "{}/display/{}/{}",
            base.trim_end_matches('/'),
            utf8_percent_encode(space, LINK_TARGET),
            utf8_percent_encode(title, LINK_TARGET)
        );
        if let Some(anchor) = anchor {
            url.push('#');
            url.push_str(&utf8_percent_encode(anchor, LINK_TARGET).to_string());
        }
        Some(url)
    }

    fn render_list(&mut self, node: &StorageNode, ordered: bool) -> String {
        let start = node
            .attr("start")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(1);
        let items: Vec<String> = node
            .children
            .iter()
            .filter(|c| c.local_name() == "li")
            .enumerate()
            .map(|(i, li)| {
                let marker = if ordered {
                    format!("{}. ", start + i)
                } else {
                    "- ".to_owned()
                };
                let content = tighten_lists(&self.render_blocks(li));
                indent_item(&marker, &content)
            })
            .collect();
        if items.is_empty() {
            return String::new();
        }
        format!("\n\n{}\n\n", items.join("\n"))
    }

    fn render_task_list(&mut self, node: &StorageNode) -> String {
        let items: Vec<String> = node
            .children
            .iter()
            .filter(|c| c.local_name() == "task")
            .map(|task| {
                let done = task
                    .child("task-status")
                    .is_some_and(|s| s.text.trim() == "complete");
                let marker = if done { "- [x] " } else { "- [ ] " };
                let content = task
                    .child("task-body")
                    .map(|body| tighten_lists(&self.render_blocks(body)))
                    .unwrap_or_default();
                indent_item(marker, &content)
            })
            .collect();
        if items.is_empty() {
            return String::new();
        }
        format!("\n\n{}\n\n", items.join("\n"))
    }

    fn render_table(&mut self, node: &StorageNode) -> String {
        let mut rows: Vec<Vec<String>> = Vec::new();
        for row in table_rows(node) {
            let cells = row
                .children
                .iter()
                .filter(|c| matches!(c.local_name(), "th" | "td"))
                .map(|cell| table_cell(&self.render_blocks(cell)))
                .collect();
            rows.push(cells);
        }
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        if columns == 0 {
            return String::new();
        }
        for row in &mut rows {
            row.resize(columns, String::new());
        }
        let widths: Vec<usize> = (0..columns)
            .map(|col| {
                rows.iter()
                    .map(|r| r[col].chars().count())
                    .max()
                    .unwrap_or(0)
                    .max(3)
            })
            .collect();

        let format_row = |row: &[String]| {
            let cells: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(cell, &width)| {
                    let pad = width - cell.chars().count();
                    format!("{cell}{}", " ".repeat(pad))
                })
                .collect();
            format!("| {} |", cells.join(" | "))
        };
        let mut lines = vec![format_row(&rows[0])];
        let separator: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
        lines.push(format!("| {} |", separator.join(" | ")));
        lines.extend(rows[1..].iter().map(|r| format_row(r)));
        format!("\n\n{}\n\n", lines.join("\n"))
    }

    fn render_macro(&mut self, node: &StorageNode, inline_context: bool) -> String {
        let element = MacroElement::from_node(node, inline_context);
        let output = match self.resolve(&element) {
            Ok(markdown) => markdown,
            Err(err) => self.fallback(&element, &err),
        };
        match element.mode() {
            OutputMode::Block => {
                let output = output.trim_matches('\n');
                if output.trim().is_empty() {
                    String::new()
                } else {
                    format!("\n\n{output}\n\n")
                }
            }
            OutputMode::Inline => output,
        }
    }

    fn resolve(&mut self, element: &MacroElement<'_>) -> Result<String, MacroError> {
        let level = self.ctx.depth + 1;
        let limit = self.converter.config.max_macro_depth;
        if level > limit {
            return Err(MacroError::DepthExceeded {
                depth: level,
                limit,
            });
        }
        let key = element.instance_key();
        if self.ctx.is_resolving(&key) {
            return Err(MacroError::Recursive(key));
        }
        let processor = self.select(element)?;
        debug!(
            session = %self.ctx.session_id,
            macro_type = element.display_type(),
            processor = processor.name(),
            depth = level,
            "Dispatching macro"
        );

        self.ctx.depth = level;
        let result = self.invoke(processor.as_ref(), element, key);
        self.ctx.depth = level - 1;
        result
    }

    fn select(&self, element: &MacroElement<'_>) -> Result<Arc<dyn ContentProcessor>, MacroError> {
        if let Some(type_id) = element.type_id() {
            if self.registry.is_blacklisted(type_id) {
                return Err(MacroError::Blacklisted(type_id.to_owned()));
            }
            if let Some(processor) = self.registry.lookup(type_id) {
                return Ok(Arc::clone(processor));
            }
        }
        self.registry
            .scan(element)
            .map(Arc::clone)
            .ok_or_else(|| MacroError::Unsupported(element.display_type().to_owned()))
    }

    fn invoke(
        &mut self,
        processor: &dyn ContentProcessor,
        element: &MacroElement<'_>,
        key: String,
    ) -> Result<String, MacroError> {
        let output = processor.process(element, &mut ProcessContext::new(self))?;
        match output {
            ProcessorOutput::Markdown(markdown) => Ok(markdown),
            ProcessorOutput::Skip => Ok(String::new()),
            ProcessorOutput::Storage(markup) => {
                let tree = parse_storage(&markup)
                    .map_err(|e| MacroError::failed(format!("malformed storage output: {e}")))?;
                let mode = element.mode();
                Ok(self.guarded(key, |walk| match mode {
                    OutputMode::Block => walk.render_blocks(&tree),
                    OutputMode::Inline => walk.render_inline_run(&tree),
                }))
            }
        }
    }

    /// Run `f` with `key` on the recursion guard; the key is removed again
    /// when `f` returns.
    fn guarded<T>(&mut self, key: String, f: impl FnOnce(&mut Self) -> T) -> T {
        self.ctx.push_guard(key);
        let out = f(self);
        self.ctx.pop_guard();
        out
    }

    fn fallback(&mut self, element: &MacroElement<'_>, err: &MacroError) -> String {
        let macro_type = element.display_type();
        let page_id = self.ctx.page_id();
        let session = &self.ctx.session_id;
        let kind = err.kind();
        match kind {
            MacroErrorKind::Recursive | MacroErrorKind::DepthExceeded => {
                warn!(page_id, session = %session, macro_type, error = %err, "Macro recursion stopped");
            }
            MacroErrorKind::Unsupported | MacroErrorKind::Blacklisted => {
                warn!(page_id, session = %session, macro_type, reason = kind.label(), "Macro not converted");
            }
            MacroErrorKind::ProcessorFailed | MacroErrorKind::IncludeFailed => {
                warn!(page_id, session = %session, macro_type, error = %err, "Macro processing failed");
            }
        }
        self.ctx.warnings.push(ConversionWarning {
            macro_type: macro_type.to_owned(),
            kind,
            message: err.to_string(),
        });

        match self.converter.config.fallback {
            FallbackStrategy::PreserveRaw => serialize_node(element.node()),
            FallbackStrategy::ConvertToText => {
                let plain = element.node().plain_text();
                let lines: Vec<String> = plain.lines().map(|l| escape_line_start(&escape_markdown(l))).collect();
                match element.mode() {
                    OutputMode::Block => lines.join("\n\n"),
                    OutputMode::Inline => lines.join(" "),
                }
            }
            FallbackStrategy::AnnotateAndSkip => format!(
                "<!-- {} macro '{macro_type}': {} -->",
                kind.label(),
                err.to_string().replace("--", "- -")
            ),
            FallbackStrategy::Skip => String::new(),
        }
    }
}

fn text(raw: &str) -> String {
    escape_markdown(&collapse_whitespace(raw))
}

fn is_block(node: &StorageNode) -> bool {
    if MacroElement::is_macro(node) {
        return MacroElement::from_node(node, false).mode() == OutputMode::Block;
    }
    BLOCK_ELEMENTS.contains(&node.local_name())
}

/// Emit gathered inline content as a paragraph and reset the buffer.
fn flush_paragraph(run: &mut String, out: &mut String) {
    let paragraph = trim_hard_break(run.trim());
    if !paragraph.is_empty() {
        let lines: Vec<&str> = paragraph.lines().map(str::trim_start).collect();
        out.push_str("\n\n");
        out.push_str(&escape_line_start(&lines.join("\n")));
        out.push_str("\n\n");
    }
    run.clear();
}

/// Drop a trailing hard line break, which would render a stray backslash.
fn trim_hard_break(text: &str) -> &str {
    let trailing = text.len() - text.trim_end_matches('\\').len();
    if trailing % 2 == 1 {
        text[..text.len() - 1].trim_end()
    } else {
        text
    }
}

fn single_line(text: &str) -> String {
    collapse_whitespace(&text.replace("\\\n", " "))
        .trim()
        .to_owned()
}

fn or_default(label: String, fallback: &str) -> String {
    if label.is_empty() {
        escape_markdown(fallback)
    } else {
        label
    }
}

fn encode_url(url: &str) -> String {
    url.replace(' ', "%20")
        .replace('(', "%28")
        .replace(')', "%29")
}

fn indent_item(marker: &str, content: &str) -> String {
    let pad = " ".repeat(marker.len());
    let mut out = String::new();
    for (i, line) in content.lines().enumerate() {
        if i == 0 {
            out.push_str(marker);
            out.push_str(line);
        } else {
            out.push('\n');
            if !line.is_empty() {
                out.push_str(&pad);
                out.push_str(line);
            }
        }
    }
    if out.is_empty() {
        marker.trim_end().to_owned()
    } else {
        out
    }
}

fn quote_lines(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                ">".to_owned()
            } else {
                format!("> {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn table_rows(table: &StorageNode) -> Vec<&StorageNode> {
    let mut rows = Vec::new();
    for child in &table.children {
        match child.local_name() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => {
                rows.extend(child.children.iter().filter(|c| c.local_name() == "tr"));
            }
            _ => {}
        }
    }
    rows
}

fn table_cell(content: &str) -> String {
    content
        .lines()
        .map(|line| trim_hard_break(line.trim()))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("<br>")
        .replace('|', "\\|")
}

fn emoticon(node: &StorageNode) -> String {
    if let Some(fallback) = node.attr("ac:emoji-fallback").filter(|f| !f.is_empty()) {
        return fallback.to_owned();
    }
    let name = node.attr("ac:name").unwrap_or_default();
    let glyph = match name {
        "smile" => "\u{1f642}",
        "sad" => "\u{1f641}",
        "cheeky" => "\u{1f61b}",
        "laugh" => "\u{1f600}",
        "wink" => "\u{1f609}",
        "thumbs-up" => "\u{1f44d}",
        "thumbs-down" => "\u{1f44e}",
        "information" => "\u{2139}\u{fe0f}",
        "tick" => "\u{2705}",
        "cross" => "\u{274c}",
        "warning" => "\u{26a0}\u{fe0f}",
        "plus" => "\u{2795}",
        "minus" => "\u{2796}",
        "question" => "\u{2753}",
        "light-on" | "light-off" => "\u{1f4a1}",
        "yellow-star" | "red-star" | "green-star" | "blue-star" => "\u{2b50}",
        "heart" => "\u{2764}\u{fe0f}",
        "broken-heart" => "\u{1f494}",
        "" => return String::new(),
        other => return format!(":{other}:"),
    };
    glyph.to_owned()
}
