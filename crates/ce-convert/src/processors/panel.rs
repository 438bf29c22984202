//! Admonition macros (`info`, `note`, `warning`, `tip`, `panel`).

use crate::element::{MacroElement, OutputMode};
use crate::error::MacroError;
use crate::processor::{ContentProcessor, ProcessContext, ProcessorOutput};
use crate::text::escape_markdown;

/// Class the server puts on rendered admonitions.
const INFORMATION_CLASS: &str = "confluence-information-macro";

/// Renders admonitions as GitHub alert blockquotes.
pub struct PanelProcessor;

struct Style {
    alert: Option<&'static str>,
    label: &'static str,
}

fn style(kind: &str) -> Style {
    let (alert, label) = match kind {
        "info" | "information" => (Some("NOTE"), "Info"),
        "tip" => (Some("TIP"), "Tip"),
        "note" => (Some("IMPORTANT"), "Note"),
        "warning" => (Some("WARNING"), "Warning"),
        _ => (None, "Panel"),
    };
    Style { alert, label }
}

/// Admonition kind from the type id or the rendered class name.
fn kind<'a>(element: &'a MacroElement<'_>) -> &'a str {
    if let Some(type_id) = element.type_id() {
        return type_id;
    }
    element
        .node()
        .classes()
        .find_map(|c| c.strip_prefix("confluence-information-macro-"))
        .unwrap_or("panel")
}

impl ContentProcessor for PanelProcessor {
    fn name(&self) -> &str {
        "panel"
    }

    fn can_handle(&self, element: &MacroElement<'_>) -> bool {
        element.node().has_class(INFORMATION_CLASS) || element.node().has_class("panel")
    }

    fn process(
        &self,
        element: &MacroElement<'_>,
        ctx: &mut ProcessContext<'_, '_>,
    ) -> Result<ProcessorOutput, MacroError> {
        let style = style(kind(element));
        let title = element.param_str("title").map(escape_markdown);
        let body = ctx.render_body(element);

        if element.mode() == OutputMode::Inline {
            let label = title.unwrap_or_else(|| style.label.to_owned());
            return Ok(ProcessorOutput::markdown(format!("**{label}:** {body}").trim_end()));
        }

        let mut lines: Vec<String> = Vec::new();
        if let Some(alert) = style.alert {
            lines.push(format!("[!{alert}]"));
        }
        if let Some(title) = title {
            lines.push(format!("**{title}**"));
        }
        if !body.is_empty() {
            if !lines.is_empty() && style.alert.is_none_or(|_| lines.len() > 1) {
                lines.push(String::new());
            }
            lines.extend(body.lines().map(str::to_owned));
        }
        if lines.is_empty() {
            return Ok(ProcessorOutput::Skip);
        }
        let quoted: Vec<String> = lines
            .iter()
            .map(|l| if l.is_empty() { ">".to_owned() } else { format!("> {l}") })
            .collect();
        Ok(ProcessorOutput::Markdown(quoted.join("\n")))
    }
}
