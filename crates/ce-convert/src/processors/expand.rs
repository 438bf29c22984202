//! Collapsible `expand` macro.

use crate::element::{MacroElement, OutputMode};
use crate::error::MacroError;
use crate::processor::{ContentProcessor, ProcessContext, ProcessorOutput};

const DEFAULT_TITLE: &str = "Click here to expand...";

/// Renders `expand` as an HTML `<details>` block.
pub struct ExpandProcessor;

impl ContentProcessor for ExpandProcessor {
    fn name(&self) -> &str {
        "expand"
    }

    fn can_handle(&self, element: &MacroElement<'_>) -> bool {
        element.node().has_class("expand-container")
    }

    fn process(
        &self,
        element: &MacroElement<'_>,
        ctx: &mut ProcessContext<'_, '_>,
    ) -> Result<ProcessorOutput, MacroError> {
        let title = element.param_str("title").unwrap_or(DEFAULT_TITLE);
        let body = ctx.render_body(element);
        let markdown = match element.mode() {
            OutputMode::Inline => format!("{title}: {body}").trim_end().to_owned(),
            OutputMode::Block if body.is_empty() => {
                format!("<details>\n<summary>{}</summary>\n</details>", escape_html(title))
            }
            OutputMode::Block => format!(
                "<details>\n<summary>{}</summary>\n\n{body}\n\n</details>",
                escape_html(title)
            ),
        };
        Ok(ProcessorOutput::Markdown(markdown))
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
