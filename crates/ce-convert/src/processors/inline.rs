//! Small inline macros: `status` lozenges and `anchor` targets.

use crate::element::MacroElement;
use crate::error::MacroError;
use crate::processor::{ContentProcessor, ProcessContext, ProcessorOutput};
use crate::text::{escape_markdown, slugify};

/// Renders `status` lozenges as bold bracketed text.
pub struct StatusProcessor;

impl ContentProcessor for StatusProcessor {
    fn name(&self) -> &str {
        "status"
    }

    fn can_handle(&self, element: &MacroElement<'_>) -> bool {
        element.node().has_class("status-macro")
    }

    fn process(
        &self,
        element: &MacroElement<'_>,
        _ctx: &mut ProcessContext<'_, '_>,
    ) -> Result<ProcessorOutput, MacroError> {
        let title = element
            .param_str("title")
            .map(str::to_owned)
            .or_else(|| {
                let text = element.node().body_text();
                let text = text.trim();
                (!text.is_empty()).then(|| text.to_owned())
            })
            .or_else(|| element.param_str("colour").map(str::to_owned));
        Ok(title.map_or(ProcessorOutput::Skip, |t| {
            ProcessorOutput::markdown(format!("**[{}]**", escape_markdown(&t.to_uppercase())))
        }))
    }
}

/// Renders `anchor` as an HTML anchor so in-page links keep working.
pub struct AnchorProcessor;

impl ContentProcessor for AnchorProcessor {
    fn name(&self) -> &str {
        "anchor"
    }

    fn process(
        &self,
        element: &MacroElement<'_>,
        _ctx: &mut ProcessContext<'_, '_>,
    ) -> Result<ProcessorOutput, MacroError> {
        let name = element
            .param_str("")
            .or_else(|| element.param_str("name"))
            .map(slugify)
            .filter(|n| !n.is_empty());
        Ok(name.map_or(ProcessorOutput::Skip, |n| {
            ProcessorOutput::markdown(format!(r#"<a id="{n}"></a>"#))
        }))
    }
}

/// Navigation macros (`toc`, `children`, `pagetree`). The export layer
/// builds its own navigation, so they produce nothing.
pub struct NavigationProcessor;

impl ContentProcessor for NavigationProcessor {
    fn name(&self) -> &str {
        "navigation"
    }

    fn process(
        &self,
        element: &MacroElement<'_>,
        ctx: &mut ProcessContext<'_, '_>,
    ) -> Result<ProcessorOutput, MacroError> {
        tracing::debug!(
            session = ctx.session_id(),
            macro_type = element.display_type(),
            "Dropping navigation macro"
        );
        Ok(ProcessorOutput::Skip)
    }
}
