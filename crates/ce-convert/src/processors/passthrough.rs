//! Generic container handling.

use crate::element::{MacroBody, MacroElement};
use crate::error::MacroError;
use crate::processor::{ContentProcessor, ProcessContext, ProcessorOutput};

/// Renders the rich body of any macro nobody else claims (`section`,
/// `column`, `excerpt`, ...).
///
/// Registered under `*` at priority 0 so it is only reached through the
/// predicate scan, after every specific processor declined.
pub struct PassthroughProcessor;

impl ContentProcessor for PassthroughProcessor {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn can_handle(&self, element: &MacroElement<'_>) -> bool {
        matches!(element.body(), MacroBody::Rich(_))
    }

    fn process(
        &self,
        element: &MacroElement<'_>,
        ctx: &mut ProcessContext<'_, '_>,
    ) -> Result<ProcessorOutput, MacroError> {
        match element.body() {
            MacroBody::Rich(_) => Ok(ProcessorOutput::Markdown(ctx.render_body(element))),
            MacroBody::Plain(_) | MacroBody::Empty => Err(MacroError::failed(format!(
                "macro '{}' has no rich body to pass through",
                element.display_type()
            ))),
        }
    }
}
