//! Content processor trait.

use crate::context::IncludeTarget;
use crate::converter::Walk;
use crate::element::{MacroBody, MacroElement, OutputMode};
use crate::error::MacroError;
use crate::tree::StorageNode;

/// Output from processing a macro.
///
/// - [`Markdown`](Self::Markdown): final Markdown, inserted as-is
/// - [`Storage`](Self::Storage): storage markup that is converted again,
///   one level deeper, with the macro instance on the recursion guard
///   (used by includes)
/// - [`Skip`](Self::Skip): the macro produces nothing
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessorOutput {
    Markdown(String),
    Storage(String),
    Skip,
}

impl ProcessorOutput {
    #[must_use]
    pub fn markdown(s: impl Into<String>) -> Self {
        Self::Markdown(s.into())
    }

    #[must_use]
    pub fn storage(s: impl Into<String>) -> Self {
        Self::Storage(s.into())
    }
}

/// Handler for one or more macro types.
///
/// Processors are shared across concurrent conversions, so they must be
/// `Send + Sync` and keep no per-document state; everything per-document
/// lives in the [`ProcessContext`].
///
/// # Example
///
/// ```
/// use ce_convert::{ContentProcessor, MacroElement, MacroError, ProcessContext, ProcessorOutput};
///
/// struct Kbd;
///
/// impl ContentProcessor for Kbd {
///     fn name(&self) -> &str { "kbd" }
///
///     fn process(
///         &self,
///         element: &MacroElement<'_>,
///         _ctx: &mut ProcessContext<'_, '_>,
///     ) -> Result<ProcessorOutput, MacroError> {
///         let keys = element
///             .param_str("keys")
///             .ok_or_else(|| MacroError::failed("missing 'keys' parameter"))?;
///         Ok(ProcessorOutput::markdown(format!("<kbd>{keys}</kbd>")))
///     }
/// }
/// ```
pub trait ContentProcessor: Send + Sync {
    /// Processor name, used in logs.
    fn name(&self) -> &str;

    /// Whether this processor recognizes an element whose type is absent or
    /// unregistered. Must be pure.
    fn can_handle(&self, _element: &MacroElement<'_>) -> bool {
        false
    }

    /// Produce replacement content for the element.
    fn process(
        &self,
        element: &MacroElement<'_>,
        ctx: &mut ProcessContext<'_, '_>,
    ) -> Result<ProcessorOutput, MacroError>;
}

/// Per-invocation view of the running conversion handed to processors.
pub struct ProcessContext<'w, 'r> {
    walk: &'w mut Walk<'r>,
}

impl<'w, 'r> ProcessContext<'w, 'r> {
    pub(crate) fn new(walk: &'w mut Walk<'r>) -> Self {
        Self { walk }
    }

    pub fn page_id(&self) -> Option<&str> {
        self.walk.ctx.page.page_id.as_deref()
    }

    pub fn space(&self) -> Option<&str> {
        self.walk.ctx.page.space.as_deref()
    }

    pub fn session_id(&self) -> &str {
        &self.walk.ctx.session_id
    }

    /// Macro nesting level of the element being processed (1 = top level).
    pub fn depth(&self) -> usize {
        self.walk.ctx.depth
    }

    /// Spaces per tab when normalizing raw text.
    pub fn tab_width(&self) -> usize {
        self.walk.converter.config().tab_width
    }

    /// Convert the element's body to Markdown in the element's output mode.
    ///
    /// Macros nested in a rich body are resolved one level deeper.
    pub fn render_body(&mut self, element: &MacroElement<'_>) -> String {
        match element.body() {
            MacroBody::Empty => String::new(),
            MacroBody::Plain(text) => text.trim().to_owned(),
            MacroBody::Rich(node) => self.render(node, element.mode()),
        }
    }

    /// Convert the children of an arbitrary container node.
    pub fn render(&mut self, node: &StorageNode, mode: OutputMode) -> String {
        match mode {
            OutputMode::Block => self.walk.render_blocks(node),
            OutputMode::Inline => self.walk.render_inline_run(node),
        }
    }

    /// Fetch the storage body of an include target.
    pub fn resolve_include(&self, target: &IncludeTarget) -> Result<String, MacroError> {
        let resolver = self
            .walk
            .ctx
            .resolver
            .ok_or_else(|| MacroError::include(target.to_string(), "no include resolver configured"))?;
        resolver.resolve(target)
    }
}
