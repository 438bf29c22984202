//! Statically linked default processors.

mod code;
mod expand;
mod include;
mod inline;
mod markdown;
mod panel;
mod passthrough;

use std::sync::Arc;

pub use code::CodeProcessor;
pub use expand::ExpandProcessor;
pub use include::IncludeProcessor;
pub use inline::{AnchorProcessor, NavigationProcessor, StatusProcessor};
pub use markdown::MarkdownProcessor;
pub use panel::PanelProcessor;
pub use passthrough::PassthroughProcessor;

use crate::processor::ContentProcessor;
use crate::registry::{DEFAULT_PRIORITY, ProcessorRegistry};

/// Type id the passthrough processor is registered under.
pub const PASSTHROUGH_TYPE: &str = "*";

/// Register the default processor table.
///
/// Order matters for the predicate scan among equal priorities: the
/// embedded-markdown processor is consulted before code and panels.
pub(crate) fn register_defaults(registry: &ProcessorRegistry) {
    let code: Arc<dyn ContentProcessor> = Arc::new(CodeProcessor);
    let panel: Arc<dyn ContentProcessor> = Arc::new(PanelProcessor);
    let include: Arc<dyn ContentProcessor> = Arc::new(IncludeProcessor);
    let navigation: Arc<dyn ContentProcessor> = Arc::new(NavigationProcessor);

    registry.register("markdown", Arc::new(MarkdownProcessor), DEFAULT_PRIORITY);
    registry.register("code", Arc::clone(&code), DEFAULT_PRIORITY);
    registry.register("noformat", code, DEFAULT_PRIORITY);
    for type_id in ["info", "note", "warning", "tip", "panel"] {
        registry.register(type_id, Arc::clone(&panel), DEFAULT_PRIORITY);
    }
    registry.register("expand", Arc::new(ExpandProcessor), DEFAULT_PRIORITY);
    registry.register("include", Arc::clone(&include), DEFAULT_PRIORITY);
    registry.register("excerpt-include", include, DEFAULT_PRIORITY);
    registry.register("status", Arc::new(StatusProcessor), DEFAULT_PRIORITY);
    registry.register("anchor", Arc::new(AnchorProcessor), DEFAULT_PRIORITY);
    for type_id in ["toc", "children", "pagetree"] {
        registry.register(type_id, Arc::clone(&navigation), DEFAULT_PRIORITY);
    }
    registry.register(PASSTHROUGH_TYPE, Arc::new(PassthroughProcessor), 0);
}
