//! Page inclusion (`include`, `excerpt-include`).
//!
//! Both return the target's storage markup, which the converter resolves
//! recursively under the recursion guard.

use crate::context::IncludeTarget;
use crate::element::MacroElement;
use crate::error::MacroError;
use crate::parser::parse_storage;
use crate::processor::{ContentProcessor, ProcessContext, ProcessorOutput};
use crate::serializer::serialize_children;
use crate::tree::StorageNode;

/// Inlines another page's body.
pub struct IncludeProcessor;

impl ContentProcessor for IncludeProcessor {
    fn name(&self) -> &str {
        "include"
    }

    fn process(
        &self,
        element: &MacroElement<'_>,
        ctx: &mut ProcessContext<'_, '_>,
    ) -> Result<ProcessorOutput, MacroError> {
        let target = include_target(element, ctx.space())
            .ok_or_else(|| MacroError::failed("include has no target page"))?;
        let body = ctx.resolve_include(&target)?;

        if element.type_id() != Some("excerpt-include") {
            return Ok(ProcessorOutput::Storage(body));
        }
        let tree = parse_storage(&body)
            .map_err(|e| MacroError::include(target.to_string(), format!("malformed body: {e}")))?;
        let excerpt = tree
            .find(&is_excerpt)
            .and_then(|m| m.child("rich-text-body"))
            .ok_or_else(|| MacroError::include(target.to_string(), "page has no excerpt"))?;
        Ok(ProcessorOutput::Storage(serialize_children(excerpt)))
    }
}

fn is_excerpt(node: &StorageNode) -> bool {
    matches!(node.tag.as_str(), "ac:structured-macro" | "ac:macro")
        && node
            .attr("ac:name")
            .is_some_and(|n| n.eq_ignore_ascii_case("excerpt"))
}

/// Target page from id parameters or a page link parameter.
pub(crate) fn include_target(
    element: &MacroElement<'_>,
    current_space: Option<&str>,
) -> Option<IncludeTarget> {
    let page_id = ["pageId", "page-id", "contentId"]
        .iter()
        .find_map(|name| element.param_str(name))
        .map(str::to_owned);

    let link = element.node().find(&|n| n.tag == "ri:page");
    let title = link
        .and_then(|l| l.attr("ri:content-title"))
        .or_else(|| element.param_str(""))
        .or_else(|| element.param_str("title"))
        .or_else(|| element.param_str("page"))
        .map(str::to_owned);
    let space = link
        .and_then(|l| l.attr("ri:space-key"))
        .or_else(|| element.param_str("spaceKey"))
        .or(current_space)
        .map(str::to_owned);

    if page_id.is_none() && title.is_none() {
        return None;
    }
    Some(IncludeTarget {
        page_id,
        title,
        space,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(storage: &str) -> Option<IncludeTarget> {
        let tree = parse_storage(storage).unwrap();
        include_target(&MacroElement::from_node(&tree.children[0], false), Some("HOME"))
    }

    #[test]
    fn test_target_by_id() {
        let t = target(
            r#"<ac:structured-macro ac:name="include"><ac:parameter ac:name="pageId">42</ac:parameter></ac:structured-macro>"#,
        )
        .unwrap();
        assert_eq!(t.page_id.as_deref(), Some("42"));
        assert_eq!(t.space.as_deref(), Some("HOME"));
    }

    #[test]
    fn test_target_by_link() {
        let t = target(
            r#"<ac:structured-macro ac:name="include"><ac:parameter ac:name=""><ac:link><ri:page ri:content-title="Setup" ri:space-key="DOC" /></ac:link></ac:parameter></ac:structured-macro>"#,
        )
        .unwrap();
        assert_eq!(t.page_id, None);
        assert_eq!(t.title.as_deref(), Some("Setup"));
        assert_eq!(t.space.as_deref(), Some("DOC"));
    }

    #[test]
    fn test_no_target() {
        assert!(target(r#"<ac:structured-macro ac:name="include" />"#).is_none());
    }
}
