//! Code block macros (`code`, `noformat`).

use crate::element::{MacroBody, MacroElement, OutputMode};
use crate::error::MacroError;
use crate::processor::{ContentProcessor, ProcessContext, ProcessorOutput};
use crate::text::{code_fence, code_span, escape_markdown};

/// Renders code macros as fenced code blocks.
pub struct CodeProcessor;

impl ContentProcessor for CodeProcessor {
    fn name(&self) -> &str {
        "code"
    }

    fn can_handle(&self, element: &MacroElement<'_>) -> bool {
        matches!(element.body(), MacroBody::Plain(_))
            && (element.param_str("language").is_some()
                || element.node().has_class("code")
                || element.node().has_class("codeContent"))
    }

    fn process(
        &self,
        element: &MacroElement<'_>,
        _ctx: &mut ProcessContext<'_, '_>,
    ) -> Result<ProcessorOutput, MacroError> {
        let code = match element.body() {
            MacroBody::Plain(text) => text.to_owned(),
            MacroBody::Rich(node) => node.text_content(),
            MacroBody::Empty => element.node().body_text(),
        };
        let code = code.trim_matches(['\n', '\r']);
        if code.trim().is_empty() {
            return Ok(ProcessorOutput::Skip);
        }

        if element.mode() == OutputMode::Inline {
            return Ok(ProcessorOutput::markdown(code_span(code)));
        }

        let language = if element.type_id() == Some("noformat") {
            None
        } else {
            element.param_str("language").map(normalize_language)
        };
        let fence = code_fence(code, language.as_deref());
        let markdown = match element.param_str("title") {
            Some(title) => format!("**{}**\n\n{fence}", escape_markdown(title)),
            None => fence,
        };
        Ok(ProcessorOutput::Markdown(markdown))
    }
}

/// Map the server's brush names to common fence languages.
fn normalize_language(language: &str) -> String {
    let lower = language.trim().to_ascii_lowercase();
    match lower.as_str() {
        "js" | "jscript" => "javascript".to_owned(),
        "shell" | "bash" => "bash".to_owned(),
        "c#" | "csharp" => "csharp".to_owned(),
        "c++" | "cpp" => "cpp".to_owned(),
        "none" | "text" | "plain" => String::new(),
        _ => lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_language() {
        assert_eq!(normalize_language("JScript"), "javascript");
        assert_eq!(normalize_language("Rust"), "rust");
        assert_eq!(normalize_language("none"), "");
    }
}
