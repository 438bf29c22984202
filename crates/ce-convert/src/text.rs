//! Inline text helpers shared by the structural renderer and processors.

/// Collapse runs of ASCII whitespace (newlines included) into one space.
///
/// Non-breaking spaces are content and survive.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if ch.is_ascii_whitespace() {
            pending_space = true;
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(ch);
        }
    }
    if pending_space {
        out.push(' ');
    }
    out
}

/// Escape characters that would otherwise start Markdown inline syntax.
///
/// Underscores between word characters are left alone; `CommonMark` never
/// treats them as emphasis.
pub(crate) fn escape_markdown(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    for (i, &ch) in chars.iter().enumerate() {
        match ch {
            '\\' | '*' | '`' | '[' | ']' | '<' => {
                out.push('\\');
                out.push(ch);
            }
            '_' => {
                let inner = i > 0
                    && chars[i - 1].is_alphanumeric()
                    && chars.get(i + 1).is_some_and(|c| c.is_alphanumeric());
                if !inner {
                    out.push('\\');
                }
                out.push('_');
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Escape text so it cannot start a block construct at the beginning of a
/// line (`#`, `>`, list markers).
pub(crate) fn escape_line_start(text: &str) -> String {
    let trimmed = text.trim_start();
    let lead = &text[..text.len() - trimmed.len()];
    let needs_escape = trimmed.starts_with('#')
        || trimmed.starts_with('>')
        || trimmed.starts_with("- ")
        || trimmed.starts_with("+ ")
        || ordered_marker_len(trimmed).is_some();
    if !needs_escape {
        return text.to_owned();
    }
    if let Some(len) = ordered_marker_len(trimmed) {
        // "1. " -> "1\. "
        let (digits, rest) = trimmed.split_at(len - 1);
        return format!("{lead}{digits}\\{rest}");
    }
    format!("{lead}\\{trimmed}")
}

fn ordered_marker_len(text: &str) -> Option<usize> {
    let digits = text.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 || digits > 9 {
        return None;
    }
    let rest = &text[digits..];
    (rest.starts_with(". ") || rest.starts_with(") ")).then_some(digits + 1)
}

/// Longest run of `ch` in `text`.
pub(crate) fn longest_run(text: &str, ch: char) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == ch {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Inline code span whose delimiter outgrows any backtick run in `code`.
pub(crate) fn code_span(code: &str) -> String {
    if code.is_empty() {
        return String::new();
    }
    let ticks = "`".repeat(longest_run(code, '`') + 1);
    if code.starts_with('`') || code.ends_with('`') {
        format!("{ticks} {code} {ticks}")
    } else {
        format!("{ticks}{code}{ticks}")
    }
}

/// Fenced code block whose fence outgrows any backtick run in `code`.
pub(crate) fn code_fence(code: &str, language: Option<&str>) -> String {
    let fence = "`".repeat(longest_run(code, '`').max(2) + 1);
    let language = language.unwrap_or_default();
    let code = code.trim_end_matches(['\n', '\r']);
    format!("{fence}{language}\n{code}\n{fence}")
}

/// GitHub-style heading anchor: lowercase, punctuation dropped, spaces to
/// hyphens.
pub fn slugify(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('-'),
            c if c.is_alphanumeric() || c == '-' || c == '_' => Some(c),
            _ => None,
        })
        .collect()
}

/// Wrap inline content in an emphasis marker, keeping surrounding
/// whitespace outside the markers so the emphasis stays valid.
pub(crate) fn wrap_inline(inner: &str, marker: &str) -> String {
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        return inner.to_owned();
    }
    let lead = if inner.starts_with(char::is_whitespace) { " " } else { "" };
    let trail = if inner.ends_with(char::is_whitespace) { " " } else { "" };
    format!("{lead}{marker}{trimmed}{marker}{trail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("a \n\t b\u{a0}c "), "a b\u{a0}c ");
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("*a* [b] `c`"), r"\*a\* \[b\] \`c\`");
        assert_eq!(escape_markdown("snake_case _x_"), r"snake_case \_x\_");
        assert_eq!(escape_markdown("a <b>"), r"a \<b>");
    }

    #[test]
    fn test_escape_line_start() {
        assert_eq!(escape_line_start("# not heading"), r"\# not heading");
        assert_eq!(escape_line_start("1. not list"), r"1\. not list");
        assert_eq!(escape_line_start("plain"), "plain");
    }

    #[test]
    fn test_code_span_grows_delimiter() {
        assert_eq!(code_span("a`b"), "``a`b``");
        assert_eq!(code_span("`x`"), "`` `x` ``");
        assert_eq!(code_span("plain"), "`plain`");
    }

    #[test]
    fn test_code_fence() {
        assert_eq!(code_fence("x = 1\n", Some("py")), "```py\nx = 1\n```");
        assert_eq!(code_fence("```\nnested\n```", None), "````\n```\nnested\n```\n````");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Getting Started: v2.0!"), "getting-started-v20");
        assert_eq!(slugify("  Über  uns "), "über--uns");
    }

    #[test]
    fn test_wrap_inline() {
        assert_eq!(wrap_inline(" bold ", "**"), " **bold** ");
        assert_eq!(wrap_inline("  ", "**"), "  ");
    }
}
