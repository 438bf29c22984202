//! Line-based Markdown normalization passes.
//!
//! Every pass leaves fenced code untouched and is idempotent, so the
//! document-level cleanup can run on already clean text without change.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::fence::{FenceTracker, detect_fence};

static LINK_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(!?\[[^\]\n]*\])\(\s*([^()\s]+)(\s+"[^"\n]*")?\s*\)"#)
        .expect("invalid link target regex")
});

static LIST_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^( *)([-*+]|\d{1,9}[.)])( +|$)").expect("invalid list item regex")
});

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(#{1,6})(?:[ \t]+(.*?))?[ \t#]*$").expect("invalid heading regex"));

static BLOCKQUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}> ?(.*)$").expect("invalid blockquote regex"));

const PLACEHOLDER_OPEN: char = '\u{E000}';
const PLACEHOLDER_CLOSE: char = '\u{E001}';

/// Document-level cleanup applied to every converted page.
///
/// Normalizes line endings, strips trailing whitespace, closes an unclosed
/// code fence, trims link targets, puts blank lines around fences, headings
/// and lists, and allows at most one blank line in a row.
pub fn clean_document(markdown: &str) -> String {
    let normalized = normalize_line_endings(markdown);
    let mut lines = map_outside_fences(&normalized, |line| {
        trim_link_targets(line.trim_end())
    });
    close_open_fence(&mut lines);
    let lines = space_blocks(lines);
    let lines = collapse_blank_runs(lines, 2, 1);
    join_trimmed(&lines)
}

/// Normalize raw Markdown embedded in a page before it is rendered.
pub(crate) fn normalize_embedded(text: &str, tab_width: usize) -> String {
    let tab = " ".repeat(tab_width);
    let normalized = normalize_line_endings(text).replace('\t', &tab);
    let mut lines = Vec::new();
    for line in normalized.lines() {
        lines.extend(repair_fence_line(line.trim_end()));
    }
    let lines = collapse_blank_runs(lines, 4, 2);
    let lines = normalize_list_indent(lines);
    let text = lines.join("\n");
    map_outside_fences(&text, |line| trim_link_targets(line)).join("\n")
}

/// Lay out Markdown as a block: blank lines around fences, headings and
/// lists; at most two blank lines in a row.
pub(crate) fn layout_block(markdown: &str) -> String {
    let lines = markdown.lines().map(str::to_owned).collect();
    let lines = space_blocks(lines);
    let lines = collapse_blank_runs(lines, 3, 2);
    join_trimmed(&lines).trim_end().to_owned()
}

/// Flatten Markdown into one inline run.
///
/// Headings become bold, list items `• ` runs, block quotes quoted text.
/// Newlines inside fenced code and inline code spans are kept verbatim.
pub(crate) fn inline_run(markdown: &str) -> String {
    let mut protected = Vec::new();
    let text = protect_fences(&normalize_line_endings(markdown), &mut protected);
    let text = protect_code_spans(&text, &mut protected);

    let mut parts: Vec<String> = Vec::new();
    let mut quote: Vec<String> = Vec::new();
    for line in text.lines() {
        if let Some(caps) = BLOCKQUOTE.captures(line) {
            quote.push(caps[1].to_owned());
            continue;
        }
        if !quote.is_empty() {
            parts.push(format!("\"{}\"", quote.join(" ").trim()));
            quote.clear();
        }
        if let Some(caps) = HEADING.captures(line) {
            let title = caps.get(2).map_or("", |m| m.as_str()).trim();
            if !title.is_empty() {
                parts.push(format!("**{title}**"));
            }
        } else if let Some(caps) = LIST_ITEM.captures(line) {
            parts.push(format!("\u{2022} {}", &line[caps[0].len()..]));
        } else {
            parts.push(line.to_owned());
        }
    }
    if !quote.is_empty() {
        parts.push(format!("\"{}\"", quote.join(" ").trim()));
    }

    let joined = parts.join(" ");
    let collapsed = joined.split_whitespace().collect::<Vec<_>>().join(" ");
    restore_placeholders(&collapsed, &protected)
}

/// Trim a rendered fragment and allow at most one blank line in a row
/// outside fenced code. No trailing newline.
pub(crate) fn tidy_block(markdown: &str) -> String {
    let lines = markdown.lines().map(str::to_owned).collect();
    let lines = collapse_blank_runs(lines, 2, 1);
    join_trimmed(&lines).trim_end_matches('\n').to_owned()
}

/// Drop blank lines directly in front of list items so nested lists stay
/// tight inside their parent item.
pub(crate) fn tighten_lists(markdown: &str) -> String {
    let lines: Vec<&str> = markdown.lines().collect();
    let mut tracker = FenceTracker::new();
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        let was_in_fence = tracker.in_fence();
        let marker = tracker.update(line);
        let droppable = !was_in_fence
            && !marker
            && line.trim().is_empty()
            && lines.get(i + 1).is_some_and(|next| is_list_item(next));
        if !droppable {
            out.push(line);
        }
    }
    out.join("\n")
}

fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Apply `f` to every line outside fenced code; fence lines and code are
/// kept as they are.
fn map_outside_fences(text: &str, f: impl Fn(&str) -> String) -> Vec<String> {
    let mut tracker = FenceTracker::new();
    text.lines()
        .map(|line| {
            let was_in_fence = tracker.in_fence();
            if tracker.update(line) || was_in_fence {
                line.to_owned()
            } else {
                f(line)
            }
        })
        .collect()
}

fn trim_link_targets(line: &str) -> String {
    if !line.contains("](") {
        return line.to_owned();
    }
    LINK_TARGET
        .replace_all(line, |caps: &Captures| {
            let title = caps
                .get(3)
                .map(|t| format!(" {}", t.as_str().trim_start()))
                .unwrap_or_default();
            format!("{}({}{title})", &caps[1], &caps[2])
        })
        .into_owned()
}

/// Give a fence marker its own line and a space-free info string.
fn repair_fence_line(line: &str) -> Vec<String> {
    let trimmed = line.trim_start();
    let indent = &line[..line.len() - trimmed.len()];
    if let Some((ch, len)) = detect_fence(trimmed) {
        let info = trimmed[len..].trim();
        let marker: String = std::iter::repeat_n(ch, len).collect();
        return vec![format!("{indent}{marker}{info}")];
    }
    // Text followed by an opening fence on the same line.
    if let Some(pos) = line.find("```") {
        let (before, fence) = line.split_at(pos);
        if !before.trim().is_empty() && detect_fence(fence).is_some() {
            let mut lines = vec![before.trim_end().to_owned()];
            lines.extend(repair_fence_line(fence));
            return lines;
        }
    }
    vec![line.to_owned()]
}

fn is_list_item(line: &str) -> bool {
    LIST_ITEM.is_match(line)
}

fn is_heading(line: &str) -> bool {
    HEADING.is_match(line) && !line.trim().is_empty()
}

/// Rewrite list-marker indentation as 2-space nesting levels.
///
/// Column 0 is always the outermost level, so a run that opens with an
/// indented item keeps it nested relative to later top-level items.
fn normalize_list_indent(lines: Vec<String>) -> Vec<String> {
    let mut tracker = FenceTracker::new();
    let mut levels: Vec<usize> = vec![0];
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        let was_in_fence = tracker.in_fence();
        if tracker.update(&line) || was_in_fence {
            out.push(line);
            continue;
        }
        if let Some(caps) = LIST_ITEM.captures(&line) {
            let indent = caps[1].len();
            while levels.last().is_some_and(|&l| l > indent) {
                levels.pop();
            }
            if levels.last() != Some(&indent) {
                levels.push(indent);
            }
            let level = levels.len() - 1;
            out.push(format!("{}{}", "  ".repeat(level), &line[indent..]));
            continue;
        }
        if !line.is_empty() && !line.starts_with(' ') {
            levels.truncate(1);
        }
        out.push(line);
    }
    out
}

/// Ensure blank lines around fenced code, headings and list blocks.
fn space_blocks(lines: Vec<String>) -> Vec<String> {
    let mut tracker = FenceTracker::new();
    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 8);
    let mut blank_after = false;
    let mut in_list = false;

    for line in lines {
        let was_in_fence = tracker.in_fence();
        let is_fence_marker = tracker.update(&line);
        if was_in_fence {
            out.push(line);
            if is_fence_marker {
                blank_after = true;
            }
            continue;
        }

        let blank = line.trim().is_empty();
        let prev_blank = out.last().is_none_or(|l| l.trim().is_empty());
        if blank {
            out.push(line);
            blank_after = false;
            continue;
        }

        let list_item = is_list_item(&line);
        let continuation = in_list && line.starts_with(' ');
        let needs_blank_before = if is_fence_marker {
            !in_list || !line.starts_with(' ')
        } else if is_heading(&line) {
            true
        } else if list_item {
            !in_list
        } else {
            in_list && !continuation
        };

        if !prev_blank && (blank_after || needs_blank_before) {
            out.push(String::new());
        }
        blank_after = is_heading(&line) && !is_fence_marker;
        in_list = if list_item || continuation {
            true
        } else {
            // A fence opened inside a list item keeps the list open.
            in_list && is_fence_marker && line.starts_with(' ')
        };
        out.push(line);
    }
    out
}

/// Replace runs of at least `threshold` blank lines outside fences by
/// `keep` blank lines.
fn collapse_blank_runs(lines: Vec<String>, threshold: usize, keep: usize) -> Vec<String> {
    let mut tracker = FenceTracker::new();
    let mut out = Vec::with_capacity(lines.len());
    let mut run = 0usize;
    for line in lines {
        let was_in_fence = tracker.in_fence();
        let marker = tracker.update(&line);
        if !was_in_fence && !marker && line.trim().is_empty() {
            run += 1;
            continue;
        }
        let emit = if run >= threshold { keep } else { run };
        out.extend(std::iter::repeat_n(String::new(), emit));
        run = 0;
        out.push(line);
    }
    let emit = if run >= threshold { keep } else { run };
    out.extend(std::iter::repeat_n(String::new(), emit));
    out
}

fn close_open_fence(lines: &mut Vec<String>) {
    let mut tracker = FenceTracker::new();
    for line in lines.iter() {
        tracker.update(line);
    }
    if let Some(marker) = tracker.closing_marker() {
        lines.push(marker);
    }
}

/// Join lines without leading/trailing blank lines, ending in one newline.
fn join_trimmed(lines: &[String]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => {
            let mut out = lines[start..=end].join("\n");
            out.push('\n');
            out
        }
        _ => String::new(),
    }
}

fn placeholder(index: usize) -> String {
    format!("{PLACEHOLDER_OPEN}{index}{PLACEHOLDER_CLOSE}")
}

/// Swap fenced code blocks for placeholders.
fn protect_fences(text: &str, protected: &mut Vec<String>) -> String {
    let mut tracker = FenceTracker::new();
    let mut out: Vec<String> = Vec::new();
    let mut block: Vec<&str> = Vec::new();
    for line in text.lines() {
        let was_in_fence = tracker.in_fence();
        let marker = tracker.update(line);
        if was_in_fence || marker {
            block.push(line);
            if was_in_fence && marker {
                out.push(placeholder(protected.len()));
                protected.push(block.join("\n"));
                block.clear();
            }
        } else {
            out.push(line.to_owned());
        }
    }
    if !block.is_empty() {
        out.push(placeholder(protected.len()));
        protected.push(block.join("\n"));
    }
    out.join("\n")
}

/// Swap inline code spans (which may span lines) for placeholders.
fn protect_code_spans(text: &str, protected: &mut Vec<String>) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    let mut copied = 0;
    while i < bytes.len() {
        if bytes[i] != b'`' {
            i += 1;
            continue;
        }
        let run = bytes[i..].iter().take_while(|&&b| b == b'`').count();
        match find_closing_run(bytes, i + run, run) {
            Some(close) => {
                out.push_str(&text[copied..i]);
                out.push_str(&placeholder(protected.len()));
                protected.push(text[i..close + run].to_owned());
                i = close + run;
                copied = i;
            }
            None => i += run,
        }
    }
    out.push_str(&text[copied..]);
    out
}

fn find_closing_run(bytes: &[u8], from: usize, len: usize) -> Option<usize> {
    let mut j = from;
    while j < bytes.len() {
        if bytes[j] == b'`' {
            let run = bytes[j..].iter().take_while(|&&b| b == b'`').count();
            if run == len {
                return Some(j);
            }
            j += run;
        } else {
            j += 1;
        }
    }
    None
}

fn restore_placeholders(text: &str, protected: &[String]) -> String {
    if protected.is_empty() {
        return text.to_owned();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(PLACEHOLDER_OPEN) {
        out.push_str(&rest[..start]);
        let after = &rest[start + PLACEHOLDER_OPEN.len_utf8()..];
        let Some(end) = after.find(PLACEHOLDER_CLOSE) else {
            out.push_str(&rest[start..]);
            return out;
        };
        match after[..end].parse::<usize>().ok().and_then(|i| protected.get(i)) {
            Some(original) => out.push_str(original),
            None => out.push_str(&rest[start..start + PLACEHOLDER_OPEN.len_utf8() + end + PLACEHOLDER_CLOSE.len_utf8()]),
        }
        rest = &after[end + PLACEHOLDER_CLOSE.len_utf8()..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_clean_document_basic() {
        let input = "# Title\r\nText   \n\n\n\nMore\n";
        assert_eq!(clean_document(input), "# Title\n\nText\n\nMore\n");
    }

    #[test]
    fn test_clean_document_is_idempotent() {
        let input = "Intro\n## Head\n- a\n- b\nafter\n```rust\nlet x = 1;   \n\n\n\nlet y;\n```\ntext [l]( http://x )\n\n\n";
        let once = clean_document(input);
        assert_eq!(clean_document(&once), once);
    }

    #[test]
    fn test_clean_document_keeps_code_verbatim() {
        let input = "```\na   \n\n\n\nb\n```\n";
        assert_eq!(clean_document(input), input);
    }

    #[test]
    fn test_clean_document_closes_fence() {
        assert_eq!(clean_document("````\ncode"), "````\ncode\n````\n");
    }

    #[test]
    fn test_clean_document_spaces_blocks() {
        let input = "para\n- a\n  - b\n- c\nnext\n```\nx\n```\nend";
        assert_eq!(
            clean_document(input),
            "para\n\n- a\n  - b\n- c\n\nnext\n\n```\nx\n```\n\nend\n"
        );
    }

    #[test]
    fn test_clean_document_empty() {
        assert_eq!(clean_document("\n \n"), "");
    }

    #[test]
    fn test_trim_link_targets() {
        assert_eq!(
            trim_link_targets(r#"see [a]( http://a ) and ![i](  img.png   "T" )"#),
            r#"see [a](http://a) and ![i](img.png "T")"#
        );
    }

    #[test]
    fn test_normalize_embedded() {
        let input = "# T\r\n\tindented\n\n\n\n\n\nText ```python\nx\n```\n    * nested\n* top\n";
        assert_eq!(
            normalize_embedded(input, 4),
            "# T\n    indented\n\n\nText\n```python\nx\n```\n  * nested\n* top"
        );
    }

    #[test]
    fn test_repair_fence_spacing() {
        assert_eq!(repair_fence_line("``` python  "), vec!["```python".to_owned()]);
        assert_eq!(repair_fence_line("use ``code`` here"), vec!["use ``code`` here".to_owned()]);
    }

    #[test]
    fn test_list_indent_levels() {
        let lines = ["- a", "    - b", "        - c", "    - d", "- e"]
            .map(str::to_owned)
            .to_vec();
        assert_eq!(
            normalize_list_indent(lines),
            ["- a", "  - b", "    - c", "  - d", "- e"]
        );
    }

    #[test]
    fn test_list_indent_run_opening_indented() {
        let lines = ["    * deep", "* top", "  * child", "text", "   * fresh"]
            .map(str::to_owned)
            .to_vec();
        assert_eq!(
            normalize_list_indent(lines),
            ["  * deep", "* top", "  * child", "text", "  * fresh"]
        );
    }

    #[test]
    fn test_layout_block() {
        assert_eq!(
            layout_block("text\n# H\nmore\n\n\n\n\nend"),
            "text\n\n# H\n\nmore\n\n\nend"
        );
    }

    #[test]
    fn test_tidy_block() {
        assert_eq!(tidy_block("\n\nA\n\n\n\nB\n\n"), "A\n\nB");
    }

    #[test]
    fn test_tighten_lists() {
        assert_eq!(tighten_lists("item\n\n- sub\n\n- sub2\n\ntext"), "item\n- sub\n- sub2\n\ntext");
    }

    #[test]
    fn test_inline_run() {
        let input = "# Title\n- one\n- two\n> quoted\n> text\nplain   words";
        assert_eq!(
            inline_run(input),
            "**Title** \u{2022} one \u{2022} two \"quoted text\" plain words"
        );
    }

    #[test]
    fn test_inline_run_keeps_code_newlines() {
        assert_eq!(inline_run("x `a\nb` y\nz"), "x `a\nb` y z");
        assert_eq!(inline_run("before\n```\nl1\nl2\n```\nafter"), "before ```\nl1\nl2\n``` after");
    }
}
