//! Code fence tracking for line-based Markdown passes.

/// Tracks whether a line-by-line pass is inside a fenced code block.
///
/// Fences use backticks or tildes, three or more. A closing fence must use
/// the same character, be at least as long as the opener and carry no info
/// string.
#[derive(Debug, Default)]
pub(crate) struct FenceTracker {
    fence_char: Option<char>,
    fence_len: usize,
}

impl FenceTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn in_fence(&self) -> bool {
        self.fence_char.is_some()
    }

    /// Feed one line. Returns `true` if the line opened or closed a fence.
    pub(crate) fn update(&mut self, line: &str) -> bool {
        let trimmed = line.trim_start();
        if let Some(ch) = self.fence_char {
            if is_closing_fence(trimmed, ch, self.fence_len) {
                self.fence_char = None;
                self.fence_len = 0;
                return true;
            }
            return false;
        }
        if let Some((ch, len)) = detect_fence(trimmed) {
            self.fence_char = Some(ch);
            self.fence_len = len;
            return true;
        }
        false
    }

    /// Marker that closes the currently open fence, if any.
    pub(crate) fn closing_marker(&self) -> Option<String> {
        self.fence_char
            .map(|ch| std::iter::repeat_n(ch, self.fence_len).collect())
    }
}

/// Fence character and run length if the (left-trimmed) line opens a fence.
pub(crate) fn detect_fence(trimmed: &str) -> Option<(char, usize)> {
    let first = trimmed.chars().next()?;
    if first != '`' && first != '~' {
        return None;
    }
    let count = trimmed.chars().take_while(|&c| c == first).count();
    // A backtick fence's info string cannot contain backticks.
    if count < 3 || (first == '`' && trimmed[count..].contains('`')) {
        return None;
    }
    Some((first, count))
}

fn is_closing_fence(trimmed: &str, expected: char, min_len: usize) -> bool {
    if !trimmed.starts_with(expected) {
        return false;
    }
    let count = trimmed.chars().take_while(|&c| c == expected).count();
    count >= min_len && trimmed[count..].chars().all(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backtick_fence() {
        let mut tracker = FenceTracker::new();
        assert!(tracker.update("```rust"));
        assert!(tracker.in_fence());
        assert!(!tracker.update("let a = 1;"));
        assert!(tracker.update("```"));
        assert!(!tracker.in_fence());
    }

    #[test]
    fn test_tilde_fence_not_closed_by_backticks() {
        let mut tracker = FenceTracker::new();
        assert!(tracker.update("~~~"));
        assert!(!tracker.update("```"));
        assert!(tracker.in_fence());
        assert!(tracker.update("~~~~"));
        assert!(!tracker.in_fence());
    }

    #[test]
    fn test_shorter_fence_does_not_close() {
        let mut tracker = FenceTracker::new();
        assert!(tracker.update("````"));
        assert!(!tracker.update("```"));
        assert_eq!(tracker.closing_marker().as_deref(), Some("````"));
    }

    #[test]
    fn test_closing_fence_rejects_info_string() {
        let mut tracker = FenceTracker::new();
        tracker.update("```");
        assert!(!tracker.update("```python"));
        assert!(tracker.in_fence());
    }

    #[test]
    fn test_inline_code_is_not_a_fence() {
        let mut tracker = FenceTracker::new();
        assert!(!tracker.update("``code``"));
        assert!(!tracker.update("```inline``` text"));
        assert!(!tracker.in_fence());
        assert_eq!(tracker.closing_marker(), None);
    }

    #[test]
    fn test_indented_fence() {
        let mut tracker = FenceTracker::new();
        assert!(tracker.update("   ```"));
        assert!(tracker.update("  ```"));
        assert!(!tracker.in_fence());
    }
}
