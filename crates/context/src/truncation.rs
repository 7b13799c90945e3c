/// Largest index `<= max` that falls on a UTF-8 character boundary.
pub fn floor_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut i = max;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Truncate `content` to at most `max_chars` bytes at a UTF-8 boundary and
/// append `marker` when anything was cut. Returns whether truncation happened.
pub fn truncate_with_marker(content: &str, max_chars: usize, marker: &str) -> (String, bool) {
    if content.len() <= max_chars {
        return (content.to_string(), false);
    }
    let boundary = floor_boundary(content, max_chars);
    let mut result = content[..boundary].to_string();
    result.push_str(marker);
    (result, true)
}

/// Cut a line of text for display, appending an ellipsis when shortened.
pub fn clip(content: &str, max_chars: usize) -> String {
    let (mut s, cut) = truncate_with_marker(content.trim(), max_chars, "");
    if cut {
        s.push('…');
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_truncation_when_under_limit() {
        let (result, truncated) = truncate_with_marker("hello world", 100, "[TRUNCATED]");
        assert_eq!(result, "hello world");
        assert!(!truncated);
    }

    #[test]
    fn truncates_at_limit_with_marker() {
        let (result, truncated) = truncate_with_marker("abcdefghij", 5, "\n[TRUNCATED]");
        assert!(truncated);
        assert_eq!(result, "abcde\n[TRUNCATED]");
    }

    #[test]
    fn never_splits_a_multibyte_char() {
        // "é" is two bytes; a cut at 2 would land inside it.
        let (result, truncated) = truncate_with_marker("aé bc", 2, "");
        assert!(truncated);
        assert_eq!(result, "a");
        assert_eq!(floor_boundary("aé", 10), 3);
    }

    #[test]
    fn clip_adds_ellipsis_only_when_cut() {
        assert_eq!(clip("short", 10), "short");
        assert_eq!(clip("a longer line", 8), "a longer…");
    }
}
