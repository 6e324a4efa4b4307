//! UTF-8-safe text helpers shared by output capping, previews and cache keys.

/// Longest prefix of `text` that fits in `max_bytes` without splitting a char.
pub fn safe_prefix_by_bytes(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Cap `text` at `max_bytes`, appending `suffix` only when something was cut.
pub fn truncate_with_suffix_by_bytes(text: &str, max_bytes: usize, suffix: &str) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    format!("{}{suffix}", safe_prefix_by_bytes(text, max_bytes))
}

/// Lowercase and collapse every whitespace run to one space.
pub fn normalize_for_key(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// First line of `text`, cut to `max_chars` with an ellipsis.
pub fn one_line_preview(text: &str, max_chars: usize) -> String {
    let line = text.lines().next().unwrap_or_default().trim();
    let multi_line = text.trim().lines().nth(1).is_some();
    if line.chars().count() <= max_chars && !multi_line {
        return line.to_string();
    }
    let prefix: String = line.chars().take(max_chars).collect();
    format!("{prefix}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_prefix_never_splits_a_codepoint() {
        let s = "a\u{e9}\u{1F642}";
        assert_eq!(safe_prefix_by_bytes(s, 2), "a");
        assert_eq!(safe_prefix_by_bytes(s, 3), "a\u{e9}");
        assert_eq!(safe_prefix_by_bytes(s, 64), s);
    }

    #[test]
    fn truncate_marks_only_when_cut() {
        assert_eq!(truncate_with_suffix_by_bytes("hello", 5, "~"), "hello");
        assert_eq!(
            truncate_with_suffix_by_bytes("\u{1F642}\u{1F642}", 5, "...[truncated]"),
            "\u{1F642}...[truncated]"
        );
    }

    #[test]
    fn normalize_for_key_folds_case_and_spacing() {
        assert_eq!(normalize_for_key("  List\tFILES \n here "), "list files here");
        assert_eq!(normalize_for_key(""), "");
    }

    #[test]
    fn one_line_preview_flags_hidden_lines() {
        assert_eq!(one_line_preview("ls -la", 20), "ls -la");
        assert_eq!(one_line_preview("echo a\necho b", 20), "echo a…");
        assert_eq!(one_line_preview("abcdef", 3), "abc…");
    }
}
