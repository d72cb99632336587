//! Text sanitizing for chat markup.
//!
//! Titles come from third-party feeds and routinely contain `*`, `_`, `[`
//! and friends. Everything that reaches a notifier goes through
//! [`sanitize_text`] so the rendered message cannot break.

/// Characters with meaning in chat markdown (the Telegram MarkdownV2 set, a superset of Discord's)
const MARKDOWN_SPECIAL: &[char] = &[
    '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Backslash-escapes every markdown-special character.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        if MARKDOWN_SPECIAL.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Collapses whitespace, drops control characters, truncates to `max_chars`
/// and escapes markdown. Truncation happens before escaping so an escape
/// sequence is never split.
pub fn sanitize_text(text: &str, max_chars: usize) -> String {
    let cleaned: String = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|c| !c.is_control())
        .collect();

    let truncated = if cleaned.chars().count() > max_chars {
        let mut t: String = cleaned.chars().take(max_chars.saturating_sub(1)).collect();
        t.push('…');
        t
    } else {
        cleaned
    };

    escape_markdown(&truncated)
}

/// True if `text` contains a markdown-special character not preceded by a backslash.
pub fn has_unescaped_markdown(text: &str) -> bool {
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            // escaped pair, or a dangling backslash
            if chars.next().is_none() {
                return true;
            }
            continue;
        }
        if MARKDOWN_SPECIAL.contains(&ch) {
            return true;
        }
    }
    false
}

/// Whole-word containment on already-lowercased strings.
///
/// A match must not be flanked by alphanumerics, so `"t"` does not match
/// inside `"market"`.
pub fn contains_term(haystack: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(term) {
        let begin = start + pos;
        let end = begin + term.len();
        let before_ok = haystack[..begin]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        start = begin + haystack[begin..].chars().next().map_or(1, |c| c.len_utf8());
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("a_b*c"), "a\\_b\\*c");
        assert_eq!(escape_markdown("PSI 5.0!"), "PSI 5\\.0\\!");
        assert!(!has_unescaped_markdown(&escape_markdown("[SEC 8-K] *Results* (Q1)")));
    }

    #[test]
    fn test_sanitize_truncates_before_escaping() {
        let s = sanitize_text("abc.def.ghi", 5);
        assert_eq!(s, "abc\\.…");
        assert!(!has_unescaped_markdown(&s));
    }

    #[test]
    fn test_sanitize_collapses_whitespace() {
        assert_eq!(sanitize_text("  Breaking:\n\tchip   ban  ", 100), "Breaking: chip ban");
    }

    #[test]
    fn test_has_unescaped_markdown() {
        assert!(has_unescaped_markdown("a*b"));
        assert!(has_unescaped_markdown("trailing\\"));
        assert!(!has_unescaped_markdown("plain text"));
        assert!(!has_unescaped_markdown("a\\*b"));
    }

    #[test]
    fn test_contains_term_word_boundary() {
        assert!(contains_term("at&t cuts guidance", "at&t"));
        assert!(contains_term("shares of t fell", "t"));
        assert!(!contains_term("market update", "t"));
        assert!(contains_term("export control rules", "export control"));
        assert!(!contains_term("anything", ""));
    }
}
