/// Maximum characters returned to a caller in one reply. Chosen to match
/// a single chat-message bound rather than any particular channel's limit.
pub const MAX_REPLY_CHARS: usize = 4_000;

const TRUNCATION_NOTICE: &str = "\n\n[reply truncated]";

/// Clamp a reply to [`MAX_REPLY_CHARS`], appending a truncation notice when
/// the content didn't fit. Truncates on a char boundary so multi-byte UTF-8
/// sequences are never split.
///
/// The front-end's own chunking/markdown-escaping is out of scope here; this
/// only guarantees the pipeline hands back a single bounded string.
pub fn safe_truncate(text: &str) -> String {
    if text.chars().count() <= MAX_REPLY_CHARS {
        return text.to_string();
    }
    let budget = MAX_REPLY_CHARS - TRUNCATION_NOTICE.len();
    let mut truncated: String = text.chars().take(budget).collect();
    truncated.push_str(TRUNCATION_NOTICE);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_unchanged() {
        assert_eq!(safe_truncate("hello"), "hello");
    }

    #[test]
    fn long_text_is_truncated_with_notice() {
        let text = "a".repeat(MAX_REPLY_CHARS + 500);
        let result = safe_truncate(&text);
        assert!(result.len() <= MAX_REPLY_CHARS);
        assert!(result.ends_with(TRUNCATION_NOTICE));
    }

    #[test]
    fn truncation_respects_utf8_boundaries() {
        let text = "é".repeat(MAX_REPLY_CHARS + 10);
        let result = safe_truncate(&text);
        assert!(result.ends_with(TRUNCATION_NOTICE));
    }
}
