//! Bounded-length previews for knowledge items.

/// Maximum characters of source content carried into a summary.
pub const SUMMARY_MAX_CHARS: usize = 200;

/// Returns the longest prefix of `s` holding at most `max` characters.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// `"{label}: {content}"`, hard-truncated with an ellipsis.
pub fn generate_summary(label: &str, content: &str) -> String {
    let preview = truncate_chars(content, SUMMARY_MAX_CHARS);
    if preview.len() < content.len() {
        format!("{}: {}...", label, preview)
    } else {
        format!("{}: {}", label, content)
    }
}

/// `"{sender}: {content}"`, preferring to cut at a sentence boundary.
///
/// When the content exceeds [`SUMMARY_MAX_CHARS`], the cut lands just after
/// the last `.`, `?` or `!` inside the window if that point is past 70% of
/// the window; otherwise the window is hard-truncated with an ellipsis.
pub fn generate_chat_summary(content: &str, sender_name: &str) -> String {
    let content = content.trim();
    let window = truncate_chars(content, SUMMARY_MAX_CHARS);
    if window.len() == content.len() {
        return format!("{}: {}", sender_name, content);
    }

    let min_cut = SUMMARY_MAX_CHARS * 7 / 10;
    if let Some(idx) = window.rfind(|c| matches!(c, '.' | '?' | '!')) {
        if window[..idx].chars().count() > min_cut {
            return format!("{}: {}", sender_name, &window[..=idx]);
        }
    }
    format!("{}: {}...", sender_name, window.trim_end())
}
