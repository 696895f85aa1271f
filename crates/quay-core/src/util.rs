//! Shared utility functions used across multiple modules.

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Compact free-form response text for error messages.
///
/// Trims the value and truncates long bodies with an ellipsis so a server
/// error page never floods a log line.
pub fn compact_text(value: &str) -> String {
    const MAX_CHARS: usize = 200;

    let trimmed = value.trim();
    if trimmed.chars().count() <= MAX_CHARS {
        return trimmed.to_string();
    }

    let mut compacted: String = trimmed.chars().take(MAX_CHARS - 3).collect();
    compacted.push_str("...");
    compacted
}
