pub fn strip_quotes_space(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.chars().count() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        return trimmed[1..trimmed.len() - 1].trim().to_string();
    }
    trimmed.to_string()
}

/// Produces a key that is safe as a map key, a file name and a URL fragment.
///
/// Used for document titles and speaker names as-is, and for tags through
/// [`tag_key`]. Applying it twice yields the same result as applying it once.
pub fn normalize(input: &str) -> String {
    strip_quotes_space(input)
        .replace('/', "_")
        .replace('?', "_")
        .replace(':', " -")
        .replace(' ', "_")
        .replace(['%', '"', '\''], "")
}

pub fn tag_key(input: &str) -> String {
    normalize(input).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_quotes_space_removes_wrapping_quotes_and_whitespace() {
        assert_eq!(strip_quotes_space("  \" hello world \"  "), "hello world");
        assert_eq!(strip_quotes_space("\""), "\"");
        assert_eq!(strip_quotes_space("plain "), "plain");
        assert_eq!(strip_quotes_space("\"half"), "\"half");
    }

    #[test]
    fn normalize_replaces_unsafe_characters() {
        assert_eq!(normalize("tracking keystrokes / keylogger"), "tracking_keystrokes___keylogger");
        assert_eq!(normalize("why?"), "why_");
        assert_eq!(normalize("Q: 100%"), "Q_-_100");
        assert_eq!(normalize("\"it's\""), "its");
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in ["a/b c", " \"Jones: 7\" ", "50% 'x'?", ""] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn empty_input_normalizes_to_empty() {
        assert_eq!(normalize("   "), "");
        assert_eq!(tag_key("\"\""), "");
    }

    #[test]
    fn tag_key_folds_case() {
        assert_eq!(tag_key("Privacy "), "privacy");
        assert_eq!(tag_key("Location Tracking"), "location_tracking");
    }
}
