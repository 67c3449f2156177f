//! Normalization of untrusted path fragments.

/// Replace every character outside `[A-Za-z0-9_-]` with `_`.
///
/// Applied to category names and lookup values before they are joined onto
/// the fixture root. The output can never contain a separator, a dot, or a
/// NUL byte, so it always names a single entry inside its parent directory.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if is_safe_char(c) { c } else { '_' })
        .collect()
}

/// Whether `raw` is already made only of safe characters.
pub fn is_safe(raw: &str) -> bool {
    raw.chars().all(is_safe_char)
}

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passes_safe_input() {
        assert_eq!(sanitize("user_123-abc"), "user_123-abc");
        assert!(is_safe("TXN1"));
    }

    #[test]
    fn test_traversal_is_neutralized() {
        assert_eq!(sanitize("../../etc/passwd"), "______etc_passwd");
        assert_eq!(sanitize("%2e%2e%2f"), "_2e_2e_2f");
        assert_eq!(sanitize("a\0b"), "a_b");
        assert_eq!(sanitize("..\\secret"), "___secret");
    }

    #[test]
    fn test_non_ascii_becomes_underscore() {
        assert_eq!(sanitize("café"), "caf_");
        assert!(!is_safe("a.json"));
    }

    #[test]
    fn test_empty_stays_empty() {
        assert_eq!(sanitize(""), "");
    }
}
