//! Shared utilities

/// Truncate a string to `max` characters, appending "..." if truncated.
/// Operates on Unicode char boundaries, not bytes.
pub fn truncate_chars(s: &str, max: usize) -> String {
    let mut chars = s.chars();
    let truncated: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{truncated}...")
    } else {
        truncated
    }
}

/// Wrap stage-direction text in `*` markers unless it already is
pub fn wrap_narration(text: &str) -> String {
    let trimmed = text.trim();
    let inner = trimmed.trim_matches('*').trim();
    if inner.is_empty() {
        return String::new();
    }
    if trimmed.starts_with('*') && trimmed.ends_with('*') {
        trimmed.to_string()
    } else {
        format!("*{inner}*")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo...");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn test_wrap_narration() {
        assert_eq!(wrap_narration("She smiles."), "*She smiles.*");
        assert_eq!(wrap_narration("  *waves*  "), "*waves*");
        assert_eq!(wrap_narration("*half open"), "*half open*");
        assert_eq!(wrap_narration("   "), "");
        assert_eq!(wrap_narration("*"), "");
        assert_eq!(wrap_narration(" ** * "), "");
    }
}
