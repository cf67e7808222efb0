//! String utilities for the domain layer.

/// Words that carry no signal when matching step descriptions against paths.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "your", "will", "should", "must",
    "have", "are", "was", "were", "been", "can", "all", "any", "each", "use", "using", "make",
    "create", "add", "implement", "build", "ensure", "set", "new", "code", "file", "files",
];

/// Minimum keyword length kept by [`keywords`].
const MIN_KEYWORD_LEN: usize = 3;

/// Truncate a string to a maximum byte length with ellipsis (UTF-8 safe)
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let target = max_len.saturating_sub(3);
        let mut end = target.min(s.len());
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

/// Split free text into lowercase keywords.
///
/// Short tokens and common English/imperative words are dropped; order of
/// first appearance is preserved and duplicates are removed.
pub fn keywords(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for token in text
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .map(str::to_lowercase)
    {
        if token.len() < MIN_KEYWORD_LEN || STOP_WORDS.contains(&token.as_str()) {
            continue;
        }
        if !out.contains(&token) {
            out.push(token);
        }
    }
    out
}

/// Turn a title into a file-system friendly slug (`"Add Login Form"` → `"add-login-form"`).
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_dash = true;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_ascii() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 8), "hello...");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        // "é" is two bytes; cutting in the middle must back off
        let s = "ééééé";
        let out = truncate(s, 6);
        assert!(out.ends_with("..."));
        assert!(out.len() <= 6);
    }

    #[test]
    fn test_keywords_drop_short_and_common_words() {
        let words = keywords("Implement the login form for the user dashboard");
        assert_eq!(words, vec!["login", "form", "user", "dashboard"]);
    }

    #[test]
    fn test_keywords_deduplicate() {
        assert_eq!(keywords("router router ROUTER"), vec!["router"]);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Add Login Form!"), "add-login-form");
        assert_eq!(slugify("  "), "untitled");
    }
}
