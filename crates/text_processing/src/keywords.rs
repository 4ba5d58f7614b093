//! Keyword-set matching helpers

use regex::Regex;

/// Lowercase and fold typographic apostrophes
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .replace(['\u{2019}', '\u{2018}', '`'], "'")
}

/// Compile a case-insensitive, word-bounded alternation over phrases.
/// Internal whitespace in a phrase matches any run of whitespace.
///
/// Panics on an invalid pattern; only called from `Lazy` statics built from
/// literal phrase lists.
pub fn phrase_set(phrases: &[&str]) -> Regex {
    let alternation = phrases
        .iter()
        .map(|p| {
            p.split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+")
        })
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phrase_set_is_word_bounded() {
        let set = phrase_set(&["new ac", "cancel"]);
        assert!(set.is_match("I want a NEW  AC"));
        assert!(set.is_match("please cancel it"));
        assert!(!set.is_match("new acme filters"));
        assert!(!set.is_match("cancellation fee"));
    }

    #[test]
    fn test_normalize_folds_apostrophes() {
        assert_eq!(normalize("We\u{2019}re FINE"), "we're fine");
    }
}
