//! Field validators
//!
//! Pure functions over caller text. Each returns the accepted value, or an
//! empty string when the input is missing, a sentinel, or malformed. None of
//! them ever substitutes a default.

use once_cell::sync::Lazy;
use regex::Regex;

use call_agent_core::Field;

use crate::keywords::{normalize, phrase_set};
use crate::numerals::{digit_runs, normalize_spoken_digits};

/// Placeholder values treated as missing
const SENTINELS: &[&str] = &[
    "unknown",
    "n/a",
    "na",
    "n.a.",
    "tbd",
    "tba",
    "none",
    "null",
    "nil",
    "undefined",
    "not provided",
    "not available",
    "not sure",
    "no name",
    "customer",
    "caller",
    "anonymous",
    "-",
    "?",
];

/// Replies that answer the question without giving a name
static NON_ANSWER: Lazy<Regex> = Lazy::new(|| {
    phrase_set(&[
        "don't know",
        "dont know",
        "no idea",
        "not telling",
        "rather not",
        "prefer not",
        "go ahead",
        "doesn't matter",
        "not important",
        "why do you need",
        "hold on",
        "hang on",
        "one second",
        "just a second",
        "i forgot",
        "excuse me",
    ])
});

/// Bare acknowledgements that are never a name on their own
const ACKNOWLEDGEMENTS: &[&str] = &[
    "yes", "yeah", "yep", "no", "nope", "ok", "okay", "sure", "hi", "hello", "whatever", "nobody",
    "skip", "pass",
];

static TEMPLATE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{.*?\}\}|\$\{.*?\}|<[a-z_]+>").unwrap());

static PHONE_SHAPED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\d\s\-\.\(\)\+]+$").unwrap());

static DISJUNCTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bor\b").unwrap());

fn clean(text: &str) -> &str {
    text.trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == ',' || c == '.' || c == ';')
        .trim()
}

/// Whether a value is a known placeholder
pub fn is_sentinel(text: &str) -> bool {
    let value = clean(text);
    if value.is_empty() || TEMPLATE_PLACEHOLDER.is_match(value) {
        return true;
    }
    let lowered = value.to_lowercase();
    SENTINELS.iter().any(|s| *s == lowered)
}

fn is_phone_shaped(value: &str) -> bool {
    PHONE_SHAPED.is_match(value) && value.chars().filter(|c| c.is_ascii_digit()).count() >= 7
}

/// Accept exactly one 5-digit ZIP; spoken numerals are normalized first.
/// ZIP+4 and partial ZIPs are rejected.
pub fn validate_zip(text: &str) -> String {
    let runs = digit_runs(text);
    let mut candidates = runs.iter().filter(|r| r.len() == 5);
    match (candidates.next(), candidates.next()) {
        (Some(zip), None) => zip.clone(),
        _ => String::new(),
    }
}

/// Accept a ZIP only when it starts with one of the service prefixes.
/// An empty prefix list accepts any well-formed ZIP.
pub fn validate_zip_in_area(text: &str, prefixes: &[String]) -> String {
    let zip = validate_zip(text);
    if zip.is_empty() {
        return zip;
    }
    if prefixes.is_empty() || prefixes.iter().any(|p| zip.starts_with(p.as_str())) {
        zip
    } else {
        String::new()
    }
}

/// Accept a customer or contact name
pub fn validate_name(text: &str) -> String {
    let value = clean(text);
    if is_sentinel(value) || is_phone_shaped(value) {
        return String::new();
    }
    if !value.chars().any(char::is_alphabetic) {
        return String::new();
    }
    let lowered = normalize(value);
    if ACKNOWLEDGEMENTS.contains(&lowered.as_str()) || NON_ANSWER.is_match(&lowered) {
        return String::new();
    }
    value.to_string()
}

/// Accept a service address. A standalone "or" marks an ambiguous or garbled
/// address ("12 Main St or Oak Ave") and is rejected.
pub fn validate_address(text: &str) -> String {
    let value = clean(text);
    if is_sentinel(value) || DISJUNCTION.is_match(value) {
        return String::new();
    }
    if !value.chars().any(char::is_alphanumeric) {
        return String::new();
    }
    value.to_string()
}

/// Accept a 10-digit NANP phone number; a leading country code 1 is
/// stripped. Returns digits only.
pub fn validate_phone(text: &str) -> String {
    if is_sentinel(text) {
        return String::new();
    }
    let digits: String = normalize_spoken_digits(text)
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    let digits = match digits.len() {
        11 if digits.starts_with('1') => digits[1..].to_string(),
        10 => digits,
        _ => return String::new(),
    };
    // Area code and exchange never start with 0 or 1
    let bytes = digits.as_bytes();
    if matches!(bytes[0], b'0' | b'1') || matches!(bytes[3], b'0' | b'1') {
        return String::new();
    }
    digits
}

/// Accept free text (problem description, preferred time)
pub fn validate_free_text(text: &str) -> String {
    let value = clean(text);
    if is_sentinel(value) {
        return String::new();
    }
    value.to_string()
}

/// Validator matching a collected field. Empty means rejected.
pub fn validate_field(field: Field, value: &str) -> String {
    match field {
        Field::CustomerName | Field::SiteContactName => validate_name(value),
        Field::ServiceAddress => validate_address(value),
        Field::ZipCode => validate_zip(value),
        Field::ProblemDescription | Field::PreferredTime => validate_free_text(value),
        Field::SiteContactPhone => validate_phone(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_zip() {
        assert_eq!(validate_zip("787"), "");
        assert_eq!(validate_zip("78745"), "78745");
        assert_eq!(validate_zip("seven eight seven oh one"), "78701");
        assert_eq!(validate_zip("my zip is 78745, thanks"), "78745");
        assert_eq!(validate_zip("787451"), "");
        assert_eq!(validate_zip("78745-1234"), "");
        assert_eq!(validate_zip("78745 or 78746"), "");
        assert_eq!(validate_zip(""), "");
    }

    #[test]
    fn test_validate_zip_output_shape() {
        let inputs = [
            "1234",
            "12345",
            "one two three four five six",
            "zip code 9 0 2 1 0",
            "no idea",
            "oh oh oh",
            "double seven triple eight",
        ];
        for input in inputs {
            let out = validate_zip(input);
            assert!(
                out.is_empty() || (out.len() == 5 && out.chars().all(|c| c.is_ascii_digit())),
                "{input:?} produced {out:?}"
            );
        }
        assert_eq!(validate_zip("zip code 9 0 2 1 0"), "90210");
        assert_eq!(validate_zip("double seven triple eight"), "77888");
    }

    #[test]
    fn test_validate_zip_in_area() {
        let prefixes = vec!["787".to_string()];
        assert_eq!(validate_zip_in_area("78745", &prefixes), "78745");
        assert_eq!(validate_zip_in_area("90210", &prefixes), "");
        assert_eq!(validate_zip_in_area("90210", &[]), "90210");
    }

    #[test]
    fn test_validate_name_sentinels() {
        for bad in ["", "  ", "unknown", "N/A", "TBD", "{{customer_name}}", "512-555-0100", "(512) 555 0100"] {
            assert_eq!(validate_name(bad), "", "{bad:?} should be rejected");
        }
        assert_eq!(validate_name("  Dana Reyes "), "Dana Reyes");
        assert_eq!(validate_name("O'Neil"), "O'Neil");
    }

    #[test]
    fn test_validate_name_rejects_non_answers() {
        for bad in ["I don't know", "no idea", "go ahead", "Not telling", "I'd rather not say", "yes", "Nope"] {
            assert_eq!(validate_name(bad), "", "{bad:?} should be rejected");
        }
        assert_eq!(validate_name("Noah Goldberg"), "Noah Goldberg");
    }

    #[test]
    fn test_validate_address() {
        assert_eq!(validate_address("1200 Main St or Oak Ave"), "");
        assert_eq!(validate_address("{{address}}"), "");
        assert_eq!(validate_address("n/a"), "");
        assert_eq!(validate_address("1200 Oakridge Dr"), "1200 Oakridge Dr");
        // "or" inside a word is fine
        assert_eq!(validate_address("45 Orchard Rd"), "45 Orchard Rd");
    }

    #[test]
    fn test_validate_phone() {
        assert_eq!(validate_phone("(512) 555-0100"), "5125550100");
        assert_eq!(validate_phone("+1 512 555 0100"), "5125550100");
        assert_eq!(
            validate_phone("five one two five five five oh one oh oh"),
            "5125550100"
        );
        assert_eq!(validate_phone("555-0100"), "");
        assert_eq!(validate_phone("012 555 0100"), "");
        assert_eq!(validate_phone("unknown"), "");
    }

    #[test]
    fn test_validate_free_text() {
        assert_eq!(validate_free_text("AC blowing warm air"), "AC blowing warm air");
        assert_eq!(validate_free_text("none"), "");
    }

    #[test]
    fn test_validate_field_dispatch() {
        assert_eq!(validate_field(Field::ZipCode, "zip is 78745"), "78745");
        assert_eq!(validate_field(Field::CustomerName, "unknown"), "");
        assert_eq!(validate_field(Field::SiteContactPhone, "(512) 555-0100"), "5125550100");
        assert_eq!(validate_field(Field::ServiceAddress, "12 Main St or Oak Ave"), "");
    }
}
