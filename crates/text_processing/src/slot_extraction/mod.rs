//! Slot value extraction from caller utterances
//!
//! Pulls candidate field values out of conversational answers ("yeah it's
//! John Smith" → "John Smith") and classifies urgency and problem duration.
//! Every candidate is passed through its validator before being returned.
//!
//! Static patterns are compiled once using `once_cell::sync::Lazy`.

use once_cell::sync::Lazy;
use regex::Regex;

use call_agent_core::{Field, FieldSet, ProblemDuration, UrgencyTier};

use crate::keywords::{normalize, phrase_set};
use crate::validation::{validate_address, validate_free_text, validate_name, validate_zip};

// =============================================================================
// STATIC REGEX PATTERNS
// =============================================================================

static NAME_LEAD_IN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:(?:yes|yeah|yep|sure|ok|okay|hi|hello|um+|uh+)[,\s]+)*(?:(?:my\s+)?(?:full\s+)?name(?:'s|\s+is)|this\s+is|it's|it\s+is|i'm|i\s+am|call\s+me|you\s+can\s+call\s+me|the\s+name\s+is)?\s*",
    )
    .unwrap()
});

static NAME_TRAILER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[,\s]+(?:thanks|thank\s+you|please|here|speaking|calling)\b.*$").unwrap()
});

static NAME_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z'\-\.]*(?:\s+[A-Za-z][A-Za-z'\-\.]*){0,3}$").unwrap());

static ADDRESS_LEAD_IN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:(?:yes|yeah|sure|ok|okay|um+|uh+)[,\s]+)*(?:(?:the\s+)?address\s+is|it's|it\s+is|i'm\s+at|we're\s+at|i\s+live\s+at|we\s+live\s+at|that's)?\s*",
    )
    .unwrap()
});

static STREET_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b\d{1,6}\s+(?:[a-z0-9.'\-]+\s+){0,4}(?:st|street|ave|avenue|rd|road|dr|drive|ln|lane|blvd|boulevard|ct|court|way|pl|place|cir|circle|pkwy|parkway|trl|trail|hwy|highway|loop|pass|cv|cove)\b\.?",
    )
    .unwrap()
});

static NAME_STATEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?i:my\s+name\s+is|my\s+name's|the\s+name\s+is|name's)\s+([A-Za-z][A-Za-z'\-]+(?:\s+[A-Z][A-Za-z'\-]+)?)").unwrap()
});

static ZIP_STATEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:zip|zip\s+code|postal\s+code)\D{0,12}(\d{5})\b").unwrap());

static TIME_FRAGMENTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:asap|as\s+soon\s+as\s+possible|anytime|any\s+time|whenever|today|tonight|tomorrow|this\s+weekend|next\s+week|this\s+week|(?:next\s+|this\s+)?(?:monday|tuesday|wednesday|thursday|friday|saturday|sunday)|morning|afternoon|evening|(?:after|before|around)\s+\d{1,2}(?::\d{2})?\s*(?:am|pm)?|\d{1,2}(?::\d{2})?\s*(?:am|pm)|noon)\b",
    )
    .unwrap()
});

static NOT_URGENT: Lazy<Regex> = Lazy::new(|| {
    phrase_set(&[
        "not urgent",
        "no rush",
        "no hurry",
        "not in a hurry",
        "not an emergency",
        "isn't an emergency",
        "can wait",
        "whenever",
        "sometime next week",
        "no big deal",
    ])
});

static EMERGENCY: Lazy<Regex> = Lazy::new(|| {
    phrase_set(&[
        "emergency",
        "right now",
        "right away",
        "immediately",
        "asap",
        "as soon as possible",
        "tonight",
        "today",
        "no heat",
        "no ac",
        "no air",
        "newborn",
        "infant",
        "elderly",
        "medical",
        "dangerous",
    ])
});

static URGENT: Lazy<Regex> = Lazy::new(|| {
    phrase_set(&[
        "urgent",
        "tomorrow",
        "soon",
        "this week",
        "next day",
        "couple days",
        "couple of days",
        "quickly",
        "pretty bad",
    ])
});

static ROUTINE: Lazy<Regex> = Lazy::new(|| {
    phrase_set(&[
        "routine",
        "next week",
        "maintenance",
        "tune-up",
        "tune up",
        "checkup",
        "check-up",
        "later",
        "flexible",
    ])
});

static DURATION_ONGOING: Lazy<Regex> = Lazy::new(|| {
    phrase_set(&[
        "weeks",
        "a month",
        "months",
        "a year",
        "years",
        "for a while",
        "for ages",
        "all summer",
        "all winter",
        "ongoing",
        "on and off",
        "off and on",
        "keeps happening",
    ])
});

static DURATION_RECENT: Lazy<Regex> = Lazy::new(|| {
    phrase_set(&[
        "few days",
        "couple days",
        "couple of days",
        "days",
        "a week",
        "last week",
        "this week",
        "since monday",
        "since tuesday",
        "since wednesday",
        "since thursday",
        "since friday",
        "since saturday",
        "since sunday",
        "since the weekend",
        "over the weekend",
    ])
});

static DURATION_ACUTE: Lazy<Regex> = Lazy::new(|| {
    phrase_set(&[
        "today",
        "this morning",
        "this afternoon",
        "this evening",
        "tonight",
        "last night",
        "yesterday",
        "just now",
        "just started",
        "an hour ago",
        "hours",
        "suddenly",
    ])
});

// =============================================================================
// EXTRACTION
// =============================================================================

/// Customer or contact name from a conversational answer
pub fn extract_name(text: &str) -> Option<String> {
    let stripped = NAME_LEAD_IN.replace(text.trim(), "");
    let stripped = NAME_TRAILER.replace(&stripped, "");
    let candidate = stripped
        .trim()
        .trim_end_matches(|c: char| c == '.' || c == '!' || c == ',');
    if !NAME_SHAPE.is_match(candidate) {
        return None;
    }
    let name = validate_name(candidate);
    (!name.is_empty()).then_some(name)
}

/// Service address from a conversational answer. Requires a street number.
pub fn extract_address(text: &str) -> Option<String> {
    let stripped = ADDRESS_LEAD_IN.replace(text.trim(), "");
    let candidate = stripped.trim().trim_end_matches('.');
    let has_number = candidate.chars().next().is_some_and(|c| c.is_ascii_digit());
    if !has_number || !candidate.chars().any(char::is_alphabetic) {
        return None;
    }
    let address = validate_address(candidate);
    (!address.is_empty()).then_some(address)
}

/// Problem description; the answer itself, validated
pub fn extract_problem(text: &str) -> Option<String> {
    let problem = validate_free_text(text);
    if problem.is_empty() || (problem.split_whitespace().count() < 2 && problem.len() < 6) {
        return None;
    }
    Some(problem)
}

/// Preferred time fragments in spoken order ("tomorrow morning")
pub fn extract_preferred_time(text: &str) -> Option<String> {
    let normalized = normalize(text);
    let fragments: Vec<&str> = TIME_FRAGMENTS
        .find_iter(&normalized)
        .map(|m| m.as_str().trim())
        .collect();
    if fragments.is_empty() {
        return None;
    }
    let joined = fragments.join(" ");
    let value = validate_free_text(&joined);
    (!value.is_empty()).then_some(value)
}

/// Urgency tier. An explicit "not urgent" / "no rush" is checked first so it
/// cannot be read as urgent.
pub fn classify_urgency(text: &str) -> Option<UrgencyTier> {
    let text = normalize(text);
    if NOT_URGENT.is_match(&text) {
        Some(UrgencyTier::Routine)
    } else if EMERGENCY.is_match(&text) {
        Some(UrgencyTier::Emergency)
    } else if URGENT.is_match(&text) {
        Some(UrgencyTier::Urgent)
    } else if ROUTINE.is_match(&text) {
        Some(UrgencyTier::Routine)
    } else {
        None
    }
}

/// Bucket elapsed-time language. When several buckets match the longest
/// one wins ("started yesterday but it's been on and off for months" is
/// ongoing).
pub fn classify_problem_duration(text: &str) -> Option<ProblemDuration> {
    let text = normalize(text);
    if DURATION_ONGOING.is_match(&text) {
        Some(ProblemDuration::Ongoing)
    } else if DURATION_RECENT.is_match(&text) {
        Some(ProblemDuration::Recent)
    } else if DURATION_ACUTE.is_match(&text) {
        Some(ProblemDuration::Acute)
    } else {
        None
    }
}

/// Last-resort pattern scan over caller text. First match per field wins;
/// every value passes its validator.
pub fn scan_transcript(caller_text: &str) -> FieldSet {
    let mut fields = FieldSet::new();

    for line in caller_text.lines() {
        if !fields.is_set(Field::CustomerName) {
            if let Some(caps) = NAME_STATEMENT.captures(line) {
                let name = validate_name(&caps[1]);
                fields.set(Field::CustomerName, name);
            }
        }

        if !fields.is_set(Field::ZipCode) {
            let zip = match ZIP_STATEMENT.captures(line) {
                Some(caps) => validate_zip(&caps[1]),
                None => String::new(),
            };
            fields.set(Field::ZipCode, zip);
        }

        if !fields.is_set(Field::ServiceAddress) {
            if let Some(m) = STREET_ADDRESS.find(line) {
                fields.set(Field::ServiceAddress, validate_address(m.as_str()));
            }
        }

        if !fields.is_set(Field::PreferredTime) {
            if let Some(time) = extract_preferred_time(line) {
                fields.set(Field::PreferredTime, time);
            }
        }
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_name_strips_lead_ins() {
        assert_eq!(extract_name("yeah it's John Smith").as_deref(), Some("John Smith"));
        assert_eq!(extract_name("My name is Dana Reyes, thanks").as_deref(), Some("Dana Reyes"));
        assert_eq!(extract_name("Priya").as_deref(), Some("Priya"));
        assert_eq!(extract_name("unknown"), None);
        assert_eq!(extract_name("I'd rather not say why do you need it"), None);
    }

    #[test]
    fn test_extract_name_ignores_non_answers() {
        assert_eq!(extract_name("I don't know"), None);
        assert_eq!(extract_name("no idea"), None);
        assert_eq!(extract_name("go ahead"), None);
        assert_eq!(extract_name("yeah, go ahead"), None);
        assert_eq!(extract_name("um, it's Sam Ortiz").as_deref(), Some("Sam Ortiz"));
    }

    #[test]
    fn test_extract_address() {
        assert_eq!(
            extract_address("it's 1200 Oakridge Drive").as_deref(),
            Some("1200 Oakridge Drive")
        );
        assert_eq!(extract_address("1200 Main St or Oak Ave"), None);
        assert_eq!(extract_address("the blue house"), None);
    }

    #[test]
    fn test_extract_preferred_time() {
        assert_eq!(
            extract_preferred_time("tomorrow morning would be great").as_deref(),
            Some("tomorrow morning")
        );
        assert_eq!(
            extract_preferred_time("Friday after 2pm").as_deref(),
            Some("friday after 2pm")
        );
        assert_eq!(extract_preferred_time("I don't know"), None);
    }

    #[test]
    fn test_not_urgent_checked_first() {
        assert_eq!(
            classify_urgency("it's not urgent, today or tomorrow is fine"),
            Some(UrgencyTier::Routine)
        );
        assert_eq!(
            classify_urgency("we have a newborn and no heat"),
            Some(UrgencyTier::Emergency)
        );
        assert_eq!(classify_urgency("sometime soon"), Some(UrgencyTier::Urgent));
        assert_eq!(classify_urgency("hmm"), None);
    }

    #[test]
    fn test_problem_duration_longest_wins() {
        assert_eq!(
            classify_problem_duration("it started this morning"),
            Some(ProblemDuration::Acute)
        );
        assert_eq!(
            classify_problem_duration("for a few days now"),
            Some(ProblemDuration::Recent)
        );
        assert_eq!(
            classify_problem_duration("worse since yesterday but on and off for months"),
            Some(ProblemDuration::Ongoing)
        );
        assert_eq!(classify_problem_duration("it's loud"), None);
    }

    #[test]
    fn test_scan_transcript() {
        let caller = "hi my AC is out\nmy name is Dana Reyes\nwe're at 1200 Oakridge Drive, zip code 78745\ntomorrow morning";
        let fields = scan_transcript(caller);
        assert_eq!(fields.get(Field::CustomerName), Some("Dana Reyes"));
        assert_eq!(fields.get(Field::ZipCode), Some("78745"));
        assert_eq!(fields.get(Field::ServiceAddress), Some("1200 Oakridge Drive"));
        assert_eq!(fields.get(Field::PreferredTime), Some("tomorrow morning"));
    }
}
