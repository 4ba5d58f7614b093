//! Commitment claims in outbound text
//!
//! Detects agent text asserting that a side effect already happened: a
//! booking, a cancellation or reschedule, a queued callback, an alert.
//! Generated text is checked with this before it is spoken.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::keywords::normalize;

static COMMITMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:(?:you're|you\s+are|you've\s+been|we've|i've|it's|it\s+is|that's|appointment\s+is|appointment's|visit\s+is|technician\s+is)\s+(?:all\s+)?(?:booked|scheduled|confirmed|set|cancel(?:l)?ed|rescheduled|on\s+the\s+way|dispatched)|i've\s+(?:booked|scheduled|confirmed|cancel(?:l)?ed|rescheduled|alerted|notified|dispatched|sent|put\s+in|created|queued)|(?:someone|a\s+technician|our\s+team)\s+(?:will|is\s+going\s+to)\s+(?:call|be\s+there|come)|confirmation\s+(?:number|code)|all\s+set)\b",
    )
    .unwrap()
});

/// Whether the text asserts a completed side effect
pub fn detect_commitment_claim(text: &str) -> bool {
    COMMITMENT.is_match(&normalize(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commitment_claims() {
        assert!(detect_commitment_claim("Great news, you're all booked for Tuesday!"));
        assert!(detect_commitment_claim("I've scheduled a technician for tomorrow."));
        assert!(detect_commitment_claim("Someone will call you back within the hour."));
        assert!(detect_commitment_claim("Your confirmation number is 1234."));
        assert!(detect_commitment_claim("Okay, you're all set."));
    }

    #[test]
    fn test_questions_are_not_claims() {
        assert!(!detect_commitment_claim("What's the address where you need service?"));
        assert!(!detect_commitment_claim("Would you like me to book that for you?"));
        assert!(!detect_commitment_claim("When did the unit stop cooling?"));
    }
}
