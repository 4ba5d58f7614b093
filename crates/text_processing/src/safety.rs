//! Safety and lead-value detectors
//!
//! Hazard detection matches a keyword set, then rescans the same utterance
//! for a retraction ("never mind", "we're fine"). A retraction anywhere in
//! the utterance cancels the hazard. A hazard keyword directly negated
//! ("no gas smell", "I don't smell gas") is not a match; negation elsewhere
//! in the clause leaves it standing.
//!
//! High-ticket detection matches replacement language, but repair language
//! always wins: any repair indicator makes the result false.

use once_cell::sync::Lazy;
use regex::Regex;

use call_agent_core::{HazardKind, LeadType};

use crate::keywords::{normalize, phrase_set};

static HAZARDS: Lazy<Vec<(Regex, HazardKind)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"(?i)\b(?:gas\s+(?:leak|leaking|smell)|smell(?:s|ing)?\s+(?:of\s+|like\s+)?gas|leaking\s+gas|rotten\s+eggs?)\b").unwrap(),
            HazardKind::GasLeak,
        ),
        (
            Regex::new(r"(?i)\b(?:carbon\s+monoxide|monoxide|co\s+(?:detector|alarm))\b").unwrap(),
            HazardKind::CarbonMonoxide,
        ),
        (
            Regex::new(r"(?i)\b(?:on\s+fire|(?:catch|caught|catching)\s+fire|flames|(?:see|seeing|saw|there'?s|there\s+is)\s+smoke|smoke\s+(?:is\s+)?(?:coming|pouring|billowing|everywhere)|smell(?:s|ing)?\s+(?:of\s+|like\s+)?smoke|smoky|smoke\s+(?:detectors?|alarms?)\s+(?:is\s+|are\s+|keeps?\s+)?going\s+off|(?:yes|yeah)[\s,]+(?:smoke|fire))\b").unwrap(),
            HazardKind::Fire,
        ),
        (
            Regex::new(r"(?i)\b(?:sparks?|sparking|arcing|burning\s+smell|smell(?:s|ing)?\s+(?:like\s+)?burning|exposed\s+wires?|electrical\s+smell|shocked)\b").unwrap(),
            HazardKind::Electrical,
        ),
        (
            Regex::new(r"(?i)\b(?:flooding|flooded|burst\s+pipe|water\s+everywhere)\b").unwrap(),
            HazardKind::Flooding,
        ),
    ]
});

static RETRACTION: Lazy<Regex> = Lazy::new(|| {
    phrase_set(&[
        "never mind",
        "nevermind",
        "actually no",
        "we're fine",
        "we are fine",
        "we're ok",
        "we're okay",
        "we are okay",
        "everything's fine",
        "false alarm",
        "just kidding",
        "scratch that",
        "my mistake",
    ])
});

static CLAUSE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)[.,;!?]|\bbut\b").unwrap());

const NEGATORS: &[&str] = &[
    "no", "not", "don't", "dont", "doesn't", "didn't", "never", "without", "isn't", "nothing",
];

/// Words allowed between a negator and the keyword it governs ("no real gas smell")
const NEGATION_FILLERS: &[&str] = &["a", "an", "any", "the", "even", "really", "real"];

static AC_FORMS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\ba\s*/\s*c\b|\ba\.c\.?").unwrap());

static REPLACEMENT: Lazy<Regex> = Lazy::new(|| {
    phrase_set(&[
        "new ac",
        "new unit",
        "new system",
        "new furnace",
        "new heat pump",
        "new air conditioner",
        "new hvac",
        "whole new",
        "replace",
        "replacement",
        "replacing",
        "upgrade",
        "upgrading",
        "install a new",
        "installation",
        "quote on a new",
        "estimate for a new",
    ])
});

static REPAIR: Lazy<Regex> = Lazy::new(|| {
    phrase_set(&[
        "not working",
        "isn't working",
        "stopped working",
        "quit working",
        "won't turn on",
        "won't start",
        "broken",
        "broke",
        "repair",
        "fix",
        "leaking",
        "not cooling",
        "not heating",
        "no heat",
        "no cold air",
        "blowing warm",
        "blowing hot",
        "making noise",
        "making a noise",
        "died",
        "went out",
    ])
});

static MAINTENANCE: Lazy<Regex> = Lazy::new(|| {
    phrase_set(&[
        "tune-up",
        "tune up",
        "tuneup",
        "maintenance",
        "annual service",
        "seasonal service",
        "checkup",
        "check-up",
        "inspection",
        "filter change",
        "duct cleaning",
    ])
});

/// The nearest non-filler word before the keyword is a negator
fn is_negated(clause: &str, keyword_start: usize) -> bool {
    clause[..keyword_start]
        .split_whitespace()
        .rev()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\''))
        .find(|w| !NEGATION_FILLERS.contains(w))
        .is_some_and(|w| NEGATORS.contains(&w))
}

/// Hazard reported in the utterance, if any
pub fn classify_hazard(text: &str) -> Option<HazardKind> {
    let text = normalize(text);

    let hazard = CLAUSE_BREAK.split(&text).find_map(|clause| {
        HAZARDS.iter().find_map(|(pattern, kind)| {
            pattern
                .find_iter(clause)
                .any(|m| !is_negated(clause, m.start()))
                .then_some(*kind)
        })
    })?;

    if RETRACTION.is_match(&text) {
        tracing::debug!(hazard = hazard.as_str(), "Hazard retracted in same utterance");
        return None;
    }
    Some(hazard)
}

/// Whether the utterance reports a safety emergency
pub fn detect_safety_emergency(text: &str) -> bool {
    classify_hazard(text).is_some()
}

/// Replacement intent with no repair language
pub fn detect_high_ticket(text: &str) -> bool {
    let text = AC_FORMS.replace_all(&normalize(text), "ac").into_owned();
    REPLACEMENT.is_match(&text) && !REPAIR.is_match(&text)
}

/// Lead classification of a problem description
pub fn classify_lead_type(text: &str) -> LeadType {
    if detect_high_ticket(text) {
        LeadType::HighTicket
    } else if MAINTENANCE.is_match(&normalize(text)) {
        LeadType::Maintenance
    } else {
        LeadType::Service
    }
}
