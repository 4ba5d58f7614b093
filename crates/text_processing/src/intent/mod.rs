//! Caller intent detection
//!
//! Keyword-set classifiers over a single utterance. Intent uses a fixed
//! priority order (manage-booking, follow-up, non-service, then service);
//! the first set that matches wins. There is no scoring.

use once_cell::sync::Lazy;
use regex::Regex;

use call_agent_core::{AppointmentAction, CallerIntent};

use crate::keywords::{normalize, phrase_set};

static MANAGE_BOOKING: Lazy<Regex> = Lazy::new(|| {
    phrase_set(&[
        "reschedule",
        "re-schedule",
        "cancel my appointment",
        "cancel the appointment",
        "cancel my booking",
        "cancel the visit",
        "cancel my service",
        "change my appointment",
        "change the appointment",
        "move my appointment",
        "move the appointment",
        "push my appointment",
        "confirm my appointment",
        "confirm the appointment",
        "existing appointment",
        "appointment i have",
        "my appointment time",
    ])
});

static FOLLOW_UP: Lazy<Regex> = Lazy::new(|| {
    phrase_set(&[
        "following up",
        "follow up",
        "follow-up",
        "called earlier",
        "called yesterday",
        "called before",
        "called last week",
        "still waiting",
        "haven't heard",
        "never heard back",
        "nobody called",
        "no one called",
        "supposed to call",
        "was promised",
        "you said you would",
        "you said you'd",
        "returning your call",
        "returning a call",
        "status of my",
        "checking on",
    ])
});

static NON_SERVICE: Lazy<Regex> = Lazy::new(|| {
    phrase_set(&[
        "wrong number",
        "selling",
        "sales call",
        "vendor",
        "supplier",
        "partnership",
        "marketing",
        "seo",
        "advertising",
        "business listing",
        "google listing",
        "merchant services",
        "credit card processing",
        "business loan",
        "job application",
        "applying for",
        "are you hiring",
        "looking for work",
        "robocall",
        "extended warranty",
    ])
});

static CALLBACK_REQUEST: Lazy<Regex> = Lazy::new(|| {
    phrase_set(&[
        "call me back",
        "callback",
        "call back",
        "have someone call",
        "someone call me",
        "speak to a person",
        "speak to a human",
        "talk to a person",
        "talk to a human",
        "real person",
        "live person",
        "speak to someone",
        "talk to someone",
        "speak with someone",
        "representative",
        "operator",
        "speak to a manager",
        "talk to the owner",
    ])
});

static AFFIRM: Lazy<Regex> = Lazy::new(|| {
    phrase_set(&[
        "yes",
        "yeah",
        "yep",
        "yup",
        "ya",
        "correct",
        "that's correct",
        "that's right",
        "right",
        "sure",
        "ok",
        "okay",
        "sounds good",
        "perfect",
        "exactly",
        "affirmative",
        "uh huh",
        "go ahead",
        "please do",
        "all good",
        "looks good",
        "that works",
    ])
});

static NEGATE: Lazy<Regex> = Lazy::new(|| {
    phrase_set(&[
        "no",
        "nope",
        "nah",
        "not",
        "wrong",
        "incorrect",
        "isn't right",
        "that's wrong",
        "wait",
        "hold on",
        "change",
        "fix",
        "actually",
        "mistake",
    ])
});

static THIRD_PARTY: Lazy<Regex> = Lazy::new(|| {
    phrase_set(&[
        "on behalf of",
        "for my mother",
        "for my mom",
        "for my father",
        "for my dad",
        "for my parents",
        "for my grandmother",
        "for my grandfather",
        "for my neighbor",
        "for my neighbour",
        "for my tenant",
        "my tenant",
        "my tenants",
        "my mom's",
        "my dad's",
        "my mother's",
        "my father's",
        "rental property",
        "property i manage",
        "property manager",
        "for a client",
        "i'm the landlord",
        "not my house",
        "not my home",
    ])
});

static CANCEL: Lazy<Regex> = Lazy::new(|| phrase_set(&["cancel", "cancellation", "call off"]));

static RESCHEDULE: Lazy<Regex> = Lazy::new(|| {
    phrase_set(&[
        "reschedule",
        "re-schedule",
        "move",
        "change",
        "different time",
        "different day",
        "push",
        "later",
        "earlier",
    ])
});

static CONFIRM: Lazy<Regex> =
    Lazy::new(|| phrase_set(&["confirm", "still on", "still coming", "double check", "verify"]));

/// Classify the caller's intent. Priority: manage-booking, follow-up,
/// non-service, then service.
pub fn classify_intent(text: &str) -> CallerIntent {
    let text = normalize(text);
    if MANAGE_BOOKING.is_match(&text) {
        CallerIntent::ManageBooking
    } else if FOLLOW_UP.is_match(&text) {
        CallerIntent::FollowUp
    } else if NON_SERVICE.is_match(&text) {
        CallerIntent::NonService
    } else {
        CallerIntent::Service
    }
}

/// Caller asks for a human callback
pub fn detect_callback_request(text: &str) -> bool {
    CALLBACK_REQUEST.is_match(&normalize(text))
}

/// Yes/no reading of an answer. A negative marker wins over an affirmative
/// one ("yes but the address is wrong" is a no). `None` when neither.
pub fn detect_affirmation(text: &str) -> Option<bool> {
    let text = normalize(text);
    if NEGATE.is_match(&text) {
        Some(false)
    } else if AFFIRM.is_match(&text) {
        Some(true)
    } else {
        None
    }
}

/// Caller is arranging service for someone else's property
pub fn detect_third_party(text: &str) -> bool {
    THIRD_PARTY.is_match(&normalize(text))
}

/// Requested change to an existing appointment. Cancel wins over reschedule,
/// reschedule over confirm.
pub fn classify_appointment_action(text: &str) -> Option<AppointmentAction> {
    let text = normalize(text);
    if CANCEL.is_match(&text) {
        Some(AppointmentAction::Cancel)
    } else if RESCHEDULE.is_match(&text) {
        Some(AppointmentAction::Reschedule)
    } else if CONFIRM.is_match(&text) {
        Some(AppointmentAction::Confirm)
    } else {
        None
    }
}
