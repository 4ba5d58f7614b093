//! Validators and classifiers for caller text
//!
//! All functions in this crate are pure and deterministic:
//! - **Numerals**: spoken digit normalization ("seven eight seven oh one")
//! - **Validation**: ZIP, name, address, phone and free-text validators
//! - **Intent**: intent priority classifier, callback request, yes/no,
//!   third-party and appointment-change detection
//! - **Claims**: commitment claims in outbound text
//! - **Safety**: hazard detection with retraction, high-ticket detection
//! - **Slot extraction**: field candidates, urgency, problem duration and
//!   the last-resort transcript scan

pub mod claims;
pub mod intent;
pub mod keywords;
pub mod numerals;
pub mod safety;
pub mod slot_extraction;
pub mod validation;

pub use claims::detect_commitment_claim;
pub use intent::{
    classify_appointment_action, classify_intent, detect_affirmation, detect_callback_request,
    detect_third_party,
};
pub use numerals::normalize_spoken_digits;
pub use safety::{classify_hazard, classify_lead_type, detect_high_ticket, detect_safety_emergency};
pub use slot_extraction::{
    classify_problem_duration, classify_urgency, extract_address, extract_name,
    extract_preferred_time, extract_problem, scan_transcript,
};
pub use validation::{
    is_sentinel, validate_address, validate_field, validate_free_text, validate_name,
    validate_phone, validate_zip, validate_zip_in_area,
};
