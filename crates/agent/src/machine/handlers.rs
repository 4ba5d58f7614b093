//! Per-state interpretation of caller turns
//!
//! Each decision state reads the utterance through the validators and
//! classifiers and either stays (asking again) or names the next state.

use once_cell::sync::Lazy;
use regex::Regex;

use call_agent_core::{
    AppointmentAction, CallSession, CallState, CallerIntent, EndReason, Field, RequestedChange,
};
use call_agent_text_processing::{
    classify_appointment_action, classify_hazard, classify_intent, classify_lead_type,
    classify_urgency, detect_affirmation, detect_callback_request, detect_third_party,
    extract_address, extract_name, extract_preferred_time, extract_problem, validate_phone,
    validate_zip, validate_zip_in_area,
};

use super::{prompts, Entry, StateMachine, TurnAction, Utterance};
use crate::AgentError;

/// Result of interpreting one caller turn
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Step {
    Stay(Utterance),
    Go(CallState),
}

/// Booking fields, in the order they are asked
const COLLECT_ORDER: [Field; 3] = [
    Field::ProblemDescription,
    Field::CustomerName,
    Field::ServiceAddress,
];

const SITE_CONTACT: [Field; 2] = [Field::SiteContactName, Field::SiteContactPhone];

/// Fields walked during a read-back correction
const REVIEW_ORDER: [Field; 6] = [
    Field::CustomerName,
    Field::ServiceAddress,
    Field::ProblemDescription,
    Field::PreferredTime,
    Field::SiteContactName,
    Field::SiteContactPhone,
];

static CORRECTION_LEAD_IN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:no|nope|nah|not\s+quite|actually|wait)\b[\s,.!]*(?:(?:it's|it\s+is|that's|that\s+is|it\s+should\s+be|should\s+be)\b\s*)?",
    )
    .unwrap()
});

static NEW_ISSUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:something\s+(?:new|else|different)|new\s+(?:issue|problem)|different\s+(?:issue|problem)|another\s+(?:issue|problem))\b")
        .unwrap()
});

fn required_fields(session: &CallSession) -> Vec<Field> {
    let mut fields = COLLECT_ORDER.to_vec();
    if session.flags().is_third_party {
        fields.extend(SITE_CONTACT);
    }
    fields
}

/// First booking field still empty
pub(super) fn next_missing(session: &CallSession) -> Option<Field> {
    required_fields(session)
        .into_iter()
        .find(|field| session.field(*field).is_none())
}

/// Validated value for `field` from a conversational answer
fn extract_for(field: Field, text: &str) -> Option<String> {
    let value = match field {
        Field::ProblemDescription => return extract_problem(text),
        Field::CustomerName | Field::SiteContactName => return extract_name(text),
        Field::ServiceAddress => return extract_address(text),
        Field::PreferredTime => return extract_preferred_time(text),
        Field::ZipCode => validate_zip(text),
        Field::SiteContactPhone => validate_phone(text),
    };
    (!value.is_empty()).then_some(value)
}

/// Replacement value in "no, it's ..." style corrections
fn inline_correction(field: Field, text: &str) -> Option<String> {
    let rest = CORRECTION_LEAD_IN.replace(text, "");
    if rest.trim().is_empty() || rest.len() == text.len() {
        return None;
    }
    extract_for(field, &rest)
}

impl StateMachine {
    pub(super) fn on_welcome(
        &self,
        session: &mut CallSession,
        text: &str,
    ) -> Result<Step, AgentError> {
        // Hazards always reach the safety check, so lookup comes first
        if let Some(kind) = classify_hazard(text) {
            session.mark_hazard(kind)?;
            session.set_intent(CallerIntent::Service)?;
            return Ok(Step::Go(CallState::Lookup));
        }

        if detect_callback_request(text) {
            session.set_end_reason(EndReason::CallbackRequested)?;
            return Ok(Step::Go(CallState::Callback));
        }

        let intent = classify_intent(text);
        session.set_intent(intent)?;
        if intent == CallerIntent::NonService {
            session.set_end_reason(EndReason::NonService)?;
            return Ok(Step::Go(CallState::NonService));
        }

        if detect_third_party(text) {
            session.mark_third_party()?;
        }
        Ok(Step::Go(CallState::Lookup))
    }

    pub(super) fn on_follow_up(
        &self,
        session: &mut CallSession,
        text: &str,
    ) -> Result<Step, AgentError> {
        if let Some(kind) = classify_hazard(text) {
            session.mark_hazard(kind)?;
            return Ok(Step::Go(CallState::Safety));
        }
        if NEW_ISSUE.is_match(text) {
            return Ok(Step::Go(CallState::Safety));
        }
        if detect_callback_request(text) || detect_affirmation(text) == Some(true) {
            session.set_end_reason(EndReason::FollowUpRequested)?;
            return Ok(Step::Go(CallState::Callback));
        }
        if detect_affirmation(text) == Some(false) {
            return Ok(Step::Go(CallState::Safety));
        }
        Ok(Step::Stay(Utterance::Generate(prompts::follow_up_brief(
            prompts::follow_up_opening(None),
        ))))
    }

    pub(super) fn on_manage_booking(
        &self,
        session: &mut CallSession,
        text: &str,
    ) -> Result<Step, AgentError> {
        if let Some(kind) = classify_hazard(text) {
            session.mark_hazard(kind)?;
            return Ok(Step::Go(CallState::Safety));
        }
        if detect_callback_request(text) {
            session.set_end_reason(EndReason::CallbackRequested)?;
            return Ok(Step::Go(CallState::Callback));
        }

        // A reschedule waiting on its new time
        if let Some(change) = session.requested_change().cloned() {
            if change.action == AppointmentAction::Reschedule && change.new_time.is_none() {
                if let Some(time) = extract_preferred_time(text) {
                    session.set_requested_change(RequestedChange {
                        action: AppointmentAction::Reschedule,
                        new_time: Some(time),
                    })?;
                    return Ok(Step::Go(CallState::ManageAppointment));
                }
                if classify_appointment_action(text).is_none() {
                    return Ok(Step::Stay(Utterance::fixed(prompts::RESCHEDULE_TIME_QUESTION)));
                }
            }
        }

        match classify_appointment_action(text) {
            Some(AppointmentAction::Reschedule) => {
                let new_time = extract_preferred_time(text);
                let ready = new_time.is_some();
                session.set_requested_change(RequestedChange {
                    action: AppointmentAction::Reschedule,
                    new_time,
                })?;
                if ready {
                    Ok(Step::Go(CallState::ManageAppointment))
                } else {
                    Ok(Step::Stay(Utterance::fixed(prompts::RESCHEDULE_TIME_QUESTION)))
                }
            }
            Some(action) => {
                session.set_requested_change(RequestedChange {
                    action,
                    new_time: None,
                })?;
                Ok(Step::Go(CallState::ManageAppointment))
            }
            None if NEW_ISSUE.is_match(text) || detect_affirmation(text) == Some(false) => {
                Ok(Step::Go(CallState::Safety))
            }
            None => {
                let appointment = session.lookup().and_then(|l| l.upcoming_appointment.as_ref());
                Ok(Step::Stay(Utterance::Generate(prompts::manage_brief(
                    prompts::manage_opening(appointment),
                ))))
            }
        }
    }

    pub(super) fn on_safety(
        &self,
        session: &mut CallSession,
        text: &str,
    ) -> Result<Step, AgentError> {
        if let Some(kind) = classify_hazard(text) {
            session.mark_hazard(kind)?;
            session.set_end_reason(EndReason::SafetyEmergency)?;
            return Ok(Step::Go(CallState::SafetyExit));
        }
        if detect_callback_request(text) {
            session.set_end_reason(EndReason::CallbackRequested)?;
            return Ok(Step::Go(CallState::Callback));
        }
        match detect_affirmation(text) {
            Some(false) => Ok(Step::Go(CallState::ServiceArea)),
            Some(true) => Ok(Step::Stay(Utterance::fixed(prompts::SAFETY_CLARIFY))),
            None => Ok(Step::Stay(Utterance::fixed(prompts::SAFETY_REASK))),
        }
    }

    pub(super) fn on_service_area(
        &self,
        session: &mut CallSession,
        text: &str,
    ) -> Result<Step, AgentError> {
        if detect_callback_request(text) {
            session.set_end_reason(EndReason::CallbackRequested)?;
            return Ok(Step::Go(CallState::Callback));
        }

        let zip = validate_zip(text);
        if zip.is_empty() {
            return Ok(Step::Stay(Utterance::fixed(prompts::ZIP_REASK)));
        }
        session.set_field(Field::ZipCode, &zip)?;

        if validate_zip_in_area(&zip, &self.config.zip_prefixes).is_empty() {
            tracing::info!(call_id = %session.call_id(), zip = %zip, "Caller outside service area");
            session.set_end_reason(EndReason::OutOfArea)?;
            Ok(Step::Go(CallState::OutOfArea))
        } else {
            Ok(Step::Go(CallState::Discovery))
        }
    }

    pub(super) fn discovery_entry(&self, session: &mut CallSession) -> Result<Entry, AgentError> {
        if session.review_mode() {
            if let Some(field) = self.next_review_field(session, None) {
                session.set_awaiting_field(Some(field))?;
                let value = session.field(field).unwrap_or_default();
                return Ok(Entry::Act(TurnAction::say(Utterance::Fixed(
                    prompts::review_question(field, value),
                ))));
            }
            session.set_review_mode(false)?;
        }

        match next_missing(session) {
            Some(field) => {
                session.set_awaiting_field(Some(field))?;
                Ok(Entry::Act(TurnAction::say(Utterance::Generate(
                    prompts::discovery_brief(field),
                ))))
            }
            None => Ok(Entry::Chain(self.after_discovery(session))),
        }
    }

    pub(super) fn on_discovery(
        &self,
        session: &mut CallSession,
        text: &str,
    ) -> Result<Step, AgentError> {
        if let Some(kind) = classify_hazard(text) {
            session.mark_hazard(kind)?;
            session.set_end_reason(EndReason::SafetyEmergency)?;
            return Ok(Step::Go(CallState::SafetyExit));
        }
        if detect_callback_request(text) {
            session.set_end_reason(EndReason::CallbackRequested)?;
            return Ok(Step::Go(CallState::Callback));
        }
        if !session.flags().is_third_party && detect_third_party(text) {
            session.mark_third_party()?;
        }

        if session.review_mode() {
            return self.on_review(session, text);
        }

        let Some(field) = session.awaiting_field().or_else(|| next_missing(session)) else {
            return Ok(Step::Go(self.after_discovery(session)));
        };

        match extract_for(field, text) {
            Some(value) => {
                self.store(session, field, &value)?;
                self.ask_next_or_finish(session)
            }
            None => {
                tracing::debug!(
                    call_id = %session.call_id(),
                    field = field.as_str(),
                    "Answer rejected by validator"
                );
                Ok(Step::Stay(Utterance::Generate(prompts::discovery_reask_brief(field))))
            }
        }
    }

    /// One step of the read-back correction walk
    fn on_review(&self, session: &mut CallSession, text: &str) -> Result<Step, AgentError> {
        let Some(field) = session.awaiting_field() else {
            session.set_review_mode(false)?;
            return self.ask_next_or_finish(session);
        };

        // Field was rejected earlier; this turn is the replacement
        if session.field(field).is_none() {
            return match extract_for(field, text) {
                Some(value) => {
                    self.store(session, field, &value)?;
                    self.advance_review(session, field)
                }
                None => Ok(Step::Stay(Utterance::Fixed(prompts::field_reask(field)))),
            };
        }

        match detect_affirmation(text) {
            Some(true) => self.advance_review(session, field),
            Some(false) => match inline_correction(field, text) {
                Some(value) => {
                    self.store(session, field, &value)?;
                    self.advance_review(session, field)
                }
                None => {
                    session.clear_field(field)?;
                    Ok(Step::Stay(Utterance::Fixed(prompts::review_replace(field))))
                }
            },
            None => match extract_for(field, text) {
                Some(value) => {
                    self.store(session, field, &value)?;
                    self.advance_review(session, field)
                }
                None => {
                    let value = session.field(field).unwrap_or_default();
                    Ok(Step::Stay(Utterance::Fixed(prompts::review_question(field, value))))
                }
            },
        }
    }

    fn advance_review(&self, session: &mut CallSession, current: Field) -> Result<Step, AgentError> {
        match self.next_review_field(session, Some(current)) {
            Some(field) => {
                session.set_awaiting_field(Some(field))?;
                let value = session.field(field).unwrap_or_default();
                Ok(Step::Stay(Utterance::Fixed(prompts::review_question(field, value))))
            }
            None => {
                session.set_review_mode(false)?;
                self.ask_next_or_finish(session)
            }
        }
    }

    /// Next populated field after `after` in read-back order
    fn next_review_field(&self, session: &CallSession, after: Option<Field>) -> Option<Field> {
        let start = after
            .and_then(|f| REVIEW_ORDER.iter().position(|r| *r == f))
            .map_or(0, |i| i + 1);
        REVIEW_ORDER[start..]
            .iter()
            .copied()
            .find(|f| session.field(*f).is_some())
    }

    fn store(&self, session: &mut CallSession, field: Field, value: &str) -> Result<(), AgentError> {
        session.set_field(field, value)?;
        if field == Field::ProblemDescription {
            session.set_lead_type(classify_lead_type(value))?;
        }
        Ok(())
    }

    fn ask_next_or_finish(&self, session: &mut CallSession) -> Result<Step, AgentError> {
        match next_missing(session) {
            Some(field) => {
                session.set_awaiting_field(Some(field))?;
                Ok(Step::Stay(Utterance::Generate(prompts::discovery_brief(field))))
            }
            None => Ok(Step::Go(self.after_discovery(session))),
        }
    }

    fn after_discovery(&self, session: &CallSession) -> CallState {
        if session.urgency_tier().is_some() {
            CallState::PreConfirm
        } else {
            CallState::Urgency
        }
    }

    pub(super) fn on_urgency(
        &self,
        session: &mut CallSession,
        text: &str,
    ) -> Result<Step, AgentError> {
        if detect_callback_request(text) {
            session.set_end_reason(EndReason::CallbackRequested)?;
            return Ok(Step::Go(CallState::Callback));
        }
        if let Some(time) = extract_preferred_time(text) {
            session.set_field(Field::PreferredTime, &time)?;
        }
        match classify_urgency(text) {
            Some(tier) => {
                session.set_urgency_tier(tier)?;
                Ok(Step::Go(CallState::PreConfirm))
            }
            // A concrete time with no urgency words reads as routine
            None if session.field(Field::PreferredTime).is_some() => {
                session.set_urgency_tier(call_agent_core::UrgencyTier::Routine)?;
                Ok(Step::Go(CallState::PreConfirm))
            }
            None => Ok(Step::Stay(Utterance::Generate(prompts::urgency_brief(true)))),
        }
    }

    pub(super) fn on_pre_confirm(
        &self,
        session: &mut CallSession,
        text: &str,
    ) -> Result<Step, AgentError> {
        if detect_callback_request(text) {
            session.set_end_reason(EndReason::CallbackRequested)?;
            return Ok(Step::Go(CallState::Callback));
        }
        match detect_affirmation(text) {
            Some(true) => {
                session.set_caller_confirmed(true)?;
                Ok(Step::Go(CallState::Booking))
            }
            Some(false) => {
                session.set_caller_confirmed(false)?;
                session.set_review_mode(true)?;
                Ok(Step::Go(CallState::Discovery))
            }
            None => Ok(Step::Stay(Utterance::fixed(prompts::READBACK_REASK))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_for_rejects_unusable_answers() {
        assert_eq!(extract_for(Field::ServiceAddress, "I'm not sure"), None);
        assert_eq!(
            extract_for(Field::ServiceAddress, "it's 412 Elm Street").as_deref(),
            Some("412 Elm Street")
        );
        assert_eq!(extract_for(Field::SiteContactPhone, "five five five"), None);
    }

    #[test]
    fn test_inline_correction_strips_negation() {
        assert_eq!(
            inline_correction(Field::CustomerName, "no, it's Dana Reyes").as_deref(),
            Some("Dana Reyes")
        );
        assert_eq!(inline_correction(Field::CustomerName, "no"), None);
        assert_eq!(inline_correction(Field::CustomerName, "Dana Reyes"), None);
    }

    #[test]
    fn test_third_party_adds_site_contact() {
        let mut session = CallSession::new("5125550100");
        assert_eq!(required_fields(&session).len(), 3);
        session.mark_third_party().unwrap();
        assert_eq!(
            required_fields(&session)[3..],
            [Field::SiteContactName, Field::SiteContactPhone]
        );
    }
}
