//! Per-call session record
//!
//! `CallSession` is owned by exactly one call driver. All mutation goes
//! through the methods below, which enforce the record's invariants:
//! - state changes follow a declared edge and reset the per-state counter
//! - the call-wide turn counter only grows
//! - at most one tool is outstanding, and only a whitelisted one
//! - `booking_confirmed` is set from a booking result and nowhere else
//! - once frozen, nothing changes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classification::{AppointmentAction, CallerIntent, HazardKind, LeadType, UrgencyTier};
use crate::error::{Error, Result, ToolError};
use crate::fields::{Field, FieldSet};
use crate::report::EndReason;
use crate::state::CallState;
use crate::tools::{
    BookingResult, CallbackResult, LookupResult, ManageResult, ToolName, ToolResult,
};
use crate::transcript::{Speaker, Transcript};

/// Session flags. Read-only outside this module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFlags {
    pub caller_known: bool,
    pub has_appointment: bool,
    pub caller_confirmed: bool,
    pub booking_confirmed: bool,
    pub callback_created: bool,
    pub is_third_party: bool,
    pub hazard_reported: bool,
    pub alert_sent: bool,
}

/// Turn counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnCounters {
    /// Caller turns over the whole call; never decreases
    pub turn_count: u32,
    /// Caller turns since the last transition
    pub state_turn_count: u32,
    /// Generator outputs discarded by the orchestrator
    pub llm_violations: u32,
    /// Tool calls that ended in a structured failure
    pub tool_failures: u32,
}

/// One recorded transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub from: CallState,
    pub to: CallState,
    pub turn: u32,
    pub at: DateTime<Utc>,
}

/// Pending appointment change requested by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedChange {
    pub action: AppointmentAction,
    pub new_time: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CallSession {
    call_id: String,
    phone: String,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    state: CallState,
    history: Vec<StateChange>,
    fields: FieldSet,
    intent: Option<CallerIntent>,
    urgency_tier: Option<UrgencyTier>,
    lead_type: LeadType,
    hazard: Option<HazardKind>,
    flags: SessionFlags,
    counters: TurnCounters,
    transcript: Transcript,
    pending_tool: Option<ToolName>,
    last_tool_error: Option<ToolError>,
    lookup: Option<LookupResult>,
    booking: Option<BookingResult>,
    callback: Option<CallbackResult>,
    manage: Option<ManageResult>,
    requested_change: Option<RequestedChange>,
    awaiting_field: Option<Field>,
    review_mode: bool,
    end_reason: Option<EndReason>,
    frozen: bool,
}

impl CallSession {
    /// New session in the initial state
    pub fn new(phone: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), phone)
    }

    pub fn with_id(call_id: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            phone: phone.into(),
            started_at: Utc::now(),
            ended_at: None,
            state: CallState::default(),
            history: Vec::new(),
            fields: FieldSet::default(),
            intent: None,
            urgency_tier: None,
            lead_type: LeadType::default(),
            hazard: None,
            flags: SessionFlags::default(),
            counters: TurnCounters::default(),
            transcript: Transcript::new(),
            pending_tool: None,
            last_tool_error: None,
            lookup: None,
            booking: None,
            callback: None,
            manage: None,
            requested_change: None,
            awaiting_field: None,
            review_mode: false,
            end_reason: None,
            frozen: false,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn history(&self) -> &[StateChange] {
        &self.history
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    pub fn field(&self, field: Field) -> Option<&str> {
        self.fields.get(field)
    }

    pub fn intent(&self) -> Option<CallerIntent> {
        self.intent
    }

    pub fn urgency_tier(&self) -> Option<UrgencyTier> {
        self.urgency_tier
    }

    pub fn lead_type(&self) -> LeadType {
        self.lead_type
    }

    pub fn hazard(&self) -> Option<HazardKind> {
        self.hazard
    }

    pub fn flags(&self) -> &SessionFlags {
        &self.flags
    }

    pub fn counters(&self) -> TurnCounters {
        self.counters
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn pending_tool(&self) -> Option<ToolName> {
        self.pending_tool
    }

    pub fn last_tool_error(&self) -> Option<&ToolError> {
        self.last_tool_error.as_ref()
    }

    /// Cached lookup result; present once `lookup_caller` has answered
    pub fn lookup(&self) -> Option<&LookupResult> {
        self.lookup.as_ref()
    }

    pub fn booking(&self) -> Option<&BookingResult> {
        self.booking.as_ref()
    }

    pub fn callback(&self) -> Option<&CallbackResult> {
        self.callback.as_ref()
    }

    pub fn manage(&self) -> Option<&ManageResult> {
        self.manage.as_ref()
    }

    pub fn requested_change(&self) -> Option<&RequestedChange> {
        self.requested_change.as_ref()
    }

    pub fn awaiting_field(&self) -> Option<Field> {
        self.awaiting_field
    }

    pub fn review_mode(&self) -> bool {
        self.review_mode
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    fn ensure_mutable(&self) -> Result<()> {
        if self.frozen {
            return Err(Error::SessionFrozen(self.state));
        }
        Ok(())
    }

    /// Move along a declared edge. Resets the per-state turn counter.
    pub fn transition(&mut self, next: CallState) -> Result<()> {
        self.ensure_mutable()?;
        if let Some(tool) = self.pending_tool {
            return Err(Error::ToolPending(tool));
        }
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        tracing::info!(
            call_id = %self.call_id,
            from = %self.state,
            to = %next,
            turn = self.counters.turn_count,
            "State transition"
        );

        self.history.push(StateChange {
            from: self.state,
            to: next,
            turn: self.counters.turn_count,
            at: Utc::now(),
        });
        self.state = next;
        self.counters.state_turn_count = 0;
        self.awaiting_field = None;
        Ok(())
    }

    /// Count and log one caller utterance
    pub fn record_caller_turn(&mut self, text: &str) -> Result<TurnCounters> {
        self.ensure_mutable()?;
        self.counters.turn_count = self.counters.turn_count.saturating_add(1);
        self.counters.state_turn_count = self.counters.state_turn_count.saturating_add(1);
        self.transcript.push(Speaker::Caller, text, self.state);
        Ok(self.counters)
    }

    pub fn record_agent(&mut self, text: &str) -> Result<()> {
        self.ensure_mutable()?;
        self.transcript.push(Speaker::Agent, text, self.state);
        Ok(())
    }

    pub fn record_system(&mut self, text: &str) -> Result<()> {
        self.ensure_mutable()?;
        self.transcript.push(Speaker::System, text, self.state);
        Ok(())
    }

    pub fn record_violation(&mut self) {
        self.counters.llm_violations = self.counters.llm_violations.saturating_add(1);
    }

    /// Reserve the single tool slot. The tool must be whitelisted in the
    /// current state.
    pub fn begin_tool(&mut self, tool: ToolName) -> Result<()> {
        self.ensure_mutable()?;
        if let Some(pending) = self.pending_tool {
            return Err(Error::ToolPending(pending));
        }
        if !self.state.permits_tool(tool) {
            return Err(ToolError::NotPermitted {
                tool,
                state: self.state,
            }
            .into());
        }
        self.pending_tool = Some(tool);
        Ok(())
    }

    /// Apply a structured result for the outstanding tool
    pub fn apply_tool_result(&mut self, result: ToolResult) -> Result<()> {
        self.ensure_mutable()?;
        let got = result.tool();
        if self.pending_tool != Some(got) {
            return Err(Error::UnexpectedToolResult {
                expected: self.pending_tool,
                got,
            });
        }
        self.pending_tool = None;
        self.last_tool_error = None;

        match result {
            ToolResult::LookupCaller(lookup) => {
                self.flags.caller_known = lookup.found;
                self.flags.has_appointment = lookup.found && lookup.upcoming_appointment.is_some();
                self.lookup = Some(lookup);
            }
            ToolResult::BookService(booking) => {
                self.flags.booking_confirmed = booking.booked;
                self.booking = Some(booking);
            }
            ToolResult::CreateCallback(callback) => {
                self.flags.callback_created = callback.created;
                self.callback = Some(callback);
            }
            ToolResult::ManageAppointment(manage) => {
                self.manage = Some(manage);
            }
            ToolResult::SendAlert(alert) => {
                self.flags.alert_sent = alert.sent;
            }
        }
        Ok(())
    }

    /// Release the tool slot after a structured failure
    pub fn fail_tool(&mut self, error: ToolError) -> Result<()> {
        self.ensure_mutable()?;
        let got = error.tool();
        if self.pending_tool != Some(got) {
            return Err(Error::UnexpectedToolResult {
                expected: self.pending_tool,
                got,
            });
        }
        self.pending_tool = None;
        self.counters.tool_failures = self.counters.tool_failures.saturating_add(1);
        self.last_tool_error = Some(error);
        Ok(())
    }

    /// Store an already-validated value. Blank values are ignored.
    pub fn set_field(&mut self, field: Field, value: &str) -> Result<bool> {
        self.ensure_mutable()?;
        Ok(self.fields.set(field, value))
    }

    /// Store an already-validated value only if the field is empty
    pub fn fill_field_if_empty(&mut self, field: Field, value: &str) -> Result<bool> {
        self.ensure_mutable()?;
        Ok(self.fields.fill_empty(field, value))
    }

    /// Drop a value the caller has rejected
    pub fn clear_field(&mut self, field: Field) -> Result<()> {
        self.ensure_mutable()?;
        self.fields.clear(field);
        Ok(())
    }

    pub fn set_awaiting_field(&mut self, field: Option<Field>) -> Result<()> {
        self.ensure_mutable()?;
        self.awaiting_field = field;
        Ok(())
    }

    pub fn set_review_mode(&mut self, review: bool) -> Result<()> {
        self.ensure_mutable()?;
        self.review_mode = review;
        Ok(())
    }

    pub fn set_intent(&mut self, intent: CallerIntent) -> Result<()> {
        self.ensure_mutable()?;
        self.intent = Some(intent);
        Ok(())
    }

    pub fn set_urgency_tier(&mut self, tier: UrgencyTier) -> Result<()> {
        self.ensure_mutable()?;
        self.urgency_tier = Some(tier);
        Ok(())
    }

    pub fn set_lead_type(&mut self, lead_type: LeadType) -> Result<()> {
        self.ensure_mutable()?;
        self.lead_type = lead_type;
        Ok(())
    }

    pub fn mark_hazard(&mut self, kind: HazardKind) -> Result<()> {
        self.ensure_mutable()?;
        self.hazard = Some(kind);
        self.flags.hazard_reported = true;
        Ok(())
    }

    pub fn mark_third_party(&mut self) -> Result<()> {
        self.ensure_mutable()?;
        self.flags.is_third_party = true;
        Ok(())
    }

    pub fn set_caller_confirmed(&mut self, confirmed: bool) -> Result<()> {
        self.ensure_mutable()?;
        self.flags.caller_confirmed = confirmed;
        Ok(())
    }

    pub fn set_requested_change(&mut self, change: RequestedChange) -> Result<()> {
        self.ensure_mutable()?;
        self.requested_change = Some(change);
        Ok(())
    }

    /// Record why the call is ending. The first reason wins.
    pub fn set_end_reason(&mut self, reason: EndReason) -> Result<()> {
        self.ensure_mutable()?;
        if self.end_reason.is_none() {
            self.end_reason = Some(reason);
        }
        Ok(())
    }

    /// Make the session read-only. Idempotent.
    pub fn freeze(&mut self, reason: EndReason) {
        if self.frozen {
            return;
        }
        if self.end_reason.is_none() {
            self.end_reason = Some(reason);
        }
        self.pending_tool = None;
        self.ended_at = Some(Utc::now());
        self.frozen = true;
        tracing::debug!(call_id = %self.call_id, state = %self.state, reason = %reason, "Session frozen");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::AlertResult;

    fn session_in(path: &[CallState]) -> CallSession {
        let mut session = CallSession::new("5125550100");
        for state in path {
            session.transition(*state).unwrap();
        }
        session
    }

    #[test]
    fn test_transition_resets_state_counter_only() {
        let mut session = CallSession::new("5125550100");
        session.record_caller_turn("hi").unwrap();
        session.record_caller_turn("my heater is out").unwrap();
        assert_eq!(session.counters().state_turn_count, 2);

        session.transition(CallState::Lookup).unwrap();
        let counters = session.counters();
        assert_eq!(counters.state_turn_count, 0);
        assert_eq!(counters.turn_count, 2);
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn test_undeclared_transition_is_rejected() {
        let mut session = CallSession::new("5125550100");
        let err = session.transition(CallState::Confirm).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidTransition {
                from: CallState::Welcome,
                to: CallState::Confirm
            }
        );
        assert_eq!(session.state(), CallState::Welcome);
    }

    #[test]
    fn test_tool_outside_whitelist_is_rejected() {
        let mut session = CallSession::new("5125550100");
        let err = session.begin_tool(ToolName::BookService).unwrap_err();
        assert!(matches!(err, Error::Tool(ToolError::NotPermitted { .. })));
        assert_eq!(session.pending_tool(), None);
    }

    #[test]
    fn test_single_outstanding_tool() {
        let mut session = session_in(&[CallState::Lookup]);
        session.begin_tool(ToolName::LookupCaller).unwrap();
        assert_eq!(
            session.begin_tool(ToolName::LookupCaller),
            Err(Error::ToolPending(ToolName::LookupCaller))
        );
        assert_eq!(
            session.transition(CallState::Safety),
            Err(Error::ToolPending(ToolName::LookupCaller))
        );
    }

    #[test]
    fn test_booking_confirmed_only_from_booked_result() {
        let mut session = session_in(&[
            CallState::Lookup,
            CallState::Safety,
            CallState::ServiceArea,
            CallState::Discovery,
            CallState::PreConfirm,
            CallState::Booking,
        ]);
        session.begin_tool(ToolName::BookService).unwrap();
        session
            .apply_tool_result(ToolResult::BookService(BookingResult::declined(vec![])))
            .unwrap();
        assert!(!session.flags().booking_confirmed);

        session.begin_tool(ToolName::BookService).unwrap();
        session
            .apply_tool_result(ToolResult::BookService(BookingResult {
                booked: true,
                booked_date: Some("2024-05-02".into()),
                booked_time: Some("9am".into()),
                appointment_id: Some("A-1".into()),
                available_slots: vec![],
            }))
            .unwrap();
        assert!(session.flags().booking_confirmed);
    }

    #[test]
    fn test_mismatched_result_is_rejected() {
        let mut session = session_in(&[CallState::Lookup]);
        session.begin_tool(ToolName::LookupCaller).unwrap();
        let err = session
            .apply_tool_result(ToolResult::SendAlert(AlertResult { sent: true }))
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedToolResult { .. }));
        assert!(!session.flags().alert_sent);
    }

    #[test]
    fn test_fail_tool_records_error() {
        let mut session = session_in(&[CallState::Lookup]);
        session.begin_tool(ToolName::LookupCaller).unwrap();
        session
            .fail_tool(ToolError::Timeout {
                tool: ToolName::LookupCaller,
                timeout_ms: 12_000,
            })
            .unwrap();
        assert_eq!(session.pending_tool(), None);
        assert_eq!(session.counters().tool_failures, 1);
        assert!(session.last_tool_error().is_some());
        assert!(session.lookup().is_none());
    }

    #[test]
    fn test_frozen_session_rejects_mutation() {
        let mut session = session_in(&[CallState::NonService]);
        session.freeze(EndReason::NonService);
        let before = session.counters();

        assert_eq!(
            session.record_caller_turn("hello?"),
            Err(Error::SessionFrozen(CallState::NonService))
        );
        assert!(session.set_field(Field::CustomerName, "Dana").is_err());
        assert_eq!(session.counters(), before);
        assert_eq!(session.end_reason(), Some(EndReason::NonService));
        assert!(session.ended_at().is_some());
    }

    #[test]
    fn test_first_end_reason_wins() {
        let mut session = CallSession::new("5125550100");
        session.set_end_reason(EndReason::TurnLimitExceeded).unwrap();
        session.freeze(EndReason::CallerHangup);
        assert_eq!(session.end_reason(), Some(EndReason::TurnLimitExceeded));
    }
}
