//! Post-call report payload

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::classification::{LeadType, ProblemDuration, UrgencyTier};
use crate::fields::FieldSet;
use crate::session::{SessionFlags, TurnCounters};
use crate::state::CallState;
use crate::transcript::TranscriptEntry;

/// Reason code sent with the end-of-call signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    BookingConfirmed,
    AppointmentUpdated,
    CallbackRequested,
    FollowUpRequested,
    BookingFailed,
    ToolFailure,
    TurnLimitExceeded,
    SafetyEmergency,
    OutOfArea,
    NonService,
    CallerHangup,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::BookingConfirmed => "booking_confirmed",
            EndReason::AppointmentUpdated => "appointment_updated",
            EndReason::CallbackRequested => "callback_requested",
            EndReason::FollowUpRequested => "follow_up_requested",
            EndReason::BookingFailed => "booking_failed",
            EndReason::ToolFailure => "tool_failure",
            EndReason::TurnLimitExceeded => "turn_limit_exceeded",
            EndReason::SafetyEmergency => "safety_emergency",
            EndReason::OutOfArea => "out_of_area",
            EndReason::NonService => "non_service",
            EndReason::CallerHangup => "caller_hangup",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Business outcome of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Booked,
    AppointmentManaged,
    CallbackQueued,
    SafetyEmergency,
    OutOfArea,
    NonService,
    /// Ended without a booking or a queued callback
    Incomplete,
}

impl CallOutcome {
    /// Outcome from the final state and the tool-reported flags
    pub fn classify(state: CallState, flags: &SessionFlags) -> Self {
        match state {
            CallState::Confirm if flags.booking_confirmed => CallOutcome::Booked,
            CallState::ManageDone => CallOutcome::AppointmentManaged,
            CallState::SafetyExit => CallOutcome::SafetyEmergency,
            CallState::OutOfArea => CallOutcome::OutOfArea,
            CallState::NonService => CallOutcome::NonService,
            _ if flags.callback_created => CallOutcome::CallbackQueued,
            _ => CallOutcome::Incomplete,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Booked => "booked",
            CallOutcome::AppointmentManaged => "appointment_managed",
            CallOutcome::CallbackQueued => "callback_queued",
            CallOutcome::SafetyEmergency => "safety_emergency",
            CallOutcome::OutOfArea => "out_of_area",
            CallOutcome::NonService => "non_service",
            CallOutcome::Incomplete => "incomplete",
        }
    }
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Appointment as reported by the scheduling collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookedAppointment {
    pub appointment_id: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
}

/// Structured payload delivered to the reporting collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallReport {
    pub call_id: String,
    pub phone: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub final_state: CallState,
    pub outcome: CallOutcome,
    pub end_reason: Option<EndReason>,
    pub fields: FieldSet,
    pub urgency_tier: Option<UrgencyTier>,
    pub lead_type: LeadType,
    pub problem_duration: Option<ProblemDuration>,
    pub flags: SessionFlags,
    pub appointment: Option<BookedAppointment>,
    pub counters: TurnCounters,
    pub tags: Vec<String>,
    pub transcript: Vec<TranscriptEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirm_without_flag_is_not_booked() {
        let flags = SessionFlags::default();
        assert_eq!(
            CallOutcome::classify(CallState::Confirm, &flags),
            CallOutcome::Incomplete
        );

        let flags = SessionFlags {
            booking_confirmed: true,
            ..SessionFlags::default()
        };
        assert_eq!(
            CallOutcome::classify(CallState::Confirm, &flags),
            CallOutcome::Booked
        );
    }

    #[test]
    fn test_callback_outcome_requires_created_callback() {
        let mut flags = SessionFlags::default();
        assert_eq!(
            CallOutcome::classify(CallState::BookingFailed, &flags),
            CallOutcome::Incomplete
        );
        flags.callback_created = true;
        assert_eq!(
            CallOutcome::classify(CallState::BookingFailed, &flags),
            CallOutcome::CallbackQueued
        );
    }
}
