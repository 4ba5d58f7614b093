//! Call States
//!
//! Every state is one of three kinds:
//! - **Decision**: interprets the latest caller signal and picks a declared
//!   next state. No tool access.
//! - **Action**: owns exactly one tool and moves only on that tool's result.
//! - **Terminal**: ends the call. May own a single entry tool that runs once
//!   before the closing utterance (alerting, callback queueing).
//!
//! Destinations and tool whitelists are static tables on the enum. Nothing
//! infers an edge or a tool permission at runtime.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::tools::ToolName;

/// Conversational state of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    /// Greeting and first-utterance intent classification
    #[default]
    Welcome,
    /// Caller lookup by phone number
    Lookup,
    /// Returning caller checking on an earlier promise
    FollowUp,
    /// Caller wants to change an existing appointment
    ManageBooking,
    /// Applying the requested appointment change
    ManageAppointment,
    /// Appointment change applied
    ManageDone,
    /// Hazard screening
    Safety,
    /// Hazard confirmed; caller told to get safe
    SafetyExit,
    /// ZIP collection and service-area check
    ServiceArea,
    /// ZIP outside the service area
    OutOfArea,
    /// Name / address / problem collection
    Discovery,
    /// Urgency tier and preferred time
    Urgency,
    /// Read-back of collected details
    PreConfirm,
    /// Booking the service visit
    Booking,
    /// Booking tool reported success
    Confirm,
    /// Booking tool failed or declined
    BookingFailed,
    /// Human callback fallback
    Callback,
    /// Vendor, sales or wrong-number call
    NonService,
}

/// State kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Decision,
    Action(ToolName),
    Terminal { entry_tool: Option<ToolName> },
}

impl CallState {
    /// All states, in declaration order
    pub const ALL: [CallState; 18] = [
        CallState::Welcome,
        CallState::Lookup,
        CallState::FollowUp,
        CallState::ManageBooking,
        CallState::ManageAppointment,
        CallState::ManageDone,
        CallState::Safety,
        CallState::SafetyExit,
        CallState::ServiceArea,
        CallState::OutOfArea,
        CallState::Discovery,
        CallState::Urgency,
        CallState::PreConfirm,
        CallState::Booking,
        CallState::Confirm,
        CallState::BookingFailed,
        CallState::Callback,
        CallState::NonService,
    ];

    /// State every limit escalation lands in
    pub const FALLBACK: CallState = CallState::Callback;

    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Welcome => "welcome",
            CallState::Lookup => "lookup",
            CallState::FollowUp => "follow_up",
            CallState::ManageBooking => "manage_booking",
            CallState::ManageAppointment => "manage_appointment",
            CallState::ManageDone => "manage_done",
            CallState::Safety => "safety",
            CallState::SafetyExit => "safety_exit",
            CallState::ServiceArea => "service_area",
            CallState::OutOfArea => "out_of_area",
            CallState::Discovery => "discovery",
            CallState::Urgency => "urgency",
            CallState::PreConfirm => "pre_confirm",
            CallState::Booking => "booking",
            CallState::Confirm => "confirm",
            CallState::BookingFailed => "booking_failed",
            CallState::Callback => "callback",
            CallState::NonService => "non_service",
        }
    }

    /// Kind of this state
    pub fn kind(&self) -> StateKind {
        match self {
            CallState::Lookup => StateKind::Action(ToolName::LookupCaller),
            CallState::ManageAppointment => StateKind::Action(ToolName::ManageAppointment),
            CallState::Booking => StateKind::Action(ToolName::BookService),
            CallState::SafetyExit => StateKind::Terminal {
                entry_tool: Some(ToolName::SendAlert),
            },
            CallState::BookingFailed | CallState::Callback => StateKind::Terminal {
                entry_tool: Some(ToolName::CreateCallback),
            },
            CallState::Confirm
            | CallState::ManageDone
            | CallState::OutOfArea
            | CallState::NonService => StateKind::Terminal { entry_tool: None },
            CallState::Welcome
            | CallState::FollowUp
            | CallState::ManageBooking
            | CallState::Safety
            | CallState::ServiceArea
            | CallState::Discovery
            | CallState::Urgency
            | CallState::PreConfirm => StateKind::Decision,
        }
    }

    /// Legal destination states
    pub fn destinations(&self) -> &'static [CallState] {
        use CallState::*;
        match self {
            Welcome => &[Lookup, NonService, Callback],
            Lookup => &[Safety, FollowUp, ManageBooking, Callback],
            FollowUp => &[Safety, Callback],
            ManageBooking => &[ManageAppointment, Safety, Callback],
            ManageAppointment => &[ManageDone, Callback],
            Safety => &[ServiceArea, SafetyExit, Callback],
            ServiceArea => &[Discovery, OutOfArea, Callback],
            Discovery => &[Urgency, PreConfirm, SafetyExit, Callback],
            Urgency => &[PreConfirm, Callback],
            PreConfirm => &[Booking, Discovery, Callback],
            Booking => &[Confirm, BookingFailed],
            ManageDone | SafetyExit | OutOfArea | Confirm | BookingFailed | Callback
            | NonService => &[],
        }
    }

    /// Tools this state may invoke
    pub fn tool_whitelist(&self) -> &'static [ToolName] {
        match self {
            CallState::Lookup => &[ToolName::LookupCaller],
            CallState::ManageAppointment => &[ToolName::ManageAppointment],
            CallState::Booking => &[ToolName::BookService],
            CallState::SafetyExit => &[ToolName::SendAlert],
            CallState::BookingFailed | CallState::Callback => &[ToolName::CreateCallback],
            _ => &[],
        }
    }

    pub fn permits_tool(&self, tool: ToolName) -> bool {
        self.tool_whitelist().contains(&tool)
    }

    pub fn can_transition_to(&self, next: CallState) -> bool {
        self.destinations().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind(), StateKind::Terminal { .. })
    }

    pub fn is_decision(&self) -> bool {
        matches!(self.kind(), StateKind::Decision)
    }

    pub fn is_action(&self) -> bool {
        matches!(self.kind(), StateKind::Action(_))
    }

    /// Tool run once on entering a terminal state
    pub fn entry_tool(&self) -> Option<ToolName> {
        match self.kind() {
            StateKind::Terminal { entry_tool } => entry_tool,
            _ => None,
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_constraints_hold_for_every_state() {
        for state in CallState::ALL {
            match state.kind() {
                StateKind::Decision => {
                    assert!(state.tool_whitelist().is_empty(), "{state} has tools");
                    assert!(!state.destinations().is_empty(), "{state} is a dead end");
                }
                StateKind::Action(tool) => {
                    assert_eq!(state.tool_whitelist(), &[tool], "{state} whitelist");
                }
                StateKind::Terminal { entry_tool } => {
                    assert!(state.destinations().is_empty(), "{state} has exits");
                    let expected: Vec<ToolName> = entry_tool.into_iter().collect();
                    assert_eq!(state.tool_whitelist(), expected.as_slice());
                }
            }
        }
    }

    #[test]
    fn test_destinations_are_never_self_loops() {
        for state in CallState::ALL {
            assert!(!state.can_transition_to(state), "{state} loops to itself");
        }
    }

    #[test]
    fn test_fallback_is_declared_from_every_decision_state() {
        for state in CallState::ALL.iter().filter(|s| s.is_decision()) {
            assert!(
                state.can_transition_to(CallState::FALLBACK),
                "{state} cannot escalate"
            );
        }
        assert!(CallState::FALLBACK.is_terminal());
    }

    #[test]
    fn test_representative_edges() {
        assert!(CallState::Welcome.can_transition_to(CallState::Lookup));
        assert!(CallState::Welcome.can_transition_to(CallState::NonService));
        assert!(CallState::Lookup.can_transition_to(CallState::ManageBooking));
        assert!(CallState::Safety.can_transition_to(CallState::SafetyExit));
        assert!(CallState::Booking.can_transition_to(CallState::Confirm));
        assert!(CallState::Booking.can_transition_to(CallState::BookingFailed));
        assert!(!CallState::Booking.can_transition_to(CallState::Callback));
        assert!(!CallState::Welcome.can_transition_to(CallState::Confirm));
    }

    #[test]
    fn test_confirm_only_reachable_from_booking() {
        for state in CallState::ALL {
            if state.can_transition_to(CallState::Confirm) {
                assert_eq!(state, CallState::Booking);
            }
        }
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&CallState::BookingFailed).unwrap();
        assert_eq!(json, "\"booking_failed\"");
        assert_eq!(CallState::ServiceArea.to_string(), "service_area");
    }
}
