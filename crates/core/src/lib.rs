//! Core types for the missed-call agent
//!
//! This crate provides the foundational types used across all other crates:
//! - Call states and the static transition / tool whitelist table
//! - The per-call session record and its mutation rules
//! - Tool request and result records exchanged with external collaborators
//! - Collected fields, classifications and the post-call report payload
//! - Error types

pub mod classification;
pub mod error;
pub mod fields;
pub mod report;
pub mod session;
pub mod state;
pub mod tools;
pub mod transcript;

pub use classification::{
    AppointmentAction, CallerIntent, HazardKind, LeadType, ProblemDuration, UrgencyTier,
};
pub use error::{Error, Result, ToolError};
pub use fields::{Field, FieldSet};
pub use report::{BookedAppointment, CallOutcome, CallReport, EndReason};
pub use session::{CallSession, RequestedChange, SessionFlags, StateChange, TurnCounters};
pub use state::{CallState, StateKind};
pub use tools::{
    AlertRequest, AlertResult, BookingRequest, BookingResult, CallbackRequest, CallbackResult,
    CallbackType, Collaborator, LookupRequest, LookupResult, ManageRequest, ManageResult,
    ToolName, ToolRequest, ToolResult, UpcomingAppointment,
};
pub use transcript::{Speaker, Transcript, TranscriptEntry};
