//! Tool request and result records
//!
//! Every external side effect is expressed as a typed request and answered
//! with a typed result carrying an explicit success/found boolean. The wire
//! format is camelCase JSON; required booleans have no serde default, so a partial
//! or textual response fails to parse instead of being read as success.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::classification::{AppointmentAction, HazardKind, UrgencyTier};

/// External tool identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    LookupCaller,
    BookService,
    CreateCallback,
    ManageAppointment,
    SendAlert,
}

impl ToolName {
    pub const ALL: [ToolName; 5] = [
        ToolName::LookupCaller,
        ToolName::BookService,
        ToolName::CreateCallback,
        ToolName::ManageAppointment,
        ToolName::SendAlert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::LookupCaller => "lookup_caller",
            ToolName::BookService => "book_service",
            ToolName::CreateCallback => "create_callback",
            ToolName::ManageAppointment => "manage_appointment",
            ToolName::SendAlert => "send_alert",
        }
    }

    /// Parse a tool name as written by a generator (snake or camel case)
    pub fn parse(name: &str) -> Option<Self> {
        let normalized: String = name
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "lookupcaller" => Some(ToolName::LookupCaller),
            "bookservice" => Some(ToolName::BookService),
            "createcallback" => Some(ToolName::CreateCallback),
            "manageappointment" => Some(ToolName::ManageAppointment),
            "sendalert" => Some(ToolName::SendAlert),
            _ => None,
        }
    }

    /// Collaborator that serves this tool
    pub fn collaborator(&self) -> Collaborator {
        match self {
            ToolName::LookupCaller => Collaborator::CustomerDirectory,
            ToolName::BookService | ToolName::ManageAppointment => Collaborator::Scheduling,
            ToolName::CreateCallback => Collaborator::CallbackQueue,
            ToolName::SendAlert => Collaborator::Alerting,
        }
    }

    /// Read-only tools that are safe to attempt twice
    pub fn is_idempotent(&self) -> bool {
        matches!(self, ToolName::LookupCaller)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External collaborator; one circuit breaker each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collaborator {
    CustomerDirectory,
    Scheduling,
    CallbackQueue,
    Alerting,
}

impl Collaborator {
    pub const ALL: [Collaborator; 4] = [
        Collaborator::CustomerDirectory,
        Collaborator::Scheduling,
        Collaborator::CallbackQueue,
        Collaborator::Alerting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collaborator::CustomerDirectory => "customer_directory",
            Collaborator::Scheduling => "scheduling",
            Collaborator::CallbackQueue => "callback_queue",
            Collaborator::Alerting => "alerting",
        }
    }
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupRequest {
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub customer_name: String,
    pub phone: String,
    pub service_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_time: Option<String>,
    pub issue: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urgency: Option<UrgencyTier>,
}

/// Reason class of a queued callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackType {
    Service,
    FollowUp,
    BookingFailed,
    Escalation,
}

impl CallbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackType::Service => "service",
            CallbackType::FollowUp => "follow_up",
            CallbackType::BookingFailed => "booking_failed",
            CallbackType::Escalation => "escalation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackRequest {
    pub phone: String,
    #[serde(rename = "type")]
    pub callback_type: CallbackType,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManageRequest {
    pub action: AppointmentAction,
    pub booking_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRequest {
    pub kind: HazardKind,
    pub details: String,
    pub phone: String,
}

/// Typed request for any tool
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequest {
    LookupCaller(LookupRequest),
    BookService(BookingRequest),
    CreateCallback(CallbackRequest),
    ManageAppointment(ManageRequest),
    SendAlert(AlertRequest),
}

impl ToolRequest {
    pub fn tool(&self) -> ToolName {
        match self {
            ToolRequest::LookupCaller(_) => ToolName::LookupCaller,
            ToolRequest::BookService(_) => ToolName::BookService,
            ToolRequest::CreateCallback(_) => ToolName::CreateCallback,
            ToolRequest::ManageAppointment(_) => ToolName::ManageAppointment,
            ToolRequest::SendAlert(_) => ToolName::SendAlert,
        }
    }
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingAppointment {
    #[serde(alias = "appointmentId")]
    pub booking_ref: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResult {
    pub found: bool,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub upcoming_appointment: Option<UpcomingAppointment>,
    #[serde(default)]
    pub callback_promise: Option<String>,
}

impl LookupResult {
    pub fn not_found() -> Self {
        Self {
            found: false,
            customer_name: None,
            zip_code: None,
            address: None,
            upcoming_appointment: None,
            callback_promise: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResult {
    pub booked: bool,
    #[serde(default)]
    pub booked_date: Option<String>,
    #[serde(default)]
    pub booked_time: Option<String>,
    #[serde(default)]
    pub appointment_id: Option<String>,
    #[serde(default)]
    pub available_slots: Vec<String>,
}

impl BookingResult {
    pub fn declined(available_slots: Vec<String>) -> Self {
        Self {
            booked: false,
            booked_date: None,
            booked_time: None,
            appointment_id: None,
            available_slots,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackResult {
    pub created: bool,
    #[serde(default)]
    pub callback_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManageResult {
    pub success: bool,
    #[serde(default)]
    pub new_date: Option<String>,
    #[serde(default)]
    pub new_time: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertResult {
    pub sent: bool,
}

/// Typed result for any tool
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    LookupCaller(LookupResult),
    BookService(BookingResult),
    CreateCallback(CallbackResult),
    ManageAppointment(ManageResult),
    SendAlert(AlertResult),
}

impl ToolResult {
    pub fn tool(&self) -> ToolName {
        match self {
            ToolResult::LookupCaller(_) => ToolName::LookupCaller,
            ToolResult::BookService(_) => ToolName::BookService,
            ToolResult::CreateCallback(_) => ToolName::CreateCallback,
            ToolResult::ManageAppointment(_) => ToolName::ManageAppointment,
            ToolResult::SendAlert(_) => ToolName::SendAlert,
        }
    }

    /// The domain success flag, as reported by the collaborator
    pub fn succeeded(&self) -> bool {
        match self {
            ToolResult::LookupCaller(r) => r.found,
            ToolResult::BookService(r) => r.booked,
            ToolResult::CreateCallback(r) => r.created,
            ToolResult::ManageAppointment(r) => r.success,
            ToolResult::SendAlert(r) => r.sent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_name_parse_accepts_both_casings() {
        assert_eq!(ToolName::parse("book_service"), Some(ToolName::BookService));
        assert_eq!(ToolName::parse("bookService"), Some(ToolName::BookService));
        assert_eq!(ToolName::parse(" SendAlert "), Some(ToolName::SendAlert));
        assert_eq!(ToolName::parse("transfer_call"), None);
    }

    #[test]
    fn test_only_lookup_is_idempotent() {
        let idempotent: Vec<_> = ToolName::ALL.into_iter().filter(|t| t.is_idempotent()).collect();
        assert_eq!(idempotent, vec![ToolName::LookupCaller]);
    }

    #[test]
    fn test_booking_result_requires_booked_flag() {
        let partial = r#"{"bookedDate":"2024-05-02","appointmentId":"A-1"}"#;
        assert!(serde_json::from_str::<BookingResult>(partial).is_err());

        let ok: BookingResult =
            serde_json::from_str(r#"{"booked":true,"bookedDate":"2024-05-02"}"#).unwrap();
        assert!(ok.booked);
        assert_eq!(ok.booked_date.as_deref(), Some("2024-05-02"));
        assert!(ok.available_slots.is_empty());
    }

    #[test]
    fn test_lookup_result_parses_upcoming_appointment_alias() {
        let json = r#"{
            "found": true,
            "customerName": "Dana Reyes",
            "upcomingAppointment": {"appointmentId": "BK-77", "date": "Friday"}
        }"#;
        let result: LookupResult = serde_json::from_str(json).unwrap();
        let appt = result.upcoming_appointment.unwrap();
        assert_eq!(appt.booking_ref, "BK-77");
        assert_eq!(appt.time, None);
    }

    #[test]
    fn test_callback_request_wire_format() {
        let req = CallbackRequest {
            phone: "5125550100".into(),
            callback_type: CallbackType::BookingFailed,
            reason: "no slots".into(),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["type"], "booking_failed");
        assert_eq!(value["phone"], "5125550100");
    }

    #[test]
    fn test_result_success_flag() {
        let result = ToolResult::BookService(BookingResult::declined(vec!["Mon 9am".into()]));
        assert_eq!(result.tool(), ToolName::BookService);
        assert!(!result.succeeded());
        assert!(ToolResult::SendAlert(AlertResult { sent: true }).succeeded());
    }
}
