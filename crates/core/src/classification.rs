//! Caller classifications
//!
//! Closed sets produced by the validators and carried on the session and the
//! post-call report.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Intent classified from the caller's first utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallerIntent {
    ManageBooking,
    FollowUp,
    NonService,
    #[default]
    Service,
}

impl CallerIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallerIntent::ManageBooking => "manage_booking",
            CallerIntent::FollowUp => "follow_up",
            CallerIntent::NonService => "non_service",
            CallerIntent::Service => "service",
        }
    }
}

impl fmt::Display for CallerIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hazard reported by a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardKind {
    GasLeak,
    CarbonMonoxide,
    Fire,
    Electrical,
    Flooding,
}

impl HazardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HazardKind::GasLeak => "gas_leak",
            HazardKind::CarbonMonoxide => "carbon_monoxide",
            HazardKind::Fire => "fire",
            HazardKind::Electrical => "electrical",
            HazardKind::Flooding => "flooding",
        }
    }

    /// Spoken safety instruction for this hazard
    pub fn instruction(&self) -> &'static str {
        match self {
            HazardKind::GasLeak => {
                "Please leave the house right away, don't use any switches or flames, and call 911 or your gas company from outside."
            }
            HazardKind::CarbonMonoxide => {
                "Please get everyone out into fresh air right away and call 911."
            }
            HazardKind::Fire => "Please get everyone out of the house and call 911 now.",
            HazardKind::Electrical => {
                "Please stay away from the equipment, switch off the breaker only if it's safe, and call 911 if you see sparks or flames."
            }
            HazardKind::Flooding => {
                "Please shut off the water and power to the affected area only if it's safe to do so."
            }
        }
    }
}

impl fmt::Display for HazardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgency tier of a service request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyTier {
    Emergency,
    Urgent,
    Routine,
}

impl UrgencyTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrgencyTier::Emergency => "emergency",
            UrgencyTier::Urgent => "urgent",
            UrgencyTier::Routine => "routine",
        }
    }
}

impl fmt::Display for UrgencyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lead classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LeadType {
    #[default]
    Service,
    Maintenance,
    HighTicket,
}

impl LeadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadType::Service => "service",
            LeadType::Maintenance => "maintenance",
            LeadType::HighTicket => "high_ticket",
        }
    }
}

/// How long the reported problem has been going on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemDuration {
    /// Today or within the last day
    Acute,
    /// A few days up to about two weeks
    Recent,
    /// Weeks, months or longer
    Ongoing,
}

impl ProblemDuration {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProblemDuration::Acute => "acute",
            ProblemDuration::Recent => "recent",
            ProblemDuration::Ongoing => "ongoing",
        }
    }
}

/// Change requested for an existing appointment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentAction {
    Cancel,
    Reschedule,
    Confirm,
}

impl AppointmentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentAction::Cancel => "cancel",
            AppointmentAction::Reschedule => "reschedule",
            AppointmentAction::Confirm => "confirm",
        }
    }
}

impl fmt::Display for AppointmentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
