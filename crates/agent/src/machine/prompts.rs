//! Fixed utterances and generation briefs
//!
//! Every closing that reports a side effect is built here from the tool
//! result that produced it; nothing in this module reads caller text.

use call_agent_core::{
    AppointmentAction, BookingResult, CallSession, CallState, EndReason, Field, HazardKind,
    ManageResult, RequestedChange, UpcomingAppointment, UrgencyTier,
};

use super::GenerationBrief;

pub const SAFETY_QUESTION: &str = "Before we go any further, is anyone smelling gas, seeing smoke or sparks, or hearing a carbon monoxide alarm right now?";

pub const SAFETY_CLARIFY: &str =
    "Okay, tell me what you're noticing. Is it a gas smell, smoke or fire, sparks, or a carbon monoxide alarm?";

pub const SAFETY_REASK: &str =
    "Just to be safe, is there any gas smell, smoke, sparking, or a CO alarm going off? A yes or no is fine.";

pub const ZIP_QUESTION: &str = "What's the ZIP code where you need service?";

pub const ZIP_REASK: &str =
    "Sorry, I didn't catch a five digit ZIP code. Could you say it one more time?";

pub const READBACK_REASK: &str = "Is everything I read back correct?";

pub const BOOKING_WAIT: &str = "Great, give me just a moment while I check the schedule.";

pub const MANAGE_WAIT: &str = "One moment while I pull that up.";

pub const BOOKING_FAILED_OFFER: &str =
    "I'm sorry, I wasn't able to lock in that appointment. Let me get a callback request in so the office can find you a time.";

pub fn greeting(business: &str, agent_name: &str) -> String {
    format!(
        "Thanks for calling {}, this is {}. Sorry we missed you. How can I help today?",
        business, agent_name
    )
}

pub fn field_question(field: Field) -> &'static str {
    match field {
        Field::ProblemDescription => "What's going on with your heating or cooling system?",
        Field::CustomerName => "Can I get your first and last name?",
        Field::ServiceAddress => "What's the street address where you need service?",
        Field::ZipCode => ZIP_QUESTION,
        Field::PreferredTime => "Do you have a preferred day or time for the visit?",
        Field::SiteContactName => "Who should the technician ask for when they arrive?",
        Field::SiteContactPhone => "And what's the best phone number to reach them?",
    }
}

pub fn field_reask(field: Field) -> String {
    match field {
        Field::ServiceAddress => {
            "Sorry, I need the street number and street name. What's the service address?"
                .to_string()
        }
        Field::SiteContactPhone => {
            "Sorry, I didn't get a full ten digit number. Could you repeat it?".to_string()
        }
        field => format!(
            "Sorry, I didn't quite catch the {}. Could you say that again?",
            field.label()
        ),
    }
}

pub fn review_question(field: Field, value: &str) -> String {
    format!("I have the {} as {}. Is that right?", field.label(), spoken(field, value))
}

pub fn review_replace(field: Field) -> String {
    format!("No problem. What should the {} be?", field.label())
}

fn spoken(field: Field, value: &str) -> String {
    match field {
        Field::SiteContactPhone if value.len() == 10 => {
            format!("{} {} {}", &value[..3], &value[3..6], &value[6..])
        }
        _ => value.to_string(),
    }
}

fn urgency_phrase(tier: UrgencyTier) -> &'static str {
    match tier {
        UrgencyTier::Emergency => "as an emergency",
        UrgencyTier::Urgent => "as urgent",
        UrgencyTier::Routine => "at the next available time",
    }
}

/// Read-back of everything collected for the booking
pub fn readback(session: &CallSession) -> String {
    let mut parts = Vec::new();
    if let Some(name) = session.field(Field::CustomerName) {
        parts.push(name.to_string());
    }
    if let Some(address) = session.field(Field::ServiceAddress) {
        parts.push(format!("at {}", address));
    }
    if let Some(problem) = session.field(Field::ProblemDescription) {
        parts.push(format!("for {}", problem));
    }
    if let Some(tier) = session.urgency_tier() {
        parts.push(urgency_phrase(tier).to_string());
    }
    if let Some(time) = session.field(Field::PreferredTime) {
        parts.push(format!("preferably {}", time));
    }

    let mut text = format!("Let me read that back. I have {}.", parts.join(", "));
    if let (Some(contact), Some(phone)) = (
        session.field(Field::SiteContactName),
        session.field(Field::SiteContactPhone),
    ) {
        text.push_str(&format!(
            " The on-site contact is {} at {}.",
            contact,
            spoken(Field::SiteContactPhone, phone)
        ));
    }
    text.push_str(" Is all of that correct?");
    text
}

pub fn follow_up_opening(callback_promise: Option<&str>) -> String {
    match callback_promise {
        Some(promise) => format!(
            "I see a note that we owe you a call about {}. Is this about that same issue, or something new?",
            promise
        ),
        None => "Thanks for following up. Is this about the same issue as before, or something new?"
            .to_string(),
    }
}

pub fn manage_opening(appointment: Option<&UpcomingAppointment>) -> String {
    let when = appointment
        .map(|a| when_phrase(a.date.as_deref(), a.time.as_deref()))
        .unwrap_or_default();
    if when.is_empty() {
        "I see an upcoming appointment on your account. Would you like to confirm it, reschedule it, or cancel it?".to_string()
    } else {
        format!(
            "I see an appointment {}. Would you like to confirm it, reschedule it, or cancel it?",
            when
        )
    }
}

pub const RESCHEDULE_TIME_QUESTION: &str = "Sure. What day and time would work better for you?";

fn when_phrase(date: Option<&str>, time: Option<&str>) -> String {
    match (date, time) {
        (Some(d), Some(t)) if d != t => format!("for {} at {}", d, t),
        (Some(d), _) => format!("for {}", d),
        (None, Some(t)) => format!("for {}", t),
        (None, None) => String::new(),
    }
}

pub fn callback_offer(reason: EndReason) -> &'static str {
    match reason {
        EndReason::TurnLimitExceeded => {
            "I'm having a hard time getting this sorted out over the phone, so let me have someone from the team call you back."
        }
        EndReason::ToolFailure => {
            "I'm having trouble reaching our system right now, so let me have someone call you back."
        }
        EndReason::FollowUpRequested => "Okay, let me put in a follow-up request for you.",
        _ => "No problem, let me get a callback request in for you.",
    }
}

// ===== CLOSINGS =====

/// Only reachable after the booking tool reported `booked: true`
pub fn confirm(booking: &BookingResult, business: &str) -> String {
    let when = when_phrase(booking.booked_date.as_deref(), booking.booked_time.as_deref());
    let mut text = if when.is_empty() {
        "You're all set, your appointment is booked.".to_string()
    } else {
        format!("You're all set, your appointment is booked {}.", when)
    };
    if let Some(id) = &booking.appointment_id {
        text.push_str(&format!(" Your confirmation number is {}.", id));
    }
    text.push_str(&format!(" Thanks for calling {}.", business));
    text
}

fn callback_outcome(created: bool, business: &str) -> String {
    if created {
        format!(
            "Your callback request is in, and someone from {} will call you back at this number.",
            business
        )
    } else {
        "I wasn't able to submit a callback request on my end. Please call us back at this number during business hours, or call 911 if anyone is in danger.".to_string()
    }
}

pub fn booking_failed(callback_created: bool, business: &str) -> String {
    callback_outcome(callback_created, business)
}

pub fn callback(callback_created: bool, business: &str) -> String {
    format!("{} Thanks for calling.", callback_outcome(callback_created, business))
}

pub fn safety_exit(alert_sent: bool) -> String {
    if alert_sent {
        "I've alerted our on-call team about this. Please stay safe and get out of the house if you need to.".to_string()
    } else {
        "Please contact emergency services or your utility's emergency line right away. Stay safe.".to_string()
    }
}

pub fn safety_instruction(kind: HazardKind) -> String {
    format!("That sounds like it could be dangerous. {}", kind.instruction())
}

pub fn out_of_area(zip: Option<&str>) -> String {
    match zip {
        Some(zip) => format!(
            "I'm sorry, {} is outside the area we service, so we can't send a technician out there. Thanks for calling.",
            zip
        ),
        None => "I'm sorry, that's outside the area we service. Thanks for calling.".to_string(),
    }
}

pub fn non_service(business: &str) -> String {
    format!(
        "Thanks for reaching out. This line is for {} service requests only, so I'll let you go. Have a good day.",
        business
    )
}

/// Only reachable after the manage tool reported `success: true`
pub fn manage_done(change: Option<&RequestedChange>, result: &ManageResult, business: &str) -> String {
    let when = when_phrase(result.new_date.as_deref(), result.new_time.as_deref());
    let body = match change.map(|c| c.action) {
        Some(AppointmentAction::Cancel) => "Your appointment has been cancelled.".to_string(),
        Some(AppointmentAction::Reschedule) if !when.is_empty() => {
            format!("Your appointment has been moved {}.", when)
        }
        Some(AppointmentAction::Reschedule) => "Your appointment has been rescheduled.".to_string(),
        Some(AppointmentAction::Confirm) | None => "Your appointment is confirmed.".to_string(),
    };
    format!("{} Thanks for calling {}.", body, business)
}

// ===== GENERATION BRIEFS =====

const DISCOVERY_INTENTS: &[&str] = &[
    "answer the question",
    "report a safety hazard",
    "ask for a callback",
];

pub fn discovery_brief(field: Field) -> GenerationBrief {
    GenerationBrief {
        state: CallState::Discovery,
        goal: format!(
            "Acknowledge what the caller said in a few words, then ask for their {}.",
            field.label()
        ),
        legal_intents: DISCOVERY_INTENTS,
        fallback: field_question(field).to_string(),
    }
}

pub fn discovery_reask_brief(field: Field) -> GenerationBrief {
    GenerationBrief {
        state: CallState::Discovery,
        goal: format!(
            "The last answer did not contain a usable {}. Politely ask for it again.",
            field.label()
        ),
        legal_intents: DISCOVERY_INTENTS,
        fallback: field_reask(field),
    }
}

pub fn follow_up_brief(fallback: String) -> GenerationBrief {
    GenerationBrief {
        state: CallState::FollowUp,
        goal: "The caller is following up on an earlier request. Find out whether this is about the same issue or something new.".to_string(),
        legal_intents: &[
            "confirm it is the same issue",
            "describe a new problem",
            "ask for a callback",
        ],
        fallback,
    }
}

pub fn manage_brief(fallback: String) -> GenerationBrief {
    GenerationBrief {
        state: CallState::ManageBooking,
        goal: "The caller has an upcoming appointment. Find out whether they want to confirm, reschedule or cancel it.".to_string(),
        legal_intents: &[
            "confirm the appointment",
            "reschedule the appointment",
            "cancel the appointment",
            "report a different problem",
        ],
        fallback,
    }
}

pub fn urgency_brief(reask: bool) -> GenerationBrief {
    let fallback = if reask {
        "Would you call this an emergency, fairly urgent, or can it wait for a regular appointment?"
    } else {
        "How soon do you need someone out? Is this an emergency, or would the next regular appointment work?"
    };
    GenerationBrief {
        state: CallState::Urgency,
        goal: "Find out how urgent the problem is, and whether the caller has a preferred day or time.".to_string(),
        legal_intents: &[
            "say it is an emergency",
            "say it is urgent",
            "say it can wait",
            "give a preferred time",
        ],
        fallback: fallback.to_string(),
    }
}
