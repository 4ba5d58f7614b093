//! Deterministic call state machine
//!
//! The machine decides every transition and every tool invocation from
//! validated caller input and structured tool results. The language model
//! only phrases some of the questions (see [`Utterance::Generate`]); it can
//! never move the call or trigger a side effect.
//!
//! Decision states interpret the caller's answer. Action states run exactly
//! one whitelisted tool on entry and route on its structured result. Terminal
//! states speak a closing built from tool output and freeze the session.

mod handlers;
pub mod prompts;

use call_agent_config::Settings;
use call_agent_core::{
    AlertRequest, BookingRequest, CallSession, CallState, CallbackRequest, CallbackType,
    EndReason, Field, LookupRequest, ManageRequest, ToolError, ToolRequest,
    ToolResult, TurnCounters,
};
use call_agent_text_processing::validate_zip_in_area;

use crate::AgentError;

pub(crate) use handlers::Step;

/// Machine limits and business identity
#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Caller turns allowed in one state before escalating to a callback
    pub max_turns_per_state: u32,
    /// Caller turns allowed in the whole call
    pub max_turns_per_call: u32,
    /// Serviced ZIP prefixes
    pub zip_prefixes: Vec<String>,
    pub business_name: String,
    pub agent_name: String,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            max_turns_per_state: 5,
            max_turns_per_call: 30,
            zip_prefixes: vec!["787".to_string()],
            business_name: "Comfort Air Services".to_string(),
            agent_name: "Sam".to_string(),
        }
    }
}

impl From<&Settings> for MachineConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            max_turns_per_state: settings.dialogue.max_turns_per_state,
            max_turns_per_call: settings.dialogue.max_turns_per_call,
            zip_prefixes: settings.service_area.zip_prefixes.clone(),
            business_name: settings.business.name.clone(),
            agent_name: settings.business.agent_name.clone(),
        }
    }
}

/// What the orchestrator should phrase for this turn
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationBrief {
    pub state: CallState,
    pub goal: String,
    pub legal_intents: &'static [&'static str],
    /// Spoken verbatim when generation fails or is rejected
    pub fallback: String,
}

/// Outbound speech for one turn
#[derive(Debug, Clone, PartialEq)]
pub enum Utterance {
    /// Spoken exactly as written
    Fixed(String),
    /// Phrased by the language model, within the brief
    Generate(GenerationBrief),
}

impl Utterance {
    pub fn fixed(text: impl Into<String>) -> Self {
        Utterance::Fixed(text.into())
    }

    /// Text spoken when nothing better is available
    pub fn fallback_text(&self) -> &str {
        match self {
            Utterance::Fixed(text) => text,
            Utterance::Generate(brief) => &brief.fallback,
        }
    }
}

/// The machine's decision for one step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnAction {
    pub speak: Option<Utterance>,
    /// Tool to execute; the session already holds its slot
    pub tool: Option<ToolRequest>,
    /// Set when the session has been frozen
    pub end_call: Option<EndReason>,
}

impl TurnAction {
    fn say(utterance: Utterance) -> Self {
        Self {
            speak: Some(utterance),
            ..Self::default()
        }
    }
}

enum Entry {
    Act(TurnAction),
    Chain(CallState),
}

/// Deterministic call state machine
#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    config: MachineConfig,
}

impl StateMachine {
    pub fn new(config: MachineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Opening line for a fresh call
    pub fn start(&self, session: &mut CallSession) -> Result<TurnAction, AgentError> {
        if session.state() != CallState::Welcome || !session.transcript().is_empty() {
            return Err(AgentError::Dialogue("call already started".to_string()));
        }
        Ok(TurnAction::say(Utterance::Fixed(prompts::greeting(
            &self.config.business_name,
            &self.config.agent_name,
        ))))
    }

    /// Interpret one caller utterance
    pub fn process(&self, session: &mut CallSession, text: &str) -> Result<TurnAction, AgentError> {
        if let Some(tool) = session.pending_tool() {
            return Err(call_agent_core::Error::ToolPending(tool).into());
        }
        let counters = session.record_caller_turn(text)?;

        if let Some(breach) = self.turn_limit_breach(session.state(), counters) {
            tracing::warn!(call_id = %session.call_id(), error = %breach, "Escalating to callback");
            metrics::counter!("turn_limit_escalations_total", "state" => session.state().as_str())
                .increment(1);
            session.set_end_reason(EndReason::TurnLimitExceeded)?;
            return self.enter(session, CallState::FALLBACK);
        }

        let step = match session.state() {
            CallState::Welcome => self.on_welcome(session, text)?,
            CallState::FollowUp => self.on_follow_up(session, text)?,
            CallState::ManageBooking => self.on_manage_booking(session, text)?,
            CallState::Safety => self.on_safety(session, text)?,
            CallState::ServiceArea => self.on_service_area(session, text)?,
            CallState::Discovery => self.on_discovery(session, text)?,
            CallState::Urgency => self.on_urgency(session, text)?,
            CallState::PreConfirm => self.on_pre_confirm(session, text)?,
            other => {
                return Err(AgentError::Dialogue(format!(
                    "no caller input expected in {}",
                    other
                )))
            }
        };

        match step {
            Step::Stay(utterance) => Ok(TurnAction::say(utterance)),
            Step::Go(next) => self.enter(session, next),
        }
    }

    /// Route on the structured result of the outstanding tool
    pub fn on_tool_result(
        &self,
        session: &mut CallSession,
        outcome: Result<ToolResult, ToolError>,
    ) -> Result<TurnAction, AgentError> {
        let state = session.state();
        match outcome {
            Ok(result) => session.apply_tool_result(result)?,
            Err(error) => {
                tracing::warn!(
                    call_id = %session.call_id(),
                    state = %state,
                    error = %error,
                    "Tool failed, taking fallback route"
                );
                session.record_system(&error.to_string())?;
                session.fail_tool(error)?;
            }
        }
        let failed = session.last_tool_error().is_some();
        let business = self.config.business_name.as_str();

        match state {
            // A remembered hazard still gets the safety exit and its alert
            CallState::Lookup if failed && session.hazard().is_some() => {
                self.enter(session, CallState::Safety)
            }
            CallState::Lookup if failed => {
                session.set_end_reason(EndReason::ToolFailure)?;
                self.enter(session, CallState::Callback)
            }
            CallState::Lookup => {
                let next = self.route_after_lookup(session)?;
                self.enter(session, next)
            }
            CallState::Booking if session.flags().booking_confirmed => {
                self.enter(session, CallState::Confirm)
            }
            CallState::Booking => {
                session.set_end_reason(if failed {
                    EndReason::ToolFailure
                } else {
                    EndReason::BookingFailed
                })?;
                self.enter(session, CallState::BookingFailed)
            }
            CallState::ManageAppointment
                if !failed && session.manage().is_some_and(|m| m.success) =>
            {
                self.enter(session, CallState::ManageDone)
            }
            CallState::ManageAppointment => {
                session.set_end_reason(EndReason::ToolFailure)?;
                self.enter(session, CallState::Callback)
            }
            CallState::SafetyExit => {
                let text = prompts::safety_exit(session.flags().alert_sent);
                self.close(session, text, EndReason::SafetyEmergency)
            }
            CallState::BookingFailed => {
                let text = prompts::booking_failed(session.flags().callback_created, business);
                let reason = session.end_reason().unwrap_or(EndReason::BookingFailed);
                self.close(session, text, reason)
            }
            CallState::Callback => {
                let text = prompts::callback(session.flags().callback_created, business);
                let reason = session.end_reason().unwrap_or(EndReason::CallbackRequested);
                self.close(session, text, reason)
            }
            other => Err(AgentError::Dialogue(format!(
                "tool result arrived in {}",
                other
            ))),
        }
    }

    /// Caller hung up. Idempotent.
    pub fn hangup(&self, session: &mut CallSession) {
        if !session.is_frozen() {
            tracing::info!(call_id = %session.call_id(), state = %session.state(), "Caller hung up");
            session.freeze(EndReason::CallerHangup);
        }
    }

    fn turn_limit_breach(
        &self,
        state: CallState,
        counters: TurnCounters,
    ) -> Option<call_agent_core::Error> {
        if counters.state_turn_count > self.config.max_turns_per_state {
            Some(call_agent_core::Error::TurnLimitExceeded {
                state,
                turns: counters.state_turn_count,
                limit: self.config.max_turns_per_state,
            })
        } else if counters.turn_count > self.config.max_turns_per_call {
            Some(call_agent_core::Error::TurnLimitExceeded {
                state,
                turns: counters.turn_count,
                limit: self.config.max_turns_per_call,
            })
        } else {
            None
        }
    }

    /// Transition and run entry logic, following chained transitions until a
    /// state needs input, a tool, or ends the call
    fn enter(&self, session: &mut CallSession, next: CallState) -> Result<TurnAction, AgentError> {
        let mut next = next;
        for _ in 0..CallState::ALL.len() {
            let from = session.state();
            session.transition(next)?;
            metrics::counter!("call_transitions_total", "from" => from.as_str(), "to" => next.as_str())
                .increment(1);

            match self.on_enter(session)? {
                Entry::Act(action) => return Ok(action),
                Entry::Chain(state) => next = state,
            }
        }
        Err(AgentError::Dialogue(format!(
            "transition chain did not settle at {}",
            next
        )))
    }

    fn on_enter(&self, session: &mut CallSession) -> Result<Entry, AgentError> {
        let state = session.state();
        let business = self.config.business_name.as_str();

        let entry = match state {
            CallState::Welcome => {
                return Err(AgentError::Dialogue("welcome cannot be re-entered".to_string()))
            }
            CallState::Lookup => match session.lookup() {
                Some(_) => {
                    tracing::debug!(call_id = %session.call_id(), "Reusing cached lookup");
                    Entry::Chain(self.route_after_lookup(session)?)
                }
                None => {
                    let request = ToolRequest::LookupCaller(LookupRequest {
                        phone: session.phone().to_string(),
                    });
                    Entry::Act(self.begin(session, request, None)?)
                }
            },
            CallState::FollowUp => {
                let promise = session.lookup().and_then(|l| l.callback_promise.as_deref());
                let opening = prompts::follow_up_opening(promise);
                Entry::Act(TurnAction::say(Utterance::Generate(prompts::follow_up_brief(
                    opening,
                ))))
            }
            CallState::ManageBooking => {
                let appointment = session.lookup().and_then(|l| l.upcoming_appointment.as_ref());
                Entry::Act(TurnAction::say(Utterance::Fixed(prompts::manage_opening(
                    appointment,
                ))))
            }
            CallState::ManageAppointment => {
                let booking_ref = session
                    .lookup()
                    .and_then(|l| l.upcoming_appointment.as_ref())
                    .map(|a| a.booking_ref.clone());
                match (session.requested_change().cloned(), booking_ref) {
                    (Some(change), Some(booking_ref)) => {
                        let request = ToolRequest::ManageAppointment(ManageRequest {
                            action: change.action,
                            booking_ref,
                            new_time: change.new_time,
                        });
                        Entry::Act(self.begin(
                            session,
                            request,
                            Some(Utterance::fixed(prompts::MANAGE_WAIT)),
                        )?)
                    }
                    _ => {
                        return Err(AgentError::Dialogue(
                            "appointment change without a booking reference".to_string(),
                        ))
                    }
                }
            }
            CallState::Safety => match session.hazard() {
                Some(_) => Entry::Chain(CallState::SafetyExit),
                None => Entry::Act(TurnAction::say(Utterance::fixed(prompts::SAFETY_QUESTION))),
            },
            CallState::ServiceArea => {
                let known_in_area = session
                    .field(Field::ZipCode)
                    .is_some_and(|zip| !validate_zip_in_area(zip, &self.config.zip_prefixes).is_empty());
                if known_in_area {
                    Entry::Chain(CallState::Discovery)
                } else {
                    Entry::Act(TurnAction::say(Utterance::fixed(prompts::ZIP_QUESTION)))
                }
            }
            CallState::Discovery => self.discovery_entry(session)?,
            CallState::Urgency => match session.urgency_tier() {
                Some(_) => Entry::Chain(CallState::PreConfirm),
                None => Entry::Act(TurnAction::say(Utterance::Generate(prompts::urgency_brief(
                    false,
                )))),
            },
            CallState::PreConfirm => {
                if handlers::next_missing(session).is_some() {
                    Entry::Chain(CallState::Discovery)
                } else {
                    Entry::Act(TurnAction::say(Utterance::Fixed(prompts::readback(session))))
                }
            }
            CallState::Booking => {
                let request = ToolRequest::BookService(self.booking_request(session)?);
                Entry::Act(self.begin(session, request, Some(Utterance::fixed(prompts::BOOKING_WAIT)))?)
            }
            CallState::Confirm => {
                let booking = session
                    .booking()
                    .filter(|b| b.booked)
                    .cloned()
                    .ok_or_else(|| AgentError::Dialogue("confirm without a booking".to_string()))?;
                Entry::Act(self.close(
                    session,
                    prompts::confirm(&booking, business),
                    EndReason::BookingConfirmed,
                )?)
            }
            CallState::ManageDone => {
                let result = session
                    .manage()
                    .cloned()
                    .ok_or_else(|| AgentError::Dialogue("manage done without a result".to_string()))?;
                let text = prompts::manage_done(session.requested_change(), &result, business);
                Entry::Act(self.close(session, text, EndReason::AppointmentUpdated)?)
            }
            CallState::NonService => {
                Entry::Act(self.close(session, prompts::non_service(business), EndReason::NonService)?)
            }
            CallState::OutOfArea => {
                let text = prompts::out_of_area(session.field(Field::ZipCode));
                Entry::Act(self.close(session, text, EndReason::OutOfArea)?)
            }
            CallState::SafetyExit => {
                let kind = session.hazard().ok_or_else(|| {
                    AgentError::Dialogue("safety exit without a reported hazard".to_string())
                })?;
                session.set_end_reason(EndReason::SafetyEmergency)?;
                let details = session
                    .transcript()
                    .caller_lines()
                    .last()
                    .unwrap_or_default()
                    .to_string();
                let request = ToolRequest::SendAlert(AlertRequest {
                    kind,
                    details,
                    phone: session.phone().to_string(),
                });
                Entry::Act(self.begin(
                    session,
                    request,
                    Some(Utterance::Fixed(prompts::safety_instruction(kind))),
                )?)
            }
            CallState::BookingFailed => {
                let request = self.callback_request(session, CallbackType::BookingFailed);
                Entry::Act(self.begin(
                    session,
                    request,
                    Some(Utterance::fixed(prompts::BOOKING_FAILED_OFFER)),
                )?)
            }
            CallState::Callback => {
                let reason = session.end_reason().unwrap_or(EndReason::CallbackRequested);
                session.set_end_reason(reason)?;
                let callback_type = match reason {
                    EndReason::FollowUpRequested => CallbackType::FollowUp,
                    EndReason::TurnLimitExceeded | EndReason::ToolFailure => CallbackType::Escalation,
                    _ => CallbackType::Service,
                };
                let request = self.callback_request(session, callback_type);
                Entry::Act(self.begin(
                    session,
                    request,
                    Some(Utterance::fixed(prompts::callback_offer(reason))),
                )?)
            }
        };

        Ok(entry)
    }

    /// Where a found (or unknown) caller goes after the directory lookup
    fn route_after_lookup(&self, session: &mut CallSession) -> Result<CallState, AgentError> {
        let Some(lookup) = session.lookup().cloned() else {
            return Ok(CallState::Safety);
        };

        if lookup.found {
            if let Some(name) = lookup.customer_name.as_deref() {
                session.fill_field_if_empty(
                    Field::CustomerName,
                    &call_agent_text_processing::validate_name(name),
                )?;
            }
            if let Some(address) = lookup.address.as_deref() {
                session.fill_field_if_empty(
                    Field::ServiceAddress,
                    &call_agent_text_processing::validate_address(address),
                )?;
            }
            if let Some(zip) = lookup.zip_code.as_deref() {
                session.fill_field_if_empty(
                    Field::ZipCode,
                    &call_agent_text_processing::validate_zip(zip),
                )?;
            }
        }

        let next = match session.intent() {
            Some(call_agent_core::CallerIntent::ManageBooking) if session.flags().has_appointment => {
                CallState::ManageBooking
            }
            Some(call_agent_core::CallerIntent::FollowUp) => CallState::FollowUp,
            _ => CallState::Safety,
        };
        Ok(next)
    }

    fn booking_request(&self, session: &CallSession) -> Result<BookingRequest, AgentError> {
        let required = |field: Field| {
            session
                .field(field)
                .map(str::to_string)
                .ok_or_else(|| AgentError::Dialogue(format!("booking without {}", field.label())))
        };
        Ok(BookingRequest {
            customer_name: required(Field::CustomerName)?,
            phone: session.phone().to_string(),
            service_address: required(Field::ServiceAddress)?,
            preferred_time: session.field(Field::PreferredTime).map(str::to_string),
            issue: required(Field::ProblemDescription)?,
            zip_code: session.field(Field::ZipCode).map(str::to_string),
            urgency: session.urgency_tier(),
        })
    }

    fn callback_request(&self, session: &CallSession, callback_type: CallbackType) -> ToolRequest {
        let reason = session
            .field(Field::ProblemDescription)
            .map(str::to_string)
            .or_else(|| session.end_reason().map(|r| r.as_str().replace('_', " ")))
            .unwrap_or_else(|| "caller requested a callback".to_string());
        ToolRequest::CreateCallback(CallbackRequest {
            phone: session.phone().to_string(),
            callback_type,
            reason,
        })
    }

    /// Reserve the tool slot and hand the request to the caller
    fn begin(
        &self,
        session: &mut CallSession,
        request: ToolRequest,
        speak: Option<Utterance>,
    ) -> Result<TurnAction, AgentError> {
        session.begin_tool(request.tool())?;
        Ok(TurnAction {
            speak,
            tool: Some(request),
            end_call: None,
        })
    }

    /// Record the closing line and freeze the session
    fn close(
        &self,
        session: &mut CallSession,
        text: String,
        reason: EndReason,
    ) -> Result<TurnAction, AgentError> {
        session.record_agent(&text)?;
        session.freeze(reason);
        tracing::info!(
            call_id = %session.call_id(),
            state = %session.state(),
            reason = %reason,
            "Call closed"
        );
        Ok(TurnAction {
            speak: Some(Utterance::Fixed(text)),
            tool: None,
            end_call: Some(reason),
        })
    }
}
