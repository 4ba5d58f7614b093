//! Call flow integration tests
//!
//! Drives whole calls through the runner, the tool gateway and the stub
//! collaborators, then reconciles the finished session into a report.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use call_agent_agent::{
    CallRunner, DialogueOrchestrator, MachineConfig, OrchestratorSettings, PostCallReconciler,
    StateMachine, TurnOutput,
};
use call_agent_core::{
    CallOutcome, CallSession, CallState, EndReason, Field, LookupResult, ToolName, UrgencyTier,
};
use call_agent_llm::{LlmBackend, ScriptedBackend};
use call_agent_tools::{open_circuits, GatewayConfig, StubMode, StubServiceBackend, ToolGateway};

const PHONE: &str = "5125550100";

struct Harness {
    runner: CallRunner,
    _cancel: watch::Sender<bool>,
}

impl Harness {
    fn new(stub: Arc<StubServiceBackend>, llm: Option<Arc<dyn LlmBackend>>) -> Self {
        let gateway = Arc::new(ToolGateway::new(stub, GatewayConfig::default()));
        Self::with_gateway(gateway, llm)
    }

    fn with_gateway(gateway: Arc<ToolGateway>, llm: Option<Arc<dyn LlmBackend>>) -> Self {
        let (tx, rx) = watch::channel(false);
        let runner = CallRunner::new(
            Arc::new(StateMachine::new(MachineConfig::default())),
            Arc::new(DialogueOrchestrator::new(llm, OrchestratorSettings::default())),
            gateway,
            CallSession::new(PHONE),
            rx,
        );
        Self {
            runner,
            _cancel: tx,
        }
    }

    async fn say(&mut self, text: &str) -> TurnOutput {
        self.runner.handle_utterance(text).await.unwrap()
    }

    fn passed_through(&self, from: CallState, to: CallState) -> bool {
        self.runner
            .session()
            .history()
            .iter()
            .any(|change| change.from == from && change.to == to)
    }
}

/// Greeting, service intent, no hazard: leaves the call at the ZIP question
async fn to_service_area(h: &mut Harness) {
    let greeting = h.runner.start().await.unwrap();
    assert_eq!(greeting.state, CallState::Welcome);

    let output = h.say("Hi, my furnace stopped working last night").await;
    assert_eq!(output.state, CallState::Safety);

    let output = h.say("No, nothing like that").await;
    assert_eq!(output.state, CallState::ServiceArea);
}

/// ZIP through urgency for an unknown caller: leaves the call at the read-back
async fn to_pre_confirm(h: &mut Harness) {
    to_service_area(h).await;

    let output = h.say("seven eight seven four five").await;
    assert_eq!(output.state, CallState::Discovery);

    h.say("The furnace won't turn on at all").await;
    h.say("It's Dana Reyes").await;
    let output = h.say("412 Elm Street").await;
    assert_eq!(output.state, CallState::Urgency);

    let output = h.say("Pretty urgent, tomorrow morning if possible").await;
    assert_eq!(output.state, CallState::PreConfirm);
    assert!(output.speak.contains("412 Elm Street"));
}

/// An in-area ZIP moves the call into discovery
#[tokio::test]
async fn test_in_area_zip_enters_discovery() {
    let mut h = Harness::new(Arc::new(StubServiceBackend::new()), None);
    to_service_area(&mut h).await;

    let output = h.say("It's 78745").await;
    assert_eq!(output.state, CallState::Discovery);
    assert!(output.end_call.is_none());
    assert_eq!(h.runner.session().field(Field::ZipCode), Some("78745"));
    assert!(h.passed_through(CallState::ServiceArea, CallState::Discovery));
}

/// Full happy path ends in a confirmed booking and a booked report
#[tokio::test]
async fn test_successful_booking_end_to_end() {
    let stub = Arc::new(StubServiceBackend::new());
    let mut h = Harness::new(stub.clone(), None);
    to_pre_confirm(&mut h).await;

    let output = h.say("Yes, that's all correct").await;
    assert_eq!(output.state, CallState::Confirm);
    assert_eq!(output.end_call, Some(EndReason::BookingConfirmed));
    assert_eq!(stub.calls(ToolName::BookService), 1);
    assert_eq!(stub.calls(ToolName::LookupCaller), 1);

    let session = h.runner.into_session();
    assert!(session.is_frozen());
    assert_eq!(session.urgency_tier(), Some(UrgencyTier::Urgent));

    let report = PostCallReconciler::new(None, Duration::from_secs(1))
        .reconcile(&session)
        .await;
    assert_eq!(report.outcome, CallOutcome::Booked);
    assert_eq!(report.final_state, CallState::Confirm);
    let appointment = report.appointment.expect("booked appointment");
    assert!(appointment
        .appointment_id
        .is_some_and(|id| id.starts_with("BK")));
    assert_eq!(report.fields.get(Field::CustomerName), Some("Dana Reyes"));
    assert_eq!(report.fields.get(Field::ZipCode), Some("78745"));
    assert!(report.tags.contains(&"booked".to_string()));
}

/// A declined booking never claims success and offers a callback
#[tokio::test]
async fn test_declined_booking_offers_callback() {
    let stub = Arc::new(StubServiceBackend::new().with_mode(ToolName::BookService, StubMode::Decline));
    let mut h = Harness::new(stub.clone(), None);
    to_pre_confirm(&mut h).await;

    let output = h.say("yes").await;
    assert_eq!(output.state, CallState::BookingFailed);
    assert_eq!(output.end_call, Some(EndReason::BookingFailed));
    assert!(output.speak.contains("callback"));
    assert!(!output.speak.to_lowercase().contains("booked"));
    assert!(!output.speak.contains("all set"));
    assert_eq!(stub.calls(ToolName::CreateCallback), 1);
    assert!(h.passed_through(CallState::Booking, CallState::BookingFailed));

    let session = h.runner.into_session();
    assert!(!session.flags().booking_confirmed);

    let report = PostCallReconciler::new(None, Duration::from_secs(1))
        .reconcile(&session)
        .await;
    assert_eq!(report.outcome, CallOutcome::CallbackQueued);
    assert!(report.appointment.is_none());
}

/// Six unproductive turns in one state escalate to a callback
#[tokio::test]
async fn test_turn_limit_escalates_to_callback() {
    let stub = Arc::new(StubServiceBackend::new());
    let mut h = Harness::new(stub.clone(), None);
    to_service_area(&mut h).await;

    for _ in 0..5 {
        let output = h.say("hmm, I'm not sure").await;
        assert_eq!(output.state, CallState::ServiceArea);
    }
    let output = h.say("hmm, I'm not sure").await;
    assert_eq!(output.state, CallState::Callback);
    assert_eq!(output.end_call, Some(EndReason::TurnLimitExceeded));
    assert_eq!(stub.calls(ToolName::CreateCallback), 1);
    assert!(h.passed_through(CallState::ServiceArea, CallState::Callback));
}

/// The caller lookup runs exactly once even when the caller is known
#[tokio::test]
async fn test_lookup_runs_once_per_call() {
    let stub = Arc::new(StubServiceBackend::new().with_customer(
        PHONE,
        LookupResult {
            found: true,
            customer_name: Some("Dana Reyes".into()),
            zip_code: Some("78745".into()),
            address: Some("412 Elm Street".into()),
            upcoming_appointment: None,
            callback_promise: None,
        },
    ));
    let mut h = Harness::new(stub.clone(), None);
    h.runner.start().await.unwrap();
    h.say("My AC is blowing warm air").await;

    let output = h.say("no").await;
    assert_eq!(output.state, CallState::Discovery);
    h.say("It's been blowing warm since Monday").await;
    h.say("whenever works, no rush").await;
    h.say("yes").await;

    assert_eq!(stub.calls(ToolName::LookupCaller), 1);
}

/// A hazard mentioned then retracted does not trigger the safety exit
#[tokio::test]
async fn test_retracted_hazard_continues_call() {
    let stub = Arc::new(StubServiceBackend::new());
    let mut h = Harness::new(stub.clone(), None);
    h.runner.start().await.unwrap();

    let output = h
        .say("I smell gas, never mind, we're fine. The AC just isn't cooling")
        .await;
    assert_eq!(output.state, CallState::Safety);
    assert!(output.end_call.is_none());

    let output = h.say("no").await;
    assert_eq!(output.state, CallState::ServiceArea);
    assert_eq!(stub.calls(ToolName::SendAlert), 0);
    assert!(!h.runner.session().flags().hazard_reported);
}

/// A live hazard sends the alert and ends the call with instructions
#[tokio::test]
async fn test_gas_smell_sends_alert() {
    let stub = Arc::new(StubServiceBackend::new());
    let mut h = Harness::new(stub.clone(), None);
    h.runner.start().await.unwrap();

    let output = h.say("I smell gas in the kitchen").await;
    assert_eq!(output.state, CallState::SafetyExit);
    assert_eq!(output.end_call, Some(EndReason::SafetyEmergency));
    assert_eq!(stub.calls(ToolName::SendAlert), 1);
    assert_eq!(stub.calls(ToolName::BookService), 0);

    let report = PostCallReconciler::new(None, Duration::from_secs(1))
        .reconcile(h.runner.session())
        .await;
    assert_eq!(report.outcome, CallOutcome::SafetyEmergency);
    assert!(report.tags.contains(&"safety_hazard".to_string()));
}

/// Generated tool requests are dropped, counted and never executed
#[tokio::test]
async fn test_generated_tool_request_is_not_executed() {
    let stub = Arc::new(StubServiceBackend::new());
    let llm: Arc<dyn LlmBackend> = Arc::new(ScriptedBackend::always(
        r#"You're booked! [TOOL_CALL: {"name": "book_service", "arguments": {}}]"#,
    ));
    let mut h = Harness::new(stub.clone(), Some(llm));
    to_service_area(&mut h).await;

    let output = h.say("78745").await;
    assert_eq!(output.state, CallState::Discovery);
    assert!(!output.speak.contains("booked"));
    assert_eq!(stub.calls(ToolName::BookService), 0);
    assert!(h.runner.session().counters().llm_violations >= 1);
    assert!(!h.runner.session().flags().booking_confirmed);
}

/// Lookup outage retries once, then the caller is offered a callback
#[tokio::test]
async fn test_lookup_outage_falls_back_to_callback() {
    let stub = Arc::new(StubServiceBackend::new().with_mode(ToolName::LookupCaller, StubMode::Fail));
    let mut h = Harness::new(stub.clone(), None);
    h.runner.start().await.unwrap();

    let output = h.say("my heat pump is making a grinding noise").await;
    assert_eq!(output.state, CallState::Callback);
    assert_eq!(output.end_call, Some(EndReason::ToolFailure));
    assert_eq!(stub.calls(ToolName::LookupCaller), 2);
    assert_eq!(stub.calls(ToolName::CreateCallback), 1);
    assert!(h.runner.session().counters().tool_failures >= 1);
}

/// An open breaker short-circuits later calls without reaching the backend
#[tokio::test]
async fn test_open_breaker_is_shared_across_calls() {
    let stub = Arc::new(StubServiceBackend::new().with_mode(ToolName::LookupCaller, StubMode::Fail));
    let gateway = Arc::new(ToolGateway::new(stub.clone(), GatewayConfig::default()));

    for _ in 0..3 {
        let mut h = Harness::with_gateway(gateway.clone(), None);
        h.runner.start().await.unwrap();
        let output = h.say("my furnace is blowing cold air").await;
        assert_eq!(output.state, CallState::Callback);
    }

    let attempts = stub.calls(ToolName::LookupCaller);
    assert!(!open_circuits(&gateway).is_empty());

    let mut h = Harness::with_gateway(gateway.clone(), None);
    h.runner.start().await.unwrap();
    let output = h.say("my furnace is blowing cold air").await;
    assert_eq!(output.state, CallState::Callback);
    assert_eq!(stub.calls(ToolName::LookupCaller), attempts);
}

/// The report fills gaps from the transcript without overwriting live fields
#[tokio::test]
async fn test_reconciliation_fills_from_transcript() {
    let mut h = Harness::new(Arc::new(StubServiceBackend::new()), None);
    to_service_area(&mut h).await;
    h.say("78745").await;
    h.say("The furnace is short cycling").await;
    h.runner.hangup();

    let session = h.runner.into_session();
    assert_eq!(session.end_reason(), Some(EndReason::CallerHangup));
    assert!(session.field(Field::CustomerName).is_none());

    let report = PostCallReconciler::new(None, Duration::from_secs(1))
        .reconcile(&session)
        .await;
    assert_eq!(report.outcome, CallOutcome::Incomplete);
    assert_eq!(report.fields.get(Field::ZipCode), Some("78745"));
    assert_eq!(
        report.fields.get(Field::ProblemDescription),
        session.field(Field::ProblemDescription)
    );
    assert!(report
        .transcript
        .iter()
        .all(|entry| !entry.text.is_empty()));
}
