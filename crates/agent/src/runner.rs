//! Single-call driver
//!
//! Owns one session and runs it strictly sequentially: at most one tool call
//! or one generation is outstanding at a time. Both are raced against the
//! call's cancellation signal so a disconnect abandons in-flight work
//! immediately.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use call_agent_core::{CallSession, CallState, EndReason};
use call_agent_tools::ToolGateway;

use crate::machine::{StateMachine, TurnAction};
use crate::orchestrator::DialogueOrchestrator;
use crate::AgentError;

/// What the caller hears after one step
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutput {
    pub speak: String,
    /// Set once the call has ended
    pub end_call: Option<EndReason>,
    pub state: CallState,
}

pub struct CallRunner {
    machine: Arc<StateMachine>,
    orchestrator: Arc<DialogueOrchestrator>,
    gateway: Arc<ToolGateway>,
    session: CallSession,
    cancel: watch::Receiver<bool>,
}

impl CallRunner {
    pub fn new(
        machine: Arc<StateMachine>,
        orchestrator: Arc<DialogueOrchestrator>,
        gateway: Arc<ToolGateway>,
        session: CallSession,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            machine,
            orchestrator,
            gateway,
            session,
            cancel,
        }
    }

    pub fn session(&self) -> &CallSession {
        &self.session
    }

    pub fn into_session(self) -> CallSession {
        self.session
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Speak the greeting
    pub async fn start(&mut self) -> Result<TurnOutput, AgentError> {
        let action = self.machine.start(&mut self.session)?;
        self.drive(action).await
    }

    /// Handle one caller utterance through to the next spoken reply
    pub async fn handle_utterance(&mut self, text: &str) -> Result<TurnOutput, AgentError> {
        if self.is_cancelled() {
            self.machine.hangup(&mut self.session);
            return Err(AgentError::Cancelled);
        }
        let action = self.machine.process(&mut self.session, text)?;
        self.drive(action).await
    }

    /// Transport disconnect
    pub fn hangup(&mut self) {
        self.machine.hangup(&mut self.session);
    }

    /// Speak, run tools and feed results back until the machine waits for
    /// the caller or ends the call
    async fn drive(&mut self, first: TurnAction) -> Result<TurnOutput, AgentError> {
        let mut cancel = self.cancel.clone();
        let mut spoken = Vec::new();
        let mut action = first;

        loop {
            if let Some(utterance) = action.speak.take() {
                if self.session.is_frozen() {
                    // Closing line, already recorded by the machine
                    spoken.push(utterance.fallback_text().to_string());
                } else {
                    let render = self.orchestrator.render(&utterance, &self.session);
                    let Some(rendered) = until_cancelled(&mut cancel, render).await else {
                        return Err(self.abandon());
                    };
                    for _ in 0..rendered.violations {
                        self.session.record_violation();
                    }
                    self.session.record_agent(&rendered.text)?;
                    spoken.push(rendered.text);
                }
            }

            if action.end_call.is_some() {
                break;
            }
            let Some(request) = action.tool.take() else {
                break;
            };

            let state = self.session.state();
            let execute = self.gateway.execute_for_state(state, &request);
            let Some(outcome) = until_cancelled(&mut cancel, execute).await else {
                return Err(self.abandon());
            };
            action = self.machine.on_tool_result(&mut self.session, outcome)?;
        }

        Ok(TurnOutput {
            speak: spoken.join(" "),
            end_call: action.end_call,
            state: self.session.state(),
        })
    }

    fn abandon(&mut self) -> AgentError {
        tracing::info!(
            call_id = %self.session.call_id(),
            state = %self.session.state(),
            pending_tool = ?self.session.pending_tool(),
            "Call cancelled, abandoning in-flight work"
        );
        self.machine.hangup(&mut self.session);
        AgentError::Cancelled
    }
}

/// `None` when the call is cancelled first. A dropped sender never cancels.
async fn until_cancelled<F: Future>(cancel: &mut watch::Receiver<bool>, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancelled(cancel) => None,
        output = fut => Some(output),
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|c| *c).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use call_agent_core::{LookupResult, ToolName};
    use call_agent_tools::{GatewayConfig, StubMode, StubServiceBackend};

    use crate::machine::MachineConfig;
    use crate::orchestrator::OrchestratorSettings;

    fn runner(stub: Arc<StubServiceBackend>) -> (CallRunner, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let runner = CallRunner::new(
            Arc::new(StateMachine::new(MachineConfig::default())),
            Arc::new(DialogueOrchestrator::fixed_only(OrchestratorSettings::default())),
            Arc::new(ToolGateway::new(stub, GatewayConfig::default())),
            CallSession::new("5125550100"),
            rx,
        );
        (runner, tx)
    }

    #[tokio::test]
    async fn test_tool_step_speaks_after_result() {
        let stub = Arc::new(StubServiceBackend::new());
        let (mut runner, _tx) = runner(stub.clone());

        let greeting = runner.start().await.unwrap();
        assert!(greeting.speak.contains("Thanks for calling"));

        let output = runner.handle_utterance("my heat pump is not heating").await.unwrap();
        assert_eq!(output.state, CallState::Safety);
        assert_eq!(stub.calls(ToolName::LookupCaller), 1);
        assert!(runner.session().pending_tool().is_none());
    }

    #[tokio::test]
    async fn test_known_caller_fields_prefilled() {
        let stub = Arc::new(StubServiceBackend::new().with_customer(
            "5125550100",
            LookupResult {
                found: true,
                customer_name: Some("Dana Reyes".into()),
                zip_code: Some("78745".into()),
                address: Some("412 Elm Street".into()),
                upcoming_appointment: None,
                callback_promise: None,
            },
        ));
        let (mut runner, _tx) = runner(stub);
        runner.start().await.unwrap();
        runner.handle_utterance("the AC is leaking water").await.unwrap();

        let output = runner.handle_utterance("no").await.unwrap();
        assert_eq!(output.state, CallState::Discovery);
        assert_eq!(runner.session().field(call_agent_core::Field::ZipCode), Some("78745"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_abandons_hung_tool() {
        let stub = Arc::new(StubServiceBackend::new().with_mode(ToolName::LookupCaller, StubMode::Hang));
        let (mut runner, tx) = runner(stub);
        runner.start().await.unwrap();

        let cancel = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            tx.send(true).unwrap();
            tx
        });
        let result = runner.handle_utterance("my furnace won't turn on").await;
        assert!(matches!(result, Err(AgentError::Cancelled)));
        assert!(runner.session().is_frozen());
        assert_eq!(runner.session().end_reason(), Some(EndReason::CallerHangup));
        cancel.await.unwrap();
    }

    #[tokio::test]
    async fn test_turn_after_cancel_is_rejected() {
        let (mut runner, tx) = runner(Arc::new(StubServiceBackend::new()));
        runner.start().await.unwrap();
        tx.send(true).unwrap();
        assert!(matches!(
            runner.handle_utterance("hello").await,
            Err(AgentError::Cancelled)
        ));
    }
}
