//! Call Management
//!
//! Owns every live call. Each call is driven by one `CallRunner` behind its
//! own async mutex, so turns within a call are serialized while calls run
//! independently. A hangup flips the call's cancel signal before taking the
//! lock, which makes any in-flight turn abandon its tool call or generation.
//!
//! Once a call ends it is finalized on a spawned task: reconciliation into a
//! `CallReport`, then bounded report delivery. Shutdown waits for those tasks
//! up to a deadline.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use call_agent_agent::{
    deliver_report, AgentError, CallRunner, DialogueOrchestrator, PostCallReconciler, ReportSink,
    StateMachine, TurnOutput,
};
use call_agent_config::{ReportingConfig, ServerConfig};
use call_agent_core::{CallOutcome, CallSession, CallState, EndReason, TurnCounters};
use call_agent_tools::ToolGateway;

use crate::ServerError;

/// Finished calls kept for `GET /api/calls/:id`
const FINISHED_RETAINED: usize = 1000;

/// Process-wide collaborators shared by every call
#[derive(Clone)]
pub struct AgentServices {
    pub machine: Arc<StateMachine>,
    pub orchestrator: Arc<DialogueOrchestrator>,
    pub gateway: Arc<ToolGateway>,
    pub reconciler: Arc<PostCallReconciler>,
    pub sink: Arc<dyn ReportSink>,
}

/// Point-in-time view of one call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallSummary {
    pub call_id: String,
    pub phone: String,
    pub state: CallState,
    pub active: bool,
    pub end_reason: Option<EndReason>,
    pub outcome: Option<CallOutcome>,
    pub counters: TurnCounters,
    pub pending_tool: Option<String>,
}

impl CallSummary {
    fn of(session: &CallSession) -> Self {
        let ended = session.is_frozen();
        Self {
            call_id: session.call_id().to_string(),
            phone: session.phone().to_string(),
            state: session.state(),
            active: !ended,
            end_reason: session.end_reason(),
            outcome: ended.then(|| CallOutcome::classify(session.state(), session.flags())),
            counters: session.counters(),
            pending_tool: session.pending_tool().map(|t| t.as_str().to_string()),
        }
    }
}

struct ActiveCall {
    /// `None` once the call has been handed to finalization
    runner: tokio::sync::Mutex<Option<CallRunner>>,
    cancel: watch::Sender<bool>,
    snapshot: RwLock<CallSummary>,
    last_activity: RwLock<Instant>,
}

impl ActiveCall {
    fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    fn is_idle(&self, timeout: Duration) -> bool {
        self.last_activity.read().elapsed() > timeout
    }
}

#[derive(Default)]
struct FinishedCalls {
    by_id: HashMap<String, CallSummary>,
    order: VecDeque<String>,
}

impl FinishedCalls {
    fn insert(&mut self, summary: CallSummary) {
        if self.order.len() >= FINISHED_RETAINED {
            if let Some(oldest) = self.order.pop_front() {
                self.by_id.remove(&oldest);
            }
        }
        self.order.push_back(summary.call_id.clone());
        self.by_id.insert(summary.call_id.clone(), summary);
    }
}

/// Call manager
pub struct CallManager {
    services: AgentServices,
    calls: RwLock<HashMap<String, Arc<ActiveCall>>>,
    finished: Mutex<FinishedCalls>,
    finalizers: Mutex<Vec<JoinHandle<()>>>,
    max_calls: usize,
    idle_timeout: Duration,
    report_attempts: u32,
    report_timeout: Duration,
}

impl CallManager {
    pub fn new(services: AgentServices, server: &ServerConfig, reporting: &ReportingConfig) -> Self {
        Self {
            services,
            calls: RwLock::new(HashMap::new()),
            finished: Mutex::new(FinishedCalls::default()),
            finalizers: Mutex::new(Vec::new()),
            max_calls: server.max_calls,
            idle_timeout: Duration::from_secs(server.idle_timeout_seconds),
            report_attempts: reporting.max_attempts,
            report_timeout: Duration::from_millis(reporting.timeout_ms),
        }
    }

    /// Open a call for `phone` and speak the greeting
    pub async fn start_call(&self, phone: &str) -> Result<(String, TurnOutput), ServerError> {
        let phone = phone.trim();
        if phone.is_empty() {
            return Err(ServerError::InvalidRequest("phone is required".to_string()));
        }
        if self.active_count() >= self.max_calls {
            tracing::warn!(max_calls = self.max_calls, "Rejecting call, capacity reached");
            return Err(ServerError::Capacity);
        }

        let call_id = uuid::Uuid::new_v4().to_string();
        let (cancel, cancel_rx) = watch::channel(false);
        let mut runner = CallRunner::new(
            self.services.machine.clone(),
            self.services.orchestrator.clone(),
            self.services.gateway.clone(),
            CallSession::with_id(call_id.clone(), phone),
            cancel_rx,
        );
        let greeting = runner.start().await?;

        let call = Arc::new(ActiveCall {
            snapshot: RwLock::new(CallSummary::of(runner.session())),
            runner: tokio::sync::Mutex::new(Some(runner)),
            cancel,
            last_activity: RwLock::new(Instant::now()),
        });
        {
            let mut calls = self.calls.write();
            if calls.len() >= self.max_calls {
                return Err(ServerError::Capacity);
            }
            calls.insert(call_id.clone(), call);
        }

        metrics::counter!("calls_started_total").increment(1);
        tracing::info!(call_id = %call_id, "Call started");
        Ok((call_id, greeting))
    }

    /// One caller utterance
    pub async fn handle_turn(&self, call_id: &str, text: &str) -> Result<TurnOutput, ServerError> {
        let call = self.active(call_id)?;
        call.touch();

        let mut guard = call.runner.lock().await;
        let Some(runner) = guard.as_mut() else {
            return Err(ServerError::CallEnded(call_id.to_string()));
        };

        let result = runner.handle_utterance(text).await;
        *call.snapshot.write() = CallSummary::of(runner.session());

        let ended = match &result {
            Ok(output) => output.end_call.is_some(),
            Err(AgentError::Cancelled) => true,
            Err(_) => runner.session().is_frozen(),
        };
        if ended {
            if let Some(runner) = guard.take() {
                self.finalize(runner);
            }
        }
        result.map_err(ServerError::from)
    }

    /// Transport disconnect
    pub async fn hangup(&self, call_id: &str) -> Result<CallSummary, ServerError> {
        let call = self.active(call_id)?;
        // Signal first so an in-flight turn releases the lock
        call.cancel.send_replace(true);

        let mut guard = call.runner.lock().await;
        match guard.take() {
            Some(mut runner) => {
                runner.hangup();
                let summary = CallSummary::of(runner.session());
                self.finalize(runner);
                Ok(summary)
            }
            // The in-flight turn finalized the call
            None => self
                .finished
                .lock()
                .by_id
                .get(call_id)
                .cloned()
                .ok_or_else(|| ServerError::CallEnded(call_id.to_string())),
        }
    }

    pub fn summary(&self, call_id: &str) -> Result<CallSummary, ServerError> {
        if let Some(call) = self.calls.read().get(call_id) {
            return Ok(call.snapshot.read().clone());
        }
        self.finished
            .lock()
            .by_id
            .get(call_id)
            .cloned()
            .ok_or_else(|| ServerError::CallNotFound(call_id.to_string()))
    }

    /// Snapshots of the live calls
    pub fn list(&self) -> Vec<CallSummary> {
        self.calls
            .read()
            .values()
            .map(|call| call.snapshot.read().clone())
            .collect()
    }

    pub fn services(&self) -> &AgentServices {
        &self.services
    }

    pub fn active_count(&self) -> usize {
        self.calls.read().len()
    }

    /// Finalizations still running
    pub fn pending_finalizations(&self) -> usize {
        let mut handles = self.finalizers.lock();
        handles.retain(|h| !h.is_finished());
        handles.len()
    }

    /// Periodically hang up calls with no caller activity for the idle timeout.
    ///
    /// Returns a shutdown sender that stops the task.
    pub fn start_idle_reaper(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let period = (manager.idle_timeout / 4).max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for call_id in manager.idle_calls() {
                            tracing::info!(call_id = %call_id, "Hanging up idle call");
                            if let Err(e) = manager.hangup(&call_id).await {
                                tracing::debug!(call_id = %call_id, error = %e, "Idle hangup skipped");
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("Idle reaper shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    /// Hang up every open call, then wait for finalizations up to `grace`
    pub async fn shutdown(&self, grace: Duration) {
        let open: Vec<String> = self.calls.read().keys().cloned().collect();
        tracing::info!(open_calls = open.len(), "Hanging up open calls for shutdown");
        for call_id in open {
            if let Err(e) = self.hangup(&call_id).await {
                tracing::debug!(call_id = %call_id, error = %e, "Shutdown hangup skipped");
            }
        }

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.finalizers.lock());
        let outstanding = handles.len();
        if tokio::time::timeout(grace, futures::future::join_all(handles))
            .await
            .is_err()
        {
            tracing::warn!(
                outstanding,
                grace_ms = grace.as_millis() as u64,
                "Shutdown deadline reached with finalizations still running"
            );
        }
    }

    fn active(&self, call_id: &str) -> Result<Arc<ActiveCall>, ServerError> {
        if let Some(call) = self.calls.read().get(call_id) {
            return Ok(call.clone());
        }
        if self.finished.lock().by_id.contains_key(call_id) {
            Err(ServerError::CallEnded(call_id.to_string()))
        } else {
            Err(ServerError::CallNotFound(call_id.to_string()))
        }
    }

    fn idle_calls(&self) -> Vec<String> {
        self.calls
            .read()
            .iter()
            .filter(|(_, call)| call.is_idle(self.idle_timeout))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Retire the call and spawn reconciliation plus report delivery
    fn finalize(&self, runner: CallRunner) {
        let session = runner.into_session();
        let call_id = session.call_id().to_string();
        let summary = CallSummary::of(&session);

        self.calls.write().remove(&call_id);
        self.finished.lock().insert(summary.clone());
        metrics::counter!("calls_ended_total", "reason" => summary.end_reason.map(|r| r.as_str()).unwrap_or("unknown"))
            .increment(1);
        tracing::info!(
            call_id = %call_id,
            state = %summary.state,
            end_reason = ?summary.end_reason,
            turns = summary.counters.turn_count,
            "Call ended, finalizing"
        );

        let reconciler = self.services.reconciler.clone();
        let sink = self.services.sink.clone();
        let attempts = self.report_attempts;
        let attempt_timeout = self.report_timeout;
        let handle = tokio::spawn(async move {
            let report = reconciler.reconcile(&session).await;
            if let Err(e) = deliver_report(sink.as_ref(), &report, attempts, attempt_timeout).await {
                tracing::warn!(call_id = %report.call_id, error = %e, "Call report not delivered");
            }
        });

        let mut handles = self.finalizers.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use call_agent_agent::{LogReportSink, MachineConfig, OrchestratorSettings};
    use call_agent_core::ToolName;
    use call_agent_tools::{GatewayConfig, StubMode, StubServiceBackend};

    fn manager_with(stub: StubServiceBackend, max_calls: usize) -> Arc<CallManager> {
        let services = AgentServices {
            machine: Arc::new(StateMachine::new(MachineConfig::default())),
            orchestrator: Arc::new(DialogueOrchestrator::fixed_only(OrchestratorSettings::default())),
            gateway: Arc::new(ToolGateway::new(Arc::new(stub), GatewayConfig::default())),
            reconciler: Arc::new(PostCallReconciler::new(None, Duration::from_secs(1))),
            sink: Arc::new(LogReportSink),
        };
        let server = ServerConfig {
            max_calls,
            ..ServerConfig::default()
        };
        Arc::new(CallManager::new(services, &server, &ReportingConfig::default()))
    }

    fn manager() -> Arc<CallManager> {
        manager_with(StubServiceBackend::new(), 10)
    }

    #[tokio::test]
    async fn test_start_call_speaks_greeting() {
        let manager = manager();
        let (call_id, greeting) = manager.start_call("5125550100").await.unwrap();

        assert!(greeting.speak.contains("Thanks for calling"));
        assert!(greeting.end_call.is_none());
        let summary = manager.summary(&call_id).unwrap();
        assert!(summary.active);
        assert_eq!(summary.state, CallState::Welcome);
    }

    #[tokio::test]
    async fn test_capacity_limit_rejects_calls() {
        let manager = manager_with(StubServiceBackend::new(), 1);
        manager.start_call("5125550100").await.unwrap();
        assert!(matches!(
            manager.start_call("5125550101").await,
            Err(ServerError::Capacity)
        ));
    }

    #[tokio::test]
    async fn test_empty_phone_is_rejected() {
        assert!(matches!(
            manager().start_call("  ").await,
            Err(ServerError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_ended_call_is_finalized() {
        let manager = manager();
        let (call_id, _) = manager.start_call("5125550100").await.unwrap();

        let output = manager
            .handle_turn(&call_id, "Hi, I'm calling about a job application")
            .await
            .unwrap();
        assert_eq!(output.end_call, Some(EndReason::NonService));
        assert_eq!(manager.active_count(), 0);

        let summary = manager.summary(&call_id).unwrap();
        assert!(!summary.active);
        assert_eq!(summary.outcome, Some(CallOutcome::NonService));
        assert!(matches!(
            manager.handle_turn(&call_id, "hello?").await,
            Err(ServerError::CallEnded(_))
        ));

        manager.shutdown(Duration::from_secs(1)).await;
        assert_eq!(manager.pending_finalizations(), 0);
    }

    #[tokio::test]
    async fn test_unknown_call_is_not_found() {
        assert!(matches!(
            manager().handle_turn("missing", "hello").await,
            Err(ServerError::CallNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hangup_abandons_in_flight_turn() {
        let manager = manager_with(
            StubServiceBackend::new().with_mode(ToolName::LookupCaller, StubMode::Hang),
            10,
        );
        let (call_id, _) = manager.start_call("5125550100").await.unwrap();

        let turn = {
            let manager = manager.clone();
            let call_id = call_id.clone();
            tokio::spawn(async move { manager.handle_turn(&call_id, "my furnace won't start").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let summary = manager.hangup(&call_id).await.unwrap();
        assert!(!summary.active);
        assert_eq!(summary.end_reason, Some(EndReason::CallerHangup));
        assert!(matches!(
            turn.await.unwrap(),
            Err(ServerError::Agent(AgentError::Cancelled))
        ));
        assert_eq!(manager.active_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_hangs_up_open_calls() {
        let manager = manager();
        let (first, _) = manager.start_call("5125550100").await.unwrap();
        let (second, _) = manager.start_call("5125550101").await.unwrap();

        manager.shutdown(Duration::from_secs(1)).await;
        assert_eq!(manager.active_count(), 0);
        for call_id in [first, second] {
            assert_eq!(
                manager.summary(&call_id).unwrap().end_reason,
                Some(EndReason::CallerHangup)
            );
        }
    }
}
