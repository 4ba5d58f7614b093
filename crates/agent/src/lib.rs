//! Missed-call service agent
//!
//! Features:
//! - Deterministic call state machine with a per-state tool whitelist
//! - Dialogue orchestration: the language model phrases questions, the
//!   machine decides everything else
//! - Call runner that drives one call through the tool gateway
//! - Post-call reconciliation into a single structured report
//! - Report delivery to a webhook or the log

pub mod machine;
pub mod orchestrator;
pub mod reconciler;
pub mod report;
pub mod runner;

pub use machine::{GenerationBrief, MachineConfig, StateMachine, TurnAction, Utterance};
pub use orchestrator::{DialogueOrchestrator, OrchestratorSettings, Rendered, SpeechSource};
pub use reconciler::{merge_field_sets, FieldExtractor, LlmFieldExtractor, PostCallReconciler};
pub use report::{deliver_report, sink_from_settings, LogReportSink, ReportSink, WebhookReportSink};
pub use runner::{CallRunner, TurnOutput};

use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Session error: {0}")]
    Session(#[from] call_agent_core::Error),

    #[error("Dialogue error: {0}")]
    Dialogue(String),

    #[error("LLM error: {0}")]
    Llm(#[from] call_agent_llm::LlmError),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Report delivery error: {0}")]
    Report(String),

    #[error("Call cancelled")]
    Cancelled,

    #[error("Timeout")]
    Timeout,
}
