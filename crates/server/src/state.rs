//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use call_agent_agent::{
    sink_from_settings, DialogueOrchestrator, MachineConfig, OrchestratorSettings,
    PostCallReconciler, StateMachine,
};
use call_agent_config::Settings;
use call_agent_llm::{LlmBackend, LlmConfig, OllamaBackend};
use call_agent_tools::ToolGateway;

use crate::session::{AgentServices, CallManager};
use crate::ServerError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub calls: Arc<CallManager>,
    /// Present when the Prometheus recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Build the agent services from settings
    pub fn from_settings(
        config: Settings,
        metrics: Option<PrometheusHandle>,
    ) -> Result<Self, ServerError> {
        let services = build_services(&config)?;
        let calls = Arc::new(CallManager::new(services, &config.server, &config.reporting));
        Ok(Self::new(config, calls, metrics))
    }

    pub fn new(config: Settings, calls: Arc<CallManager>, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            config: Arc::new(config),
            calls,
            metrics,
        }
    }
}

/// Language model backend, or `None` for fixed phrasing only
fn build_llm(config: &Settings) -> Option<Arc<dyn LlmBackend>> {
    if !config.llm.enabled {
        tracing::info!("LLM disabled, using fixed phrasing");
        return None;
    }
    match OllamaBackend::new(LlmConfig::from(&config.llm)) {
        Ok(backend) => {
            tracing::info!(model = %config.llm.model, endpoint = %config.llm.endpoint, "LLM backend ready");
            Some(Arc::new(backend))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to create LLM backend, using fixed phrasing");
            None
        }
    }
}

fn build_services(config: &Settings) -> Result<AgentServices, ServerError> {
    let llm = build_llm(config);

    let gateway = ToolGateway::from_settings(&config.tools)
        .map_err(|e| ServerError::Init(format!("tool gateway: {}", e)))?;
    let sink = sink_from_settings(&config.reporting)
        .map_err(|e| ServerError::Init(format!("report sink: {}", e)))?;
    tracing::info!(sink = sink.name(), "Report sink ready");

    Ok(AgentServices {
        machine: Arc::new(StateMachine::new(MachineConfig::from(config))),
        orchestrator: Arc::new(DialogueOrchestrator::new(
            llm.clone(),
            OrchestratorSettings::from(config),
        )),
        gateway: Arc::new(gateway),
        reconciler: Arc::new(PostCallReconciler::from_settings(config, llm)),
        sink,
    })
}
