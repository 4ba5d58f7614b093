//! Tool gateway
//!
//! The only path from the dialogue to an external side effect. Every call is
//! bounded by a timeout and guarded by the circuit breaker of its
//! collaborator. Breakers live on the gateway, so one gateway shared across
//! calls means one breaker per collaborator for the whole process.
//!
//! Failures come back as a structured `ToolError`; a domain "no" such as
//! `booked: false` is a successful call and does not count against the
//! breaker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use call_agent_config::ToolsConfig;
use call_agent_core::{CallState, Collaborator, ToolError, ToolName, ToolRequest, ToolResult};

use crate::circuit_breaker::{BreakerConfig, CircuitBreaker};
use crate::http::HttpServiceBackend;
use crate::integrations::{IntegrationError, ServiceBackend, StubServiceBackend};

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Extra attempts granted to idempotent tools on transient failure
    pub idempotent_retries: u32,
    pub breaker: BreakerConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(12),
            idempotent_retries: 1,
            breaker: BreakerConfig::default(),
        }
    }
}

impl From<&ToolsConfig> for GatewayConfig {
    fn from(config: &ToolsConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            idempotent_retries: config.idempotent_retries,
            breaker: BreakerConfig {
                failure_threshold: config.breaker_failure_threshold,
                cooldown: Duration::from_millis(config.breaker_cooldown_ms),
            },
        }
    }
}

struct Breakers {
    customer_directory: CircuitBreaker,
    scheduling: CircuitBreaker,
    callback_queue: CircuitBreaker,
    alerting: CircuitBreaker,
}

impl Breakers {
    fn new(config: BreakerConfig) -> Self {
        Self {
            customer_directory: CircuitBreaker::new(Collaborator::CustomerDirectory, config),
            scheduling: CircuitBreaker::new(Collaborator::Scheduling, config),
            callback_queue: CircuitBreaker::new(Collaborator::CallbackQueue, config),
            alerting: CircuitBreaker::new(Collaborator::Alerting, config),
        }
    }

    fn get(&self, collaborator: Collaborator) -> &CircuitBreaker {
        match collaborator {
            Collaborator::CustomerDirectory => &self.customer_directory,
            Collaborator::Scheduling => &self.scheduling,
            Collaborator::CallbackQueue => &self.callback_queue,
            Collaborator::Alerting => &self.alerting,
        }
    }
}

pub struct ToolGateway {
    backend: Arc<dyn ServiceBackend>,
    config: GatewayConfig,
    breakers: Breakers,
}

impl ToolGateway {
    pub fn new(backend: Arc<dyn ServiceBackend>, config: GatewayConfig) -> Self {
        let breakers = Breakers::new(config.breaker);
        Self {
            backend,
            config,
            breakers,
        }
    }

    /// Build from settings: HTTP when a base URL is configured, otherwise
    /// the in-memory stub.
    pub fn from_settings(config: &ToolsConfig) -> Result<Self, IntegrationError> {
        let backend: Arc<dyn ServiceBackend> = match &config.base_url {
            Some(url) => {
                // Transport ceiling above the gateway timeout
                let ceiling = Duration::from_millis(config.timeout_ms.saturating_mul(2));
                Arc::new(HttpServiceBackend::new(url.clone(), config.api_key.clone(), ceiling)?)
            }
            None => {
                tracing::warn!("No tools.base_url configured, using stub service backend");
                Arc::new(StubServiceBackend::new())
            }
        };
        tracing::info!(backend = backend.name(), timeout_ms = config.timeout_ms, "Tool gateway ready");
        Ok(Self::new(backend, GatewayConfig::from(config)))
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn breaker(&self, collaborator: Collaborator) -> &CircuitBreaker {
        self.breakers.get(collaborator)
    }

    /// Execute only if `state` whitelists the tool
    pub async fn execute_for_state(
        &self,
        state: CallState,
        request: &ToolRequest,
    ) -> Result<ToolResult, ToolError> {
        let tool = request.tool();
        if !state.permits_tool(tool) {
            tracing::warn!(state = %state, tool = %tool, "Rejected tool call outside whitelist");
            metrics::counter!("tool_calls_total", "tool" => tool.as_str(), "outcome" => "not_permitted")
                .increment(1);
            return Err(ToolError::NotPermitted { tool, state });
        }
        self.execute(request).await
    }

    /// Execute a tool call. Idempotent tools get `idempotent_retries` extra
    /// attempts on timeout or transport failure; all others run once.
    pub async fn execute(&self, request: &ToolRequest) -> Result<ToolResult, ToolError> {
        let tool = request.tool();
        let max_attempts = if tool.is_idempotent() {
            1 + self.config.idempotent_retries
        } else {
            1
        };

        let mut attempt = 1;
        loop {
            match self.execute_once(request).await {
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    tracing::warn!(
                        tool = %tool,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Idempotent tool call failed, retrying"
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn execute_once(&self, request: &ToolRequest) -> Result<ToolResult, ToolError> {
        let tool = request.tool();
        let collaborator = tool.collaborator();
        let breaker = self.breakers.get(collaborator);

        let Some(permit) = breaker.try_acquire() else {
            tracing::warn!(tool = %tool, collaborator = %collaborator, "Circuit open, short-circuiting tool call");
            metrics::counter!("tool_calls_total", "tool" => tool.as_str(), "outcome" => "circuit_open")
                .increment(1);
            return Err(ToolError::CircuitOpen { tool, collaborator });
        };

        let start = Instant::now();
        let outcome = tokio::time::timeout(self.config.timeout, self.dispatch(request)).await;
        metrics::histogram!("tool_call_duration_seconds", "tool" => tool.as_str())
            .record(start.elapsed().as_secs_f64());

        let result = match outcome {
            Ok(Ok(result)) => {
                permit.success();
                tracing::info!(tool = %tool, succeeded = result.succeeded(), "Tool call completed");
                Ok(result)
            }
            Ok(Err(e)) => {
                permit.failure();
                tracing::warn!(tool = %tool, error = %e, "Tool call failed");
                Err(ToolError::Failure {
                    tool,
                    message: e.to_string(),
                })
            }
            Err(_) => {
                permit.failure();
                let timeout_ms = self.config.timeout.as_millis() as u64;
                tracing::warn!(tool = %tool, timeout_ms, "Tool call timed out");
                Err(ToolError::Timeout { tool, timeout_ms })
            }
        };

        let label = match &result {
            Ok(r) if r.succeeded() => "success",
            Ok(_) => "negative",
            Err(e) => e.kind(),
        };
        metrics::counter!("tool_calls_total", "tool" => tool.as_str(), "outcome" => label).increment(1);
        result
    }

    async fn dispatch(&self, request: &ToolRequest) -> Result<ToolResult, IntegrationError> {
        Ok(match request {
            ToolRequest::LookupCaller(r) => ToolResult::LookupCaller(self.backend.lookup_caller(r).await?),
            ToolRequest::BookService(r) => ToolResult::BookService(self.backend.book_service(r).await?),
            ToolRequest::CreateCallback(r) => {
                ToolResult::CreateCallback(self.backend.create_callback(r).await?)
            }
            ToolRequest::ManageAppointment(r) => {
                ToolResult::ManageAppointment(self.backend.manage_appointment(r).await?)
            }
            ToolRequest::SendAlert(r) => ToolResult::SendAlert(self.backend.send_alert(r).await?),
        })
    }
}

impl std::fmt::Debug for ToolGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolGateway")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish()
    }
}

/// Tool names with a breaker currently refusing calls
pub fn open_circuits(gateway: &ToolGateway) -> Vec<ToolName> {
    ToolName::ALL
        .into_iter()
        .filter(|tool| !gateway.breaker(tool.collaborator()).is_available())
        .collect()
}
