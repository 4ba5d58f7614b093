//! Report delivery
//!
//! Delivery is best effort: a bounded number of attempts, each under its own
//! timeout. Failure is logged and counted, never retried indefinitely.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use call_agent_config::ReportingConfig;
use call_agent_core::CallReport;

use crate::AgentError;

#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn deliver(&self, report: &CallReport) -> Result<(), AgentError>;

    fn name(&self) -> &str;
}

/// JSON POST to the reporting collaborator
pub struct WebhookReportSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookReportSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Report(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ReportSink for WebhookReportSink {
    async fn deliver(&self, report: &CallReport) -> Result<(), AgentError> {
        let response = self
            .client
            .post(&self.url)
            .json(report)
            .send()
            .await
            .map_err(|e| AgentError::Report(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AgentError::Report(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

/// Writes the report as one structured log line
#[derive(Debug, Default)]
pub struct LogReportSink;

#[async_trait]
impl ReportSink for LogReportSink {
    async fn deliver(&self, report: &CallReport) -> Result<(), AgentError> {
        let payload =
            serde_json::to_string(report).map_err(|e| AgentError::Report(e.to_string()))?;
        tracing::info!(call_id = %report.call_id, outcome = %report.outcome, report = %payload, "Call report");
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Webhook when configured, otherwise the log
pub fn sink_from_settings(config: &ReportingConfig) -> Result<Arc<dyn ReportSink>, AgentError> {
    match &config.webhook_url {
        Some(url) => Ok(Arc::new(WebhookReportSink::new(
            url.clone(),
            Duration::from_millis(config.timeout_ms),
        )?)),
        None => Ok(Arc::new(LogReportSink)),
    }
}

/// Deliver with at most `max_attempts` attempts, each bounded by `attempt_timeout`
pub async fn deliver_report(
    sink: &dyn ReportSink,
    report: &CallReport,
    max_attempts: u32,
    attempt_timeout: Duration,
) -> Result<(), AgentError> {
    let max_attempts = max_attempts.max(1);
    let mut backoff = Duration::from_millis(250);

    for attempt in 1..=max_attempts {
        let error = match tokio::time::timeout(attempt_timeout, sink.deliver(report)).await {
            Ok(Ok(())) => {
                metrics::counter!("report_deliveries_total", "sink" => sink.name().to_string(), "result" => "ok")
                    .increment(1);
                tracing::debug!(call_id = %report.call_id, sink = sink.name(), attempt, "Report delivered");
                return Ok(());
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {}ms", attempt_timeout.as_millis()),
        };

        tracing::warn!(
            call_id = %report.call_id,
            sink = sink.name(),
            attempt,
            max_attempts,
            error = %error,
            "Report delivery failed"
        );
        if attempt < max_attempts {
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }
    }

    metrics::counter!("report_deliveries_total", "sink" => sink.name().to_string(), "result" => "failed")
        .increment(1);
    Err(AgentError::Report(format!(
        "gave up after {} attempts",
        max_attempts
    )))
}
