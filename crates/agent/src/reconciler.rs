//! Post-call reconciliation
//!
//! Builds the single [`CallReport`] for a finished call. Field values come
//! from three sources in priority order:
//! 1. fields collected live during the call
//! 2. an optional offline extraction pass over caller-only lines
//! 3. a last-resort pattern scan of the same lines
//!
//! A lower-priority source only fills fields that are still empty, and every
//! value passes its validator again during the merge. Agent speech is never
//! used as a source.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use call_agent_config::Settings;
use call_agent_core::{
    BookedAppointment, CallOutcome, CallReport, CallSession, EndReason, Field, FieldSet,
    LeadType, Speaker,
};
use call_agent_llm::{LlmBackend, Message};
use call_agent_text_processing::{
    classify_lead_type, classify_problem_duration, scan_transcript, validate_field,
};

use crate::AgentError;

/// Merge the three sources in priority order. A later source only fills
/// fields that are still empty; values rejected by a validator are dropped.
pub fn merge_field_sets(
    live: Option<&FieldSet>,
    offline: Option<&FieldSet>,
    scanned: Option<&FieldSet>,
) -> FieldSet {
    let mut merged = FieldSet::new();
    for source in [live, offline, scanned].into_iter().flatten() {
        for (field, value) in source.iter() {
            let value = validate_field(field, value);
            if !value.is_empty() {
                merged.fill_empty(field, value);
            }
        }
    }
    merged
}

/// Offline field extraction over caller-only text
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract(&self, caller_text: &str) -> Result<FieldSet, AgentError>;
}

/// Extraction through the language model, answered as a JSON object
pub struct LlmFieldExtractor {
    backend: Arc<dyn LlmBackend>,
}

impl LlmFieldExtractor {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    fn prompt(caller_text: &str) -> Vec<Message> {
        let keys: Vec<&str> = Field::ALL.iter().map(|f| f.as_str()).collect();
        vec![
            Message::system(format!(
                "Extract details from what a caller said to a heating and cooling company. \
                 Reply with one JSON object using exactly these keys: {}. \
                 Use null for anything the caller did not clearly say. Never guess.",
                keys.join(", ")
            )),
            Message::user(caller_text.to_string()),
        ]
    }
}

/// Outermost `{...}` in a generation
fn json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn parse_extraction(raw: &str) -> Result<FieldSet, AgentError> {
    let body = json_object(raw)
        .ok_or_else(|| AgentError::Extraction("no JSON object in response".to_string()))?;
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| AgentError::Extraction(e.to_string()))?;

    let mut fields = FieldSet::new();
    for field in Field::ALL {
        if let Some(text) = value.get(field.as_str()).and_then(|v| v.as_str()) {
            fields.set(field, text.trim());
        }
    }
    Ok(fields)
}

#[async_trait]
impl FieldExtractor for LlmFieldExtractor {
    async fn extract(&self, caller_text: &str) -> Result<FieldSet, AgentError> {
        if caller_text.trim().is_empty() {
            return Ok(FieldSet::new());
        }
        let result = self.backend.generate(&Self::prompt(caller_text)).await?;
        parse_extraction(&result.text)
    }
}

pub struct PostCallReconciler {
    extractor: Option<Arc<dyn FieldExtractor>>,
    extraction_timeout: Duration,
}

impl PostCallReconciler {
    pub fn new(extractor: Option<Arc<dyn FieldExtractor>>, extraction_timeout: Duration) -> Self {
        Self {
            extractor,
            extraction_timeout,
        }
    }

    /// Extraction runs through `backend` only when enabled in settings
    pub fn from_settings(settings: &Settings, backend: Option<Arc<dyn LlmBackend>>) -> Self {
        let extractor = backend
            .filter(|_| settings.reconciler.offline_extraction)
            .map(|b| Arc::new(LlmFieldExtractor::new(b)) as Arc<dyn FieldExtractor>);
        Self::new(
            extractor,
            Duration::from_millis(settings.reconciler.extraction_timeout_ms),
        )
    }

    async fn offline_fields(&self, call_id: &str, caller_text: &str) -> Option<FieldSet> {
        let extractor = self.extractor.as_ref()?;
        match tokio::time::timeout(self.extraction_timeout, extractor.extract(caller_text)).await {
            Ok(Ok(fields)) => Some(fields),
            Ok(Err(e)) => {
                tracing::warn!(call_id, error = %e, "Offline extraction failed");
                None
            }
            Err(_) => {
                tracing::warn!(
                    call_id,
                    timeout_ms = self.extraction_timeout.as_millis() as u64,
                    "Offline extraction timed out"
                );
                None
            }
        }
    }

    /// Build the report for a finished (or abandoned) call
    pub async fn reconcile(&self, session: &CallSession) -> CallReport {
        let caller_text = session.transcript().caller_text();
        let offline = self.offline_fields(session.call_id(), &caller_text).await;
        let scanned = scan_transcript(&caller_text);

        let fields = merge_field_sets(Some(session.fields()), offline.as_ref(), Some(&scanned));

        let flags = *session.flags();
        let outcome = CallOutcome::classify(session.state(), &flags);
        let lead_type = match (session.lead_type(), fields.get(Field::ProblemDescription)) {
            (LeadType::Service, Some(problem)) => classify_lead_type(problem),
            (lead_type, _) => lead_type,
        };
        let appointment = session
            .booking()
            .filter(|b| b.booked && flags.booking_confirmed)
            .map(|b| BookedAppointment {
                appointment_id: b.appointment_id.clone(),
                date: b.booked_date.clone(),
                time: b.booked_time.clone(),
            });

        let mut report = CallReport {
            call_id: session.call_id().to_string(),
            phone: session.phone().to_string(),
            started_at: session.started_at(),
            ended_at: session.ended_at().unwrap_or_else(Utc::now),
            final_state: session.state(),
            outcome,
            end_reason: session.end_reason(),
            fields,
            urgency_tier: session.urgency_tier(),
            lead_type,
            problem_duration: classify_problem_duration(&caller_text),
            flags,
            appointment,
            counters: session.counters(),
            tags: Vec::new(),
            transcript: session
                .transcript()
                .entries()
                .iter()
                .filter(|e| e.speaker != Speaker::System)
                .cloned()
                .collect(),
        };
        report.tags = derive_tags(&report);

        metrics::counter!("call_reports_total", "outcome" => outcome.as_str()).increment(1);
        tracing::info!(
            call_id = %report.call_id,
            outcome = %report.outcome,
            final_state = %report.final_state,
            fields = report.fields.iter().count(),
            "Call reconciled"
        );
        report
    }
}

fn derive_tags(report: &CallReport) -> Vec<String> {
    let mut tags = vec![report.outcome.as_str().to_string()];
    let mut tag = |on: bool, name: &str| {
        if on {
            tags.push(name.to_string());
        }
    };
    tag(
        report.urgency_tier == Some(call_agent_core::UrgencyTier::Emergency),
        "emergency",
    );
    tag(report.flags.hazard_reported, "safety_hazard");
    tag(report.lead_type == LeadType::HighTicket, "high_ticket");
    tag(report.lead_type == LeadType::Maintenance, "maintenance");
    tag(report.flags.is_third_party, "third_party");
    tag(report.flags.caller_known, "repeat_caller");
    tag(
        report.end_reason == Some(EndReason::TurnLimitExceeded),
        "turn_limit",
    );
    tag(report.counters.tool_failures > 0, "tool_failure");
    tag(report.counters.llm_violations > 0, "llm_violation");
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use call_agent_core::{BookingResult, CallState, ToolName, ToolResult};

    struct FixedExtractor(FieldSet);

    #[async_trait]
    impl FieldExtractor for FixedExtractor {
        async fn extract(&self, _caller_text: &str) -> Result<FieldSet, AgentError> {
            Ok(self.0.clone())
        }
    }

    struct HangingExtractor;

    #[async_trait]
    impl FieldExtractor for HangingExtractor {
        async fn extract(&self, _caller_text: &str) -> Result<FieldSet, AgentError> {
            std::future::pending::<()>().await;
            Err(AgentError::Timeout)
        }
    }

    fn fields(pairs: &[(Field, &str)]) -> FieldSet {
        let mut set = FieldSet::new();
        for (field, value) in pairs {
            set.set(*field, *value);
        }
        set
    }

    #[test]
    fn test_merge_fills_only_empty_fields() {
        let live = fields(&[(Field::CustomerName, "Dana Reyes")]);
        let offline = fields(&[
            (Field::CustomerName, "Dan Rey"),
            (Field::ZipCode, "78745"),
        ]);
        let scanned = fields(&[(Field::ZipCode, "78701"), (Field::PreferredTime, "tomorrow")]);

        let merged = merge_field_sets(Some(&live), Some(&offline), Some(&scanned));
        assert_eq!(merged.get(Field::CustomerName), Some("Dana Reyes"));
        assert_eq!(merged.get(Field::ZipCode), Some("78745"));
        assert_eq!(merged.get(Field::PreferredTime), Some("tomorrow"));
    }

    #[test]
    fn test_merge_revalidates_every_source() {
        let offline = fields(&[
            (Field::CustomerName, "unknown"),
            (Field::ZipCode, "787"),
            (Field::SiteContactPhone, "(512) 555-0100"),
        ]);
        let merged = merge_field_sets(None, Some(&offline), None);
        assert_eq!(merged.get(Field::CustomerName), None);
        assert_eq!(merged.get(Field::ZipCode), None);
        assert_eq!(merged.get(Field::SiteContactPhone), Some("5125550100"));
    }

    #[test]
    fn test_parse_extraction_tolerates_prose() {
        let raw = r#"Here you go: {"customer_name": "Dana Reyes", "zip_code": null, "problem_description": "no cooling"} Thanks!"#;
        let parsed = parse_extraction(raw).unwrap();
        assert_eq!(parsed.get(Field::CustomerName), Some("Dana Reyes"));
        assert_eq!(parsed.get(Field::ZipCode), None);
        assert!(parse_extraction("no json here").is_err());
    }

    #[tokio::test]
    async fn test_reconcile_uses_caller_lines_only() {
        let mut session = CallSession::new("5125550100");
        session
            .record_agent("My name is Sam, what's your zip code?")
            .unwrap();
        session
            .record_caller_turn("yeah my name is Dana Reyes and the zip is 78745")
            .unwrap();

        let report = PostCallReconciler::new(None, Duration::from_secs(1))
            .reconcile(&session)
            .await;
        assert_eq!(report.fields.get(Field::CustomerName), Some("Dana Reyes"));
        assert_eq!(report.fields.get(Field::ZipCode), Some("78745"));
        assert_eq!(report.outcome, CallOutcome::Incomplete);
        assert_eq!(report.transcript.len(), 2);
    }

    #[tokio::test]
    async fn test_offline_pass_fills_gaps_behind_live_fields() {
        let mut session = CallSession::new("5125550100");
        session.set_field(Field::CustomerName, "Dana Reyes").unwrap();
        session.record_caller_turn("the upstairs unit is dead").unwrap();

        let extractor = FixedExtractor(fields(&[
            (Field::CustomerName, "Someone Else"),
            (Field::ProblemDescription, "upstairs unit is dead"),
        ]));
        let report = PostCallReconciler::new(Some(Arc::new(extractor)), Duration::from_secs(1))
            .reconcile(&session)
            .await;
        assert_eq!(report.fields.get(Field::CustomerName), Some("Dana Reyes"));
        assert_eq!(
            report.fields.get(Field::ProblemDescription),
            Some("upstairs unit is dead")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_extraction_timeout_still_reports() {
        let mut session = CallSession::new("5125550100");
        session.record_caller_turn("my address is 412 Elm Street").unwrap();
        let report = PostCallReconciler::new(Some(Arc::new(HangingExtractor)), Duration::from_secs(5))
            .reconcile(&session)
            .await;
        assert_eq!(report.fields.get(Field::ServiceAddress), Some("412 Elm Street"));
    }

    #[tokio::test]
    async fn test_booked_report_carries_appointment() {
        let mut session = CallSession::new("5125550100");
        session.transition(CallState::Lookup).unwrap();
        session.begin_tool(ToolName::LookupCaller).unwrap();
        session
            .apply_tool_result(ToolResult::LookupCaller(call_agent_core::LookupResult::not_found()))
            .unwrap();
        for state in [
            CallState::Safety,
            CallState::ServiceArea,
            CallState::Discovery,
            CallState::PreConfirm,
            CallState::Booking,
        ] {
            session.transition(state).unwrap();
        }
        session.begin_tool(ToolName::BookService).unwrap();
        session
            .apply_tool_result(ToolResult::BookService(BookingResult {
                booked: true,
                booked_date: Some("2026-10-15".into()),
                booked_time: Some("8am-12pm".into()),
                appointment_id: Some("BK-42".into()),
                available_slots: vec![],
            }))
            .unwrap();
        session.transition(CallState::Confirm).unwrap();
        session.freeze(EndReason::BookingConfirmed);

        let report = PostCallReconciler::new(None, Duration::from_secs(1))
            .reconcile(&session)
            .await;
        assert_eq!(report.outcome, CallOutcome::Booked);
        assert_eq!(
            report.appointment.and_then(|a| a.appointment_id).as_deref(),
            Some("BK-42")
        );
        assert!(report.tags.contains(&"booked".to_string()));
    }
}
