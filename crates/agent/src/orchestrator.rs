//! Dialogue orchestration
//!
//! Turns a [`GenerationBrief`] into one spoken line. The language model is
//! treated as an untrusted formatter: any tool request it emits is discarded,
//! state claims and commitment claims are rejected, and the loop is bounded
//! by an attempt cap plus a wall-clock timeout for the whole turn. The caller
//! always gets something to hear.

use std::sync::Arc;
use std::time::Duration;

use call_agent_config::Settings;
use call_agent_core::{CallSession, Field, Speaker, ToolName};
use call_agent_llm::{parse_generation, LlmBackend, Message, PromptBuilder};
use call_agent_text_processing::detect_commitment_claim;

use crate::machine::{GenerationBrief, Utterance};

/// Orchestrator bounds
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_attempts: u32,
    pub turn_timeout: Duration,
    /// Transcript lines included in the prompt
    pub history_turns: usize,
    /// Spoken when the turn timeout expires
    pub fallback_utterance: String,
    pub max_prompt_tokens: usize,
    pub business_name: String,
    pub agent_name: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            turn_timeout: Duration::from_secs(15),
            history_turns: 8,
            fallback_utterance: "Sorry, I missed that. Could you say it one more time?".to_string(),
            max_prompt_tokens: call_agent_config::constants::orchestrator::MAX_PROMPT_TOKENS,
            business_name: "Comfort Air Services".to_string(),
            agent_name: "Sam".to_string(),
        }
    }
}

impl From<&Settings> for OrchestratorSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            max_attempts: settings.orchestrator.max_generation_attempts.max(1),
            turn_timeout: Duration::from_millis(settings.orchestrator.turn_timeout_ms),
            history_turns: settings.orchestrator.history_turns,
            fallback_utterance: settings.orchestrator.fallback_utterance.clone(),
            business_name: settings.business.name.clone(),
            agent_name: settings.business.agent_name.clone(),
            max_prompt_tokens: settings.orchestrator.max_prompt_tokens,
        }
    }
}

/// Where the spoken text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechSource {
    Fixed,
    Generated,
    /// Brief fallback after rejected or failed generations
    Fallback,
    /// Turn timeout expired
    TimedOut,
}

/// One rendered line
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub text: String,
    pub source: SpeechSource,
    /// Rejected generations this turn
    pub violations: u32,
}

#[derive(Debug, PartialEq)]
enum Verdict {
    Accept(String),
    Retry,
    /// Stop generating and use the brief fallback
    Discard,
}

/// Bounded generation loop over an optional backend
pub struct DialogueOrchestrator {
    backend: Option<Arc<dyn LlmBackend>>,
    settings: OrchestratorSettings,
}

impl DialogueOrchestrator {
    pub fn new(backend: Option<Arc<dyn LlmBackend>>, settings: OrchestratorSettings) -> Self {
        Self { backend, settings }
    }

    /// Orchestrator that always speaks the fixed fallbacks
    pub fn fixed_only(settings: OrchestratorSettings) -> Self {
        Self::new(None, settings)
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Produce the spoken text for `utterance`
    pub async fn render(&self, utterance: &Utterance, session: &CallSession) -> Rendered {
        let brief = match utterance {
            Utterance::Fixed(text) => {
                return Rendered {
                    text: text.clone(),
                    source: SpeechSource::Fixed,
                    violations: 0,
                }
            }
            Utterance::Generate(brief) => brief,
        };
        let Some(backend) = self.backend.as_deref() else {
            return Rendered {
                text: brief.fallback.clone(),
                source: SpeechSource::Fallback,
                violations: 0,
            };
        };

        match tokio::time::timeout(
            self.settings.turn_timeout,
            self.generate(backend, brief, session),
        )
        .await
        {
            Ok(rendered) => rendered,
            Err(_) => {
                tracing::warn!(
                    call_id = %session.call_id(),
                    state = %brief.state,
                    timeout_ms = self.settings.turn_timeout.as_millis() as u64,
                    "Generation turn timed out"
                );
                metrics::counter!("llm_turn_timeouts_total").increment(1);
                Rendered {
                    text: self.settings.fallback_utterance.clone(),
                    source: SpeechSource::TimedOut,
                    violations: 0,
                }
            }
        }
    }

    async fn generate(
        &self,
        backend: &dyn LlmBackend,
        brief: &GenerationBrief,
        session: &CallSession,
    ) -> Rendered {
        let prompt = self.build_prompt(brief, session);
        let mut violations = 0;

        for attempt in 1..=self.settings.max_attempts {
            let raw = match backend.generate(&prompt).await {
                Ok(result) => result.text,
                Err(e) => {
                    tracing::warn!(
                        call_id = %session.call_id(),
                        attempt,
                        error = %e,
                        "Generation failed"
                    );
                    continue;
                }
            };

            match self.vet(brief, &raw) {
                Verdict::Accept(text) => {
                    return Rendered {
                        text,
                        source: SpeechSource::Generated,
                        violations,
                    }
                }
                Verdict::Retry => {
                    violations += 1;
                    self.note_violation(session, brief, attempt, "rejected generation");
                }
                Verdict::Discard => {
                    violations += 1;
                    self.note_violation(session, brief, attempt, "discarded tool request");
                    break;
                }
            }
        }

        Rendered {
            text: brief.fallback.clone(),
            source: SpeechSource::Fallback,
            violations,
        }
    }

    /// Decide what to do with one raw generation
    fn vet(&self, brief: &GenerationBrief, raw: &str) -> Verdict {
        let parsed = parse_generation(raw);

        if let Some(call) = &parsed.tool_call {
            let permitted = ToolName::parse(&call.name)
                .is_some_and(|tool| brief.state.permits_tool(tool));
            if !permitted {
                return Verdict::Discard;
            }
            // Whitelisted tools are dispatched by the state machine, never here
            tracing::debug!(tool = %call.name, "Ignoring in-whitelist tool request");
        }

        if parsed
            .claimed_state
            .as_deref()
            .is_some_and(|claimed| claimed != brief.state.as_str())
        {
            return Verdict::Retry;
        }

        let text = parsed.text;
        if text.is_empty() || detect_commitment_claim(&text) {
            return Verdict::Retry;
        }
        Verdict::Accept(text)
    }

    fn note_violation(&self, session: &CallSession, brief: &GenerationBrief, attempt: u32, kind: &str) {
        tracing::warn!(
            call_id = %session.call_id(),
            state = %brief.state,
            attempt,
            kind,
            "LLM output violation"
        );
        metrics::counter!("llm_violations_total", "state" => brief.state.as_str()).increment(1);
    }

    fn build_prompt(&self, brief: &GenerationBrief, session: &CallSession) -> Vec<Message> {
        let history: Vec<Message> = session
            .transcript()
            .recent_spoken(self.settings.history_turns)
            .into_iter()
            .map(|entry| match entry.speaker {
                Speaker::Caller => Message::user(entry.text.clone()),
                _ => Message::assistant(entry.text.clone()),
            })
            .collect();

        PromptBuilder::new()
            .system_prompt(&self.settings.business_name, &self.settings.agent_name)
            .with_state_guidance(brief.state.as_str(), &brief.goal, brief.legal_intents)
            .with_context(&known_facts(session))
            .with_history(&history)
            .build_with_limit(self.settings.max_prompt_tokens)
    }
}

fn known_facts(session: &CallSession) -> String {
    let mut lines: Vec<String> = Field::ALL
        .iter()
        .filter_map(|field| {
            session
                .field(*field)
                .map(|value| format!("- {}: {}", field.label(), value))
        })
        .collect();
    if session.flags().caller_known {
        lines.push("- Returning customer".to_string());
    }
    lines.join("\n")
}
