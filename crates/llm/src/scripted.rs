//! Scripted backend
//!
//! Replays a fixed sequence of steps. Used by tests and by the server when no
//! model endpoint is enabled, in which case it is empty and every generation
//! fails fast so callers take their fallback path.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::backend::{FinishReason, GenerationResult, LlmBackend};
use crate::prompt::Message;
use crate::LlmError;

/// One scripted generation
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    /// Return this raw text
    Reply(String),
    /// Return a generation error
    Fail(String),
    /// Never return
    Hang,
}

#[derive(Debug, Default)]
pub struct ScriptedBackend {
    steps: Mutex<VecDeque<ScriptStep>>,
    /// Repeated once the queue is exhausted
    fallback: Option<ScriptStep>,
    prompts: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedBackend {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Backend that answers every prompt with the same text
    pub fn always(reply: impl Into<String>) -> Self {
        Self {
            fallback: Some(ScriptStep::Reply(reply.into())),
            ..Self::default()
        }
    }

    pub fn push(&self, step: ScriptStep) {
        self.steps.lock().push_back(step);
    }

    /// Number of generations requested so far
    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    pub fn last_prompt(&self) -> Option<Vec<Message>> {
        self.prompts.lock().last().cloned()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError> {
        self.prompts.lock().push(messages.to_vec());
        let step = self.steps.lock().pop_front().or_else(|| self.fallback.clone());

        match step {
            Some(ScriptStep::Reply(text)) => Ok(GenerationResult {
                tokens: crate::prompt::estimate_tokens(&text),
                text,
                total_time_ms: 0,
                finish_reason: FinishReason::Stop,
            }),
            Some(ScriptStep::Fail(message)) => Err(LlmError::Generation(message)),
            Some(ScriptStep::Hang) => {
                std::future::pending::<()>().await;
                Err(LlmError::Timeout)
            }
            None => Err(LlmError::Generation("script exhausted".to_string())),
        }
    }

    async fn is_available(&self) -> bool {
        self.fallback.is_some() || !self.steps.lock().is_empty()
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
