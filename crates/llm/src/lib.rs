//! Text generation for the missed-call agent
//!
//! Features:
//! - `LlmBackend` trait with an Ollama chat backend
//! - Prompt building with history truncation
//! - Parsing of control markup (tool requests, state claims) out of raw
//!   generations so the caller can vet it
//! - A scripted backend for tests and offline runs

pub mod backend;
pub mod prompt;
pub mod scripted;

pub use backend::{FinishReason, GenerationResult, LlmBackend, LlmConfig, OllamaBackend};
pub use prompt::{
    parse_generation, parse_tool_call, Message, ParsedGeneration, ParsedToolCall, PromptBuilder,
    Role,
};
pub use scripted::{ScriptStep, ScriptedBackend};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}
