//! Centralized constants for the call agent
//!
//! Defaults used by `Settings` and by callers that need a value before
//! configuration is loaded.

/// Dialogue turn limits
pub mod turns {
    /// Caller turns allowed in one state before escalation
    pub const MAX_TURNS_PER_STATE: u32 = 5;

    /// Caller turns allowed over a whole call before escalation
    pub const MAX_TURNS_PER_CALL: u32 = 30;
}

/// Tool gateway defaults
pub mod tools {
    /// Per-call timeout for an external tool (ms)
    pub const TIMEOUT_MS: u64 = 12_000;

    /// Bounds for the per-call timeout (ms)
    pub const MIN_TIMEOUT_MS: u64 = 1_000;
    pub const MAX_TIMEOUT_MS: u64 = 30_000;

    /// Automatic retries for idempotent tools
    pub const IDEMPOTENT_RETRIES: u32 = 1;

    /// Consecutive failures that open a collaborator's breaker
    pub const BREAKER_FAILURE_THRESHOLD: u32 = 3;

    /// Time an open breaker waits before allowing a probe (ms)
    pub const BREAKER_COOLDOWN_MS: u64 = 30_000;
}

/// Dialogue orchestrator defaults
pub mod orchestrator {
    /// Generation attempts per turn
    pub const MAX_GENERATION_ATTEMPTS: u32 = 5;

    /// Wall-clock budget for one generated turn (ms)
    pub const TURN_TIMEOUT_MS: u64 = 15_000;

    /// Spoken when generation fails or times out
    pub const FALLBACK_UTTERANCE: &str = "Sorry, could you say that one more time?";

    /// Transcript lines passed to the generator
    pub const HISTORY_TURNS: usize = 8;

    /// Estimated token budget for one generation prompt
    pub const MAX_PROMPT_TOKENS: usize = 1_500;
}

/// Reporting defaults
pub mod reporting {
    pub const TIMEOUT_MS: u64 = 5_000;
    pub const MAX_ATTEMPTS: u32 = 2;
}

/// Endpoint defaults
pub mod endpoints {
    /// Default Ollama endpoint
    pub const OLLAMA_DEFAULT: &str = "http://localhost:11434";

    /// Default service backend endpoint
    pub const SERVICE_BACKEND_DEFAULT: &str = "http://localhost:9000/tools";
}
