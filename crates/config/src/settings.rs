//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{endpoints, orchestrator, reporting, tools, turns};
use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    /// Business identity used in fixed utterances
    #[serde(default)]
    pub business: BusinessConfig,

    /// Turn limits
    #[serde(default)]
    pub dialogue: DialogueConfig,

    #[serde(default)]
    pub service_area: ServiceAreaConfig,

    /// External tool collaborators
    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub reconciler: ReconcilerConfig,

    #[serde(default)]
    pub reporting: ReportingConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_dialogue()?;
        self.validate_service_area()?;
        self.validate_tools()?;
        self.validate_orchestrator()?;
        self.validate_reporting()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if self.server.max_calls == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_calls".to_string(),
                message: "Max calls must be at least 1".to_string(),
            });
        }

        if self.environment.is_production() && self.server.cors_origins.is_empty() {
            tracing::warn!("No CORS origins configured in production; all origins are allowed");
        }

        Ok(())
    }

    fn validate_dialogue(&self) -> Result<(), ConfigError> {
        let dialogue = &self.dialogue;

        if dialogue.max_turns_per_state == 0 {
            return Err(ConfigError::InvalidValue {
                field: "dialogue.max_turns_per_state".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if dialogue.max_turns_per_state > dialogue.max_turns_per_call {
            return Err(ConfigError::InvalidValue {
                field: "dialogue.max_turns_per_state".to_string(),
                message: format!(
                    "Must not exceed max_turns_per_call ({}), got {}",
                    dialogue.max_turns_per_call, dialogue.max_turns_per_state
                ),
            });
        }

        Ok(())
    }

    fn validate_service_area(&self) -> Result<(), ConfigError> {
        for prefix in &self.service_area.zip_prefixes {
            let well_formed = (1..=5).contains(&prefix.len())
                && prefix.chars().all(|c| c.is_ascii_digit());
            if !well_formed {
                return Err(ConfigError::InvalidValue {
                    field: "service_area.zip_prefixes".to_string(),
                    message: format!("Prefix must be 1-5 digits, got {:?}", prefix),
                });
            }
        }
        Ok(())
    }

    fn validate_tools(&self) -> Result<(), ConfigError> {
        let t = &self.tools;

        if !(tools::MIN_TIMEOUT_MS..=tools::MAX_TIMEOUT_MS).contains(&t.timeout_ms) {
            return Err(ConfigError::InvalidValue {
                field: "tools.timeout_ms".to_string(),
                message: format!(
                    "Must be between {} and {}, got {}",
                    tools::MIN_TIMEOUT_MS,
                    tools::MAX_TIMEOUT_MS,
                    t.timeout_ms
                ),
            });
        }

        if t.idempotent_retries > 1 {
            return Err(ConfigError::InvalidValue {
                field: "tools.idempotent_retries".to_string(),
                message: format!("At most one automatic retry, got {}", t.idempotent_retries),
            });
        }

        if t.breaker_failure_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "tools.breaker_failure_threshold".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if t.breaker_cooldown_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "tools.breaker_cooldown_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    fn validate_orchestrator(&self) -> Result<(), ConfigError> {
        let o = &self.orchestrator;

        if !(1..=10).contains(&o.max_generation_attempts) {
            return Err(ConfigError::InvalidValue {
                field: "orchestrator.max_generation_attempts".to_string(),
                message: format!("Must be between 1 and 10, got {}", o.max_generation_attempts),
            });
        }

        if !(1_000..=30_000).contains(&o.turn_timeout_ms) {
            return Err(ConfigError::InvalidValue {
                field: "orchestrator.turn_timeout_ms".to_string(),
                message: format!("Must be between 1000 and 30000, got {}", o.turn_timeout_ms),
            });
        }

        if o.fallback_utterance.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "orchestrator.fallback_utterance".to_string(),
                message: "Fallback utterance cannot be empty".to_string(),
            });
        }

        if !(256..=8_192).contains(&o.max_prompt_tokens) {
            return Err(ConfigError::InvalidValue {
                field: "orchestrator.max_prompt_tokens".to_string(),
                message: format!("Must be between 256 and 8192, got {}", o.max_prompt_tokens),
            });
        }

        Ok(())
    }

    fn validate_reporting(&self) -> Result<(), ConfigError> {
        let r = &self.reporting;

        if !(1..=5).contains(&r.max_attempts) {
            return Err(ConfigError::InvalidValue {
                field: "reporting.max_attempts".to_string(),
                message: format!("Must be between 1 and 5, got {}", r.max_attempts),
            });
        }

        if r.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "reporting.timeout_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum concurrent calls
    #[serde(default = "default_max_calls")]
    pub max_calls: usize,

    /// Idle time after which an unfinished call is hung up (seconds)
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,

    /// Deadline for outstanding finalisations on shutdown (seconds)
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_calls() -> usize {
    100
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_shutdown_grace() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_calls: default_max_calls(),
            idle_timeout_seconds: default_idle_timeout(),
            shutdown_grace_seconds: default_shutdown_grace(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

/// Business identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessConfig {
    #[serde(default = "default_business_name")]
    pub name: String,

    /// Agent name used in the greeting
    #[serde(default = "default_agent_name")]
    pub agent_name: String,
}

fn default_business_name() -> String {
    "Comfort Air Services".to_string()
}

fn default_agent_name() -> String {
    "Sam".to_string()
}

impl Default for BusinessConfig {
    fn default() -> Self {
        Self {
            name: default_business_name(),
            agent_name: default_agent_name(),
        }
    }
}

/// Turn limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueConfig {
    #[serde(default = "default_turns_per_state")]
    pub max_turns_per_state: u32,

    #[serde(default = "default_turns_per_call")]
    pub max_turns_per_call: u32,
}

fn default_turns_per_state() -> u32 {
    turns::MAX_TURNS_PER_STATE
}

fn default_turns_per_call() -> u32 {
    turns::MAX_TURNS_PER_CALL
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            max_turns_per_state: default_turns_per_state(),
            max_turns_per_call: default_turns_per_call(),
        }
    }
}

/// Service area
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceAreaConfig {
    /// Accepted ZIP prefixes; empty accepts every well-formed ZIP
    #[serde(default)]
    pub zip_prefixes: Vec<String>,
}

/// External tool collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Base URL of the service backend; `None` uses the in-memory stub
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_tool_timeout")]
    pub timeout_ms: u64,

    #[serde(default = "default_idempotent_retries")]
    pub idempotent_retries: u32,

    #[serde(default = "default_breaker_threshold")]
    pub breaker_failure_threshold: u32,

    #[serde(default = "default_breaker_cooldown")]
    pub breaker_cooldown_ms: u64,
}

fn default_tool_timeout() -> u64 {
    tools::TIMEOUT_MS
}

fn default_idempotent_retries() -> u32 {
    tools::IDEMPOTENT_RETRIES
}

fn default_breaker_threshold() -> u32 {
    tools::BREAKER_FAILURE_THRESHOLD
}

fn default_breaker_cooldown() -> u64 {
    tools::BREAKER_COOLDOWN_MS
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_ms: default_tool_timeout(),
            idempotent_retries: default_idempotent_retries(),
            breaker_failure_threshold: default_breaker_threshold(),
            breaker_cooldown_ms: default_breaker_cooldown(),
        }
    }
}

/// LLM backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Disabled means fixed fallback phrasing only
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,

    #[serde(default = "default_llm_timeout")]
    pub timeout_ms: u64,
}

fn default_llm_model() -> String {
    "qwen2.5:3b".to_string()
}

fn default_llm_endpoint() -> String {
    endpoints::OLLAMA_DEFAULT.to_string()
}

fn default_llm_max_tokens() -> usize {
    160
}

fn default_llm_temperature() -> f32 {
    0.4
}

fn default_llm_timeout() -> u64 {
    10_000
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            model: default_llm_model(),
            endpoint: default_llm_endpoint(),
            max_tokens: default_llm_max_tokens(),
            temperature: default_llm_temperature(),
            timeout_ms: default_llm_timeout(),
        }
    }
}

/// Dialogue orchestrator bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_generation_attempts")]
    pub max_generation_attempts: u32,

    #[serde(default = "default_turn_timeout")]
    pub turn_timeout_ms: u64,

    #[serde(default = "default_history_turns")]
    pub history_turns: usize,

    #[serde(default = "default_fallback_utterance")]
    pub fallback_utterance: String,

    #[serde(default = "default_max_prompt_tokens")]
    pub max_prompt_tokens: usize,
}

fn default_generation_attempts() -> u32 {
    orchestrator::MAX_GENERATION_ATTEMPTS
}

fn default_turn_timeout() -> u64 {
    orchestrator::TURN_TIMEOUT_MS
}

fn default_history_turns() -> usize {
    orchestrator::HISTORY_TURNS
}

fn default_fallback_utterance() -> String {
    orchestrator::FALLBACK_UTTERANCE.to_string()
}

fn default_max_prompt_tokens() -> usize {
    orchestrator::MAX_PROMPT_TOKENS
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_generation_attempts: default_generation_attempts(),
            turn_timeout_ms: default_turn_timeout(),
            history_turns: default_history_turns(),
            fallback_utterance: default_fallback_utterance(),
            max_prompt_tokens: default_max_prompt_tokens(),
        }
    }
}

/// Post-call reconciliation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Run the LLM extraction pass over caller lines
    #[serde(default = "default_true")]
    pub offline_extraction: bool,

    #[serde(default = "default_extraction_timeout")]
    pub extraction_timeout_ms: u64,
}

fn default_extraction_timeout() -> u64 {
    20_000
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            offline_extraction: true,
            extraction_timeout_ms: default_extraction_timeout(),
        }
    }
}

/// Report delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// Webhook URL; `None` logs reports instead
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "default_report_timeout")]
    pub timeout_ms: u64,

    #[serde(default = "default_report_attempts")]
    pub max_attempts: u32,
}

fn default_report_timeout() -> u64 {
    reporting::TIMEOUT_MS
}

fn default_report_attempts() -> u32 {
    reporting::MAX_ATTEMPTS
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_ms: default_report_timeout(),
            max_attempts: default_report_attempts(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from `config/default`, `config/{env}` and `CALL_AGENT__*`
/// environment variables, in increasing priority.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from("config", env)
}

/// Load settings from an explicit configuration directory
pub fn load_settings_from(dir: &str, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name(&format!("{}/default", dir)).required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("{}/{}", dir, env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("CALL_AGENT")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("service_area.zip_prefixes")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.dialogue.max_turns_per_state, 5);
        assert_eq!(settings.dialogue.max_turns_per_call, 30);
        assert_eq!(settings.tools.timeout_ms, 12_000);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_tool_timeout_bounds() {
        let mut settings = Settings::default();
        settings.tools.timeout_ms = 500;
        assert!(settings.validate().is_err());

        settings.tools.timeout_ms = 45_000;
        assert!(settings.validate().is_err());

        settings.tools.timeout_ms = 10_000;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_turn_limits_must_be_ordered() {
        let mut settings = Settings::default();
        settings.dialogue.max_turns_per_state = 40;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("dialogue.max_turns_per_state"));
    }

    #[test]
    fn test_zip_prefix_validation() {
        let mut settings = Settings::default();
        settings.service_area.zip_prefixes = vec!["787".into(), "786".into()];
        assert!(settings.validate().is_ok());

        settings.service_area.zip_prefixes = vec!["78a".into()];
        assert!(settings.validate().is_err());

        settings.service_area.zip_prefixes = vec!["787011".into()];
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_orchestrator_bounds() {
        let mut settings = Settings::default();
        settings.orchestrator.max_generation_attempts = 0;
        assert!(settings.validate().is_err());

        settings.orchestrator.max_generation_attempts = 5;
        settings.orchestrator.turn_timeout_ms = 60_000;
        assert!(settings.validate().is_err());

        settings.orchestrator.turn_timeout_ms = 15_000;
        settings.orchestrator.max_prompt_tokens = 64;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_only_one_idempotent_retry_allowed() {
        let mut settings = Settings::default();
        settings.tools.idempotent_retries = 3;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_settings_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.yaml")).unwrap();
        writeln!(
            file,
            "dialogue:\n  max_turns_per_state: 4\nservice_area:\n  zip_prefixes: [\"787\"]\nbusiness:\n  name: Lone Star HVAC\norchestrator:\n  max_prompt_tokens: 2048"
        )
        .unwrap();

        let path = dir.path().to_string_lossy().to_string();
        let settings = load_settings_from(&path, None).unwrap();
        assert_eq!(settings.dialogue.max_turns_per_state, 4);
        assert_eq!(settings.dialogue.max_turns_per_call, 30);
        assert_eq!(settings.service_area.zip_prefixes, vec!["787".to_string()]);
        assert_eq!(settings.business.name, "Lone Star HVAC");
        assert_eq!(settings.orchestrator.max_prompt_tokens, 2048);
        assert_eq!(settings.orchestrator.history_turns, 8);
    }

    #[test]
    fn test_invalid_file_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.yaml")).unwrap();
        writeln!(file, "reporting:\n  max_attempts: 9").unwrap();

        let path = dir.path().to_string_lossy().to_string();
        assert!(matches!(
            load_settings_from(&path, None),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
