//! Configuration management for the call agent
//!
//! Supports loading configuration from:
//! - YAML files (`config/default.yaml`, `config/{env}.yaml`)
//! - Environment variables (`CALL_AGENT__SECTION__KEY`)

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, load_settings_from, BusinessConfig, DialogueConfig, LlmSettings,
    ObservabilityConfig, OrchestratorConfig, ReconcilerConfig, ReportingConfig,
    RuntimeEnvironment, ServerConfig, ServiceAreaConfig, Settings, ToolsConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
