//! Call Agent Server
//!
//! HTTP endpoints for driving calls through the agent, plus health and
//! Prometheus metrics.

pub mod http;
pub mod metrics;
pub mod session;
pub mod state;

pub use http::create_router;
pub use metrics::{init_metrics, metrics_handler};
pub use session::{CallManager, CallSummary};
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use call_agent_agent::AgentError;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Call not found: {0}")]
    CallNotFound(String),

    #[error("Call already ended: {0}")]
    CallEnded(String),

    #[error("Call capacity reached")]
    Capacity,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Initialization error: {0}")]
    Init(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<&ServerError> for StatusCode {
    fn from(err: &ServerError) -> Self {
        match err {
            ServerError::CallNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::CallEnded(_) => StatusCode::CONFLICT,
            ServerError::Capacity => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Agent(AgentError::Session(call_agent_core::Error::ToolPending(_))) => {
                StatusCode::CONFLICT
            }
            ServerError::Agent(AgentError::Cancelled) => StatusCode::CONFLICT,
            ServerError::Agent(_) | ServerError::Init(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = StatusCode::from(&self);
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            StatusCode::from(&ServerError::CallNotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(StatusCode::from(&ServerError::Capacity), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            StatusCode::from(&ServerError::Agent(AgentError::Cancelled)),
            StatusCode::CONFLICT
        );
    }
}
