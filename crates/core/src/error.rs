//! Error types
//!
//! `Error` covers session and state-machine failures. `ToolError` is the
//! structured failure returned for every external side-effecting call; it is
//! always routed to a spoken fallback, never swallowed.

use thiserror::Error;

use crate::state::CallState;
use crate::tools::{Collaborator, ToolName};

/// Result alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Session / state machine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A caller-supplied value failed its validator. Never fatal: the field
    /// simply stays empty.
    #[error("Validation rejected for {field}: {reason}")]
    ValidationRejected { field: String, reason: String },

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: CallState, to: CallState },

    #[error("Session is frozen in terminal state {0}")]
    SessionFrozen(CallState),

    #[error("Tool {0} is still outstanding")]
    ToolPending(ToolName),

    #[error("Unexpected tool result for {got} (expected {expected:?})")]
    UnexpectedToolResult {
        expected: Option<ToolName>,
        got: ToolName,
    },

    #[error("Turn limit exceeded in {state}: {turns} turns (limit {limit})")]
    TurnLimitExceeded {
        state: CallState,
        turns: u32,
        limit: u32,
    },

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),
}

/// Structured tool failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("{tool} timed out after {timeout_ms}ms")]
    Timeout { tool: ToolName, timeout_ms: u64 },

    #[error("{tool} failed: {message}")]
    Failure { tool: ToolName, message: String },

    #[error("Circuit open for {collaborator}; {tool} short-circuited")]
    CircuitOpen {
        tool: ToolName,
        collaborator: Collaborator,
    },

    #[error("{tool} is not permitted in state {state}")]
    NotPermitted { tool: ToolName, state: CallState },
}

impl ToolError {
    /// Tool the failure refers to
    pub fn tool(&self) -> ToolName {
        match self {
            ToolError::Timeout { tool, .. }
            | ToolError::Failure { tool, .. }
            | ToolError::CircuitOpen { tool, .. }
            | ToolError::NotPermitted { tool, .. } => *tool,
        }
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::Timeout { .. } => "timeout",
            ToolError::Failure { .. } => "failure",
            ToolError::CircuitOpen { .. } => "circuit_open",
            ToolError::NotPermitted { .. } => "not_permitted",
        }
    }

    /// Whether an idempotent call may be attempted again
    pub fn is_transient(&self) -> bool {
        matches!(self, ToolError::Timeout { .. } | ToolError::Failure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_error_accessors() {
        let err = ToolError::Timeout {
            tool: ToolName::BookService,
            timeout_ms: 12_000,
        };
        assert_eq!(err.tool(), ToolName::BookService);
        assert_eq!(err.kind(), "timeout");
        assert!(err.is_transient());

        let open = ToolError::CircuitOpen {
            tool: ToolName::LookupCaller,
            collaborator: Collaborator::CustomerDirectory,
        };
        assert!(!open.is_transient());
        assert!(open.to_string().contains("customer_directory"));
    }

    #[test]
    fn test_tool_error_converts_into_error() {
        let err: Error = ToolError::Failure {
            tool: ToolName::SendAlert,
            message: "502".into(),
        }
        .into();
        assert!(matches!(err, Error::Tool(_)));
    }
}
