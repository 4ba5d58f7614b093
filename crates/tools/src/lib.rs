//! External tool execution for the missed-call agent
//!
//! Features:
//! - `ServiceBackend` seam with HTTP and in-memory stub implementations
//! - `ToolGateway` enforcing per-call timeouts, bounded idempotent retry
//!   and the per-state whitelist
//! - One circuit breaker per external collaborator, shared process-wide

pub mod circuit_breaker;
pub mod gateway;
pub mod http;
pub mod integrations;

pub use circuit_breaker::{BreakerConfig, BreakerPermit, BreakerState, CircuitBreaker};
pub use gateway::{open_circuits, GatewayConfig, ToolGateway};
pub use http::HttpServiceBackend;
pub use integrations::{IntegrationError, ServiceBackend, StubMode, StubServiceBackend};
