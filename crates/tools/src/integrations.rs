//! External System Integrations
//!
//! `ServiceBackend` is the seam to the business's customer directory,
//! scheduling, callback queue and alerting systems. The gateway wraps every
//! call with a timeout and a circuit breaker; implementations only speak
//! the wire protocol.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;

use call_agent_core::{
    AlertRequest, AlertResult, BookingRequest, BookingResult, CallbackRequest, CallbackResult,
    LookupRequest, LookupResult, ManageRequest, ManageResult, ToolName,
};

/// Integration errors
#[derive(Error, Debug)]
pub enum IntegrationError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for IntegrationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            IntegrationError::InvalidResponse(err.to_string())
        } else if err.is_connect() || err.is_timeout() {
            IntegrationError::ConnectionFailed(err.to_string())
        } else {
            IntegrationError::Internal(err.to_string())
        }
    }
}

/// External collaborators behind the tool gateway
#[async_trait]
pub trait ServiceBackend: Send + Sync {
    async fn lookup_caller(&self, request: &LookupRequest)
        -> Result<LookupResult, IntegrationError>;

    async fn book_service(&self, request: &BookingRequest)
        -> Result<BookingResult, IntegrationError>;

    async fn create_callback(
        &self,
        request: &CallbackRequest,
    ) -> Result<CallbackResult, IntegrationError>;

    async fn manage_appointment(
        &self,
        request: &ManageRequest,
    ) -> Result<ManageResult, IntegrationError>;

    async fn send_alert(&self, request: &AlertRequest) -> Result<AlertResult, IntegrationError>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

// ============================================================================
// In-memory stub
// ============================================================================

/// Scripted behaviour of one stub tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StubMode {
    /// Succeed with a positive domain result
    #[default]
    Normal,
    /// Answer with a negative domain result (`booked: false`, ...)
    Decline,
    /// Return a transport error
    Fail,
    /// Fail the next `n` calls, then behave normally
    FailTimes(u32),
    /// Never answer
    Hang,
}

/// In-memory backend for development and tests
///
/// Known callers are registered by phone number. Every call is counted per
/// tool so tests can assert how often a collaborator was hit.
pub struct StubServiceBackend {
    customers: Mutex<HashMap<String, LookupResult>>,
    modes: Mutex<HashMap<ToolName, StubMode>>,
    calls: Mutex<HashMap<ToolName, u32>>,
    available_slots: Vec<String>,
}

impl StubServiceBackend {
    pub fn new() -> Self {
        Self {
            customers: Mutex::new(HashMap::new()),
            modes: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            available_slots: vec![
                "Tomorrow 8am-12pm".to_string(),
                "Tomorrow 12pm-4pm".to_string(),
            ],
        }
    }

    /// Register a known caller
    pub fn with_customer(self, phone: impl Into<String>, record: LookupResult) -> Self {
        self.customers.lock().insert(phone.into(), record);
        self
    }

    pub fn with_mode(self, tool: ToolName, mode: StubMode) -> Self {
        self.set_mode(tool, mode);
        self
    }

    pub fn set_mode(&self, tool: ToolName, mode: StubMode) {
        self.modes.lock().insert(tool, mode);
    }

    /// Number of calls received for a tool
    pub fn calls(&self, tool: ToolName) -> u32 {
        self.calls.lock().get(&tool).copied().unwrap_or(0)
    }

    /// Count the call and resolve the effective mode for it
    async fn enter(&self, tool: ToolName) -> Result<StubMode, IntegrationError> {
        *self.calls.lock().entry(tool).or_insert(0) += 1;

        let mode = {
            let mut modes = self.modes.lock();
            let mode = modes.get(&tool).copied().unwrap_or_default();
            if let StubMode::FailTimes(n) = mode {
                let next = if n <= 1 {
                    StubMode::Normal
                } else {
                    StubMode::FailTimes(n - 1)
                };
                modes.insert(tool, next);
            }
            mode
        };

        match mode {
            StubMode::Fail | StubMode::FailTimes(_) => Err(IntegrationError::Internal(format!(
                "Stub: {} unavailable",
                tool
            ))),
            StubMode::Hang => {
                std::future::pending::<()>().await;
                Err(IntegrationError::Internal("unreachable".to_string()))
            }
            mode => Ok(mode),
        }
    }

    fn short_id(prefix: &str) -> String {
        format!(
            "{}-{}",
            prefix,
            uuid::Uuid::new_v4().simple().to_string()[..8].to_uppercase()
        )
    }
}

impl Default for StubServiceBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceBackend for StubServiceBackend {
    async fn lookup_caller(
        &self,
        request: &LookupRequest,
    ) -> Result<LookupResult, IntegrationError> {
        let mode = self.enter(ToolName::LookupCaller).await?;
        let record = match mode {
            StubMode::Decline => None,
            _ => self.customers.lock().get(&request.phone).cloned(),
        };
        tracing::info!(phone = %request.phone, found = record.is_some(), "Stub directory: Lookup");
        Ok(record.unwrap_or_else(LookupResult::not_found))
    }

    async fn book_service(
        &self,
        request: &BookingRequest,
    ) -> Result<BookingResult, IntegrationError> {
        let mode = self.enter(ToolName::BookService).await?;
        if mode == StubMode::Decline {
            tracing::info!(phone = %request.phone, "Stub scheduling: No slot for request");
            return Ok(BookingResult::declined(self.available_slots.clone()));
        }

        let id = Self::short_id("BK");
        let when = request
            .preferred_time
            .clone()
            .unwrap_or_else(|| self.available_slots[0].clone());
        tracing::info!(appointment_id = %id, name = %request.customer_name, "Stub scheduling: Booked");
        Ok(BookingResult {
            booked: true,
            booked_date: Some(when.clone()),
            booked_time: Some(when),
            appointment_id: Some(id),
            available_slots: Vec::new(),
        })
    }

    async fn create_callback(
        &self,
        request: &CallbackRequest,
    ) -> Result<CallbackResult, IntegrationError> {
        let mode = self.enter(ToolName::CreateCallback).await?;
        if mode == StubMode::Decline {
            return Ok(CallbackResult {
                created: false,
                callback_id: None,
            });
        }
        let id = Self::short_id("CB");
        tracing::info!(
            callback_id = %id,
            phone = %request.phone,
            kind = request.callback_type.as_str(),
            "Stub queue: Created callback"
        );
        Ok(CallbackResult {
            created: true,
            callback_id: Some(id),
        })
    }

    async fn manage_appointment(
        &self,
        request: &ManageRequest,
    ) -> Result<ManageResult, IntegrationError> {
        let mode = self.enter(ToolName::ManageAppointment).await?;
        let success = mode != StubMode::Decline;
        tracing::info!(
            booking_ref = %request.booking_ref,
            action = %request.action,
            success,
            "Stub scheduling: Manage appointment"
        );
        Ok(ManageResult {
            success,
            new_date: request.new_time.clone().filter(|_| success),
            new_time: request.new_time.clone().filter(|_| success),
            message: None,
        })
    }

    async fn send_alert(&self, request: &AlertRequest) -> Result<AlertResult, IntegrationError> {
        let mode = self.enter(ToolName::SendAlert).await?;
        let sent = mode != StubMode::Decline;
        tracing::warn!(kind = %request.kind, phone = %request.phone, sent, "Stub alerting: Hazard alert");
        Ok(AlertResult { sent })
    }

    fn name(&self) -> &str {
        "stub"
    }
}
