//! HTTP service backend
//!
//! Each tool is a JSON `POST {base_url}/{tool_name}`. Responses are parsed
//! into the typed result records; a body that does not carry the required
//! success flag is an `InvalidResponse`, never a success.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

use call_agent_core::{
    AlertRequest, AlertResult, BookingRequest, BookingResult, CallbackRequest, CallbackResult,
    LookupRequest, LookupResult, ManageRequest, ManageResult, ToolName,
};

use crate::integrations::{IntegrationError, ServiceBackend};

/// Backend talking to the business's service API
#[derive(Clone)]
pub struct HttpServiceBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpServiceBackend {
    /// `request_timeout` is a transport ceiling; the gateway applies the
    /// per-call timeout on top of it.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, IntegrationError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| IntegrationError::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, tool: ToolName) -> String {
        format!("{}/{}", self.base_url, tool.as_str())
    }

    async fn post<Req, Resp>(&self, tool: ToolName, request: &Req) -> Result<Resp, IntegrationError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let mut builder = self.client.post(self.url(tool)).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, body));
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            tracing::warn!(tool = %tool, error = %e, "Unparseable tool response");
            IntegrationError::InvalidResponse(format!("{}: {}", tool, e))
        })
    }

    fn map_status(status: StatusCode, body: String) -> IntegrationError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => IntegrationError::AuthFailed(body),
            StatusCode::NOT_FOUND => IntegrationError::NotFound(body),
            StatusCode::TOO_MANY_REQUESTS => IntegrationError::RateLimited,
            s if s.is_client_error() => {
                IntegrationError::InvalidRequest(format!("HTTP {}: {}", s, body))
            }
            s => IntegrationError::Internal(format!("HTTP {}: {}", s, body)),
        }
    }
}

#[async_trait]
impl ServiceBackend for HttpServiceBackend {
    async fn lookup_caller(
        &self,
        request: &LookupRequest,
    ) -> Result<LookupResult, IntegrationError> {
        self.post(ToolName::LookupCaller, request).await
    }

    async fn book_service(
        &self,
        request: &BookingRequest,
    ) -> Result<BookingResult, IntegrationError> {
        self.post(ToolName::BookService, request).await
    }

    async fn create_callback(
        &self,
        request: &CallbackRequest,
    ) -> Result<CallbackResult, IntegrationError> {
        self.post(ToolName::CreateCallback, request).await
    }

    async fn manage_appointment(
        &self,
        request: &ManageRequest,
    ) -> Result<ManageResult, IntegrationError> {
        self.post(ToolName::ManageAppointment, request).await
    }

    async fn send_alert(&self, request: &AlertRequest) -> Result<AlertResult, IntegrationError> {
        self.post(ToolName::SendAlert, request).await
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let backend =
            HttpServiceBackend::new("http://svc.local/api/", None, Duration::from_secs(5)).unwrap();
        assert_eq!(
            backend.url(ToolName::BookService),
            "http://svc.local/api/book_service"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            HttpServiceBackend::map_status(StatusCode::UNAUTHORIZED, String::new()),
            IntegrationError::AuthFailed(_)
        ));
        assert!(matches!(
            HttpServiceBackend::map_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            IntegrationError::RateLimited
        ));
        assert!(matches!(
            HttpServiceBackend::map_status(StatusCode::UNPROCESSABLE_ENTITY, String::new()),
            IntegrationError::InvalidRequest(_)
        ));
        assert!(matches!(
            HttpServiceBackend::map_status(StatusCode::BAD_GATEWAY, String::new()),
            IntegrationError::Internal(_)
        ));
    }

    #[test]
    fn test_textual_success_is_not_a_result() {
        // A body without the boolean flag must not parse
        let parsed: Result<BookingResult, _> =
            serde_json::from_str(r#"{"message": "Your appointment is booked!"}"#);
        assert!(parsed.is_err());
    }
}
