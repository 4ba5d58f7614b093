//! HTTP Endpoints
//!
//! REST API for driving calls through the agent.

use axum::{
    extract::{Json, Path, State},
    http::{HeaderValue, Method, StatusCode},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use call_agent_agent::TurnOutput;
use call_agent_core::{CallState, EndReason};
use call_agent_tools::open_circuits;

use crate::metrics::metrics_handler;
use crate::session::CallSummary;
use crate::state::AppState;
use crate::ServerError;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(&state.config.server.cors_origins, state.config.server.cors_enabled);

    Router::new()
        .route("/api/calls", post(start_call).get(list_calls))
        .route("/api/calls/:id", get(get_call))
        .route("/api/calls/:id/turns", post(caller_turn))
        .route("/api/calls/:id/hangup", post(hangup))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// - If cors_enabled is false, returns a permissive layer (for dev)
/// - If no origin parses, defaults to localhost:3000
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);
    if parsed_origins.is_empty() {
        tracing::info!("No usable CORS origins configured, defaulting to localhost:3000");
        return layer.allow_origin(HeaderValue::from_static("http://localhost:3000"));
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    layer.allow_origin(parsed_origins)
}

#[derive(Debug, Deserialize)]
struct StartCallRequest {
    phone: String,
}

#[derive(Debug, Deserialize)]
struct TurnRequest {
    text: String,
}

/// Spoken reply, plus the reason code once the call has ended
#[derive(Debug, Serialize)]
struct TurnResponse {
    call_id: String,
    speak: String,
    end_call: bool,
    end_reason: Option<EndReason>,
    state: CallState,
}

impl TurnResponse {
    fn new(call_id: String, output: TurnOutput) -> Self {
        Self {
            call_id,
            speak: output.speak,
            end_call: output.end_call.is_some(),
            end_reason: output.end_call,
            state: output.state,
        }
    }
}

async fn start_call(
    State(state): State<AppState>,
    Json(request): Json<StartCallRequest>,
) -> Result<(StatusCode, Json<TurnResponse>), ServerError> {
    let (call_id, greeting) = state.calls.start_call(&request.phone).await?;
    Ok((StatusCode::CREATED, Json(TurnResponse::new(call_id, greeting))))
}

async fn caller_turn(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, ServerError> {
    let output = state.calls.handle_turn(&id, &request.text).await?;
    Ok(Json(TurnResponse::new(id, output)))
}

async fn hangup(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CallSummary>, ServerError> {
    Ok(Json(state.calls.hangup(&id).await?))
}

async fn get_call(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CallSummary>, ServerError> {
    Ok(Json(state.calls.summary(&id)?))
}

async fn list_calls(State(state): State<AppState>) -> Json<serde_json::Value> {
    let calls = state.calls.list();
    Json(serde_json::json!({
        "count": calls.len(),
        "calls": calls,
    }))
}

/// Degraded while any collaborator circuit is open
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let services = state.calls.services();
    let open: Vec<&'static str> = open_circuits(&services.gateway)
        .into_iter()
        .map(|tool| tool.as_str())
        .collect();
    let status = if open.is_empty() { "healthy" } else { "degraded" };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": status,
            "version": env!("CARGO_PKG_VERSION"),
            "active_calls": state.calls.active_count(),
            "pending_finalizations": state.calls.pending_finalizations(),
            "open_circuits": open,
            "llm_enabled": services.orchestrator.has_backend(),
            "report_sink": services.sink.name(),
        })),
    )
}
