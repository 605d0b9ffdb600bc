//! HTTP API handlers for Lifeline.
//!
//! Handlers delegate to the engine and translate its error taxonomy to
//! status codes: missing entities become 404, invariant violations (caller
//! bugs like de-escalation) become 409, and infrastructure failures become
//! 500. Channel and resource failures never surface here — the dispatcher
//! recovers those with documented fallbacks.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::dashboard::{self, PlatformStatistics, UserDashboard};
use crate::engine::CrisisEngine;
use crate::error::EngineError;
use crate::model::{
    AssessmentRequest, CrisisAnalysisResult, FollowUpPlan, ProtocolExecutionResult,
};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: CrisisEngine,
}

fn status_for(error: &EngineError) -> StatusCode {
    match error {
        EngineError::AlertNotFound(_) | EngineError::InterventionNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        EngineError::DeEscalation { .. } | EngineError::AlertResolved(_) => StatusCode::CONFLICT,
        EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// POST /assess - Run a risk assessment over one batch of signals.
///
/// Opens an alert and starts its protocol when the classified level is
/// Low or above. Never fails: a degraded engine answers with the
/// emergency fallback at the highest plausible risk.
#[instrument(skip(state, request), fields(user_id = %request.user_id))]
pub async fn assess(
    State(state): State<AppState>,
    Json(request): Json<AssessmentRequest>,
) -> Json<CrisisAnalysisResult> {
    Json(state.engine.assess(request).await)
}

/// POST /alerts/:id/protocol - Execute (or re-execute) an alert's protocol.
///
/// Idempotent: interventions already triggered at the current level are
/// not repeated.
#[instrument(skip(state))]
pub async fn execute_protocol(
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
) -> Result<Json<ProtocolExecutionResult>, StatusCode> {
    match state.engine.execute_protocol(alert_id).await {
        Ok(result) => Ok(Json(result)),
        Err(e) => {
            warn!(%alert_id, error = %e, "Protocol execution rejected");
            Err(status_for(&e))
        }
    }
}

/// Request body for POST /alerts/:id/resolve.
#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    /// Who is resolving ("counselor:<id>", "user", ...).
    pub resolved_by: String,
}

/// POST /alerts/:id/resolve - Terminally resolve an alert.
///
/// Cancels all pending timers for the alert; a resolved alert can never
/// escalate later.
#[instrument(skip(state, request))]
pub async fn resolve_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
    Json(request): Json<ResolveRequest>,
) -> Result<StatusCode, StatusCode> {
    match state
        .engine
        .resolve_alert(alert_id, &request.resolved_by)
        .await
    {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => {
            warn!(%alert_id, error = %e, "Resolution rejected");
            Err(status_for(&e))
        }
    }
}

/// Request body for POST /interventions/:id/response.
#[derive(Debug, Deserialize)]
pub struct InterventionResponse {
    pub text: String,
}

/// POST /interventions/:id/response - Ingest a person's reply.
///
/// High-risk language re-escalates the owning alert; every reply yields a
/// follow-up plan with the next check-in time and the crisis resources.
#[instrument(skip(state, request))]
pub async fn handle_response(
    State(state): State<AppState>,
    Path(intervention_id): Path<Uuid>,
    Json(request): Json<InterventionResponse>,
) -> Result<Json<FollowUpPlan>, StatusCode> {
    match state
        .engine
        .handle_response(intervention_id, &request.text)
        .await
    {
        Ok(plan) => Ok(Json(plan)),
        Err(e) => {
            warn!(%intervention_id, error = %e, "Response handling failed");
            Err(status_for(&e))
        }
    }
}

/// Request body for POST /interventions/:id/outcome.
#[derive(Debug, Deserialize)]
pub struct DeliveryConfirmation {
    pub outcome: crate::model::InterventionOutcome,
}

/// POST /interventions/:id/outcome - Record an asynchronous delivery
/// confirmation from the channel gateway.
#[instrument(skip(state, confirmation))]
pub async fn confirm_delivery(
    State(state): State<AppState>,
    Path(intervention_id): Path<Uuid>,
    Json(confirmation): Json<DeliveryConfirmation>,
) -> Result<StatusCode, StatusCode> {
    match state
        .engine
        .confirm_delivery(intervention_id, confirmation.outcome)
        .await
    {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => {
            warn!(%intervention_id, error = %e, "Delivery confirmation rejected");
            Err(status_for(&e))
        }
    }
}

/// GET /dashboard/:user_id - Per-user crisis dashboard.
#[instrument(skip(state))]
pub async fn get_dashboard(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserDashboard>, StatusCode> {
    match dashboard::user_dashboard(state.engine.storage(), &user_id).await {
        Ok(view) => Ok(Json(view)),
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Failed to assemble dashboard");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /statistics - Platform-wide aggregate counters.
#[instrument(skip(state))]
pub async fn get_statistics(
    State(state): State<AppState>,
) -> Result<Json<PlatformStatistics>, StatusCode> {
    match dashboard::platform_statistics(state.engine.storage()).await {
        Ok(stats) => Ok(Json(stats)),
        Err(e) => {
            warn!(error = %e, "Failed to assemble statistics");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
