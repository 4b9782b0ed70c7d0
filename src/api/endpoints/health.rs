//! Provider health endpoint.

use axum::extract::State;
use axum::Json;

use crate::ai::HealthReport;
use crate::api::types::ApiContext;

/// `GET /api/health`: probe every backend. Never errors; an unreachable
/// backend is reported as unavailable.
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthReport> {
    Json(ctx.core.orchestrator().health_report().await)
}
