//! Portfolio rollups across every assessment.

use axum::extract::State;
use axum::Json;

use crate::analytics::{portfolio_report, PortfolioReport};
use crate::api::types::{ApiContext, ApiResponse};

/// `GET /api/portfolio`
pub async fn report(State(ctx): State<ApiContext>) -> Json<ApiResponse<PortfolioReport>> {
    let store = ctx.core.store().lock().await;
    Json(ApiResponse::ok(portfolio_report(store.assessments())))
}
