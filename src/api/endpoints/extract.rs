//! Stateless extraction endpoints. Nothing here touches the session store.

use axum::extract::{Multipart, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::ai::FoundingExtraction;
use crate::api::error::ApiError;
use crate::api::types::{provider_override, ApiContext, ApiResponse, UploadForm};
use crate::models::{ExtractionResult, Indicator, ValidationResult};

/// Form field carrying the indicator list as JSON text.
const INDICATORS_FIELD: &str = "indicators";
/// Form field carrying a per-request backend override.
const OVERRIDE_FIELD: &str = "providerOverride";

/// `POST /api/extract/founding`: project details and indicators from a PDF.
pub async fn founding(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<ApiResponse<FoundingExtraction>>, ApiError> {
    let (upload, fields) = UploadForm::read(multipart).await?.single_file()?;
    let override_backend =
        provider_override(&headers, fields.get(OVERRIDE_FIELD).map(String::as_str))?;

    let extracted = ctx
        .core
        .runner()
        .extraction()
        .extract_founding(upload, override_backend)
        .await?;
    Ok(Json(ApiResponse::from_provider(extracted.value, extracted.backend)))
}

/// `POST /api/extract/progress`: reported values from a progress PDF,
/// matched against the indicators in the `indicators` field.
pub async fn progress(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<ApiResponse<ExtractionResult>>, ApiError> {
    let (upload, fields) = UploadForm::read(multipart).await?.single_file()?;
    let override_backend =
        provider_override(&headers, fields.get(OVERRIDE_FIELD).map(String::as_str))?;

    let indicators: Vec<Indicator> = match fields.get(INDICATORS_FIELD) {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| ApiError::BadRequest(format!("Invalid indicators JSON: {e}")))?,
        None => Vec::new(),
    };

    let extracted = ctx
        .core
        .runner()
        .extraction()
        .extract_progress(upload, &indicators, override_backend)
        .await?;
    Ok(Json(ApiResponse::from_provider(extracted.value, extracted.backend)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceRequest {
    #[serde(default)]
    pub evidence_metadata: String,
    #[serde(default, rename = "linkedKpiData")]
    pub linked_indicator_data: String,
    pub provider_override: Option<String>,
}

/// `POST /api/extract/evidence`: judge evidence summaries against reported values.
pub async fn evidence(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    Json(req): Json<EvidenceRequest>,
) -> Result<Json<ApiResponse<Vec<ValidationResult>>>, ApiError> {
    let override_backend = provider_override(&headers, req.provider_override.as_deref())?;

    let extracted = ctx
        .core
        .runner()
        .extraction()
        .validate_evidence(&req.evidence_metadata, &req.linked_indicator_data, override_backend)
        .await?;
    Ok(Json(ApiResponse::from_provider(
        extracted.value.validation_results,
        extracted.backend,
    )))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestRequest {
    #[serde(default)]
    pub file_info: String,
    #[serde(default, rename = "kpiList")]
    pub indicator_list: String,
    pub provider_override: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuggestResponse {
    pub success: bool,
    #[serde(rename = "kpiIds")]
    pub indicator_ids: Vec<String>,
}

/// `POST /api/suggest-indicators`: never fails on backend problems;
/// an empty list comes back instead.
pub async fn suggest_indicators(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    Json(req): Json<SuggestRequest>,
) -> Result<Json<SuggestResponse>, ApiError> {
    if req.file_info.trim().is_empty() || req.indicator_list.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Both fileInfo and kpiList are required".into(),
        ));
    }
    let override_backend = provider_override(&headers, req.provider_override.as_deref())?;

    let indicator_ids = ctx
        .core
        .runner()
        .extraction()
        .suggest_indicators(&req.file_info, &req.indicator_list, override_backend)
        .await;
    Ok(Json(SuggestResponse {
        success: true,
        indicator_ids,
    }))
}
