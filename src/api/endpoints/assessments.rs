//! Assessment endpoints: management, stage navigation and every
//! stage's edits on the active assessment.
//!
//! Mutations answer with the active assessment as it stands afterwards
//! and persist the session before returning.

use axum::extract::{Multipart, Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{provider_override, ApiContext, ApiResponse, UploadForm};
use crate::config::MAX_UPLOAD_BYTES;
use crate::models::{
    AdjustmentFactors, Assessment, ExtractedFields, Indicator, RatioCalculation, SessionSnapshot,
    Stage,
};
use crate::pipeline::{BatchSummary, FoundingApplied, PipelineError, PipelineStore};

const OVERRIDE_FIELD: &str = "providerOverride";
const CONFIRM_OVERWRITE_FIELD: &str = "confirmOverwrite";

type Active = Json<ApiResponse<Assessment>>;

// ── Helpers ──

/// Run one store mutation, persist, and return its output with the
/// active assessment.
async fn mutate<T>(
    ctx: &ApiContext,
    f: impl FnOnce(&mut PipelineStore) -> Result<T, PipelineError>,
) -> Result<(T, Option<Assessment>), ApiError> {
    let out = {
        let mut store = ctx.core.store().lock().await;
        let out = f(&mut store)?;
        (out, store.active().cloned())
    };
    ctx.persist().await;
    Ok(out)
}

/// Like `mutate`, for edits that need an active assessment.
async fn mutate_active<T>(
    ctx: &ApiContext,
    f: impl FnOnce(&mut PipelineStore) -> Result<T, PipelineError>,
) -> Result<(T, Assessment), ApiError> {
    let (out, active) = mutate(ctx, f).await?;
    let active = active.ok_or(PipelineError::NoActiveAssessment)?;
    Ok((out, active))
}

async fn active_assessment(ctx: &ApiContext) -> Result<Assessment, ApiError> {
    let store = ctx.core.store().lock().await;
    Ok(store
        .active()
        .cloned()
        .ok_or(PipelineError::NoActiveAssessment)?)
}

fn parse_stage(number: u8) -> Result<Stage, ApiError> {
    Stage::new(number).ok_or_else(|| ApiError::BadRequest(format!("Unknown stage {number}")))
}

// ═══════════════════════════════════════════════════════════
// Management
// ═══════════════════════════════════════════════════════════

/// `GET /api/assessments`: every assessment, the active id and the view.
pub async fn list(State(ctx): State<ApiContext>) -> Json<ApiResponse<SessionSnapshot>> {
    let store = ctx.core.store().lock().await;
    Json(ApiResponse::ok(store.snapshot()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub name: String,
    pub partner_name: Option<String>,
}

/// `POST /api/assessments`: create an assessment and make it active.
pub async fn create(
    State(ctx): State<ApiContext>,
    Json(req): Json<CreateRequest>,
) -> Result<Active, ApiError> {
    let (_, active) = mutate_active(&ctx, |s| s.create_assessment(&req.name, req.partner_name)).await?;
    Ok(Json(ApiResponse::ok(active)))
}

/// `GET /api/assessments/active`
pub async fn active(State(ctx): State<ApiContext>) -> Result<Active, ApiError> {
    Ok(Json(ApiResponse::ok(active_assessment(&ctx).await?)))
}

/// `POST /api/assessments/:id/open`
pub async fn open(State(ctx): State<ApiContext>, Path(id): Path<Uuid>) -> Result<Active, ApiError> {
    let (_, active) = mutate_active(&ctx, |s| s.open_assessment(id)).await?;
    Ok(Json(ApiResponse::ok(active)))
}

/// `DELETE /api/assessments/:id`
pub async fn delete(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<SessionSnapshot>>, ApiError> {
    mutate(&ctx, |s| s.delete_assessment(id)).await?;
    let store = ctx.core.store().lock().await;
    Ok(Json(ApiResponse::ok(store.snapshot())))
}

/// `POST /api/assessments/:id/reset`: back to stage 1 with empty data.
pub async fn reset(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Assessment>>, ApiError> {
    mutate(&ctx, |s| s.reset_assessment(id)).await?;
    let store = ctx.core.store().lock().await;
    let assessment = store
        .get(id)
        .cloned()
        .ok_or(PipelineError::AssessmentNotFound(id))?;
    Ok(Json(ApiResponse::ok(assessment)))
}

/// `POST /api/dashboard`: leave the active assessment.
pub async fn dashboard(State(ctx): State<ApiContext>) -> Result<Json<ApiResponse<SessionSnapshot>>, ApiError> {
    mutate(&ctx, |s| {
        s.go_to_dashboard();
        Ok(())
    })
    .await?;
    let store = ctx.core.store().lock().await;
    Ok(Json(ApiResponse::ok(store.snapshot())))
}

// ═══════════════════════════════════════════════════════════
// Stage navigation
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct GoToRequest {
    pub stage: u8,
}

#[derive(Debug, Serialize)]
pub struct NavigationResult {
    pub moved: bool,
    pub assessment: Assessment,
}

/// `POST /api/assessments/active/stage`: a locked stage leaves the
/// assessment where it is and answers `moved: false`.
pub async fn go_to(
    State(ctx): State<ApiContext>,
    Json(req): Json<GoToRequest>,
) -> Result<Json<ApiResponse<NavigationResult>>, ApiError> {
    let (moved, assessment) = mutate_active(&ctx, |s| s.go_to(req.stage)).await?;
    Ok(Json(ApiResponse::ok(NavigationResult { moved, assessment })))
}

/// `POST /api/assessments/active/stages/:stage/confirm`
pub async fn confirm_stage(
    State(ctx): State<ApiContext>,
    Path(stage): Path<u8>,
) -> Result<Active, ApiError> {
    let stage = parse_stage(stage)?;
    let (_, active) = mutate_active(&ctx, |s| s.confirm_stage(stage)).await?;
    Ok(Json(ApiResponse::ok(active)))
}

// ═══════════════════════════════════════════════════════════
// Stage 1: founding document
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FoundingResult {
    pub applied: FoundingApplied,
    pub assessment: Assessment,
}

/// `POST /api/assessments/active/founding`: extract and apply a founding
/// document. Overwriting confirmed data with downstream results needs
/// `confirmOverwrite=true`.
pub async fn apply_founding(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<ApiResponse<FoundingResult>>, ApiError> {
    let form = UploadForm::read(multipart).await?;
    let confirm_overwrite = form.flag(CONFIRM_OVERWRITE_FIELD);
    let (upload, fields) = form.single_file()?;
    let override_backend =
        provider_override(&headers, fields.get(OVERRIDE_FIELD).map(String::as_str))?;

    let applied = ctx
        .core
        .runner()
        .apply_founding(ctx.core.store(), upload, override_backend, confirm_overwrite)
        .await?;
    ctx.persist().await;

    let assessment = active_assessment(&ctx).await?;
    Ok(Json(ApiResponse::ok(FoundingResult { applied, assessment })))
}

/// `POST /api/assessments/active/founding/manual`: skip extraction.
pub async fn manual_entry(State(ctx): State<ApiContext>) -> Result<Active, ApiError> {
    let (_, active) = mutate_active(&ctx, |s| s.start_manual_entry()).await?;
    Ok(Json(ApiResponse::ok(active)))
}

/// `PUT /api/assessments/active/founding/fields`
pub async fn update_fields(
    State(ctx): State<ApiContext>,
    Json(fields): Json<ExtractedFields>,
) -> Result<Active, ApiError> {
    let (_, active) = mutate_active(&ctx, |s| s.update_fields(fields)).await?;
    Ok(Json(ApiResponse::ok(active)))
}

/// `POST /api/assessments/active/indicators`: an empty id is assigned.
pub async fn add_indicator(
    State(ctx): State<ApiContext>,
    Json(indicator): Json<Indicator>,
) -> Result<Active, ApiError> {
    let (_, active) = mutate_active(&ctx, |s| s.add_indicator(indicator)).await?;
    Ok(Json(ApiResponse::ok(active)))
}

/// `PUT /api/assessments/active/indicators/:id`
pub async fn update_indicator(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    Json(mut indicator): Json<Indicator>,
) -> Result<Active, ApiError> {
    indicator.id = id;
    let (_, active) = mutate_active(&ctx, |s| s.update_indicator(indicator)).await?;
    Ok(Json(ApiResponse::ok(active)))
}

/// `DELETE /api/assessments/active/indicators/:id`
pub async fn remove_indicator(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Active, ApiError> {
    let (_, active) = mutate_active(&ctx, |s| s.remove_indicator(&id)).await?;
    Ok(Json(ApiResponse::ok(active)))
}

// ═══════════════════════════════════════════════════════════
// Stage 2: progress reports
// ═══════════════════════════════════════════════════════════

/// `POST /api/assessments/active/reports`: queue every uploaded file and
/// extract them one at a time. The batch runs on its own task, so a
/// dropped client does not abandon documents mid-flight.
pub async fn process_reports(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<ApiResponse<BatchSummary>>, ApiError> {
    let form = UploadForm::read(multipart).await?;
    if form.files.is_empty() {
        return Err(ApiError::BadRequest("No file provided".into()));
    }
    let override_backend =
        provider_override(&headers, form.fields.get(OVERRIDE_FIELD).map(String::as_str))?;

    let cancel = ctx.core.begin_batch()?;
    let task_ctx = ctx.clone();
    let handle = tokio::spawn(async move {
        let result = task_ctx
            .core
            .runner()
            .process_reports(task_ctx.core.store(), form.files, override_backend, cancel)
            .await;
        task_ctx.core.end_batch();
        task_ctx.persist().await;
        result
    });

    let summary = handle
        .await
        .map_err(|e| ApiError::Internal(format!("report batch task failed: {e}")))??;
    Ok(Json(ApiResponse::ok(summary)))
}

#[derive(Debug, Serialize)]
pub struct CancelResult {
    pub cancelled: bool,
}

/// `POST /api/assessments/active/reports/cancel`
pub async fn cancel_reports(
    State(ctx): State<ApiContext>,
) -> Result<Json<ApiResponse<CancelResult>>, ApiError> {
    let cancelled = ctx.core.cancel_batch()?;
    Ok(Json(ApiResponse::ok(CancelResult { cancelled })))
}

/// `DELETE /api/assessments/active/reports/:id`
pub async fn remove_report(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
) -> Result<Active, ApiError> {
    let (_, active) = mutate_active(&ctx, |s| s.remove_report(id)).await?;
    Ok(Json(ApiResponse::ok(active)))
}

#[derive(Debug, Deserialize)]
pub struct OverrideRequest {
    /// `null` clears the override.
    pub value: Option<f64>,
}

/// `PUT /api/assessments/active/progress/:indicator_id/override`
pub async fn set_progress_override(
    State(ctx): State<ApiContext>,
    Path(indicator_id): Path<String>,
    Json(req): Json<OverrideRequest>,
) -> Result<Active, ApiError> {
    let (_, active) =
        mutate_active(&ctx, |s| s.set_progress_override(&indicator_id, req.value)).await?;
    Ok(Json(ApiResponse::ok(active)))
}

// ═══════════════════════════════════════════════════════════
// Stage 3: evidence
// ═══════════════════════════════════════════════════════════

/// `POST /api/assessments/active/evidence`: register evidence files.
/// Any file type is accepted; CSV files get a row count.
pub async fn add_evidence(
    State(ctx): State<ApiContext>,
    multipart: Multipart,
) -> Result<Active, ApiError> {
    let form = UploadForm::read(multipart).await?;
    if form.files.is_empty() {
        return Err(ApiError::BadRequest("No file provided".into()));
    }
    if let Some(large) = form.files.iter().find(|f| f.bytes.len() > MAX_UPLOAD_BYTES) {
        return Err(ApiError::BadRequest(format!(
            "{} exceeds the {} MB limit",
            large.file_name,
            MAX_UPLOAD_BYTES / (1024 * 1024)
        )));
    }

    let (_, active) = mutate_active(&ctx, |s| {
        for file in &form.files {
            s.add_evidence(&file.file_name, file.content_type.as_deref(), Some(file.bytes.as_slice()))?;
        }
        Ok(())
    })
    .await?;
    Ok(Json(ApiResponse::ok(active)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceUpdate {
    #[serde(rename = "linkedKpiIds")]
    pub linked_indicator_ids: Option<Vec<String>>,
    pub notes: Option<String>,
}

/// `PUT /api/assessments/active/evidence/:id`: replace links and/or notes.
pub async fn update_evidence(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
    Json(update): Json<EvidenceUpdate>,
) -> Result<Active, ApiError> {
    let (_, active) = mutate_active(&ctx, |s| {
        if let Some(links) = &update.linked_indicator_ids {
            s.set_evidence_links(id, links)?;
        }
        if update.notes.is_some() {
            s.set_evidence_notes(id, update.notes)?;
        }
        Ok(())
    })
    .await?;
    Ok(Json(ApiResponse::ok(active)))
}

/// `DELETE /api/assessments/active/evidence/:id`
pub async fn remove_evidence(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
) -> Result<Active, ApiError> {
    let (_, active) = mutate_active(&ctx, |s| s.remove_evidence(id)).await?;
    Ok(Json(ApiResponse::ok(active)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderChoice {
    pub provider_override: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Suggestions {
    #[serde(rename = "kpiIds")]
    pub indicator_ids: Vec<String>,
}

/// `POST /api/assessments/active/evidence/:id/suggest`: indicator ids the
/// file may relate to. Not applied.
pub async fn suggest_links(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    body: Option<Json<ProviderChoice>>,
) -> Result<Json<ApiResponse<Suggestions>>, ApiError> {
    let choice = body.map(|Json(c)| c).unwrap_or_default();
    let override_backend = provider_override(&headers, choice.provider_override.as_deref())?;

    let indicator_ids = ctx
        .core
        .runner()
        .suggest_links(ctx.core.store(), id, override_backend)
        .await?;
    Ok(Json(ApiResponse::ok(Suggestions { indicator_ids })))
}

/// `POST /api/assessments/active/validate`: validate linked evidence.
/// A failed run keeps the previous results.
pub async fn validate(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    body: Option<Json<ProviderChoice>>,
) -> Result<Active, ApiError> {
    let choice = body.map(|Json(c)| c).unwrap_or_default();
    let override_backend = provider_override(&headers, choice.provider_override.as_deref())?;

    let kept = ctx
        .core
        .runner()
        .run_validation(ctx.core.store(), override_backend)
        .await?;
    ctx.persist().await;
    tracing::info!(results = kept, "Evidence validation applied");

    Ok(Json(ApiResponse::ok(active_assessment(&ctx).await?)))
}

// ═══════════════════════════════════════════════════════════
// Stage 4: ratio
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct RatioInputs {
    pub investment: Option<f64>,
    pub adjustments: Option<AdjustmentFactors>,
}

/// `PUT /api/assessments/active/ratio`
pub async fn update_ratio(
    State(ctx): State<ApiContext>,
    Json(inputs): Json<RatioInputs>,
) -> Result<Active, ApiError> {
    let (_, active) = mutate_active(&ctx, |s| {
        if let Some(investment) = inputs.investment {
            s.set_investment(investment)?;
        }
        if let Some(adjustments) = inputs.adjustments {
            s.set_adjustments(adjustments)?;
        }
        Ok(())
    })
    .await?;
    Ok(Json(ApiResponse::ok(active)))
}

/// `GET /api/assessments/active/ratio`: full breakdown.
pub async fn ratio_breakdown(
    State(ctx): State<ApiContext>,
) -> Result<Json<ApiResponse<RatioCalculation>>, ApiError> {
    let store = ctx.core.store().lock().await;
    let breakdown = store
        .ratio_breakdown()
        .ok_or(PipelineError::NoActiveAssessment)?;
    Ok(Json(ApiResponse::ok(breakdown)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeUpdate {
    pub monetized_value: f64,
    pub monetization_method: Option<String>,
}

/// `PUT /api/assessments/active/outcomes/:indicator_id`
pub async fn update_outcome(
    State(ctx): State<ApiContext>,
    Path(indicator_id): Path<String>,
    Json(update): Json<OutcomeUpdate>,
) -> Result<Active, ApiError> {
    let (_, active) = mutate_active(&ctx, |s| {
        s.update_outcome(&indicator_id, update.monetized_value, update.monetization_method)
    })
    .await?;
    Ok(Json(ApiResponse::ok(active)))
}

// ═══════════════════════════════════════════════════════════
// Stage 5: report
// ═══════════════════════════════════════════════════════════

/// `POST /api/assessments/active/report`: record report generation.
pub async fn generate_report(State(ctx): State<ApiContext>) -> Result<Active, ApiError> {
    let (_, active) = mutate_active(&ctx, |s| s.mark_report_generated()).await?;
    Ok(Json(ApiResponse::ok(active)))
}
