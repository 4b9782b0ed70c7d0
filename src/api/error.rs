//! API error types with structured JSON responses.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::ai::ProviderError;
use crate::core_state::CoreError;
use crate::pipeline::{ExtractionError, PipelineError, RunError};

/// Error body shared by every endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_retry: Option<bool>,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    /// The store rejected the mutation in its current state.
    #[error("{0}")]
    Conflict(String),
    /// Every backend attempt failed; the user may retry or enter data manually.
    #[error("{0}")]
    ExtractionFailed(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, can_retry) = match &self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail.clone(), None),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, detail.clone(), None),
            ApiError::Conflict(detail) => (StatusCode::CONFLICT, detail.clone(), None),
            ApiError::ExtractionFailed(detail) => {
                (StatusCode::UNPROCESSABLE_ENTITY, detail.clone(), Some(true))
            }
            ApiError::Unavailable(detail) => {
                (StatusCode::SERVICE_UNAVAILABLE, detail.clone(), Some(false))
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorBody {
            success: false,
            error: message,
            can_retry,
        };
        (status, Json(body)).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::AssessmentNotFound(_)
            | PipelineError::DocumentNotFound(_)
            | PipelineError::EvidenceNotFound(_) => ApiError::NotFound(err.to_string()),
            PipelineError::InvalidValue(_) | PipelineError::UnknownIndicator(_) => {
                ApiError::BadRequest(err.to_string())
            }
            PipelineError::NoActiveAssessment
            | PipelineError::StageLocked(_)
            | PipelineError::GateNotMet { .. }
            | PipelineError::OverwriteNeedsConfirmation
            | PipelineError::DuplicateIndicator(_) => ApiError::Conflict(err.to_string()),
        }
    }
}

impl From<ExtractionError> for ApiError {
    fn from(err: ExtractionError) -> Self {
        match err {
            ExtractionError::InvalidInput(message) => ApiError::BadRequest(message),
            ExtractionError::Provider(e) => e.into(),
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match &err {
            ProviderError::NoBackendAvailable => ApiError::Unavailable(err.to_string()),
            ProviderError::UnknownBackend(_) => ApiError::BadRequest(err.to_string()),
            ProviderError::AllBackendsFailed { .. } => {
                tracing::warn!(detail = %err.detail(), "Extraction failed on every backend");
                ApiError::ExtractionFailed(err.to_string())
            }
        }
    }
}

impl From<RunError> for ApiError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::Store(e) => e.into(),
            RunError::Extraction(e) => e.into(),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::BatchRunning => ApiError::Conflict(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}
