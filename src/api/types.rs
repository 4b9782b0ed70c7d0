//! Shared types for the API layer.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::Multipart;
use axum::http::HeaderMap;
use serde::Serialize;

use crate::ai::BackendId;
use crate::api::error::ApiError;
use crate::core_state::CoreState;
use crate::pipeline::DocumentUpload;

/// Request header carrying a per-request backend override.
pub const PROVIDER_HEADER: &str = "x-ai-provider";

// ═══════════════════════════════════════════════════════════
// API context
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }

    /// Persist after a successful mutation. A failed write is logged, not
    /// surfaced: the in-memory state already moved on.
    pub async fn persist(&self) {
        if let Err(e) = self.core.persist().await {
            tracing::error!(error = %e, "Failed to persist session");
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Success envelope
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<BackendId>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            provider: None,
        }
    }

    pub fn from_provider(data: T, provider: BackendId) -> Self {
        Self {
            success: true,
            data,
            provider: Some(provider),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Provider override
// ═══════════════════════════════════════════════════════════

/// Resolve the per-request override from the body field, else the header.
/// `auto` and blank values mean no override.
pub fn provider_override(
    headers: &HeaderMap,
    body_value: Option<&str>,
) -> Result<Option<BackendId>, ApiError> {
    let header_value = headers.get(PROVIDER_HEADER).and_then(|v| v.to_str().ok());
    let Some(raw) = body_value.or(header_value).map(str::trim) else {
        return Ok(None);
    };
    if raw.is_empty() || raw.eq_ignore_ascii_case("auto") {
        return Ok(None);
    }
    Ok(Some(raw.parse::<BackendId>()?))
}

// ═══════════════════════════════════════════════════════════
// Multipart forms
// ═══════════════════════════════════════════════════════════

/// A multipart form split into uploaded files and text fields.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub files: Vec<DocumentUpload>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await?;
                    form.files
                        .push(DocumentUpload::new(file_name, content_type, bytes.to_vec()));
                }
                None => {
                    let text = field.text().await?;
                    form.fields.insert(name, text);
                }
            }
        }

        Ok(form)
    }

    /// The single file of a one-document upload.
    pub fn single_file(mut self) -> Result<(DocumentUpload, HashMap<String, String>), ApiError> {
        if self.files.is_empty() {
            return Err(ApiError::BadRequest("No file provided".into()));
        }
        let file = self.files.swap_remove(0);
        Ok((file, self.fields))
    }

    pub fn flag(&self, name: &str) -> bool {
        self.fields
            .get(name)
            .is_some_and(|v| matches!(v.trim(), "true" | "1" | "yes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn body_override_wins_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert(PROVIDER_HEADER, HeaderValue::from_static("claude"));
        assert_eq!(
            provider_override(&headers, Some("ollama")).unwrap(),
            Some(BackendId::Ollama)
        );
        assert_eq!(
            provider_override(&headers, None).unwrap(),
            Some(BackendId::Claude)
        );
    }

    #[test]
    fn auto_and_blank_mean_no_override() {
        let headers = HeaderMap::new();
        assert_eq!(provider_override(&headers, Some("auto")).unwrap(), None);
        assert_eq!(provider_override(&headers, Some("  ")).unwrap(), None);
        assert_eq!(provider_override(&headers, None).unwrap(), None);
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let headers = HeaderMap::new();
        assert!(matches!(
            provider_override(&headers, Some("gpt")),
            Err(ApiError::BadRequest(_))
        ));
    }
}
