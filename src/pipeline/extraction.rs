//! Request validation and typed extraction calls.
//!
//! Every input check happens here, before a backend is contacted.

use std::sync::Arc;

use super::error::ExtractionError;
use crate::ai::{
    evidence_validation_prompt, indicator_context, indicator_suggestion_prompt,
    progress_extraction_prompt, BackendId, Extracted, FoundingExtraction, IndicatorSuggestion,
    ProviderOrchestrator, ValidationExtraction, FOUNDING_EXTRACTION_PROMPT,
};
use crate::config::{ACCEPTED_DOCUMENT_TYPE, MAX_UPLOAD_BYTES};
use crate::models::{ExtractionResult, Indicator};

/// An uploaded binary document.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub file_name: String,
    /// Declared content type; guessed from the file name when absent.
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl DocumentUpload {
    pub fn new(file_name: impl Into<String>, content_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            bytes,
        }
    }

    /// Reject empty, oversized and non-PDF uploads.
    pub fn validate(&self) -> Result<(), ExtractionError> {
        if self.bytes.is_empty() {
            return Err(ExtractionError::InvalidInput("No file provided".into()));
        }
        if self.bytes.len() > MAX_UPLOAD_BYTES {
            return Err(ExtractionError::InvalidInput(format!(
                "File too large: {} bytes (max {} MB)",
                self.bytes.len(),
                MAX_UPLOAD_BYTES / (1024 * 1024)
            )));
        }

        let content_type = match self.content_type.as_deref().map(str::trim) {
            Some(ct) if !ct.is_empty() && ct != "application/octet-stream" => ct.to_ascii_lowercase(),
            _ => mime_guess::from_path(&self.file_name)
                .first_raw()
                .unwrap_or_default()
                .to_string(),
        };
        if content_type != ACCEPTED_DOCUMENT_TYPE {
            return Err(ExtractionError::InvalidInput(format!(
                "Only PDF files are accepted (got '{}')",
                if content_type.is_empty() { "unknown" } else { content_type.as_str() }
            )));
        }
        Ok(())
    }
}

pub struct ExtractionService {
    orchestrator: Arc<ProviderOrchestrator>,
}

impl ExtractionService {
    pub fn new(orchestrator: Arc<ProviderOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &ProviderOrchestrator {
        &self.orchestrator
    }

    /// Project details and indicators from a founding document.
    pub async fn extract_founding(
        &self,
        upload: DocumentUpload,
        override_backend: Option<BackendId>,
    ) -> Result<Extracted<FoundingExtraction>, ExtractionError> {
        upload.validate()?;
        tracing::info!(file = %upload.file_name, bytes = upload.bytes.len(), "Founding extraction");

        Ok(self
            .orchestrator
            .extract_document_as(upload.bytes, FOUNDING_EXTRACTION_PROMPT, override_backend)
            .await?)
    }

    /// Reported values from a progress document, matched against `indicators`.
    pub async fn extract_progress(
        &self,
        upload: DocumentUpload,
        indicators: &[Indicator],
        override_backend: Option<BackendId>,
    ) -> Result<Extracted<ExtractionResult>, ExtractionError> {
        upload.validate()?;
        if indicators.is_empty() {
            return Err(ExtractionError::InvalidInput("No indicators provided".into()));
        }
        let prompt = progress_extraction_prompt(&indicator_context(indicators));
        tracing::info!(
            file = %upload.file_name,
            indicators = indicators.len(),
            "Progress extraction"
        );

        Ok(self
            .orchestrator
            .extract_document_as(upload.bytes, &prompt, override_backend)
            .await?)
    }

    /// Judge linked evidence against reported values.
    pub async fn validate_evidence(
        &self,
        evidence_summary: &str,
        indicator_summary: &str,
        override_backend: Option<BackendId>,
    ) -> Result<Extracted<ValidationExtraction>, ExtractionError> {
        if evidence_summary.trim().is_empty() || indicator_summary.trim().is_empty() {
            return Err(ExtractionError::InvalidInput(
                "Missing evidence metadata or linked KPI data".into(),
            ));
        }
        let prompt = evidence_validation_prompt(evidence_summary, indicator_summary);

        Ok(self
            .orchestrator
            .extract_text_as(evidence_summary.to_string(), &prompt, override_backend)
            .await?)
    }

    /// Indicator ids an evidence file may relate to. Never fails: any
    /// problem yields an empty list.
    pub async fn suggest_indicators(
        &self,
        file_info: &str,
        indicator_list: &str,
        override_backend: Option<BackendId>,
    ) -> Vec<String> {
        if file_info.trim().is_empty() || indicator_list.trim().is_empty() {
            return Vec::new();
        }
        let prompt = indicator_suggestion_prompt(file_info, indicator_list);

        match self
            .orchestrator
            .extract_text_as::<IndicatorSuggestion>(file_info.to_string(), &prompt, override_backend)
            .await
        {
            Ok(suggestion) => suggestion.value.indicator_ids,
            Err(e) => {
                tracing::warn!(error = %e, "Indicator suggestion failed");
                Vec::new()
            }
        }
    }
}
