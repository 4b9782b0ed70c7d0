use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::{BackendError, BackendId};

/// What a backend is asked to read.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionInput {
    /// Raw document bytes (PDF).
    Document { bytes: Vec<u8>, media_type: String },
    /// Plain text, already extracted or never binary.
    Text(String),
}

impl ExtractionInput {
    pub fn pdf(bytes: Vec<u8>) -> Self {
        Self::Document {
            bytes,
            media_type: crate::config::ACCEPTED_DOCUMENT_TYPE.to_string(),
        }
    }

    pub fn is_document(&self) -> bool {
        matches!(self, Self::Document { .. })
    }
}

/// Result of one liveness probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendHealth {
    pub available: bool,
    pub latency_ms: u64,
    /// Model the backend would use.
    pub model: Option<String>,
    /// Why the backend is unavailable, when it is.
    pub error: Option<String>,
}

impl BackendHealth {
    pub fn up(latency_ms: u64, model: impl Into<String>) -> Self {
        Self {
            available: true,
            latency_ms,
            model: Some(model.into()),
            error: None,
        }
    }

    pub fn down(latency_ms: u64, error: impl Into<String>) -> Self {
        Self {
            available: false,
            latency_ms,
            model: None,
            error: Some(error.into()),
        }
    }
}

/// A service that turns a document or text plus instructions into a text reply.
///
/// Implementations must bound `health_check` by
/// [`crate::config::HEALTH_CHECK_TIMEOUT`] and never panic on transport errors.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    fn id(&self) -> BackendId;

    /// Whether `ExtractionInput::Document` can be sent as-is.
    fn accepts_documents(&self) -> bool;

    /// Budget for one `extract` call, enforced by the orchestrator.
    fn extraction_timeout(&self) -> Duration;

    async fn health_check(&self) -> BackendHealth;

    async fn extract(
        &self,
        input: &ExtractionInput,
        instructions: &str,
    ) -> Result<String, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_input_carries_media_type() {
        let input = ExtractionInput::pdf(vec![1, 2, 3]);
        assert!(input.is_document());
        match input {
            ExtractionInput::Document { media_type, .. } => assert_eq!(media_type, "application/pdf"),
            ExtractionInput::Text(_) => panic!("expected document"),
        }
    }

    #[test]
    fn health_serializes_camel_case() {
        let json = serde_json::to_value(BackendHealth::up(12, "mistral")).unwrap();
        assert_eq!(json["available"], true);
        assert_eq!(json["latencyMs"], 12);
        assert_eq!(json["model"], "mistral");
    }
}
