use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ExtractedFields, ExtractionResult, Indicator, ValidationResult};

/// The reply shapes a backend can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Founding,
    Progress,
    Validation,
    IndicatorSuggestion,
}

impl std::fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Founding => "founding document",
            Self::Progress => "progress report",
            Self::Validation => "evidence validation",
            Self::IndicatorSuggestion => "indicator suggestion",
        })
    }
}

/// A reply that did not decode into the expected shape. Keeps the raw
/// text for diagnostics.
#[derive(Error, Debug, Clone)]
#[error("Malformed {kind} response: {reason}")]
pub struct MalformedResponse {
    pub kind: ResponseKind,
    pub reason: String,
    pub raw: String,
}

// ── Typed replies ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoundingExtraction {
    pub project_details: ExtractedFields,
    pub kpis: Vec<Indicator>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationExtraction {
    pub validation_results: Vec<ValidationResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSuggestion {
    #[serde(rename = "kpiIds")]
    pub indicator_ids: Vec<String>,
}

/// A reply type with its own decode step.
pub trait ResponseDecode: DeserializeOwned + Send + 'static {
    const KIND: ResponseKind;

    fn decode(raw: &str) -> Result<Self, MalformedResponse> {
        parse(Self::KIND, raw)
    }
}

impl ResponseDecode for FoundingExtraction {
    const KIND: ResponseKind = ResponseKind::Founding;
}

impl ResponseDecode for ExtractionResult {
    const KIND: ResponseKind = ResponseKind::Progress;
}

impl ResponseDecode for ValidationExtraction {
    const KIND: ResponseKind = ResponseKind::Validation;
}

impl ResponseDecode for IndicatorSuggestion {
    const KIND: ResponseKind = ResponseKind::IndicatorSuggestion;
}

// ── Decoding ──

/// Remove a leading ```` ``` ```` / ```` ```json ```` fence and a trailing ```` ``` ````.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```") {
        s = rest;
        if s.get(..4).is_some_and(|tag| tag.eq_ignore_ascii_case("json")) {
            s = &s[4..];
        }
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// Decode a backend reply into `T`, tolerating fences and surrounding prose.
pub fn parse<T: DeserializeOwned>(kind: ResponseKind, raw: &str) -> Result<T, MalformedResponse> {
    let body = strip_code_fences(raw);
    if body.is_empty() {
        return Err(MalformedResponse {
            kind,
            reason: "empty reply".into(),
            raw: raw.to_string(),
        });
    }

    match serde_json::from_str::<T>(body) {
        Ok(value) => Ok(value),
        Err(first) => {
            // Prose around the object: retry on the outermost braces.
            if let Some(inner) = outer_object(body).filter(|inner| inner.len() < body.len()) {
                if let Ok(value) = serde_json::from_str::<T>(inner) {
                    return Ok(value);
                }
            }
            Err(MalformedResponse {
                kind,
                reason: first.to_string(),
                raw: raw.to_string(),
            })
        }
    }
}

fn outer_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    (end > start).then(|| &s[start..=end])
}
