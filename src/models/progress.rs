use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ProcessingStatus, ProgressStatus};

/// One indicator value matched in a progress report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedValue {
    #[serde(rename = "kpiId")]
    pub indicator_id: String,
    pub reported_value: f64,
    #[serde(default)]
    pub report_date: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Typed result of a progress-report extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    #[serde(default)]
    pub report_date: Option<String>,
    #[serde(default)]
    pub report_period: Option<String>,
    #[serde(rename = "kpiValues")]
    pub values: Vec<ExtractedValue>,
}

/// A queued or processed progress report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedDocument {
    pub id: Uuid,
    pub file_name: String,
    pub uploaded_at: DateTime<Utc>,
    pub status: ProcessingStatus,
    pub report_period: Option<String>,
    pub extraction: Option<ExtractionResult>,
    pub error: Option<String>,
}

impl UploadedDocument {
    pub fn queued(file_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name: file_name.into(),
            uploaded_at: now,
            status: ProcessingStatus::Pending,
            report_period: None,
            extraction: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: String,
    pub value: f64,
}

/// Derived per-indicator progress. Never stored independently of the
/// documents it is computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPoint {
    #[serde(rename = "kpiId")]
    pub indicator_id: String,
    #[serde(rename = "kpiName")]
    pub indicator_name: String,
    pub target_value: f64,
    pub current_value: f64,
    pub unit: String,
    pub percentage_achieved: f64,
    pub status: ProgressStatus,
    pub history: Vec<HistoryPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportsData {
    pub documents: Vec<UploadedDocument>,
    pub progress: Vec<ProgressPoint>,
    /// Manual current-value corrections keyed by indicator id.
    pub overrides: BTreeMap<String, f64>,
}

impl ReportsData {
    pub fn document_mut(&mut self, id: Uuid) -> Option<&mut UploadedDocument> {
        self.documents.iter_mut().find(|d| d.id == id)
    }

    pub fn completed_count(&self) -> usize {
        self.documents
            .iter()
            .filter(|d| d.status == ProcessingStatus::Completed)
            .count()
    }
}
