use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{EvidenceKind, ValidationStatus};

/// Free-form facts about an evidence file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvidenceMetadata {
    pub row_count: Option<usize>,
    pub location: Option<String>,
    pub date_taken: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceFile {
    pub id: Uuid,
    pub file_name: String,
    #[serde(rename = "fileType")]
    pub kind: EvidenceKind,
    pub uploaded_at: DateTime<Utc>,
    /// Unique, in link order.
    #[serde(rename = "linkedKpiIds")]
    pub linked_indicator_ids: Vec<String>,
    pub notes: Option<String>,
    pub metadata: EvidenceMetadata,
}

impl EvidenceFile {
    pub fn new(
        file_name: impl Into<String>,
        kind: EvidenceKind,
        metadata: EvidenceMetadata,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name: file_name.into(),
            kind,
            uploaded_at: now,
            linked_indicator_ids: Vec::new(),
            notes: None,
            metadata,
        }
    }

    pub fn is_linked_to(&self, indicator_id: &str) -> bool {
        self.linked_indicator_ids.iter().any(|id| id == indicator_id)
    }
}

/// Outcome of cross-checking one indicator against its evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    #[serde(rename = "kpiId")]
    pub indicator_id: String,
    #[serde(rename = "kpiName", default)]
    pub indicator_name: String,
    #[serde(default)]
    pub reported_value: f64,
    #[serde(default)]
    pub evidence_value: Option<f64>,
    #[serde(default)]
    pub match_percentage: Option<f64>,
    pub status: ValidationStatus,
    #[serde(default)]
    pub evidence_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceData {
    pub files: Vec<EvidenceFile>,
    pub validation_results: Vec<ValidationResult>,
}

impl EvidenceData {
    pub fn file_mut(&mut self, id: Uuid) -> Option<&mut EvidenceFile> {
        self.files.iter_mut().find(|f| f.id == id)
    }

    /// Number of files linked to the given indicator.
    pub fn linked_count(&self, indicator_id: &str) -> usize {
        self.files.iter().filter(|f| f.is_linked_to(indicator_id)).count()
    }
}
