use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::View;
use super::evidence::EvidenceData;
use super::founding::FoundingDocumentRecord;
use super::progress::ReportsData;
use super::ratio::RatioData;

// ═══════════════════════════════════════════════════════════
// Stage
// ═══════════════════════════════════════════════════════════

/// One of the five sequential assessment phases, serialized as 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Stage(u8);

impl Stage {
    pub const FOUNDING: Stage = Stage(1);
    pub const PROGRESS: Stage = Stage(2);
    pub const EVIDENCE: Stage = Stage(3);
    pub const RATIO: Stage = Stage(4);
    pub const REPORT: Stage = Stage(5);

    pub const ALL: [Stage; 5] = [
        Self::FOUNDING,
        Self::PROGRESS,
        Self::EVIDENCE,
        Self::RATIO,
        Self::REPORT,
    ];

    /// `None` outside 1..=5.
    pub fn new(number: u8) -> Option<Self> {
        (1..=5).contains(&number).then_some(Self(number))
    }

    pub fn number(self) -> u8 {
        self.0
    }

    pub fn next(self) -> Option<Self> {
        Self::new(self.0 + 1)
    }

    pub fn previous(self) -> Option<Self> {
        self.0.checked_sub(1).and_then(Self::new)
    }

    fn index(self) -> usize {
        usize::from(self.0 - 1)
    }
}

impl TryFrom<u8> for Stage {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Stage::new(value).ok_or_else(|| format!("stage out of range: {value}"))
    }
}

impl From<Stage> for u8 {
    fn from(stage: Stage) -> u8 {
        stage.0
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stage {}", self.0)
    }
}

/// Five independent completion flags, one per stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageStatus {
    pub stage1_complete: bool,
    pub stage2_complete: bool,
    pub stage3_complete: bool,
    pub stage4_complete: bool,
    pub stage5_complete: bool,
}

impl StageStatus {
    fn flags(&self) -> [bool; 5] {
        [
            self.stage1_complete,
            self.stage2_complete,
            self.stage3_complete,
            self.stage4_complete,
            self.stage5_complete,
        ]
    }

    pub fn is_complete(&self, stage: Stage) -> bool {
        self.flags()[stage.index()]
    }

    pub fn set(&mut self, stage: Stage, complete: bool) {
        let slot = match stage.number() {
            1 => &mut self.stage1_complete,
            2 => &mut self.stage2_complete,
            3 => &mut self.stage3_complete,
            4 => &mut self.stage4_complete,
            _ => &mut self.stage5_complete,
        };
        *slot = complete;
    }

    pub fn clear_all(&mut self) {
        *self = Self::default();
    }

    pub fn any_complete(&self) -> bool {
        self.flags().iter().any(|f| *f)
    }

    /// Highest stage whose flag is set, if any.
    pub fn highest_complete(&self) -> Option<Stage> {
        Stage::ALL.into_iter().rev().find(|s| self.is_complete(*s))
    }
}

// ═══════════════════════════════════════════════════════════
// Assessment aggregate
// ═══════════════════════════════════════════════════════════

/// Report generation record (stage 5).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportData {
    pub generated_at: Option<DateTime<Utc>>,
}

/// Aggregate root: one assessment and everything it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: Uuid,
    pub name: String,
    pub partner_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub current_stage: Stage,
    pub stage_status: StageStatus,
    pub founding: FoundingDocumentRecord,
    pub reports: ReportsData,
    pub evidence: EvidenceData,
    pub ratio: RatioData,
    pub report: ReportData,
}

impl Assessment {
    pub fn new(name: impl Into<String>, partner_name: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            partner_name,
            created_at: now,
            updated_at: now,
            current_stage: Stage::FOUNDING,
            stage_status: StageStatus::default(),
            founding: FoundingDocumentRecord::default(),
            reports: ReportsData::default(),
            evidence: EvidenceData::default(),
            ratio: RatioData::default(),
            report: ReportData::default(),
        }
    }

    /// Investment used for portfolio rollups: entered investment, else
    /// the stated budget from the founding document, else zero.
    pub fn effective_investment(&self) -> f64 {
        if self.ratio.investment > 0.0 {
            return self.ratio.investment;
        }
        self.founding
            .fields
            .as_ref()
            .and_then(|f| f.total_budget)
            .filter(|b| *b > 0.0)
            .unwrap_or(0.0)
    }

    /// Whether anything derived from the founding indicators exists.
    pub fn has_downstream_data(&self) -> bool {
        !self.reports.progress.is_empty()
            || !self.evidence.validation_results.is_empty()
            || self.ratio.calculated_ratio.is_some()
    }
}

/// Serialized session snapshot: every assessment, the active one, and the view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub assessments: Vec<Assessment>,
    pub active_assessment_id: Option<Uuid>,
    pub view: View,
}
