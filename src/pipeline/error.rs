use thiserror::Error;
use uuid::Uuid;

use crate::ai::ProviderError;
use crate::models::Stage;

/// A store mutation that was rejected. The committed state is unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("No active assessment")]
    NoActiveAssessment,

    #[error("Assessment not found: {0}")]
    AssessmentNotFound(Uuid),

    #[error("{0} is confirmed and locked")]
    StageLocked(Stage),

    #[error("Cannot confirm {stage}: {reason}")]
    GateNotMet { stage: Stage, reason: String },

    #[error("Founding document is confirmed and downstream data exists; overwrite must be confirmed")]
    OverwriteNeedsConfirmation,

    #[error("Unknown indicator: {0}")]
    UnknownIndicator(String),

    #[error("Indicator id already in use: {0}")]
    DuplicateIndicator(String),

    #[error("Progress document not found: {0}")]
    DocumentNotFound(Uuid),

    #[error("Evidence file not found: {0}")]
    EvidenceNotFound(Uuid),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Failure of an extraction request made on behalf of the pipeline.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// Rejected before any backend call.
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl ExtractionError {
    /// Whether the user may usefully retry (or fall back to manual entry).
    pub fn can_retry(&self) -> bool {
        matches!(
            self,
            ExtractionError::Provider(ProviderError::AllBackendsFailed { .. })
        )
    }
}

/// Failure of a pipeline run that combines extraction with a store update.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Store(#[from] PipelineError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}
