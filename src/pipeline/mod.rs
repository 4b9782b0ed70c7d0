//! Staged assessment pipeline: the store and its state machine, request
//! validation, and the runner that feeds extraction results into the store.

pub mod error;
pub mod evidence;
pub mod extraction;
pub mod runner;
pub mod stage;
pub mod store;

pub use error::{ExtractionError, PipelineError, RunError};
pub use extraction::{DocumentUpload, ExtractionService};
pub use runner::{cancel_channel, BatchSummary, FailedDocument, PipelineRunner};
pub use stage::{AutoTrigger, StageTransition};
pub use store::{FoundingApplied, PipelineStore};
