//! PipelineRunner: extraction calls feeding store mutations.
//!
//! The store lock is held only to read inputs and to commit results,
//! never across a backend call. Progress reports are processed strictly
//! one at a time, in upload order.

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::Instrument;
use uuid::Uuid;

use super::error::{ExtractionError, PipelineError, RunError};
use super::extraction::{DocumentUpload, ExtractionService};
use super::store::{FoundingApplied, PipelineStore};
use crate::ai::{evidence_summary, indicator_context, linked_indicator_summary, BackendId};

/// Message stored on a document whose extraction was cancelled.
pub const CANCELLED_MESSAGE: &str = "Extraction cancelled";

/// Per-document outcome of a report batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub completed: Vec<Uuid>,
    pub failed: Vec<FailedDocument>,
    /// Left queued because the batch was cancelled.
    pub pending: Vec<Uuid>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedDocument {
    pub id: Uuid,
    pub error: String,
}

/// Sender half flips to `true` to cancel a running batch.
pub fn cancel_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Resolves once cancellation is requested; never if the sender is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|flag| *flag).await.is_err() {
        std::future::pending::<()>().await;
    }
}

pub struct PipelineRunner {
    extraction: ExtractionService,
}

impl PipelineRunner {
    pub fn new(extraction: ExtractionService) -> Self {
        Self { extraction }
    }

    pub fn extraction(&self) -> &ExtractionService {
        &self.extraction
    }

    /// Extract a founding document and apply it to the active assessment.
    pub async fn apply_founding(
        &self,
        store: &Mutex<PipelineStore>,
        upload: DocumentUpload,
        override_backend: Option<BackendId>,
        confirm_overwrite: bool,
    ) -> Result<FoundingApplied, RunError> {
        let assessment_id = {
            let store = store.lock().await;
            let active = store.active().ok_or(PipelineError::NoActiveAssessment)?;
            // Fail before spending an extraction call.
            if active.founding.confirmed && active.has_downstream_data() && !confirm_overwrite {
                return Err(PipelineError::OverwriteNeedsConfirmation.into());
            }
            active.id
        };

        let file_name = upload.file_name.clone();
        let extracted = self
            .extraction
            .extract_founding(upload, override_backend)
            .await?;

        let mut store = store.lock().await;
        ensure_still_active(&store, assessment_id)?;
        let applied = store.apply_founding_extraction(Some(file_name), extracted.value, confirm_overwrite)?;
        tracing::info!(backend = %extracted.backend, "Founding document extracted");
        Ok(applied)
    }

    /// Queue every upload, then extract them one by one.
    ///
    /// A failed document is marked `error` and the batch moves on. On
    /// cancellation the in-flight document is marked `error` and the rest
    /// stay `pending`.
    pub async fn process_reports(
        &self,
        store: &Mutex<PipelineStore>,
        uploads: Vec<DocumentUpload>,
        override_backend: Option<BackendId>,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<BatchSummary, RunError> {
        let (assessment_id, indicators, queued) = {
            let mut store = store.lock().await;
            let active = store.active().ok_or(PipelineError::NoActiveAssessment)?;
            let assessment_id = active.id;
            let indicators = active.founding.indicators.clone();
            if indicators.is_empty() {
                return Err(ExtractionError::InvalidInput("No indicators defined".into()).into());
            }

            let mut queued = Vec::with_capacity(uploads.len());
            for upload in uploads {
                let id = store.queue_report(&upload.file_name)?;
                queued.push((id, upload));
            }
            (assessment_id, indicators, queued)
        };

        let span = tracing::info_span!("report_batch", assessment_id = %assessment_id, documents = queued.len());
        async move {
            let mut summary = BatchSummary::default();
            let mut remaining = queued.into_iter();

            while let Some((id, upload)) = remaining.next() {
                if *cancel.borrow() {
                    summary.cancelled = true;
                    summary.pending.push(id);
                    summary.pending.extend(remaining.by_ref().map(|(id, _)| id));
                    break;
                }

                {
                    let mut store = store.lock().await;
                    ensure_still_active(&store, assessment_id)?;
                    store.begin_report(id)?;
                }

                let result = tokio::select! {
                    r = self.extraction.extract_progress(upload, &indicators, override_backend) => Some(r),
                    _ = cancelled(&mut cancel) => None,
                };

                let mut store = store.lock().await;
                ensure_still_active(&store, assessment_id)?;
                match result {
                    Some(Ok(extracted)) => {
                        store.complete_report(id, extracted.value)?;
                        summary.completed.push(id);
                    }
                    Some(Err(e)) => {
                        let message = e.to_string();
                        store.fail_report(id, &message)?;
                        summary.failed.push(FailedDocument { id, error: message });
                    }
                    None => {
                        store.fail_report(id, CANCELLED_MESSAGE)?;
                        summary.failed.push(FailedDocument {
                            id,
                            error: CANCELLED_MESSAGE.to_string(),
                        });
                        summary.cancelled = true;
                        summary.pending.extend(remaining.by_ref().map(|(id, _)| id));
                        break;
                    }
                }
            }

            tracing::info!(
                completed = summary.completed.len(),
                failed = summary.failed.len(),
                pending = summary.pending.len(),
                cancelled = summary.cancelled,
                "Report batch finished"
            );
            Ok::<_, RunError>(summary)
        }
        .instrument(span)
        .await
    }

    /// Validate linked evidence. On failure the previous results stay.
    pub async fn run_validation(
        &self,
        store: &Mutex<PipelineStore>,
        override_backend: Option<BackendId>,
    ) -> Result<usize, RunError> {
        let (assessment_id, evidence, indicators) = {
            let store = store.lock().await;
            let active = store.active().ok_or(PipelineError::NoActiveAssessment)?;
            (
                active.id,
                evidence_summary(&active.evidence.files),
                linked_indicator_summary(
                    &active.founding.indicators,
                    &active.reports.progress,
                    &active.evidence.files,
                ),
            )
        };
        if evidence.is_empty() {
            return Err(ExtractionError::InvalidInput(
                "No evidence files are linked to KPIs".into(),
            )
            .into());
        }

        let extracted = self
            .extraction
            .validate_evidence(&evidence, &indicators, override_backend)
            .await?;

        let mut store = store.lock().await;
        ensure_still_active(&store, assessment_id)?;
        Ok(store.apply_validation_results(extracted.value.validation_results)?)
    }

    /// Indicator ids an evidence file may relate to, restricted to the
    /// active assessment's indicators. Not applied.
    pub async fn suggest_links(
        &self,
        store: &Mutex<PipelineStore>,
        file_id: Uuid,
        override_backend: Option<BackendId>,
    ) -> Result<Vec<String>, PipelineError> {
        let (file_info, indicator_list) = {
            let store = store.lock().await;
            let active = store.active().ok_or(PipelineError::NoActiveAssessment)?;
            let file = active
                .evidence
                .files
                .iter()
                .find(|f| f.id == file_id)
                .ok_or(PipelineError::EvidenceNotFound(file_id))?;

            let mut info = format!("Name: {}\nType: {}", file.file_name, file.kind);
            if let Some(rows) = file.metadata.row_count {
                info.push_str(&format!("\nData rows: {rows}"));
            }
            (info, indicator_context(&active.founding.indicators))
        };

        let suggested = self
            .extraction
            .suggest_indicators(&file_info, &indicator_list, override_backend)
            .await;

        let store = store.lock().await;
        let Some(active) = store.active() else {
            return Ok(Vec::new());
        };
        Ok(suggested
            .into_iter()
            .filter(|id| active.founding.has_indicator(id))
            .collect())
    }
}

fn ensure_still_active(store: &PipelineStore, assessment_id: Uuid) -> Result<(), PipelineError> {
    if store.active_id() == Some(assessment_id) {
        Ok(())
    } else {
        Err(PipelineError::AssessmentNotFound(assessment_id))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::ai::mock::MockBackend;
    use crate::ai::{ExtractionBackend, ManualClock, ProviderOrchestrator};
    use crate::models::{ProcessingStatus, Stage, ValidationStatus};

    const FOUNDING: &str = r#"{"projectDetails": {"projectName": "STEM Labs", "ngoName": "Agastya", "totalBudget": 200000},
        "kpis": [{"id": "kpi-1", "name": "Students trained", "targetValue": 100, "unit": "count", "category": "output"}]}"#;

    fn progress(value: u32) -> String {
        format!(
            r#"{{"reportDate": "2024-0{value}-28", "reportPeriod": "Q", "kpiValues": [{{"kpiId": "kpi-1", "reportedValue": {value}, "reportDate": "2024-0{value}-28"}}]}}"#
        )
    }

    fn runner(claude: MockBackend, ollama: MockBackend) -> PipelineRunner {
        let backends: Vec<Arc<dyn ExtractionBackend>> = vec![
            Arc::new(claude) as Arc<dyn ExtractionBackend>,
            Arc::new(ollama),
        ];
        let orchestrator = ProviderOrchestrator::new(backends, None, Arc::new(ManualClock::new()));
        PipelineRunner::new(ExtractionService::new(Arc::new(orchestrator)))
    }

    fn pdf(name: &str) -> DocumentUpload {
        DocumentUpload::new(name, Some("application/pdf".into()), b"%PDF-1.4".to_vec())
    }

    async fn store_with_founding(runner: &PipelineRunner) -> Mutex<PipelineStore> {
        let mut store = PipelineStore::new();
        store.create_assessment("Draft", None).unwrap();
        let store = Mutex::new(store);
        runner.apply_founding(&store, pdf("mou.pdf"), None, false).await.unwrap();
        store
    }

    #[tokio::test]
    async fn founding_upload_is_applied() {
        let runner = runner(
            MockBackend::new(BackendId::Claude).with_response(FOUNDING),
            MockBackend::new(BackendId::Ollama),
        );
        let store = store_with_founding(&runner).await;
        let store = store.lock().await;
        let a = store.active().unwrap();
        assert_eq!(a.name, "STEM Labs");
        assert_eq!(a.founding.file_name.as_deref(), Some("mou.pdf"));
        assert_eq!(a.founding.indicators.len(), 1);
    }

    #[tokio::test]
    async fn invalid_founding_upload_changes_nothing() {
        let runner = runner(
            MockBackend::new(BackendId::Claude).with_response(FOUNDING),
            MockBackend::new(BackendId::Ollama),
        );
        let mut store = PipelineStore::new();
        store.create_assessment("Draft", None).unwrap();
        let store = Mutex::new(store);

        let err = runner
            .apply_founding(&store, DocumentUpload::new("mou.docx", None, vec![1]), None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Extraction(ExtractionError::InvalidInput(_))));
        assert!(store.lock().await.active().unwrap().founding.fields.is_none());
    }

    #[tokio::test]
    async fn batch_continues_past_a_failed_document() {
        // Second claude call fails; the PDF cannot be pre-extracted for the
        // local fallback, so that document errors.
        let claude = MockBackend::new(BackendId::Claude)
            .then_reply(FOUNDING)
            .then_reply(progress(1))
            .then_fail("overloaded")
            .with_response(progress(3));
        let runner = runner(claude, MockBackend::new(BackendId::Ollama).with_failure("down"));
        let store = store_with_founding(&runner).await;

        let (_tx, rx) = cancel_channel();
        let summary = runner
            .process_reports(&store, vec![pdf("a.pdf"), pdf("b.pdf"), pdf("c.pdf")], None, rx)
            .await
            .unwrap();

        assert_eq!(summary.completed.len(), 2);
        assert_eq!(summary.failed.len(), 1);
        assert!(!summary.cancelled);

        let store = store.lock().await;
        let a = store.active().unwrap();
        let statuses: Vec<_> = a.reports.documents.iter().map(|d| d.status).collect();
        assert_eq!(
            statuses,
            [ProcessingStatus::Completed, ProcessingStatus::Error, ProcessingStatus::Completed]
        );
        assert_eq!(a.reports.progress[0].current_value, 3.0);
    }

    #[tokio::test]
    async fn cancellation_marks_in_flight_document_only() {
        let claude = MockBackend::new(BackendId::Claude)
            .then_reply(FOUNDING)
            .with_response(progress(1))
            .with_delay(Duration::from_millis(200));
        let runner = runner(claude, MockBackend::new(BackendId::Ollama));
        let store = store_with_founding(&runner).await;

        let (tx, rx) = cancel_channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
        });
        let summary = runner
            .process_reports(&store, vec![pdf("a.pdf"), pdf("b.pdf")], None, rx)
            .await
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].error, CANCELLED_MESSAGE);
        assert_eq!(summary.pending.len(), 1);

        let store = store.lock().await;
        let docs = &store.active().unwrap().reports.documents;
        assert_eq!(docs[0].status, ProcessingStatus::Error);
        assert_eq!(docs[1].status, ProcessingStatus::Pending);
    }

    #[tokio::test]
    async fn failed_validation_keeps_previous_results() {
        let validation = r#"{"validationResults": [{"kpiId": "kpi-1", "kpiName": "Students trained",
            "reportedValue": 1, "evidenceValue": 1, "matchPercentage": 100, "status": "verified", "evidenceCount": 1}]}"#;
        let claude = MockBackend::new(BackendId::Claude)
            .then_reply(FOUNDING)
            .then_reply(validation)
            .with_failure("down");
        let runner = runner(claude, MockBackend::new(BackendId::Ollama).with_failure("down"));
        let store = store_with_founding(&runner).await;

        assert!(matches!(
            runner.run_validation(&store, None).await,
            Err(RunError::Extraction(ExtractionError::InvalidInput(_)))
        ));

        {
            let mut s = store.lock().await;
            let file = s.add_evidence("survey.csv", None, Some(b"h\n1")).unwrap();
            s.link_evidence(file, "kpi-1").unwrap();
        }
        assert_eq!(runner.run_validation(&store, None).await.unwrap(), 1);
        assert!(runner.run_validation(&store, None).await.is_err());

        let store = store.lock().await;
        let results = &store.active().unwrap().evidence.validation_results;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, ValidationStatus::Verified);
    }

    #[tokio::test]
    async fn overwrite_check_happens_before_extraction() {
        let claude = MockBackend::new(BackendId::Claude)
            .then_reply(FOUNDING)
            .then_reply(progress(5))
            .with_response(FOUNDING);
        let runner = runner(claude, MockBackend::new(BackendId::Ollama));
        let store = store_with_founding(&runner).await;
        store.lock().await.confirm_stage(Stage::FOUNDING).unwrap();
        let (_tx, rx) = cancel_channel();
        runner
            .process_reports(&store, vec![pdf("q1.pdf")], None, rx)
            .await
            .unwrap();

        let err = runner
            .apply_founding(&store, pdf("mou2.pdf"), None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Store(PipelineError::OverwriteNeedsConfirmation)));

        let applied = runner.apply_founding(&store, pdf("mou2.pdf"), None, true).await.unwrap();
        assert!(applied.cascade_reset);
    }

    #[tokio::test]
    async fn suggestions_are_limited_to_known_indicators() {
        let claude = MockBackend::new(BackendId::Claude)
            .then_reply(FOUNDING)
            .with_response(r#"{"kpiIds": ["kpi-1", "kpi-99"]}"#);
        let runner = runner(claude, MockBackend::new(BackendId::Ollama));
        let store = store_with_founding(&runner).await;
        let file = store.lock().await.add_evidence("site.jpg", None, None).unwrap();

        let ids = runner.suggest_links(&store, file, None).await.unwrap();
        assert_eq!(ids, ["kpi-1"]);
    }
}
