//! PipelineStore: the assessment list, the active assessment and every
//! mutation the pipeline allows on it.
//!
//! Mutations run against a draft copy of the active assessment and are
//! committed only when they succeed, so a rejected call never leaves a
//! half-applied change behind. Derived views (progress, ratio) are
//! recomputed inside the same mutation.

use std::collections::HashSet;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::error::PipelineError;
use super::evidence::{detect_evidence_kind, upload_metadata};
use super::stage::{can_enter, AutoTrigger, StageTransition};
use crate::ai::FoundingExtraction;
use crate::analytics;
use crate::models::{
    AdjustmentFactors, Assessment, EvidenceFile, ExtractedFields, ExtractionResult,
    FoundingDocumentRecord, Indicator, ProcessingStatus, RatioCalculation, RatioData,
    SessionSnapshot, Stage, UploadedDocument, ValidationResult, View,
};

/// Error left on report documents whose extraction was cleared by a
/// founding overwrite. The upload bytes are not kept.
pub const STALE_REPORT_MESSAGE: &str = "Indicators changed; re-upload to extract";

/// What a founding-document apply did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FoundingApplied {
    /// Downstream data was cleared and every stage flag reset.
    pub cascade_reset: bool,
    pub indicator_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineStore {
    assessments: Vec<Assessment>,
    active_id: Option<Uuid>,
    view: View,
}

impl PipelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore from a persisted snapshot. A dangling active id is dropped.
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        let SessionSnapshot {
            assessments,
            active_assessment_id,
            view,
        } = snapshot;

        let active_id = active_assessment_id.filter(|id| assessments.iter().any(|a| a.id == *id));
        let view = if active_id.is_some() { view } else { View::Dashboard };

        Self {
            assessments,
            active_id,
            view,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            assessments: self.assessments.clone(),
            active_assessment_id: self.active_id,
            view: self.view,
        }
    }

    pub fn assessments(&self) -> &[Assessment] {
        &self.assessments
    }

    pub fn get(&self, id: Uuid) -> Option<&Assessment> {
        self.assessments.iter().find(|a| a.id == id)
    }

    pub fn active(&self) -> Option<&Assessment> {
        self.active_id.and_then(|id| self.get(id))
    }

    pub fn active_id(&self) -> Option<Uuid> {
        self.active_id
    }

    pub fn view(&self) -> View {
        self.view
    }

    /// Run `f` on a copy of the active assessment and commit it on success.
    fn update_active<T>(
        &mut self,
        f: impl FnOnce(&mut Assessment) -> Result<T, PipelineError>,
    ) -> Result<T, PipelineError> {
        let id = self.active_id.ok_or(PipelineError::NoActiveAssessment)?;
        let slot = self
            .assessments
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(PipelineError::NoActiveAssessment)?;

        let mut draft = slot.clone();
        let out = f(&mut draft)?;
        draft.updated_at = Utc::now();
        *slot = draft;
        Ok(out)
    }

    // ═══════════════════════════════════════════════════════════
    // Assessment management
    // ═══════════════════════════════════════════════════════════

    /// Create an assessment and make it active.
    pub fn create_assessment(
        &mut self,
        name: &str,
        partner_name: Option<String>,
    ) -> Result<Uuid, PipelineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PipelineError::InvalidValue("assessment name is empty".into()));
        }
        let partner_name = partner_name
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        let assessment = Assessment::new(name, partner_name, Utc::now());
        let id = assessment.id;
        self.assessments.push(assessment);
        self.active_id = Some(id);
        self.view = View::Assessment;
        tracing::info!(assessment_id = %id, "Assessment created");
        Ok(id)
    }

    pub fn open_assessment(&mut self, id: Uuid) -> Result<(), PipelineError> {
        if self.get(id).is_none() {
            return Err(PipelineError::AssessmentNotFound(id));
        }
        self.active_id = Some(id);
        self.view = View::Assessment;
        Ok(())
    }

    pub fn delete_assessment(&mut self, id: Uuid) -> Result<(), PipelineError> {
        let before = self.assessments.len();
        self.assessments.retain(|a| a.id != id);
        if self.assessments.len() == before {
            return Err(PipelineError::AssessmentNotFound(id));
        }
        if self.active_id == Some(id) {
            self.active_id = None;
            self.view = View::Dashboard;
        }
        tracing::info!(assessment_id = %id, "Assessment deleted");
        Ok(())
    }

    pub fn go_to_dashboard(&mut self) {
        self.active_id = None;
        self.view = View::Dashboard;
    }

    /// Return one assessment to its freshly created state, keeping its
    /// identity, name and partner.
    pub fn reset_assessment(&mut self, id: Uuid) -> Result<(), PipelineError> {
        let slot = self
            .assessments
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(PipelineError::AssessmentNotFound(id))?;

        let mut fresh = Assessment::new(slot.name.clone(), slot.partner_name.clone(), Utc::now());
        fresh.id = slot.id;
        fresh.created_at = slot.created_at;
        *slot = fresh;
        tracing::info!(assessment_id = %id, "Assessment reset");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════
    // Stage navigation
    // ═══════════════════════════════════════════════════════════

    /// Move to `stage`. Returns `false` (and changes nothing) when the
    /// stage is not reachable yet.
    pub fn go_to(&mut self, stage: u8) -> Result<bool, PipelineError> {
        let active = self.active().ok_or(PipelineError::NoActiveAssessment)?;
        if !can_enter(active.current_stage, &active.stage_status, stage) {
            tracing::debug!(stage, "Ignoring navigation to locked stage");
            return Ok(false);
        }
        let Some(target) = Stage::new(stage) else {
            return Ok(false);
        };

        self.update_active(|a| {
            a.current_stage = target;
            if target == Stage::RATIO {
                seed_outcomes_if_needed(a);
                recompute_ratio(a);
            }
            Ok(true)
        })
    }

    pub fn advance(&mut self) -> Result<bool, PipelineError> {
        let current = self
            .active()
            .ok_or(PipelineError::NoActiveAssessment)?
            .current_stage;
        self.go_to(current.number() + 1)
    }

    pub fn retreat(&mut self) -> Result<bool, PipelineError> {
        let current = self
            .active()
            .ok_or(PipelineError::NoActiveAssessment)?
            .current_stage;
        self.go_to(current.number().saturating_sub(1))
    }

    /// Explicitly confirm a reached stage after checking its gate.
    /// Confirming the current stage also moves on to the next one.
    pub fn confirm_stage(&mut self, stage: Stage) -> Result<(), PipelineError> {
        self.update_active(|a| {
            let gate = |reason: &str| PipelineError::GateNotMet {
                stage,
                reason: reason.to_string(),
            };
            if stage > a.current_stage {
                return Err(gate("stage has not been reached yet"));
            }

            match stage.number() {
                1 => {
                    if a.founding.indicators.is_empty() {
                        return Err(gate("at least one indicator is required"));
                    }
                    a.founding.confirmed = true;
                }
                2 => {
                    if a.reports.completed_count() == 0 {
                        return Err(gate("no progress report has been processed"));
                    }
                }
                3 => {
                    if a.evidence.files.is_empty() {
                        return Err(gate("no evidence file has been uploaded"));
                    }
                }
                4 => {
                    // Completes on its own once the ratio is positive.
                    if a.ratio.calculated_ratio.is_none() {
                        return Err(gate("completes automatically once a positive ratio is calculated"));
                    }
                    return Ok(());
                }
                _ => {
                    if a.ratio.calculated_ratio.is_none() {
                        return Err(gate("no ratio has been calculated"));
                    }
                    a.report.generated_at = Some(Utc::now());
                }
            }

            StageTransition::ManualConfirm(stage).apply(&mut a.stage_status);
            if a.current_stage == stage {
                if let Some(next) = stage.next() {
                    a.current_stage = next;
                    if next == Stage::RATIO {
                        seed_outcomes_if_needed(a);
                        recompute_ratio(a);
                    }
                }
            }
            Ok(())
        })
    }

    /// Record report generation (stage 5).
    pub fn mark_report_generated(&mut self) -> Result<(), PipelineError> {
        self.confirm_stage(Stage::REPORT)
    }

    // ═══════════════════════════════════════════════════════════
    // Stage 1: founding document
    // ═══════════════════════════════════════════════════════════

    /// Replace the founding record with an extraction.
    ///
    /// Overwriting a confirmed record that already has downstream data
    /// needs `confirm_overwrite` and cascades: derived progress, evidence
    /// links and validation, outcomes and ratio are cleared and every stage
    /// flag reset. Uploaded report and evidence files are kept.
    pub fn apply_founding_extraction(
        &mut self,
        file_name: Option<String>,
        extraction: FoundingExtraction,
        confirm_overwrite: bool,
    ) -> Result<FoundingApplied, PipelineError> {
        self.update_active(|a| {
            let cascade = a.founding.confirmed && a.has_downstream_data();
            if cascade && !confirm_overwrite {
                return Err(PipelineError::OverwriteNeedsConfirmation);
            }
            if cascade {
                cascade_reset(a);
            } else {
                a.stage_status.set(Stage::FOUNDING, false);
            }

            let FoundingExtraction {
                project_details,
                kpis,
            } = extraction;

            if let Some(name) = non_blank(project_details.project_name.as_deref()) {
                a.name = name;
            }
            if let Some(partner) = non_blank(project_details.partner_name.as_deref()) {
                a.partner_name = Some(partner);
            }

            let mut indicators = kpis;
            normalize_indicator_ids(&mut indicators);
            let indicator_count = indicators.len();

            a.founding = FoundingDocumentRecord {
                file_name,
                uploaded_at: Some(Utc::now()),
                fields: Some(project_details),
                indicators,
                confirmed: false,
            };

            clamp_current_stage(a);
            purge_stale_references(a);
            recompute_progress(a);
            recompute_ratio(a);

            tracing::info!(
                assessment_id = %a.id,
                indicators = indicator_count,
                cascade_reset = cascade,
                "Founding document applied"
            );
            Ok(FoundingApplied {
                cascade_reset: cascade,
                indicator_count,
            })
        })
    }

    /// Start manual entry instead of extraction: empty fields, project
    /// name defaulting to the assessment name, no source file.
    pub fn start_manual_entry(&mut self) -> Result<(), PipelineError> {
        self.update_active(|a| {
            ensure_founding_unlocked(a)?;
            a.founding.file_name = None;
            a.founding.uploaded_at = None;
            a.founding.fields = Some(ExtractedFields {
                project_name: Some(a.name.clone()),
                partner_name: a.partner_name.clone(),
                ..ExtractedFields::default()
            });
            Ok(())
        })
    }

    pub fn update_fields(&mut self, fields: ExtractedFields) -> Result<(), PipelineError> {
        self.update_active(|a| {
            ensure_founding_unlocked(a)?;
            a.founding.fields = Some(fields);
            Ok(())
        })
    }

    /// Add an indicator; an empty id is assigned. Returns the id.
    pub fn add_indicator(&mut self, indicator: Indicator) -> Result<String, PipelineError> {
        self.update_active(|a| {
            ensure_founding_unlocked(a)?;
            validate_indicator(&indicator)?;

            let mut indicator = indicator;
            indicator.id = indicator.id.trim().to_string();
            if indicator.id.is_empty() {
                indicator.id = next_indicator_id(&a.founding.indicators);
            } else if a.founding.has_indicator(&indicator.id) {
                return Err(PipelineError::DuplicateIndicator(indicator.id));
            }

            let id = indicator.id.clone();
            a.founding.indicators.push(indicator);
            Ok(id)
        })
    }

    pub fn update_indicator(&mut self, indicator: Indicator) -> Result<(), PipelineError> {
        self.update_active(|a| {
            ensure_founding_unlocked(a)?;
            validate_indicator(&indicator)?;

            let slot = a
                .founding
                .indicators
                .iter_mut()
                .find(|k| k.id == indicator.id)
                .ok_or_else(|| PipelineError::UnknownIndicator(indicator.id.clone()))?;
            *slot = indicator.clone();

            for outcome in a.ratio.outcomes.iter_mut().filter(|o| o.indicator_id == indicator.id) {
                outcome.indicator_name = indicator.name.clone();
                outcome.unit = indicator.unit.clone();
            }
            recompute_progress(a);
            Ok(())
        })
    }

    /// Remove an indicator and every reference to it.
    pub fn remove_indicator(&mut self, id: &str) -> Result<(), PipelineError> {
        self.update_active(|a| {
            ensure_founding_unlocked(a)?;
            if !a.founding.has_indicator(id) {
                return Err(PipelineError::UnknownIndicator(id.to_string()));
            }
            a.founding.indicators.retain(|k| k.id != id);
            purge_stale_references(a);
            recompute_progress(a);
            recompute_ratio(a);
            Ok(())
        })
    }

    // ═══════════════════════════════════════════════════════════
    // Stage 2: progress reports
    // ═══════════════════════════════════════════════════════════

    /// Add a report to the processing queue.
    pub fn queue_report(&mut self, file_name: &str) -> Result<Uuid, PipelineError> {
        self.update_active(|a| {
            let doc = UploadedDocument::queued(file_name, Utc::now());
            let id = doc.id;
            a.reports.documents.push(doc);
            Ok(id)
        })
    }

    pub fn begin_report(&mut self, id: Uuid) -> Result<(), PipelineError> {
        self.update_active(|a| {
            let doc = a
                .reports
                .document_mut(id)
                .ok_or(PipelineError::DocumentNotFound(id))?;
            doc.status = ProcessingStatus::Processing;
            doc.error = None;
            Ok(())
        })
    }

    /// Store an extraction for a document and recompute progress.
    /// Values for unknown indicators are dropped. Returns the number kept.
    pub fn complete_report(
        &mut self,
        id: Uuid,
        extraction: ExtractionResult,
    ) -> Result<usize, PipelineError> {
        self.update_active(|a| {
            let known: HashSet<String> = indicator_ids(a);
            let mut extraction = extraction;
            let default_date = extraction.report_date.clone().unwrap_or_default();

            extraction
                .values
                .retain(|v| known.contains(&v.indicator_id) && v.reported_value.is_finite());
            for value in extraction.values.iter_mut() {
                if value.report_date.trim().is_empty() {
                    value.report_date = default_date.clone();
                }
            }
            let kept = extraction.values.len();

            let doc = a
                .reports
                .document_mut(id)
                .ok_or(PipelineError::DocumentNotFound(id))?;
            doc.report_period = extraction.report_period.clone();
            doc.status = ProcessingStatus::Completed;
            doc.error = None;
            doc.extraction = Some(extraction);

            recompute_progress(a);
            tracing::info!(document_id = %id, values = kept, "Progress report completed");
            Ok(kept)
        })
    }

    pub fn fail_report(&mut self, id: Uuid, message: &str) -> Result<(), PipelineError> {
        self.update_active(|a| {
            let doc = a
                .reports
                .document_mut(id)
                .ok_or(PipelineError::DocumentNotFound(id))?;
            doc.status = ProcessingStatus::Error;
            doc.error = Some(message.to_string());
            tracing::warn!(document_id = %id, error = message, "Progress report failed");
            Ok(())
        })
    }

    pub fn remove_report(&mut self, id: Uuid) -> Result<(), PipelineError> {
        self.update_active(|a| {
            let before = a.reports.documents.len();
            a.reports.documents.retain(|d| d.id != id);
            if a.reports.documents.len() == before {
                return Err(PipelineError::DocumentNotFound(id));
            }
            recompute_progress(a);
            Ok(())
        })
    }

    /// Set (`Some`) or clear (`None`) a manual current value.
    pub fn set_progress_override(
        &mut self,
        indicator_id: &str,
        value: Option<f64>,
    ) -> Result<(), PipelineError> {
        self.update_active(|a| {
            ensure_stage_unlocked(a, Stage::PROGRESS)?;
            if !a.founding.has_indicator(indicator_id) {
                return Err(PipelineError::UnknownIndicator(indicator_id.to_string()));
            }
            match value {
                Some(v) if !v.is_finite() || v < 0.0 => {
                    return Err(PipelineError::InvalidValue(format!("override {v}")));
                }
                Some(v) => {
                    a.reports.overrides.insert(indicator_id.to_string(), v);
                }
                None => {
                    a.reports.overrides.remove(indicator_id);
                }
            }
            recompute_progress(a);
            Ok(())
        })
    }

    // ═══════════════════════════════════════════════════════════
    // Stage 3: evidence
    // ═══════════════════════════════════════════════════════════

    pub fn add_evidence(
        &mut self,
        file_name: &str,
        content_type: Option<&str>,
        content: Option<&[u8]>,
    ) -> Result<Uuid, PipelineError> {
        self.update_active(|a| {
            ensure_stage_unlocked(a, Stage::EVIDENCE)?;
            let kind = detect_evidence_kind(file_name, content_type);
            let file = EvidenceFile::new(file_name, kind, upload_metadata(kind, content), Utc::now());
            let id = file.id;
            a.evidence.files.push(file);
            tracing::debug!(evidence_id = %id, kind = %kind, "Evidence added");
            Ok(id)
        })
    }

    pub fn link_evidence(&mut self, file_id: Uuid, indicator_id: &str) -> Result<(), PipelineError> {
        self.update_active(|a| {
            ensure_stage_unlocked(a, Stage::EVIDENCE)?;
            if !a.founding.has_indicator(indicator_id) {
                return Err(PipelineError::UnknownIndicator(indicator_id.to_string()));
            }
            let file = a
                .evidence
                .file_mut(file_id)
                .ok_or(PipelineError::EvidenceNotFound(file_id))?;
            if !file.is_linked_to(indicator_id) {
                file.linked_indicator_ids.push(indicator_id.to_string());
            }
            Ok(())
        })
    }

    pub fn unlink_evidence(&mut self, file_id: Uuid, indicator_id: &str) -> Result<(), PipelineError> {
        self.update_active(|a| {
            ensure_stage_unlocked(a, Stage::EVIDENCE)?;
            let file = a
                .evidence
                .file_mut(file_id)
                .ok_or(PipelineError::EvidenceNotFound(file_id))?;
            file.linked_indicator_ids.retain(|id| id != indicator_id);
            Ok(())
        })
    }

    /// Replace a file's links. Every id must exist; duplicates collapse.
    pub fn set_evidence_links(
        &mut self,
        file_id: Uuid,
        indicator_ids: &[String],
    ) -> Result<(), PipelineError> {
        self.update_active(|a| {
            ensure_stage_unlocked(a, Stage::EVIDENCE)?;
            if let Some(unknown) = indicator_ids.iter().find(|id| !a.founding.has_indicator(id)) {
                return Err(PipelineError::UnknownIndicator(unknown.clone()));
            }
            let file = a
                .evidence
                .file_mut(file_id)
                .ok_or(PipelineError::EvidenceNotFound(file_id))?;
            file.linked_indicator_ids.clear();
            for id in indicator_ids {
                if !file.is_linked_to(id) {
                    file.linked_indicator_ids.push(id.clone());
                }
            }
            Ok(())
        })
    }

    pub fn set_evidence_notes(
        &mut self,
        file_id: Uuid,
        notes: Option<String>,
    ) -> Result<(), PipelineError> {
        self.update_active(|a| {
            ensure_stage_unlocked(a, Stage::EVIDENCE)?;
            let file = a
                .evidence
                .file_mut(file_id)
                .ok_or(PipelineError::EvidenceNotFound(file_id))?;
            file.notes = notes.filter(|n| !n.trim().is_empty());
            Ok(())
        })
    }

    pub fn remove_evidence(&mut self, file_id: Uuid) -> Result<(), PipelineError> {
        self.update_active(|a| {
            ensure_stage_unlocked(a, Stage::EVIDENCE)?;
            let before = a.evidence.files.len();
            a.evidence.files.retain(|f| f.id != file_id);
            if a.evidence.files.len() == before {
                return Err(PipelineError::EvidenceNotFound(file_id));
            }
            Ok(())
        })
    }

    /// Replace validation results with a new run. Results for unknown
    /// indicators are dropped. Returns the number kept.
    pub fn apply_validation_results(
        &mut self,
        results: Vec<ValidationResult>,
    ) -> Result<usize, PipelineError> {
        self.update_active(|a| {
            let mut results = results;
            results.retain(|r| a.founding.has_indicator(&r.indicator_id));
            for result in results.iter_mut() {
                if result.indicator_name.trim().is_empty() {
                    if let Some(k) = a.founding.indicator(&result.indicator_id) {
                        result.indicator_name = k.name.clone();
                    }
                }
            }
            let kept = results.len();
            a.evidence.validation_results = results;
            tracing::info!(assessment_id = %a.id, results = kept, "Validation results applied");
            Ok(kept)
        })
    }

    // ═══════════════════════════════════════════════════════════
    // Stage 4: ratio
    // ═══════════════════════════════════════════════════════════

    pub fn set_investment(&mut self, investment: f64) -> Result<(), PipelineError> {
        if !investment.is_finite() || investment < 0.0 {
            return Err(PipelineError::InvalidValue(format!("investment {investment}")));
        }
        self.update_active(|a| {
            a.ratio.investment = investment;
            recompute_ratio(a);
            Ok(())
        })
    }

    /// Store adjustment factors, clamped into their allowed range.
    pub fn set_adjustments(&mut self, adjustments: AdjustmentFactors) -> Result<(), PipelineError> {
        self.update_active(|a| {
            a.ratio.adjustments = adjustments.clamped();
            recompute_ratio(a);
            Ok(())
        })
    }

    pub fn update_outcome(
        &mut self,
        indicator_id: &str,
        monetized_value: f64,
        method: Option<String>,
    ) -> Result<(), PipelineError> {
        if !monetized_value.is_finite() || monetized_value < 0.0 {
            return Err(PipelineError::InvalidValue(format!("monetized value {monetized_value}")));
        }
        self.update_active(|a| {
            let outcome = a
                .ratio
                .outcomes
                .iter_mut()
                .find(|o| o.indicator_id == indicator_id)
                .ok_or_else(|| PipelineError::UnknownIndicator(indicator_id.to_string()))?;
            outcome.monetized_value = monetized_value;
            if let Some(method) = method {
                outcome.monetization_method = method;
            }
            recompute_ratio(a);
            Ok(())
        })
    }

    /// Seed outcomes from progress when none carries a value yet.
    /// Returns whether seeding happened.
    pub fn seed_outcomes(&mut self) -> Result<bool, PipelineError> {
        self.update_active(|a| {
            let seeded = seed_outcomes_if_needed(a);
            recompute_ratio(a);
            Ok(seeded)
        })
    }

    /// Full ratio breakdown for the active assessment.
    pub fn ratio_breakdown(&self) -> Option<RatioCalculation> {
        self.active().map(|a| {
            analytics::calculate_ratio(&a.ratio.outcomes, a.ratio.investment, a.ratio.adjustments)
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Recompute and cascade helpers
// ═══════════════════════════════════════════════════════════

fn recompute_progress(a: &mut Assessment) {
    let mut progress = analytics::compute_progress(&a.founding.indicators, &a.reports.documents);
    analytics::apply_overrides(&mut progress, &a.reports.overrides);
    a.reports.progress = progress;
}

/// Cache the ratio when positive; a positive ratio completes stage 4.
fn recompute_ratio(a: &mut Assessment) {
    let calc = analytics::calculate_ratio(&a.ratio.outcomes, a.ratio.investment, a.ratio.adjustments);
    a.ratio.calculated_ratio = (calc.ratio > 0.0).then_some(calc.ratio);

    if a.ratio.calculated_ratio.is_some() {
        StageTransition::AutoComplete {
            stage: Stage::RATIO,
            trigger: AutoTrigger::PositiveRatio,
        }
        .apply(&mut a.stage_status);
    }
}

fn seed_outcomes_if_needed(a: &mut Assessment) -> bool {
    if a.reports.progress.is_empty() || !analytics::outcomes_need_seeding(&a.ratio.outcomes) {
        return false;
    }
    a.ratio.outcomes = analytics::seed_outcomes(&a.reports.progress);
    tracing::debug!(outcomes = a.ratio.outcomes.len(), "Outcomes seeded from progress");
    true
}

/// Clear everything derived from the founding indicators.
fn cascade_reset(a: &mut Assessment) {
    a.reports.progress.clear();
    a.reports.overrides.clear();
    for doc in a.reports.documents.iter_mut() {
        doc.status = ProcessingStatus::Error;
        doc.extraction = None;
        doc.report_period = None;
        doc.error = Some(STALE_REPORT_MESSAGE.to_string());
    }

    a.evidence.validation_results.clear();
    for file in a.evidence.files.iter_mut() {
        file.linked_indicator_ids.clear();
    }

    a.ratio = RatioData {
        investment: a.ratio.investment,
        adjustments: a.ratio.adjustments,
        ..RatioData::default()
    };
    a.report.generated_at = None;
    a.stage_status.clear_all();
    a.current_stage = Stage::FOUNDING;

    tracing::warn!(assessment_id = %a.id, "Founding overwrite cleared downstream data");
}

/// Drop references to indicator ids that no longer exist.
fn purge_stale_references(a: &mut Assessment) {
    let known = indicator_ids(a);

    a.reports.overrides.retain(|id, _| known.contains(id));
    for extraction in a.reports.documents.iter_mut().filter_map(|d| d.extraction.as_mut()) {
        extraction.values.retain(|v| known.contains(&v.indicator_id));
    }
    a.ratio.outcomes.retain(|o| known.contains(&o.indicator_id));
    a.evidence.validation_results.retain(|r| known.contains(&r.indicator_id));
    for file in a.evidence.files.iter_mut() {
        file.linked_indicator_ids.retain(|id| known.contains(id));
    }
}

/// Keep the current stage within one of the highest confirmed stage.
fn clamp_current_stage(a: &mut Assessment) {
    let highest = a.stage_status.highest_complete().map_or(0, Stage::number);
    if let Some(limit) = Stage::new(highest + 1) {
        if a.current_stage > limit {
            a.current_stage = limit;
        }
    }
}

fn ensure_founding_unlocked(a: &Assessment) -> Result<(), PipelineError> {
    if a.founding.confirmed {
        return Err(PipelineError::StageLocked(Stage::FOUNDING));
    }
    Ok(())
}

fn ensure_stage_unlocked(a: &Assessment, stage: Stage) -> Result<(), PipelineError> {
    if a.stage_status.is_complete(stage) {
        return Err(PipelineError::StageLocked(stage));
    }
    Ok(())
}

fn validate_indicator(indicator: &Indicator) -> Result<(), PipelineError> {
    if indicator.name.trim().is_empty() {
        return Err(PipelineError::InvalidValue("indicator name is empty".into()));
    }
    if !indicator.target_value.is_finite() || indicator.target_value < 0.0 {
        return Err(PipelineError::InvalidValue(format!(
            "indicator target {}",
            indicator.target_value
        )));
    }
    Ok(())
}

fn indicator_ids(a: &Assessment) -> HashSet<String> {
    a.founding.indicators.iter().map(|k| k.id.clone()).collect()
}

fn next_indicator_id(existing: &[Indicator]) -> String {
    (existing.len() + 1..)
        .map(|n| format!("kpi-{n}"))
        .find(|id| !existing.iter().any(|k| &k.id == id))
        .unwrap_or_default()
}

/// Give blank or repeated ids a fresh `kpi-N`.
fn normalize_indicator_ids(indicators: &mut [Indicator]) {
    let mut seen = HashSet::new();
    let mut n = 1usize;
    for i in 0..indicators.len() {
        let id = indicators[i].id.trim().to_string();
        if !id.is_empty() && seen.insert(id.clone()) {
            indicators[i].id = id;
            continue;
        }
        let fresh = loop {
            let candidate = format!("kpi-{n}");
            n += 1;
            let taken = seen.contains(&candidate)
                || indicators.iter().skip(i + 1).any(|k| k.id.trim() == candidate);
            if !taken {
                break candidate;
            }
        };
        seen.insert(fresh.clone());
        indicators[i].id = fresh;
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(String::from)
}
