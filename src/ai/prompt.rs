//! Extraction instructions shared by every backend.
//!
//! The reply schemas below are the contract decoded by `parser`.

use crate::models::{EvidenceFile, Indicator, ProgressPoint};

pub const FOUNDING_EXTRACTION_PROMPT: &str = r#"You are a CSR impact analyst reading a Memorandum of Understanding (MoU).

Measurable commitments are often scattered across purpose, scope, roles, deliverables and reporting clauses. Read the whole document.

Extract:
1. projectDetails: projectName, ngoName (the implementing partner, not the funder), location, duration, startDate (YYYY-MM-DD, signing date if no start date), totalBudget (number in INR, null if absent).
2. kpis: every quantifiable commitment (numeric targets, reporting frequencies, personnel, events, infrastructure, outreach). When a deliverable has no explicit number, infer a reasonable annual target. Aim for 8-15 indicators.
   For each: id ("kpi-1", "kpi-2", ...), name, targetValue (number), unit ("count", "%", "₹", ...), targetDate (YYYY-MM-DD or null), category ("output" for activities, "outcome" for immediate results, "impact" for long-term change).

Return ONLY valid JSON in exactly this shape:
{
  "projectDetails": {"projectName": "string", "ngoName": "string", "location": "string", "duration": "string", "startDate": "string", "totalBudget": number | null},
  "kpis": [{"id": "string", "name": "string", "targetValue": number, "unit": "string", "targetDate": "string | null", "category": "output | outcome | impact"}]
}"#;

/// Fallback indicator context when none is supplied.
pub const NO_INDICATOR_CONTEXT: &str =
    "No KPIs provided - extract any measurable values found.";

/// `- id: name (target: T unit, category: c)` per indicator.
pub fn indicator_context(indicators: &[Indicator]) -> String {
    indicators
        .iter()
        .map(|k| {
            format!(
                "- {}: {} (target: {} {}, category: {})",
                k.id,
                k.name,
                k.target_value,
                k.unit,
                k.category.as_str()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn progress_extraction_prompt(indicator_context: &str) -> String {
    let context = if indicator_context.trim().is_empty() {
        NO_INDICATOR_CONTEXT
    } else {
        indicator_context
    };
    format!(
        r#"You are analyzing an NGO progress report for a CSR project.

Match reported values against these KPIs:

{context}

Extract reportDate (YYYY-MM-DD), reportPeriod (e.g. "Q1 2024") and, for every listed KPI with a value in this report: kpiId, reportedValue (number), reportDate (YYYY-MM-DD), notes (string or null).

Return ONLY valid JSON in exactly this shape:
{{
  "reportDate": "string",
  "reportPeriod": "string",
  "kpiValues": [{{"kpiId": "string", "reportedValue": number, "reportDate": "string", "notes": "string" | null}}]
}}"#
    )
}

pub fn evidence_validation_prompt(evidence_summary: &str, indicator_summary: &str) -> String {
    format!(
        r#"You are validating field evidence for a CSR impact assessment.

Evidence files and the KPIs they are linked to:

{evidence_summary}

Linked KPIs and their reported values:

{indicator_summary}

For each KPI with linked evidence, judge whether the evidence supports the reported value. Status is "verified" when within a 20% margin, "discrepancy" when further apart, "no-evidence" when the evidence is insufficient.

Return ONLY valid JSON in exactly this shape:
{{
  "validationResults": [{{"kpiId": "string", "kpiName": "string", "reportedValue": number, "evidenceValue": number | null, "matchPercentage": number | null, "status": "verified" | "discrepancy" | "no-evidence", "evidenceCount": number}}]
}}"#
    )
}

pub fn indicator_suggestion_prompt(file_info: &str, indicator_list: &str) -> String {
    format!(
        r#"An evidence file was uploaded for a CSR impact assessment.

File details:
{file_info}

Available KPIs:
{indicator_list}

Which KPIs could this file plausibly serve as evidence for? Use only ids from the list.

Return ONLY valid JSON in exactly this shape:
{{"kpiIds": ["string"]}}"#
    )
}

/// Wrap extracted document text for a text-only call.
pub fn compose_text_prompt(instructions: &str, text: &str) -> String {
    format!("{instructions}\n\nDocument content:\n<document>\n{text}\n</document>")
}

/// One line per evidence file linked to at least one indicator.
pub fn evidence_summary(files: &[EvidenceFile]) -> String {
    files
        .iter()
        .filter(|f| !f.linked_indicator_ids.is_empty())
        .map(|f| {
            let mut line = format!(
                "- {} ({}): linked to KPIs [{}]",
                f.file_name,
                f.kind.as_str(),
                f.linked_indicator_ids.join(", ")
            );
            if let Some(rows) = f.metadata.row_count {
                line.push_str(&format!(", {rows} data rows"));
            }
            if let Some(notes) = f.notes.as_deref().filter(|n| !n.trim().is_empty()) {
                line.push_str(&format!(", notes: \"{notes}\""));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One line per indicator that some evidence file links to, with the
/// current reported value from progress (or `N/A`).
pub fn linked_indicator_summary(
    indicators: &[Indicator],
    progress: &[ProgressPoint],
    files: &[EvidenceFile],
) -> String {
    indicators
        .iter()
        .filter(|k| files.iter().any(|f| f.is_linked_to(&k.id)))
        .map(|k| {
            let reported = progress
                .iter()
                .find(|p| p.indicator_id == k.id)
                .map(|p| p.current_value.to_string())
                .unwrap_or_else(|| "N/A".to_string());
            format!(
                "- {}: {} (target: {} {}, reported: {})",
                k.id, k.name, k.target_value, k.unit, reported
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
