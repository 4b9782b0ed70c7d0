use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::models::{
    HistoryPoint, Indicator, ProcessingStatus, ProgressPoint, ProgressStatus, UploadedDocument,
};

/// At or above this percentage an indicator is on track.
pub const ON_TRACK_THRESHOLD: f64 = 90.0;
/// At or above this percentage (and below on-track) an indicator is at risk.
pub const AT_RISK_THRESHOLD: f64 = 60.0;

pub fn progress_status(percentage: f64) -> ProgressStatus {
    if percentage >= ON_TRACK_THRESHOLD {
        ProgressStatus::OnTrack
    } else if percentage >= AT_RISK_THRESHOLD {
        ProgressStatus::AtRisk
    } else {
        ProgressStatus::Behind
    }
}

/// `current / target × 100`, or 0 when the target is not positive.
pub fn percentage_achieved(current: f64, target: f64) -> f64 {
    if target > 0.0 && current.is_finite() && target.is_finite() {
        current / target * 100.0
    } else {
        0.0
    }
}

/// Sort key for report dates. Unparseable dates sort before every valid one.
fn date_key(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc())
}

/// Recompute progress for every indicator with at least one matched value
/// across completed documents.
///
/// History is ordered by report date with ties kept in insertion order
/// (document upload order, then value order within a document); the last
/// history entry is the current value. Indicators with no matches are omitted.
pub fn compute_progress(
    indicators: &[Indicator],
    documents: &[UploadedDocument],
) -> Vec<ProgressPoint> {
    let matched: Vec<_> = documents
        .iter()
        .filter(|d| d.status == ProcessingStatus::Completed)
        .filter_map(|d| d.extraction.as_ref())
        .flat_map(|e| e.values.iter())
        .filter(|v| v.reported_value.is_finite())
        .collect();

    indicators
        .iter()
        .filter_map(|indicator| {
            let mut history: Vec<HistoryPoint> = matched
                .iter()
                .filter(|v| v.indicator_id == indicator.id)
                .map(|v| HistoryPoint {
                    date: v.report_date.clone(),
                    value: v.reported_value,
                })
                .collect();

            // Vec::sort_by_key is stable
            history.sort_by_key(|h| date_key(&h.date));
            let current_value = history.last()?.value;
            let percentage = percentage_achieved(current_value, indicator.target_value);

            Some(ProgressPoint {
                indicator_id: indicator.id.clone(),
                indicator_name: indicator.name.clone(),
                target_value: indicator.target_value,
                current_value,
                unit: indicator.unit.clone(),
                percentage_achieved: percentage,
                status: progress_status(percentage),
                history,
            })
        })
        .collect()
}

/// Replace current values with manual overrides, recomputing percentage
/// and status. Overrides for indicators without progress are ignored.
pub fn apply_overrides(progress: &mut [ProgressPoint], overrides: &BTreeMap<String, f64>) {
    for point in progress.iter_mut() {
        if let Some(value) = overrides.get(&point.indicator_id) {
            let percentage = percentage_achieved(*value, point.target_value);
            point.current_value = *value;
            point.percentage_achieved = percentage;
            point.status = progress_status(percentage);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractedValue, ExtractionResult, IndicatorCategory};
    use chrono::Utc;

    fn indicator(id: &str, target: f64) -> Indicator {
        Indicator {
            id: id.into(),
            name: format!("Indicator {id}"),
            target_value: target,
            unit: "count".into(),
            target_date: None,
            category: IndicatorCategory::Output,
        }
    }

    fn completed(values: &[(&str, f64, &str)]) -> UploadedDocument {
        let mut doc = UploadedDocument::queued("report.pdf", Utc::now());
        doc.status = ProcessingStatus::Completed;
        doc.extraction = Some(ExtractionResult {
            report_date: None,
            report_period: None,
            values: values
                .iter()
                .map(|(id, v, date)| ExtractedValue {
                    indicator_id: (*id).into(),
                    reported_value: *v,
                    report_date: (*date).into(),
                    notes: None,
                })
                .collect(),
        });
        doc
    }

    #[test]
    fn status_thresholds() {
        assert_eq!(progress_status(90.0), ProgressStatus::OnTrack);
        assert_eq!(progress_status(89.99), ProgressStatus::AtRisk);
        assert_eq!(progress_status(60.0), ProgressStatus::AtRisk);
        assert_eq!(progress_status(59.9), ProgressStatus::Behind);
        assert_eq!(progress_status(150.0), ProgressStatus::OnTrack);
    }

    #[test]
    fn latest_report_wins_and_history_is_chronological() {
        let indicators = vec![indicator("kpi-1", 100.0)];
        // Uploaded out of order: later report first.
        let docs = vec![
            completed(&[("kpi-1", 75.0, "2024-06-30")]),
            completed(&[("kpi-1", 40.0, "2024-03-31")]),
        ];

        let progress = compute_progress(&indicators, &docs);
        assert_eq!(progress.len(), 1);
        let p = &progress[0];
        assert_eq!(p.current_value, 75.0);
        assert_eq!(p.percentage_achieved, 75.0);
        assert_eq!(p.status, ProgressStatus::AtRisk);
        assert_eq!(
            p.history,
            vec![
                HistoryPoint { date: "2024-03-31".into(), value: 40.0 },
                HistoryPoint { date: "2024-06-30".into(), value: 75.0 },
            ]
        );
    }

    #[test]
    fn same_date_ties_go_to_last_inserted() {
        let indicators = vec![indicator("kpi-1", 10.0)];
        let docs = vec![
            completed(&[("kpi-1", 3.0, "2024-01-31")]),
            completed(&[("kpi-1", 5.0, "2024-01-31")]),
        ];
        let progress = compute_progress(&indicators, &docs);
        assert_eq!(progress[0].current_value, 5.0);
    }

    #[test]
    fn indicators_without_matches_are_omitted() {
        let indicators = vec![indicator("kpi-1", 10.0), indicator("kpi-2", 10.0)];
        let docs = vec![completed(&[("kpi-2", 9.0, "2024-01-31")])];
        let progress = compute_progress(&indicators, &docs);
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].indicator_id, "kpi-2");
        assert_eq!(progress[0].status, ProgressStatus::OnTrack);
    }

    #[test]
    fn only_completed_documents_count() {
        let indicators = vec![indicator("kpi-1", 10.0)];
        let mut errored = completed(&[("kpi-1", 9.0, "2024-01-31")]);
        errored.status = ProcessingStatus::Error;
        assert!(compute_progress(&indicators, &[errored]).is_empty());
    }

    #[test]
    fn non_positive_target_yields_zero_percent() {
        let indicators = vec![indicator("kpi-1", 0.0)];
        let docs = vec![completed(&[("kpi-1", 12.0, "2024-01-31")])];
        let progress = compute_progress(&indicators, &docs);
        assert_eq!(progress[0].percentage_achieved, 0.0);
        assert_eq!(progress[0].status, ProgressStatus::Behind);
    }

    #[test]
    fn values_for_unknown_indicators_are_ignored() {
        let indicators = vec![indicator("kpi-1", 10.0)];
        let docs = vec![completed(&[("kpi-99", 9.0, "2024-01-31")])];
        assert!(compute_progress(&indicators, &docs).is_empty());
    }

    #[test]
    fn recomputation_is_idempotent() {
        let indicators = vec![indicator("kpi-1", 100.0), indicator("kpi-2", 8.0)];
        let docs = vec![
            completed(&[("kpi-1", 40.0, "2024-03-31"), ("kpi-2", 2.0, "bad date")]),
            completed(&[("kpi-1", 75.0, "2024-06-30")]),
        ];
        assert_eq!(
            compute_progress(&indicators, &docs),
            compute_progress(&indicators, &docs)
        );
    }

    #[test]
    fn overrides_recompute_status() {
        let indicators = vec![indicator("kpi-1", 100.0)];
        let docs = vec![completed(&[("kpi-1", 40.0, "2024-03-31")])];
        let mut progress = compute_progress(&indicators, &docs);

        let mut overrides = BTreeMap::new();
        overrides.insert("kpi-1".to_string(), 95.0);
        overrides.insert("kpi-7".to_string(), 1.0);
        apply_overrides(&mut progress, &overrides);

        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].current_value, 95.0);
        assert_eq!(progress[0].status, ProgressStatus::OnTrack);
        // History keeps the reported values.
        assert_eq!(progress[0].history.last().unwrap().value, 40.0);
    }
}
