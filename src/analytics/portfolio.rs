use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use super::ratio::round2;
use crate::models::{Assessment, ProgressStatus, Stage, ValidationStatus};

const CRORE: f64 = 10_000_000.0;
const LAKH: f64 = 100_000.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorHealth {
    pub on_track: usize,
    pub at_risk: usize,
    pub behind: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummary {
    pub total_investment: f64,
    /// Investment-weighted average ratio; `None` when nothing qualifies.
    pub portfolio_ratio: Option<f64>,
    pub total_social_value: f64,
    pub indicator_health: IndicatorHealth,
    /// Assessments per current stage, keyed 1..=5.
    pub stage_counts: BTreeMap<u8, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatioComparisonItem {
    pub assessment_id: Uuid,
    pub assessment_name: String,
    pub ratio: f64,
    pub investment: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskItem {
    pub assessment_id: Uuid,
    pub assessment_name: String,
    pub behind_count: usize,
    pub total_indicators: usize,
    pub behind_indicators: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceCoverage {
    pub verified_count: usize,
    pub total_validated: usize,
    /// Whole-number percentage, 0 when nothing has been validated.
    pub percentage: u32,
}

/// Every portfolio rollup in one payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioReport {
    pub summary: PortfolioSummary,
    pub ratio_comparison: Vec<RatioComparisonItem>,
    pub risks: Vec<RiskItem>,
    pub evidence_coverage: EvidenceCoverage,
}

fn usable_ratio(a: &Assessment) -> Option<f64> {
    a.ratio.calculated_ratio.filter(|r| r.is_finite())
}

pub fn portfolio_summary(assessments: &[Assessment]) -> PortfolioSummary {
    let mut total_investment = 0.0;
    let mut weighted_sum = 0.0;
    let mut weight = 0.0;
    let mut health = IndicatorHealth::default();
    let mut stage_counts: BTreeMap<u8, usize> =
        Stage::ALL.iter().map(|s| (s.number(), 0)).collect();

    for a in assessments {
        let investment = a.effective_investment();
        total_investment += investment;

        if let Some(ratio) = usable_ratio(a) {
            if investment > 0.0 {
                weighted_sum += ratio * investment;
                weight += investment;
            }
        }

        for point in &a.reports.progress {
            health.total += 1;
            match point.status {
                ProgressStatus::OnTrack => health.on_track += 1,
                ProgressStatus::AtRisk => health.at_risk += 1,
                ProgressStatus::Behind => health.behind += 1,
            }
        }

        *stage_counts.entry(a.current_stage.number()).or_default() += 1;
    }

    PortfolioSummary {
        total_investment,
        portfolio_ratio: (weight > 0.0).then(|| round2(weighted_sum / weight)),
        total_social_value: weighted_sum,
        indicator_health: health,
        stage_counts,
    }
}

/// Assessments with a ratio, highest first.
pub fn ratio_comparison(assessments: &[Assessment]) -> Vec<RatioComparisonItem> {
    let mut items: Vec<_> = assessments
        .iter()
        .filter_map(|a| {
            usable_ratio(a).map(|ratio| RatioComparisonItem {
                assessment_id: a.id,
                assessment_name: a.name.clone(),
                ratio,
                investment: a.effective_investment(),
            })
        })
        .collect();
    items.sort_by(|x, y| y.ratio.total_cmp(&x.ratio));
    items
}

/// Assessments with at least one indicator behind, most behind first.
pub fn risk_items(assessments: &[Assessment]) -> Vec<RiskItem> {
    let mut items: Vec<_> = assessments
        .iter()
        .filter_map(|a| {
            let behind: Vec<String> = a
                .reports
                .progress
                .iter()
                .filter(|p| p.status == ProgressStatus::Behind)
                .map(|p| p.indicator_name.clone())
                .collect();
            (!behind.is_empty()).then(|| RiskItem {
                assessment_id: a.id,
                assessment_name: a.name.clone(),
                behind_count: behind.len(),
                total_indicators: a.reports.progress.len(),
                behind_indicators: behind,
            })
        })
        .collect();
    items.sort_by(|x, y| y.behind_count.cmp(&x.behind_count));
    items
}

pub fn evidence_coverage(assessments: &[Assessment]) -> EvidenceCoverage {
    let results = assessments.iter().flat_map(|a| a.evidence.validation_results.iter());
    let (verified_count, total_validated) = results.fold((0, 0), |(v, t), r| {
        (v + usize::from(r.status == ValidationStatus::Verified), t + 1)
    });

    let percentage = if total_validated > 0 {
        (verified_count as f64 / total_validated as f64 * 100.0).round() as u32
    } else {
        0
    };

    EvidenceCoverage {
        verified_count,
        total_validated,
        percentage,
    }
}

pub fn portfolio_report(assessments: &[Assessment]) -> PortfolioReport {
    PortfolioReport {
        summary: portfolio_summary(assessments),
        ratio_comparison: ratio_comparison(assessments),
        risks: risk_items(assessments),
        evidence_coverage: evidence_coverage(assessments),
    }
}

// ── INR formatting ──

/// Format rupees with Indian abbreviations: `₹2.5 Cr`, `₹4 L`, `₹45,000`.
pub fn format_inr(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        return "₹0".to_string();
    }
    let sign = if value < 0.0 { "-" } else { "" };
    let abs = value.abs();

    if abs >= CRORE {
        return format!("{sign}₹{} Cr", one_decimal(abs / CRORE));
    }
    if abs >= LAKH {
        return format!("{sign}₹{} L", one_decimal(abs / LAKH));
    }
    format!("{sign}₹{}", indian_grouping(abs))
}

fn one_decimal(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{v:.0}")
    } else {
        format!("{v:.1}")
    }
}

/// Indian digit grouping (last three digits, then pairs) with up to
/// three fraction digits.
fn indian_grouping(v: f64) -> String {
    let fixed = format!("{v:.3}");
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let frac = frac_part.trim_end_matches('0');

    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::new();
    if digits.len() > 3 {
        let head = &digits[..digits.len() - 3];
        for (i, c) in head.iter().enumerate() {
            if i > 0 && (head.len() - i) % 2 == 0 {
                grouped.push(',');
            }
            grouped.push(*c);
        }
        grouped.push(',');
        grouped.extend(&digits[digits.len() - 3..]);
    } else {
        grouped.extend(digits);
    }

    if frac.is_empty() {
        grouped
    } else {
        format!("{grouped}.{frac}")
    }
}
