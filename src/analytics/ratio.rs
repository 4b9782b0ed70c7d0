use crate::models::{AdjustmentFactors, OutcomeItem, ProgressPoint, RatioCalculation};

/// Keyword rule mapping an indicator name to a per-unit rupee value.
#[derive(Debug, Clone, Copy)]
pub struct MonetizationRule {
    pub keywords: &'static [&'static str],
    pub per_unit: f64,
    pub method: &'static str,
}

impl MonetizationRule {
    /// Case-insensitive substring match against any keyword.
    pub fn matches(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.keywords.iter().any(|kw| lower.contains(kw))
    }
}

/// Ordered rule table, evaluated top-down; first match wins.
pub const MONETIZATION_RULES: &[MonetizationRule] = &[
    MonetizationRule {
        keywords: &["student", "outreach", "engagement", "mobilized"],
        per_unit: 500.0,
        method: "Value of skill exposure per student (industry benchmark ₹500)",
    },
    MonetizationRule {
        keywords: &["fellow", "deployed", "personnel"],
        per_unit: 600_000.0,
        method: "Market salary for equivalent role (₹6L/year)",
    },
    MonetizationRule {
        keywords: &["centre", "center", "excellence", "lab", "hub"],
        per_unit: 5_000_000.0,
        method: "Infrastructure + equipment setup cost (₹50L per centre)",
    },
    MonetizationRule {
        keywords: &["hackathon", "innovation showcase"],
        per_unit: 1_500_000.0,
        method: "Event organization + participant value (₹15L per event)",
    },
    MonetizationRule {
        keywords: &["workshop", "capacity", "training"],
        per_unit: 500_000.0,
        method: "Equivalent commercial training cost (₹5L per workshop)",
    },
    MonetizationRule {
        keywords: &["session", "industry-led", "seminar"],
        per_unit: 300_000.0,
        method: "Expert time + knowledge transfer value (₹3L per session)",
    },
    MonetizationRule {
        keywords: &["partnership", "corporate", "funding"],
        per_unit: 2_500_000.0,
        method: "Avg CSR funding mobilized per partnership (₹25L)",
    },
    MonetizationRule {
        keywords: &["collaboration", "academia", "connect"],
        per_unit: 1_000_000.0,
        method: "Value of research/internship opportunities (₹10L per collab)",
    },
    MonetizationRule {
        keywords: &["roundtable", "stakeholder"],
        per_unit: 200_000.0,
        method: "Convening cost + policy influence value (₹2L per roundtable)",
    },
    MonetizationRule {
        keywords: &["report", "dashboard", "documentation"],
        per_unit: 100_000.0,
        method: "Equivalent consulting cost for report preparation (₹1L)",
    },
    MonetizationRule {
        keywords: &["database", "repository", "compendium"],
        per_unit: 200_000.0,
        method: "Knowledge asset development cost (₹2L per asset)",
    },
];

/// Round half away from zero to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Estimated (value, method) for an indicator; `(0, "")` when no rule matches.
pub fn estimate_monetization(name: &str, achieved_value: f64) -> (f64, &'static str) {
    MONETIZATION_RULES
        .iter()
        .find(|rule| rule.matches(name))
        .map(|rule| (achieved_value * rule.per_unit, rule.method))
        .unwrap_or((0.0, ""))
}

/// Apply deadweight, attribution and drop-off in that order, each on the
/// previous result, then divide by investment.
pub fn calculate_ratio(
    outcomes: &[OutcomeItem],
    investment: f64,
    adjustments: AdjustmentFactors,
) -> RatioCalculation {
    let gross_outcome_value: f64 = outcomes
        .iter()
        .map(|o| o.monetized_value)
        .filter(|v| v.is_finite())
        .sum();

    let after_deadweight = gross_outcome_value * (1.0 - adjustments.deadweight / 100.0);
    let after_attribution = after_deadweight * (1.0 - adjustments.attribution / 100.0);
    let after_dropoff = after_attribution * (1.0 - adjustments.dropoff / 100.0);

    let ratio = if investment > 0.0 && investment.is_finite() {
        round2(after_dropoff / investment)
    } else {
        0.0
    };

    RatioCalculation {
        gross_outcome_value,
        after_deadweight,
        after_attribution,
        after_dropoff,
        investment,
        ratio,
    }
}

/// Build default outcomes from progress via the rule table.
pub fn seed_outcomes(progress: &[ProgressPoint]) -> Vec<OutcomeItem> {
    progress
        .iter()
        .map(|p| {
            let (value, method) = estimate_monetization(&p.indicator_name, p.current_value);
            OutcomeItem {
                indicator_id: p.indicator_id.clone(),
                indicator_name: p.indicator_name.clone(),
                achieved_value: p.current_value,
                unit: p.unit.clone(),
                monetized_value: value,
                monetization_method: method.to_string(),
            }
        })
        .collect()
}

/// Seeding is allowed only while no outcome carries a non-zero value.
pub fn outcomes_need_seeding(outcomes: &[OutcomeItem]) -> bool {
    outcomes.iter().all(|o| o.monetized_value == 0.0)
}
