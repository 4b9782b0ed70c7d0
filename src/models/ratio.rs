use serde::{Deserialize, Serialize};

/// Allowed range for each adjustment percentage.
pub const ADJUSTMENT_MIN: f64 = 0.0;
pub const ADJUSTMENT_MAX: f64 = 50.0;

/// Monetized value attributed to one indicator's achievement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeItem {
    #[serde(rename = "kpiId")]
    pub indicator_id: String,
    #[serde(rename = "kpiName")]
    pub indicator_name: String,
    pub achieved_value: f64,
    pub unit: String,
    /// Total value in ₹.
    pub monetized_value: f64,
    pub monetization_method: String,
}

/// Successive markdowns applied to gross outcome value, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentFactors {
    pub deadweight: f64,
    pub attribution: f64,
    pub dropoff: f64,
}

impl Default for AdjustmentFactors {
    fn default() -> Self {
        Self {
            deadweight: 15.0,
            attribution: 20.0,
            dropoff: 10.0,
        }
    }
}

impl AdjustmentFactors {
    /// Clamp each factor into the allowed range; NaN becomes 0.
    pub fn clamped(self) -> Self {
        let clamp = |v: f64| {
            if v.is_nan() {
                ADJUSTMENT_MIN
            } else {
                v.clamp(ADJUSTMENT_MIN, ADJUSTMENT_MAX)
            }
        };
        Self {
            deadweight: clamp(self.deadweight),
            attribution: clamp(self.attribution),
            dropoff: clamp(self.dropoff),
        }
    }
}

/// Full ratio breakdown. Derived, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatioCalculation {
    pub gross_outcome_value: f64,
    pub after_deadweight: f64,
    pub after_attribution: f64,
    pub after_dropoff: f64,
    pub investment: f64,
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatioData {
    pub investment: f64,
    pub outcomes: Vec<OutcomeItem>,
    pub adjustments: AdjustmentFactors,
    /// Cached scalar for stage gating and portfolio views; `None` until positive.
    pub calculated_ratio: Option<f64>,
}

impl Default for RatioData {
    fn default() -> Self {
        Self {
            investment: 0.0,
            outcomes: Vec::new(),
            adjustments: AdjustmentFactors::default(),
            calculated_ratio: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_adjustments() {
        let a = AdjustmentFactors::default();
        assert_eq!((a.deadweight, a.attribution, a.dropoff), (15.0, 20.0, 10.0));
    }

    #[test]
    fn clamped_keeps_factors_in_range() {
        let a = AdjustmentFactors {
            deadweight: -5.0,
            attribution: 75.0,
            dropoff: f64::NAN,
        }
        .clamped();
        assert_eq!(a.deadweight, 0.0);
        assert_eq!(a.attribution, 50.0);
        assert_eq!(a.dropoff, 0.0);
    }

    #[test]
    fn outcome_item_wire_names() {
        let item = OutcomeItem {
            indicator_id: "kpi-1".into(),
            indicator_name: "Workshops".into(),
            achieved_value: 4.0,
            unit: "count".into(),
            monetized_value: 2_000_000.0,
            monetization_method: "training".into(),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["kpiId"], "kpi-1");
        assert_eq!(json["monetizedValue"], 2_000_000.0);
    }
}
