use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::IndicatorCategory;

/// Project metadata pulled from the founding agreement. Every field
/// stays `None` until extraction or manual entry fills it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractedFields {
    pub project_name: Option<String>,
    #[serde(rename = "ngoName")]
    pub partner_name: Option<String>,
    pub location: Option<String>,
    pub duration: Option<String>,
    pub start_date: Option<String>,
    pub total_budget: Option<f64>,
}

/// A named, targeted metric tracked through every later stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Indicator {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub target_value: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub target_date: Option<String>,
    #[serde(default)]
    pub category: IndicatorCategory,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoundingDocumentRecord {
    /// `None` when the fields were entered manually.
    pub file_name: Option<String>,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub fields: Option<ExtractedFields>,
    pub indicators: Vec<Indicator>,
    /// Locks fields and indicators once stage 1 is confirmed.
    pub confirmed: bool,
}

impl FoundingDocumentRecord {
    pub fn indicator(&self, id: &str) -> Option<&Indicator> {
        self.indicators.iter().find(|k| k.id == id)
    }

    pub fn has_indicator(&self, id: &str) -> bool {
        self.indicator(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_decodes_from_camel_case() {
        let json = r#"{"id":"kpi-1","name":"Students reached","targetValue":2000,
                       "unit":"count","targetDate":null,"category":"outcome"}"#;
        let k: Indicator = serde_json::from_str(json).unwrap();
        assert_eq!(k.id, "kpi-1");
        assert_eq!(k.target_value, 2000.0);
        assert_eq!(k.category, IndicatorCategory::Outcome);
        assert!(k.target_date.is_none());
    }

    #[test]
    fn partner_name_uses_ngo_wire_name() {
        let fields = ExtractedFields {
            partner_name: Some("Pratham".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json["ngoName"], "Pratham");
        assert!(json.get("partnerName").is_none());
    }

    #[test]
    fn missing_fields_default_to_none() {
        let fields: ExtractedFields = serde_json::from_str(r#"{"projectName":"Lab"}"#).unwrap();
        assert_eq!(fields.project_name.as_deref(), Some("Lab"));
        assert!(fields.total_budget.is_none());
    }

    #[test]
    fn indicator_lookup_by_id() {
        let record = FoundingDocumentRecord {
            indicators: vec![Indicator {
                id: "kpi-1".into(),
                name: "Workshops".into(),
                target_value: 10.0,
                unit: "count".into(),
                target_date: None,
                category: IndicatorCategory::Output,
            }],
            ..Default::default()
        };
        assert!(record.has_indicator("kpi-1"));
        assert!(!record.has_indicator("kpi-2"));
    }
}
