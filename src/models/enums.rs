use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The string form doubles as the serde wire name.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(IndicatorCategory {
    Output => "output",
    Outcome => "outcome",
    Impact => "impact",
});

impl Default for IndicatorCategory {
    fn default() -> Self {
        Self::Output
    }
}

str_enum!(ProgressStatus {
    OnTrack => "on-track",
    AtRisk => "at-risk",
    Behind => "behind",
});

str_enum!(ProcessingStatus {
    Pending => "pending",
    Processing => "processing",
    Completed => "completed",
    Error => "error",
});

str_enum!(EvidenceKind {
    Survey => "survey",
    Photo => "photo",
    Document => "document",
});

str_enum!(ValidationStatus {
    Verified => "verified",
    Discrepancy => "discrepancy",
    NoEvidence => "no-evidence",
});

str_enum!(View {
    Dashboard => "dashboard",
    Assessment => "assessment",
});

impl Default for View {
    fn default() -> Self {
        Self::Dashboard
    }
}
