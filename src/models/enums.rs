use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
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

str_enum!(RiskLabel {
    Diabetic => "diabetic",
    NonDiabetic => "non_diabetic",
});

/// Probability at or above which an observation is labelled diabetic.
pub const DIABETIC_THRESHOLD: f64 = 0.5;

impl RiskLabel {
    /// Exactly 0.5 classifies as `Diabetic`.
    pub fn from_probability(probability: f64) -> Self {
        if probability >= DIABETIC_THRESHOLD {
            Self::Diabetic
        } else {
            Self::NonDiabetic
        }
    }

    /// Wording used in reports and the dashboard.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Diabetic => "High Risk of Diabetes",
            Self::NonDiabetic => "Low Risk",
        }
    }

    /// Upper-case banner placed at the top of every narrative.
    pub fn banner(&self) -> &'static str {
        match self {
            Self::Diabetic => "HIGH RISK",
            Self::NonDiabetic => "LOW RISK",
        }
    }
}

str_enum!(Role {
    Patient => "patient",
    Admin => "admin",
});

str_enum!(KnowledgeSourceType {
    Upload => "upload",
    Url => "url",
    PastedText => "pasted_text",
});

str_enum!(NarrativeSource {
    Llm => "llm",
    Fallback => "fallback",
});

str_enum!(ReportFormat {
    Pdf => "pdf",
});

impl ReportFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
        }
    }
}

str_enum!(ChartKind {
    Bar => "bar",
    Radar => "radar",
    Pie => "pie",
});

impl ChartKind {
    pub const ALL: [ChartKind; 3] = [ChartKind::Bar, ChartKind::Radar, ChartKind::Pie];

    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Bar => "bar.png",
            Self::Radar => "radar.png",
            Self::Pie => "pie.png",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        "image/png"
    }
}

str_enum!(ChatRoute {
    Emergency => "emergency",
    MedicationChange => "medication_change",
    Grounded => "grounded",
    General => "general",
});
