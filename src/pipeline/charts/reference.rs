//! Static clinical reference table shared by the charts and the report.

use crate::models::ClinicalObservation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandStatus {
    Low,
    Normal,
    Borderline,
    High,
}

impl BandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Normal => "Normal",
            Self::Borderline => "Borderline",
            Self::High => "High",
        }
    }
}

/// Normal band `[min, max]`; values at or above `warning` are flagged high.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceRange {
    pub feature: &'static str,
    pub label: &'static str,
    pub unit: &'static str,
    pub min: f64,
    pub max: f64,
    pub warning: f64,
}

impl ReferenceRange {
    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    pub fn status(&self, value: f64) -> BandStatus {
        if value < self.min {
            BandStatus::Low
        } else if value <= self.max {
            BandStatus::Normal
        } else if value < self.warning {
            BandStatus::Borderline
        } else {
            BandStatus::High
        }
    }

    /// Maps the midpoint to 0.5 and clamps to [0, 1].
    pub fn normalize(&self, value: f64) -> f64 {
        let mid = self.midpoint();
        let span = if mid > 0.0 { 2.0 * mid } else { self.max.max(1.0) };
        (value / span).clamp(0.0, 1.0)
    }

    pub fn describe(&self) -> String {
        if self.unit.is_empty() {
            format!("{}–{}", self.min, self.max)
        } else {
            format!("{}–{} {}", self.min, self.max, self.unit)
        }
    }
}

/// One row per raw measurement, in feature order.
pub const REFERENCE_RANGES: [ReferenceRange; 8] = [
    ReferenceRange { feature: "pregnancies", label: "Pregnancies", unit: "", min: 0.0, max: 4.0, warning: 8.0 },
    ReferenceRange { feature: "glucose", label: "Glucose", unit: "mg/dL", min: 70.0, max: 100.0, warning: 126.0 },
    ReferenceRange { feature: "blood_pressure", label: "Blood Pressure", unit: "mmHg", min: 60.0, max: 80.0, warning: 90.0 },
    ReferenceRange { feature: "skin_thickness", label: "Skin Thickness", unit: "mm", min: 10.0, max: 50.0, warning: 60.0 },
    ReferenceRange { feature: "insulin", label: "Insulin", unit: "µU/mL", min: 16.0, max: 166.0, warning: 200.0 },
    ReferenceRange { feature: "bmi", label: "BMI", unit: "kg/m²", min: 18.5, max: 24.9, warning: 30.0 },
    ReferenceRange { feature: "diabetes_pedigree_function", label: "Diabetes Pedigree", unit: "", min: 0.0, max: 1.0, warning: 1.5 },
    ReferenceRange { feature: "age", label: "Age", unit: "years", min: 18.0, max: 45.0, warning: 60.0 },
];

/// Relative contribution shown in the pie chart, in feature order. These are
/// fixed presentation weights and do not come from the trained model.
pub const PIE_WEIGHTS: [f64; 8] = [0.05, 0.30, 0.07, 0.04, 0.10, 0.18, 0.12, 0.14];

/// `(range, value, status)` for each raw measurement.
pub fn assess_ranges(observation: &ClinicalObservation) -> Vec<(ReferenceRange, f64, BandStatus)> {
    REFERENCE_RANGES
        .iter()
        .zip(observation.measurements().values())
        .map(|(range, value)| (*range, value, range.status(value)))
        .collect()
}
