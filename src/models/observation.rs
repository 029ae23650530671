use serde::{Deserialize, Serialize};

/// The eight raw measurements collected for one prediction, in clinical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    pub pregnancies: f64,
    /// mg/dL
    pub glucose: f64,
    /// mmHg
    pub blood_pressure: f64,
    /// mm
    pub skin_thickness: f64,
    /// µU/mL
    pub insulin: f64,
    /// kg/m²
    pub bmi: f64,
    pub diabetes_pedigree_function: f64,
    /// years
    pub age: f64,
}

impl Measurements {
    /// Values in the same order as `FIELD_BOUNDS` and the first eight model features.
    pub fn values(&self) -> [f64; 8] {
        [
            self.pregnancies,
            self.glucose,
            self.blood_pressure,
            self.skin_thickness,
            self.insulin,
            self.bmi,
            self.diabetes_pedigree_function,
            self.age,
        ]
    }
}

/// A validated set of measurements plus the derived features.
///
/// Only the feature engineer constructs one, so every instance has passed
/// range validation. Deserialization re-runs that validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Measurements", into = "Measurements")]
pub struct ClinicalObservation {
    measurements: Measurements,
    bmi_age_product: f64,
    glucose_insulin_ratio: f64,
}

impl ClinicalObservation {
    pub(crate) fn new(
        measurements: Measurements,
        bmi_age_product: f64,
        glucose_insulin_ratio: f64,
    ) -> Self {
        Self {
            measurements,
            bmi_age_product,
            glucose_insulin_ratio,
        }
    }

    pub fn measurements(&self) -> &Measurements {
        &self.measurements
    }

    pub fn glucose(&self) -> f64 {
        self.measurements.glucose
    }

    pub fn bmi(&self) -> f64 {
        self.measurements.bmi
    }

    pub fn age(&self) -> f64 {
        self.measurements.age
    }

    pub fn blood_pressure(&self) -> f64 {
        self.measurements.blood_pressure
    }

    pub fn insulin(&self) -> f64 {
        self.measurements.insulin
    }

    pub fn bmi_age_product(&self) -> f64 {
        self.bmi_age_product
    }

    pub fn glucose_insulin_ratio(&self) -> f64 {
        self.glucose_insulin_ratio
    }
}

impl From<ClinicalObservation> for Measurements {
    fn from(observation: ClinicalObservation) -> Self {
        observation.measurements
    }
}
