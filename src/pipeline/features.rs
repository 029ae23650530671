//! Feature engineering: raw input → validated observation → model feature vector.
//!
//! `FEATURE_ORDER` is the contract shared with training. It is written into
//! every artifact bundle and checked again when the scorer loads one.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ClinicalObservation, Measurements};

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

pub const FEATURE_COUNT: usize = 10;

pub const FEATURE_ORDER: [&str; FEATURE_COUNT] = [
    "pregnancies",
    "glucose",
    "blood_pressure",
    "skin_thickness",
    "insulin",
    "bmi",
    "diabetes_pedigree_function",
    "age",
    "bmi_age_product",
    "glucose_insulin_ratio",
];

/// Added to insulin before dividing so a zero reading stays finite.
pub const GLUCOSE_INSULIN_EPSILON: f64 = 1.0;

/// Inclusive plausibility bounds for one raw measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldBound {
    pub name: &'static str,
    pub label: &'static str,
    pub unit: &'static str,
    pub min: f64,
    pub max: f64,
}

/// Same order as `Measurements::values`.
pub const FIELD_BOUNDS: [FieldBound; 8] = [
    FieldBound { name: "pregnancies", label: "Pregnancies", unit: "", min: 0.0, max: 20.0 },
    FieldBound { name: "glucose", label: "Glucose", unit: "mg/dL", min: 1.0, max: 300.0 },
    FieldBound { name: "blood_pressure", label: "Blood Pressure", unit: "mmHg", min: 1.0, max: 200.0 },
    FieldBound { name: "skin_thickness", label: "Skin Thickness", unit: "mm", min: 0.0, max: 100.0 },
    FieldBound { name: "insulin", label: "Insulin", unit: "µU/mL", min: 0.0, max: 900.0 },
    FieldBound { name: "bmi", label: "BMI", unit: "kg/m²", min: 10.0, max: 70.0 },
    FieldBound { name: "diabetes_pedigree_function", label: "Diabetes Pedigree", unit: "", min: 0.0, max: 3.0 },
    FieldBound { name: "age", label: "Age", unit: "years", min: 1.0, max: 120.0 },
];

// ═══════════════════════════════════════════════════════════
// Raw input
// ═══════════════════════════════════════════════════════════

/// A form value before validation: JSON numbers and numeric strings both accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Unvalidated request payload. Accepts the short form-field names as aliases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    #[serde(default)]
    pub pregnancies: Option<RawValue>,
    #[serde(default)]
    pub glucose: Option<RawValue>,
    #[serde(default, alias = "bloodPressure")]
    pub blood_pressure: Option<RawValue>,
    #[serde(default, alias = "skinThickness")]
    pub skin_thickness: Option<RawValue>,
    #[serde(default)]
    pub insulin: Option<RawValue>,
    #[serde(default)]
    pub bmi: Option<RawValue>,
    #[serde(default, alias = "dpf")]
    pub diabetes_pedigree_function: Option<RawValue>,
    #[serde(default)]
    pub age: Option<RawValue>,
}

impl RawObservation {
    fn fields(&self) -> [&Option<RawValue>; 8] {
        [
            &self.pregnancies,
            &self.glucose,
            &self.blood_pressure,
            &self.skin_thickness,
            &self.insulin,
            &self.bmi,
            &self.diabetes_pedigree_function,
            &self.age,
        ]
    }
}

impl From<Measurements> for RawObservation {
    fn from(m: Measurements) -> Self {
        Self {
            pregnancies: Some(m.pregnancies.into()),
            glucose: Some(m.glucose.into()),
            blood_pressure: Some(m.blood_pressure.into()),
            skin_thickness: Some(m.skin_thickness.into()),
            insulin: Some(m.insulin.into()),
            bmi: Some(m.bmi.into()),
            diabetes_pedigree_function: Some(m.diabetes_pedigree_function.into()),
            age: Some(m.age.into()),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum FieldProblem {
    Missing,
    NotNumeric { value: String },
    OutOfRange { value: f64, min: f64, max: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldIssue {
    pub field: &'static str,
    #[serde(flatten)]
    pub problem: FieldProblem,
}

impl std::fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.problem {
            FieldProblem::Missing => write!(f, "{} is required", self.field),
            FieldProblem::NotNumeric { value } => {
                write!(f, "{} must be a number (got {value:?})", self.field)
            }
            FieldProblem::OutOfRange { value, min, max } => {
                write!(f, "{} must be between {min} and {max} (got {value})", self.field)
            }
        }
    }
}

/// Every offending field, in feature order.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("invalid observation: {}", join_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    pub fn fields(&self) -> Vec<&'static str> {
        self.issues.iter().map(|i| i.field).collect()
    }
}

// ═══════════════════════════════════════════════════════════
// Validation + derivation
// ═══════════════════════════════════════════════════════════

/// Validate every raw field and build an observation with its derived features.
pub fn validate_observation(raw: &RawObservation) -> Result<ClinicalObservation, ValidationError> {
    let mut values = [0.0_f64; 8];
    let mut issues = Vec::new();

    for ((bound, field), slot) in FIELD_BOUNDS.iter().zip(raw.fields()).zip(values.iter_mut()) {
        match parse_field(bound, field) {
            Ok(v) => *slot = v,
            Err(problem) => issues.push(FieldIssue {
                field: bound.name,
                problem,
            }),
        }
    }

    if !issues.is_empty() {
        return Err(ValidationError { issues });
    }

    let [pregnancies, glucose, blood_pressure, skin_thickness, insulin, bmi, dpf, age] = values;
    Ok(derive(Measurements {
        pregnancies,
        glucose,
        blood_pressure,
        skin_thickness,
        insulin,
        bmi,
        diabetes_pedigree_function: dpf,
        age,
    }))
}

/// Validate already-typed measurements (training rows, stored observations).
pub fn validate_measurements(m: Measurements) -> Result<ClinicalObservation, ValidationError> {
    validate_observation(&RawObservation::from(m))
}

fn parse_field(bound: &FieldBound, field: &Option<RawValue>) -> Result<f64, FieldProblem> {
    let value = match field {
        None => return Err(FieldProblem::Missing),
        Some(RawValue::Number(n)) => *n,
        Some(RawValue::Text(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Err(FieldProblem::Missing);
            }
            trimmed.parse::<f64>().map_err(|_| FieldProblem::NotNumeric {
                value: s.clone(),
            })?
        }
    };

    if !value.is_finite() {
        return Err(FieldProblem::NotNumeric {
            value: value.to_string(),
        });
    }
    if value < bound.min || value > bound.max {
        return Err(FieldProblem::OutOfRange {
            value,
            min: bound.min,
            max: bound.max,
        });
    }
    Ok(value)
}

fn derive(m: Measurements) -> ClinicalObservation {
    let bmi_age_product = m.bmi * m.age;
    let glucose_insulin_ratio = m.glucose / (m.insulin + GLUCOSE_INSULIN_EPSILON);
    ClinicalObservation::new(m, bmi_age_product, glucose_insulin_ratio)
}

impl TryFrom<Measurements> for ClinicalObservation {
    type Error = ValidationError;

    fn try_from(m: Measurements) -> Result<Self, Self::Error> {
        validate_measurements(m)
    }
}

/// Model input in `FEATURE_ORDER`.
pub fn feature_vector(obs: &ClinicalObservation) -> [f64; FEATURE_COUNT] {
    let [pregnancies, glucose, blood_pressure, skin_thickness, insulin, bmi, dpf, age] =
        obs.measurements().values();
    [
        pregnancies,
        glucose,
        blood_pressure,
        skin_thickness,
        insulin,
        bmi,
        dpf,
        age,
        obs.bmi_age_product(),
        obs.glucose_insulin_ratio(),
    ]
}

pub fn feature_order_names() -> Vec<String> {
    FEATURE_ORDER.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    pub(crate) fn sample_measurements() -> Measurements {
        Measurements {
            pregnancies: 2.0,
            glucose: 148.0,
            blood_pressure: 72.0,
            skin_thickness: 35.0,
            insulin: 79.0,
            bmi: 33.6,
            diabetes_pedigree_function: 0.627,
            age: 50.0,
        }
    }

    pub(crate) fn sample_observation() -> ClinicalObservation {
        validate_measurements(sample_measurements()).unwrap()
    }

    #[test]
    fn feature_vector_follows_fixed_order() {
        let obs = sample_observation();
        let v = feature_vector(&obs);
        assert_eq!(v.len(), FEATURE_ORDER.len());
        assert_eq!(v[1], 148.0);
        assert_eq!(v[5], 33.6);
        assert_eq!(v[7], 50.0);
        assert!((v[8] - 33.6 * 50.0).abs() < 1e-9);
        assert!((v[9] - 148.0 / 80.0).abs() < 1e-9);
    }

    #[test]
    fn zero_insulin_ratio_stays_finite() {
        let mut m = sample_measurements();
        m.insulin = 0.0;
        let obs = validate_measurements(m).unwrap();
        assert_eq!(obs.glucose_insulin_ratio(), 148.0);
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let raw: RawObservation = serde_json::from_value(serde_json::json!({
            "pregnancies": "2",
            "glucose": " 148 ",
            "bloodPressure": 72,
            "skinThickness": 35,
            "insulin": 79,
            "bmi": "33.6",
            "dpf": 0.627,
            "age": 50
        }))
        .unwrap();
        let obs = validate_observation(&raw).unwrap();
        assert_eq!(*obs.measurements(), sample_measurements());
    }

    #[test]
    fn all_offending_fields_are_reported() {
        let mut raw = RawObservation::from(sample_measurements());
        raw.glucose = None;
        raw.bmi = Some("heavy".into());
        raw.age = Some(RawValue::Number(150.0));

        let err = validate_observation(&raw).unwrap_err();
        assert_eq!(err.fields(), vec!["glucose", "bmi", "age"]);
        assert_eq!(err.issues[0].problem, FieldProblem::Missing);
        assert_eq!(
            err.issues[1].problem,
            FieldProblem::NotNumeric { value: "heavy".into() }
        );
        assert_eq!(
            err.issues[2].problem,
            FieldProblem::OutOfRange { value: 150.0, min: 1.0, max: 120.0 }
        );
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let mut raw = RawObservation::from(sample_measurements());
        raw.insulin = Some(f64::NAN.into());
        let err = validate_observation(&raw).unwrap_err();
        assert_eq!(err.fields(), vec!["insulin"]);
    }

    #[test]
    fn bounds_are_inclusive() {
        let mut m = sample_measurements();
        m.pregnancies = 20.0;
        m.glucose = 300.0;
        m.insulin = 0.0;
        m.diabetes_pedigree_function = 3.0;
        assert!(validate_measurements(m).is_ok());
    }

    #[test]
    fn error_message_lists_each_issue() {
        let mut raw = RawObservation::from(sample_measurements());
        raw.glucose = None;
        raw.age = None;
        let message = validate_observation(&raw).unwrap_err().to_string();
        assert!(message.contains("glucose is required"));
        assert!(message.contains("age is required"));
    }

    #[test]
    fn stored_observation_deserializes_through_validation() {
        let obs = sample_observation();
        let json = serde_json::to_string(&obs).unwrap();
        let back: ClinicalObservation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, obs);

        let tampered = json.replace("148.0", "999.0");
        assert!(serde_json::from_str::<ClinicalObservation>(&tampered).is_err());
    }
}
