use serde::{Deserialize, Serialize};

use super::ModelError;
use crate::pipeline::features::FEATURE_COUNT;

/// Per-feature standardization `(x - mean) / std`, fitted on training rows only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl StandardScaler {
    /// Population standard deviation; constant columns get a scale of 1.
    pub fn fit(rows: &[[f64; FEATURE_COUNT]]) -> Result<Self, ModelError> {
        if rows.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        let n = rows.len() as f64;
        let mut means = vec![0.0; FEATURE_COUNT];
        let mut scales = vec![0.0; FEATURE_COUNT];

        for (j, mean) in means.iter_mut().enumerate() {
            *mean = rows.iter().map(|r| r[j]).sum::<f64>() / n;
        }
        for (j, scale) in scales.iter_mut().enumerate() {
            let variance = rows.iter().map(|r| (r[j] - means[j]).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();
            *scale = if std > f64::EPSILON { std } else { 1.0 };
        }

        Ok(Self { means, scales })
    }

    /// Pass-through scaler, used for hand-built bundles.
    pub fn identity() -> Self {
        Self {
            means: vec![0.0; FEATURE_COUNT],
            scales: vec![1.0; FEATURE_COUNT],
        }
    }

    pub fn transform(&self, row: &[f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
        let mut out = [0.0; FEATURE_COUNT];
        for (j, value) in out.iter_mut().enumerate() {
            *value = (row[j] - self.means[j]) / self.scales[j];
        }
        out
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.means.len() != FEATURE_COUNT || self.scales.len() != FEATURE_COUNT {
            return Err(ModelError::Corrupt(format!(
                "scaler has {} means and {} scales, expected {FEATURE_COUNT}",
                self.means.len(),
                self.scales.len()
            )));
        }
        if self.scales.iter().any(|s| !s.is_finite() || *s <= 0.0)
            || self.means.iter().any(|m| !m.is_finite())
        {
            return Err(ModelError::Corrupt("scaler has non-finite or zero scale".into()));
        }
        Ok(())
    }
}
