use serde::{Deserialize, Serialize};

use crate::config::TrainingSettings;

/// Held-out classification quality. Undefined ratios (no predicted or no
/// actual positives) count as 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl EvaluationMetrics {
    pub fn compute(predicted: &[bool], actual: &[bool]) -> Self {
        let mut tp = 0usize;
        let mut tn = 0usize;
        let mut fp = 0usize;
        let mut fn_ = 0usize;
        for (p, a) in predicted.iter().zip(actual) {
            match (p, a) {
                (true, true) => tp += 1,
                (false, false) => tn += 1,
                (true, false) => fp += 1,
                (false, true) => fn_ += 1,
            }
        }

        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };

        Self {
            accuracy: ratio(tp + tn, tp + tn + fp + fn_),
            precision,
            recall,
            f1,
        }
    }

    /// Names of every metric below its configured minimum.
    pub fn shortfalls(&self, settings: &TrainingSettings) -> Vec<String> {
        [
            ("accuracy", self.accuracy, settings.min_accuracy),
            ("precision", self.precision, settings.min_precision),
            ("recall", self.recall, settings.min_recall),
            ("f1", self.f1, settings.min_f1),
        ]
        .into_iter()
        .filter(|(_, value, minimum)| value < minimum)
        .map(|(name, value, minimum)| format!("{name} {value:.3} < {minimum:.3}"))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confusion_matrix_ratios() {
        let predicted = [true, true, false, false, true];
        let actual = [true, false, false, true, true];
        let m = EvaluationMetrics::compute(&predicted, &actual);
        assert!((m.accuracy - 0.6).abs() < 1e-12);
        assert!((m.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.f1 - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn no_positive_predictions_scores_zero_not_nan() {
        let m = EvaluationMetrics::compute(&[false, false], &[true, false]);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.f1, 0.0);
        assert_eq!(m.accuracy, 0.5);
    }

    #[test]
    fn shortfalls_name_each_failed_metric() {
        let m = EvaluationMetrics {
            accuracy: 0.9,
            precision: 0.4,
            recall: 0.9,
            f1: 0.5,
        };
        let failures = m.shortfalls(&TrainingSettings::default());
        assert_eq!(failures.len(), 2);
        assert!(failures[0].starts_with("precision"));
        assert!(failures[1].starts_with("f1"));
    }
}
