//! Deterministic text used when the LLM is unavailable, and the summary line
//! every report narrative opens with.

use crate::models::{AssessmentRecord, ClinicalObservation, RiskAssessment, RiskLabel};
use crate::pipeline::charts::reference::{assess_ranges, BandStatus, ReferenceRange};
use crate::pipeline::charts::trend::{range_for, TREND_FEATURES};

pub const CHAT_FALLBACK: &str = "I'm having trouble answering right now. Please try again in a \
little while, and for anything urgent or specific to your health, contact your doctor.";

/// `Risk classification: HIGH RISK ...` with glucose and BMI to one decimal.
pub fn summary_line(observation: &ClinicalObservation, assessment: &RiskAssessment) -> String {
    format!(
        "Risk classification: {} ({}), probability {:.1}%, confidence {:.0}%. \
         Glucose {:.1} mg/dL, BMI {:.1} kg/m², age {:.0}.",
        assessment.label.banner(),
        assessment.label.display_name(),
        assessment.probability * 100.0,
        assessment.confidence_percent,
        observation.glucose(),
        observation.bmi(),
        observation.age()
    )
}

/// Templated narrative body populated from the assessment.
pub fn report_fallback(observation: &ClinicalObservation, assessment: &RiskAssessment) -> String {
    let outside: Vec<String> = assess_ranges(observation)
        .into_iter()
        .filter(|(_, _, status)| *status != BandStatus::Normal)
        .map(|(range, value, status)| {
            format!("{} ({} is {})", range.label, value, status.as_str().to_lowercase())
        })
        .collect();

    let opening = match assessment.label {
        RiskLabel::Diabetic => format!(
            "The screening model places this profile in the higher-risk group, with an estimated \
             probability of {:.1}%. This is not a diagnosis, but it is a signal worth following up \
             with a healthcare professional, who may suggest confirmatory tests such as fasting \
             glucose or HbA1c.",
            assessment.probability * 100.0
        ),
        RiskLabel::NonDiabetic => format!(
            "The screening model places this profile in the lower-risk group, with an estimated \
             probability of {:.1}%. Continued healthy habits and routine check-ups remain \
             worthwhile.",
            assessment.probability * 100.0
        ),
    };

    let findings = if outside.is_empty() {
        "All recorded measurements fall within their usual reference ranges.".to_string()
    } else {
        format!(
            "Measurements outside their usual reference ranges: {}.",
            outside.join(", ")
        )
    };

    format!(
        "{opening}\n\n{findings}\n\nBalanced meals, regular physical activity, adequate sleep and \
         periodic monitoring support healthy blood sugar. Please review these results with your \
         doctor before making any changes."
    )
}

/// How far `value` sits outside the normal band; zero inside it.
fn distance_from_normal(range: &ReferenceRange, value: f64) -> f64 {
    if value < range.min {
        range.min - value
    } else if value > range.max {
        value - range.max
    } else {
        0.0
    }
}

fn bullets(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        format!("- {empty}")
    } else {
        items.iter().map(|i| format!("- {i}")).collect::<Vec<_>>().join("\n")
    }
}

/// Improvements, concerns and recommendations from the first and last of
/// `visits` (oldest first).
pub fn comparison_fallback(visits: &[AssessmentRecord]) -> String {
    let (Some(first), Some(last)) = (visits.first(), visits.last()) else {
        return "No assessments were available to compare.".to_string();
    };
    let before = first.observation.measurements().values();
    let after = last.observation.measurements().values();

    let mut improvements = Vec::new();
    let mut concerns = Vec::new();
    for (index, range) in TREND_FEATURES.iter().filter_map(|(f, _)| range_for(f)) {
        let (old, new) = (before[index], after[index]);
        let (old_gap, new_gap) = (
            distance_from_normal(&range, old),
            distance_from_normal(&range, new),
        );
        let change = format!("{} went from {old:.1} to {new:.1} {}", range.label, range.unit);
        if new_gap < old_gap {
            improvements.push(format!("{change}, closer to the normal range."));
        } else if new_gap > old_gap {
            concerns.push(format!("{change}, further from the normal range."));
        }
    }

    let (p_old, p_new) = (
        first.assessment.probability * 100.0,
        last.assessment.probability * 100.0,
    );
    if p_new < p_old {
        improvements.push(format!("Estimated risk fell from {p_old:.1}% to {p_new:.1}%."));
    } else if p_new > p_old {
        concerns.push(format!("Estimated risk rose from {p_old:.1}% to {p_new:.1}%."));
    }

    format!(
        "Compared {} assessments from {} to {}.\n\nImprovements:\n{}\n\nConcerns:\n{}\n\n\
         Recommendations:\n- Keep up the habits behind any improvement and keep recording \
         measurements regularly.\n- Review these trends with your doctor, especially any \
         measurement that moved away from its normal range.",
        visits.len(),
        first.assessment.created_at.format("%Y-%m-%d"),
        last.assessment.created_at.format("%Y-%m-%d"),
        bullets(&improvements, "No measurement moved closer to its normal range."),
        bullets(&concerns, "No measurement moved further from its normal range.")
    )
}
