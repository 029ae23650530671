//! Prompt text for report and comparison narratives.

use crate::models::{AssessmentRecord, ClinicalObservation, RiskAssessment};
use crate::pipeline::charts::reference::assess_ranges;
use crate::pipeline::charts::trend::{range_for, TREND_FEATURES};

pub const REPORT_SYSTEM_PROMPT: &str = "\
You are a careful clinical writing assistant preparing the narrative section of a \
diabetes risk screening report for a patient.

RULES:
- Do NOT state a definitive diagnosis. This is a screening estimate from a statistical model.
- Always recommend that the patient discusses the result with a qualified healthcare professional.
- Do NOT prescribe, start, stop, or change any medication, and never mention doses.
- Use a calm, supportive, plain-language tone.
- Refer to the measurements provided; do not invent values.
- Keep the narrative under 250 words.";

/// Patient summary and model output as the user message.
pub fn report_user_prompt(observation: &ClinicalObservation, assessment: &RiskAssessment) -> String {
    let m = observation.measurements();
    let mut prompt = String::new();
    prompt.push_str("Patient measurements:\n");
    prompt.push_str(&format!("- Pregnancies: {:.0}\n", m.pregnancies));
    prompt.push_str(&format!("- Glucose: {:.1} mg/dL\n", m.glucose));
    prompt.push_str(&format!("- Blood pressure: {:.1} mmHg\n", m.blood_pressure));
    prompt.push_str(&format!("- Skin thickness: {:.1} mm\n", m.skin_thickness));
    prompt.push_str(&format!("- Insulin: {:.1} µU/mL\n", m.insulin));
    prompt.push_str(&format!("- BMI: {:.1} kg/m²\n", m.bmi));
    prompt.push_str(&format!(
        "- Diabetes pedigree function: {:.3}\n",
        m.diabetes_pedigree_function
    ));
    prompt.push_str(&format!("- Age: {:.0} years\n", m.age));

    prompt.push_str("\nCompared with reference ranges:\n");
    for (range, value, status) in assess_ranges(observation) {
        prompt.push_str(&format!(
            "- {}: {} ({}, normal {})\n",
            range.label,
            value,
            status.as_str(),
            range.describe()
        ));
    }

    prompt.push_str(&format!(
        "\nModel result: {} (probability {:.1}%, confidence {:.0}%).\n",
        assessment.label.display_name(),
        assessment.probability * 100.0,
        assessment.confidence_percent
    ));
    prompt.push_str(
        "\nWrite the narrative: what the result means, which measurements contribute most, \
         and general lifestyle steps worth discussing with a doctor.",
    );
    prompt
}

pub const COMPARISON_SYSTEM_PROMPT: &str = "\
You are a careful clinical writing assistant reviewing a patient's diabetes screening \
results over time.

RULES:
- Summarize in three sections titled Improvements, Concerns and Recommendations.
- Give at most three short bullet points per section, in plain language.
- Describe trends rather than repeating every raw number.
- Do NOT state a definitive diagnosis, and never prescribe or change medication.
- Recommend reviewing the trend with a qualified healthcare professional.
- Keep the response under 180 words.";

/// Assessments listed oldest to newest, one line each.
pub fn comparison_user_prompt(visits: &[AssessmentRecord]) -> String {
    let mut prompt = String::from("Patient assessments (oldest to most recent):\n");
    for (i, record) in visits.iter().enumerate() {
        let values = record.observation.measurements().values();
        let metrics: Vec<String> = TREND_FEATURES
            .iter()
            .filter_map(|(feature, _)| range_for(feature))
            .map(|(index, range)| format!("{} {:.1} {}", range.label, values[index], range.unit))
            .collect();
        prompt.push_str(&format!(
            "{}. {}: {} | Result: {} (probability {:.1}%, confidence {:.0}%)\n",
            i + 1,
            record.assessment.created_at.format("%Y-%m-%d %H:%M UTC"),
            metrics.join("; "),
            record.assessment.label.display_name(),
            record.assessment.probability * 100.0,
            record.assessment.confidence_percent
        ));
    }
    prompt.push_str("\nWrite the comparison.");
    prompt
}
