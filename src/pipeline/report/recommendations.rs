//! Rule-based personalized recommendations for the report.

use serde::{Deserialize, Serialize};

use crate::models::{ClinicalObservation, RiskLabel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationGroup {
    pub category: String,
    pub items: Vec<String>,
}

fn group(category: &str, items: &[&str]) -> RecommendationGroup {
    RecommendationGroup {
        category: category.to_string(),
        items: items.iter().map(|s| s.to_string()).collect(),
    }
}

/// Groups in display order: risk level first, then measurement-specific
/// advice, then the general lifestyle groups every report carries.
pub fn personalized(observation: &ClinicalObservation, label: RiskLabel) -> Vec<RecommendationGroup> {
    let mut groups = Vec::new();

    groups.push(match label {
        RiskLabel::Diabetic => group(
            "High priority: follow up soon",
            &[
                "Book an appointment with your doctor or an endocrinologist within 1-2 weeks",
                "Ask about an HbA1c test to assess long-term glucose control",
                "Ask whether home blood glucose monitoring is right for you",
                "Consider meeting a certified diabetes educator",
            ],
        ),
        RiskLabel::NonDiabetic => group(
            "Prevention: keep healthy habits",
            &[
                "Continue regular health check-ups",
                "Maintain your current healthy lifestyle",
                "Have blood sugar checked at least once a year",
            ],
        ),
    });

    let glucose = observation.glucose();
    if glucose > 126.0 {
        groups.push(RecommendationGroup {
            category: "Blood glucose".into(),
            items: vec![
                format!("Your glucose ({glucose:.0} mg/dL) is elevated; a typical fasting target is below 100 mg/dL"),
                "Limit refined carbohydrates, sweets and sugary drinks".into(),
                "Prefer low glycemic index foods such as whole grains and legumes".into(),
            ],
        });
    } else if glucose > 100.0 {
        groups.push(RecommendationGroup {
            category: "Blood glucose: borderline".into(),
            items: vec![
                format!("Your glucose ({glucose:.0} mg/dL) is in the pre-diabetic range"),
                "Reduce refined carbohydrates and increase fiber".into(),
                "Regular exercise improves insulin sensitivity".into(),
            ],
        });
    }

    let bmi = observation.bmi();
    if bmi > 30.0 {
        groups.push(RecommendationGroup {
            category: "Weight: obesity range".into(),
            items: vec![
                format!("Your BMI ({bmi:.1}) is in the obesity range; a healthy target is below 25"),
                "An initial 5-10% weight loss brings meaningful health benefits".into(),
                "A registered dietitian can help build a meal plan".into(),
            ],
        });
    } else if bmi > 25.0 {
        groups.push(RecommendationGroup {
            category: "Weight: overweight range".into(),
            items: vec![
                format!("Your BMI ({bmi:.1}) is in the overweight range"),
                "Aim for gradual weight loss of 0.5-1 kg per week".into(),
                "Smaller portions and mindful eating help".into(),
            ],
        });
    } else if bmi < 18.5 {
        groups.push(RecommendationGroup {
            category: "Weight: underweight range".into(),
            items: vec![
                format!("Your BMI ({bmi:.1}) is in the underweight range"),
                "Ask your doctor to rule out underlying conditions".into(),
                "Favor nutrient-dense foods and healthy fats".into(),
            ],
        });
    }

    let bp = observation.blood_pressure();
    if bp > 90.0 {
        groups.push(RecommendationGroup {
            category: "Blood pressure".into(),
            items: vec![
                format!("Your blood pressure ({bp:.0} mmHg) is elevated"),
                "Reduce salt and increase potassium-rich foods".into(),
                "Monitor blood pressure at home regularly".into(),
            ],
        });
    }

    let insulin = observation.insulin();
    if insulin > 200.0 || insulin < 16.0 {
        groups.push(RecommendationGroup {
            category: "Insulin".into(),
            items: vec![
                format!("Your insulin level ({insulin:.0} µU/mL) is outside the usual range"),
                "Regular aerobic activity and avoiding long sitting periods help".into(),
                "Discuss this value with your doctor for a detailed assessment".into(),
            ],
        });
    }

    groups.push(group(
        "Diet and activity",
        &[
            "Plate method: half vegetables, a quarter lean protein, a quarter whole grains",
            "Aim for 150 minutes of moderate exercise per week",
            "Stay hydrated and limit processed foods",
        ],
    ));
    groups.push(group(
        "Lifestyle and monitoring",
        &[
            "Get 7-9 hours of sleep and manage stress",
            "Avoid smoking and limit alcohol",
            "Keep follow-up appointments and track your progress",
        ],
    ));

    if observation.age() > 45.0 {
        groups.push(group(
            "Age-related considerations",
            &[
                "Annual comprehensive health screening",
                "Low-impact exercise to protect joints",
            ],
        ));
    }

    groups
}
