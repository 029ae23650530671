//! Report assembly: assessment, narrative and charts into one document.
//!
//! Assembly is all-or-nothing. Every input must be present or the call
//! fails naming what is missing, so no partial report is ever rendered.

pub mod pdf;
pub mod recommendations;
pub mod store;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ChartKind, ClinicalObservation, RiskAssessment};
use crate::pipeline::charts::reference::assess_ranges;
use crate::pipeline::charts::ChartSet;
use crate::pipeline::narrative::{Narrative, DISCLAIMER};
use recommendations::{personalized, RecommendationGroup};

pub use pdf::{render_pdf, PdfError};
pub use store::{ReportStore, StoreError};

pub const REPORT_TITLE: &str = "Diabetes Risk Assessment Report";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("Cannot assemble report: missing {0}")]
    MissingInput(&'static str),
}

/// Everything a report needs. Callers pass what they have; `assemble`
/// decides whether it is enough.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReportInput<'a> {
    pub observation: Option<&'a ClinicalObservation>,
    pub assessment: Option<&'a RiskAssessment>,
    pub narrative: Option<&'a Narrative>,
    pub charts: Option<&'a ChartSet>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionKind {
    Header,
    Diagnosis,
    PatientData,
    ResultStatistics,
    Recommendations,
}

impl SectionKind {
    pub const ORDER: [SectionKind; 5] = [
        SectionKind::Header,
        SectionKind::Diagnosis,
        SectionKind::PatientData,
        SectionKind::ResultStatistics,
        SectionKind::Recommendations,
    ];

    pub fn heading(&self) -> &'static str {
        match self {
            Self::Header => REPORT_TITLE,
            Self::Diagnosis => "Diagnosis",
            Self::PatientData => "Patient Data",
            Self::ResultStatistics => "Result Statistics",
            Self::Recommendations => "Recommendations",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Paragraph(String),
    /// Emphasized one-line statement.
    Banner(String),
    Fields(Vec<(String, String)>),
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    Chart {
        kind: ChartKind,
        caption: String,
        png: Vec<u8>,
    },
    Recommendations(Vec<RecommendationGroup>),
    Disclaimer(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportSection {
    pub kind: SectionKind,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportDocument {
    pub assessment_id: Uuid,
    pub title: String,
    pub sections: Vec<ReportSection>,
}

impl ReportDocument {
    pub fn section(&self, kind: SectionKind) -> Option<&ReportSection> {
        self.sections.iter().find(|s| s.kind == kind)
    }
}

fn chart_caption(kind: ChartKind) -> &'static str {
    match kind {
        ChartKind::Bar => "Measured values against the midpoint of each normal range",
        ChartKind::Radar => "Normalized profile; the inner ring marks the normal midpoint",
        ChartKind::Pie => "Relative weight of each factor; highlighted slices are outside the normal range",
    }
}

pub fn assemble(input: ReportInput<'_>) -> Result<ReportDocument, AssemblyError> {
    let observation = input
        .observation
        .ok_or(AssemblyError::MissingInput("observation"))?;
    let assessment = input
        .assessment
        .ok_or(AssemblyError::MissingInput("assessment"))?;
    let narrative = input
        .narrative
        .ok_or(AssemblyError::MissingInput("narrative"))?;
    let charts = input.charts.ok_or(AssemblyError::MissingInput("charts"))?;

    let header = ReportSection {
        kind: SectionKind::Header,
        blocks: vec![Block::Fields(vec![
            ("Report ID".into(), assessment.id.to_string()),
            (
                "Assessment date".into(),
                assessment.created_at.format("%Y-%m-%d %H:%M UTC").to_string(),
            ),
            ("Requested by".into(), assessment.requested_by.clone()),
            ("Model version".into(), assessment.model_version.clone()),
        ])],
    };

    let mut diagnosis_blocks = vec![Block::Banner(format!(
        "{}: {}",
        assessment.label.banner(),
        assessment.label.display_name()
    ))];
    diagnosis_blocks.extend(
        narrative
            .text
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty() && *p != DISCLAIMER)
            .map(|p| Block::Paragraph(p.to_string())),
    );
    let diagnosis = ReportSection {
        kind: SectionKind::Diagnosis,
        blocks: diagnosis_blocks,
    };

    let rows = assess_ranges(observation)
        .into_iter()
        .map(|(range, value, status)| {
            vec![
                range.label.to_string(),
                if range.unit.is_empty() {
                    format!("{value}")
                } else {
                    format!("{value} {}", range.unit)
                },
                range.describe(),
                status.as_str().to_string(),
            ]
        })
        .collect();
    let patient_data = ReportSection {
        kind: SectionKind::PatientData,
        blocks: vec![Block::Table {
            headers: vec![
                "Measurement".into(),
                "Value".into(),
                "Normal range".into(),
                "Status".into(),
            ],
            rows,
        }],
    };

    let mut stats_blocks = vec![Block::Fields(vec![
        (
            "Probability of diabetes".into(),
            format!("{:.1}%", assessment.probability * 100.0),
        ),
        (
            "Model confidence".into(),
            format!("{:.0}%", assessment.confidence_percent),
        ),
        ("Classification".into(), assessment.label.display_name().into()),
        (
            "BMI x age".into(),
            format!("{:.1}", observation.bmi_age_product()),
        ),
        (
            "Glucose / insulin ratio".into(),
            format!("{:.2}", observation.glucose_insulin_ratio()),
        ),
    ])];
    stats_blocks.extend(ChartKind::ALL.into_iter().map(|kind| Block::Chart {
        kind,
        caption: chart_caption(kind).into(),
        png: charts.get(kind).to_vec(),
    }));
    let statistics = ReportSection {
        kind: SectionKind::ResultStatistics,
        blocks: stats_blocks,
    };

    let recommendations = ReportSection {
        kind: SectionKind::Recommendations,
        blocks: vec![
            Block::Recommendations(personalized(observation, assessment.label)),
            Block::Disclaimer(DISCLAIMER.into()),
        ],
    };

    Ok(ReportDocument {
        assessment_id: assessment.id,
        title: REPORT_TITLE.into(),
        sections: vec![header, diagnosis, patient_data, statistics, recommendations],
    })
}
