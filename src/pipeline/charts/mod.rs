//! Visualization renderer: three comparison charts per observation, plus a
//! trend chart across several observations.
//!
//! All charts are pure functions of their observations and the static
//! reference table, so identical input always yields byte-identical PNGs.

pub mod bar;
pub mod canvas;
pub mod pie;
pub mod radar;
pub mod reference;
pub mod trend;

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::models::{ChartKind, ClinicalObservation};
use crate::pipeline::report::store::{ReportStore, StoreError};
use canvas::{Color, AMBER, BLUE, GREEN, RED};
use reference::BandStatus;

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("PNG encoding failed: {0}")]
    Encode(String),

    #[error("Chart storage failed: {0}")]
    Store(#[from] StoreError),
}

pub(crate) fn status_color(status: BandStatus) -> Color {
    match status {
        BandStatus::Low => BLUE,
        BandStatus::Normal => GREEN,
        BandStatus::Borderline => AMBER,
        BandStatus::High => RED,
    }
}

/// Encoded PNG bytes for each chart kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSet {
    pub bar: Vec<u8>,
    pub radar: Vec<u8>,
    pub pie: Vec<u8>,
}

impl ChartSet {
    pub fn get(&self, kind: ChartKind) -> &[u8] {
        match kind {
            ChartKind::Bar => &self.bar,
            ChartKind::Radar => &self.radar,
            ChartKind::Pie => &self.pie,
        }
    }
}

pub fn render_charts(observation: &ClinicalObservation) -> Result<ChartSet, ChartError> {
    Ok(ChartSet {
        bar: bar::render_bar(observation)?,
        radar: radar::render_radar(observation)?,
        pie: pie::render_pie(observation)?,
    })
}

/// Write every chart under the assessment's directory, replacing older files.
pub fn persist_charts(
    store: &ReportStore,
    assessment_id: &Uuid,
    charts: &ChartSet,
) -> Result<Vec<PathBuf>, ChartError> {
    let mut paths = Vec::with_capacity(ChartKind::ALL.len());
    for kind in ChartKind::ALL {
        paths.push(store.write_chart(assessment_id, kind, charts.get(kind))?);
    }
    tracing::debug!(assessment_id = %assessment_id, "Charts persisted");
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::features::tests::{sample_measurements, sample_observation};
    use crate::pipeline::features::validate_measurements;

    #[test]
    fn rendering_is_byte_identical() {
        let obs = sample_observation();
        let first = render_charts(&obs).unwrap();
        let second = render_charts(&obs).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn different_observations_give_different_charts() {
        let mut m = sample_measurements();
        m.glucose = 90.0;
        m.bmi = 22.0;
        let healthier = validate_measurements(m).unwrap();

        let a = render_charts(&sample_observation()).unwrap();
        let b = render_charts(&healthier).unwrap();
        assert_ne!(a.bar, b.bar);
        assert_ne!(a.radar, b.radar);
        assert_ne!(a.pie, b.pie);
    }

    #[test]
    fn every_chart_is_a_png() {
        let charts = render_charts(&sample_observation()).unwrap();
        for kind in ChartKind::ALL {
            assert_eq!(&charts.get(kind)[..4], b"\x89PNG");
        }
    }

    #[test]
    fn persisting_twice_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());
        let id = Uuid::new_v4();
        let charts = render_charts(&sample_observation()).unwrap();

        let first = persist_charts(&store, &id, &charts).unwrap();
        let second = persist_charts(&store, &id, &charts).unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::read(&first[0]).unwrap(), charts.bar);
        let files = std::fs::read_dir(dir.path().join(id.to_string())).unwrap().count();
        assert_eq!(files, 3);
    }
}
