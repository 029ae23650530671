use super::canvas::{Canvas, BLUE, GREEN, GRID};
use super::reference::REFERENCE_RANGES;
use super::ChartError;
use crate::models::ClinicalObservation;

const SIZE: u32 = 600;
const RADIUS: f64 = 240.0;

fn vertex(center: f64, axis: usize, axes: usize, norm: f64) -> (i64, i64) {
    let angle = std::f64::consts::TAU * axis as f64 / axes as f64 - std::f64::consts::FRAC_PI_2;
    (
        (center + RADIUS * norm * angle.cos()).round() as i64,
        (center + RADIUS * norm * angle.sin()).round() as i64,
    )
}

fn ring(center: f64, axes: usize, norm: f64) -> Vec<(i64, i64)> {
    (0..axes).map(|i| vertex(center, i, axes, norm)).collect()
}

/// Patient profile over all eight features, each normalized so the target
/// midpoint lies on the 0.5 ring.
pub fn render_radar(observation: &ClinicalObservation) -> Result<Vec<u8>, ChartError> {
    let mut canvas = Canvas::new(SIZE, SIZE);
    let center = SIZE as f64 / 2.0;
    let axes = REFERENCE_RANGES.len();
    let hub = (center as i64, center as i64);

    for quarter in 1..=4 {
        canvas.polyline_closed(&ring(center, axes, quarter as f64 / 4.0), 1, GRID);
    }
    for i in 0..axes {
        canvas.line(hub, vertex(center, i, axes, 1.0), 1, GRID);
    }

    canvas.polyline_closed(&ring(center, axes, 0.5), 2, GREEN);

    let patient: Vec<(i64, i64)> = REFERENCE_RANGES
        .iter()
        .zip(observation.measurements().values())
        .enumerate()
        .map(|(i, (range, value))| vertex(center, i, axes, range.normalize(value)))
        .collect();
    canvas.fill_polygon(&patient, BLUE, 70);
    canvas.polyline_closed(&patient, 3, BLUE);
    for point in &patient {
        canvas.fill_circle(*point, 5, BLUE);
    }

    canvas.encode_png()
}
