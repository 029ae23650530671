use super::canvas::{tint, Canvas, Color, WHITE};
use super::reference::{assess_ranges, BandStatus, PIE_WEIGHTS};
use super::ChartError;
use crate::models::ClinicalObservation;

const SIZE: u32 = 600;
const RADIUS: i64 = 230;

/// One hue per feature, in feature order.
pub const SLICE_COLORS: [Color; 8] = [
    [139, 92, 246],
    [239, 68, 68],
    [245, 158, 11],
    [20, 184, 166],
    [59, 130, 246],
    [236, 72, 153],
    [132, 204, 22],
    [100, 116, 139],
];

/// Fixed-weight feature breakdown. Slices for features outside their normal
/// band are drawn at full strength; the rest are tinted.
pub fn render_pie(observation: &ClinicalObservation) -> Result<Vec<u8>, ChartError> {
    let mut canvas = Canvas::new(SIZE, SIZE);
    let center = (SIZE as i64 / 2, SIZE as i64 / 2);

    let colors: Vec<Color> = assess_ranges(observation)
        .iter()
        .zip(SLICE_COLORS)
        .map(|((_, _, status), color)| {
            if *status == BandStatus::Normal {
                tint(color, 150)
            } else {
                color
            }
        })
        .collect();

    let mut bounds = [0.0; 8];
    let mut acc = 0.0;
    for (bound, weight) in bounds.iter_mut().zip(PIE_WEIGHTS) {
        acc += weight;
        *bound = acc;
    }

    canvas.fill_disc_by_angle(center, RADIUS, |turns| {
        let slice = bounds.iter().position(|b| turns < *b).unwrap_or(bounds.len() - 1);
        colors[slice]
    });

    let mut start = 0.0;
    for weight in PIE_WEIGHTS {
        let angle = std::f64::consts::TAU * start - std::f64::consts::FRAC_PI_2;
        let edge = (
            center.0 + (RADIUS as f64 * angle.cos()).round() as i64,
            center.1 + (RADIUS as f64 * angle.sin()).round() as i64,
        );
        canvas.line(center, edge, 2, WHITE);
        start += weight;
    }

    canvas.encode_png()
}
