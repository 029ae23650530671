use super::canvas::{tint, Canvas, AXIS, GRID, TARGET};
use super::reference::{assess_ranges, BandStatus};
use super::{status_color, ChartError};
use crate::models::ClinicalObservation;

const WIDTH: u32 = 800;
const HEIGHT: u32 = 420;
const MARGIN: i64 = 40;

/// Grouped bars per feature: patient value (coloured by band) beside the
/// normal-range midpoint, both on the feature's normalized scale. The
/// normal band is shaded behind each group.
pub fn render_bar(observation: &ClinicalObservation) -> Result<Vec<u8>, ChartError> {
    let mut canvas = Canvas::new(WIDTH, HEIGHT);
    let plot_left = MARGIN;
    let plot_right = WIDTH as i64 - MARGIN;
    let plot_top = MARGIN;
    let baseline = HEIGHT as i64 - MARGIN;
    let plot_height = baseline - plot_top;

    for quarter in 1..=4 {
        let y = baseline - plot_height * quarter / 4;
        canvas.line((plot_left, y), (plot_right, y), 1, GRID);
    }

    let rows = assess_ranges(observation);
    let group_width = (plot_right - plot_left) / rows.len() as i64;
    let bar_width = group_width / 3;
    let to_y = |norm: f64| baseline - (norm * plot_height as f64).round() as i64;

    for (i, (range, value, status)) in rows.iter().enumerate() {
        let group_left = plot_left + i as i64 * group_width;

        let band_top = to_y(range.normalize(range.max));
        let band_bottom = to_y(range.normalize(range.min));
        canvas.fill_rect(
            group_left + 4,
            band_top,
            group_left + group_width - 4,
            band_bottom.max(band_top + 1),
            tint(status_color(BandStatus::Normal), 215),
        );

        let actual_left = group_left + bar_width / 2;
        canvas.fill_rect(
            actual_left,
            to_y(range.normalize(*value)),
            actual_left + bar_width,
            baseline,
            status_color(*status),
        );

        let target_left = actual_left + bar_width + 4;
        canvas.fill_rect(
            target_left,
            to_y(range.normalize(range.midpoint())),
            target_left + bar_width,
            baseline,
            TARGET,
        );
    }

    canvas.line((plot_left, baseline), (plot_right, baseline), 2, AXIS);
    canvas.line((plot_left, plot_top), (plot_left, baseline), 2, AXIS);
    canvas.encode_png()
}
