use super::canvas::{tint, Canvas, Color, AMBER, AXIS, BLUE, GREEN, GRID, RED};
use super::reference::{ReferenceRange, REFERENCE_RANGES};
use super::ChartError;
use crate::models::ClinicalObservation;

const WIDTH: u32 = 900;
const HEIGHT: u32 = 520;
const MARGIN: i64 = 50;

/// Measurements tracked across visits, with their line colours.
pub const TREND_FEATURES: [(&str, Color); 4] = [
    ("glucose", RED),
    ("blood_pressure", AMBER),
    ("bmi", BLUE),
    ("insulin", [124, 58, 237]),
];

pub(crate) fn range_for(feature: &str) -> Option<(usize, ReferenceRange)> {
    REFERENCE_RANGES
        .iter()
        .enumerate()
        .find(|(_, r)| r.feature == feature)
        .map(|(i, r)| (i, *r))
}

/// One line per tracked measurement across `visits` (oldest first), each on
/// its normalized scale so the normal midpoint sits at half height. The
/// shared normal level is drawn as a green guide.
pub fn render_trend(visits: &[ClinicalObservation]) -> Result<Vec<u8>, ChartError> {
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
    let to_y = |norm: f64| baseline - (norm * plot_height as f64).round() as i64;
    canvas.line((plot_left, to_y(0.5)), (plot_right, to_y(0.5)), 2, tint(GREEN, 120));

    let step = match visits.len() {
        0 | 1 => 0,
        n => (plot_right - plot_left - 2 * MARGIN) / (n as i64 - 1),
    };
    let to_x = |i: usize| {
        if visits.len() == 1 {
            (plot_left + plot_right) / 2
        } else {
            plot_left + MARGIN + step * i as i64
        }
    };

    for (feature, color) in TREND_FEATURES {
        let Some((index, range)) = range_for(feature) else {
            continue;
        };
        let points: Vec<(i64, i64)> = visits
            .iter()
            .enumerate()
            .map(|(i, obs)| (to_x(i), to_y(range.normalize(obs.measurements().values()[index]))))
            .collect();
        for pair in points.windows(2) {
            canvas.line(pair[0], pair[1], 3, color);
        }
        for point in &points {
            canvas.fill_circle(*point, 6, color);
        }
    }

    canvas.line((plot_left, baseline), (plot_right, baseline), 2, AXIS);
    canvas.line((plot_left, plot_top), (plot_left, baseline), 2, AXIS);
    canvas.encode_png()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::features::tests::sample_measurements;
    use crate::pipeline::features::validate_measurements;

    fn visit(glucose: f64, bmi: f64) -> ClinicalObservation {
        let mut m = sample_measurements();
        m.glucose = glucose;
        m.bmi = bmi;
        validate_measurements(m).unwrap()
    }

    #[test]
    fn every_tracked_feature_has_a_reference_range() {
        for (feature, _) in TREND_FEATURES {
            assert!(range_for(feature).is_some(), "{feature}");
        }
    }

    #[test]
    fn trend_is_a_deterministic_png() {
        let visits = [visit(160.0, 34.0), visit(140.0, 32.0), visit(118.0, 29.5)];
        let first = render_trend(&visits).unwrap();
        assert_eq!(&first[..4], b"\x89PNG");
        assert_eq!(first, render_trend(&visits).unwrap());
    }

    #[test]
    fn trend_reflects_the_values() {
        let falling = [visit(160.0, 34.0), visit(110.0, 27.0)];
        let rising = [visit(110.0, 27.0), visit(160.0, 34.0)];
        assert_ne!(render_trend(&falling).unwrap(), render_trend(&rising).unwrap());
    }
}
