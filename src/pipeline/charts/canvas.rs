//! Minimal deterministic raster primitives over an RGB buffer.
//!
//! No anti-aliasing and no floating-point accumulation across pixels, so the
//! same drawing calls always produce the same bytes.

use std::io::Cursor;

use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};

use super::ChartError;

pub type Color = [u8; 3];

pub const WHITE: Color = [255, 255, 255];
pub const AXIS: Color = [75, 85, 99];
pub const GRID: Color = [229, 231, 235];
pub const TARGET: Color = [156, 163, 175];
pub const GREEN: Color = [16, 185, 129];
pub const AMBER: Color = [245, 158, 11];
pub const RED: Color = [239, 68, 68];
pub const BLUE: Color = [37, 99, 235];

pub struct Canvas {
    img: RgbImage,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            img: RgbImage::from_pixel(width, height, Rgb(WHITE)),
        }
    }

    pub fn width(&self) -> u32 {
        self.img.width()
    }

    pub fn height(&self) -> u32 {
        self.img.height()
    }

    fn put(&mut self, x: i64, y: i64, color: Color) {
        if x >= 0 && y >= 0 && (x as u32) < self.img.width() && (y as u32) < self.img.height() {
            self.img.put_pixel(x as u32, y as u32, Rgb(color));
        }
    }

    /// Mix `color` over the existing pixel; `alpha` is out of 255.
    fn blend(&mut self, x: i64, y: i64, color: Color, alpha: u16) {
        if x < 0 || y < 0 || x as u32 >= self.img.width() || y as u32 >= self.img.height() {
            return;
        }
        let px = self.img.get_pixel_mut(x as u32, y as u32);
        for (dst, src) in px.0.iter_mut().zip(color) {
            *dst = ((src as u16 * alpha + *dst as u16 * (255 - alpha)) / 255) as u8;
        }
    }

    /// Half-open rectangle `[x0, x1) × [y0, y1)`.
    pub fn fill_rect(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, color: Color) {
        for y in y0.min(y1)..y0.max(y1) {
            for x in x0.min(x1)..x0.max(x1) {
                self.put(x, y, color);
            }
        }
    }

    /// Bresenham line with a square pen of `thickness` pixels.
    pub fn line(&mut self, from: (i64, i64), to: (i64, i64), thickness: i64, color: Color) {
        let (mut x, mut y) = from;
        let dx = (to.0 - x).abs();
        let dy = -(to.1 - y).abs();
        let sx = if x < to.0 { 1 } else { -1 };
        let sy = if y < to.1 { 1 } else { -1 };
        let mut err = dx + dy;
        let half = thickness.max(1) / 2;

        loop {
            self.fill_rect(x - half, y - half, x - half + thickness.max(1), y - half + thickness.max(1), color);
            if x == to.0 && y == to.1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    pub fn polyline_closed(&mut self, points: &[(i64, i64)], thickness: i64, color: Color) {
        for (i, p) in points.iter().enumerate() {
            let next = points[(i + 1) % points.len()];
            self.line(*p, next, thickness, color);
        }
    }

    /// Even-odd scanline fill, sampling each pixel at its centre.
    pub fn fill_polygon(&mut self, points: &[(i64, i64)], color: Color, alpha: u16) {
        if points.len() < 3 {
            return;
        }
        let min_y = points.iter().map(|p| p.1).min().unwrap_or(0);
        let max_y = points.iter().map(|p| p.1).max().unwrap_or(0);

        for y in min_y..=max_y {
            // Doubled coordinates keep the pixel-centre test in integers.
            let sample = 2 * y + 1;
            let mut crossings: Vec<i64> = Vec::new();
            for (i, a) in points.iter().enumerate() {
                let b = points[(i + 1) % points.len()];
                let (ay, by) = (2 * a.1, 2 * b.1);
                if (ay <= sample && by > sample) || (by <= sample && ay > sample) {
                    let num = (sample - ay) * (b.0 - a.0);
                    let den = by - ay;
                    crossings.push(a.0 + num.div_euclid(den));
                }
            }
            crossings.sort_unstable();
            for pair in crossings.chunks_exact(2) {
                for x in pair[0]..pair[1] {
                    self.blend(x, y, color, alpha);
                }
            }
        }
    }

    pub fn fill_circle(&mut self, center: (i64, i64), radius: i64, color: Color) {
        let r2 = radius * radius;
        for y in -radius..=radius {
            for x in -radius..=radius {
                if x * x + y * y <= r2 {
                    self.put(center.0 + x, center.1 + y, color);
                }
            }
        }
    }

    /// Paint each pixel of a disc with the colour `pick` returns for its angle.
    ///
    /// Angles are in turns, clockwise from 12 o'clock, in `[0, 1)`.
    pub fn fill_disc_by_angle<F>(&mut self, center: (i64, i64), radius: i64, mut pick: F)
    where
        F: FnMut(f64) -> Color,
    {
        let r2 = radius * radius;
        for y in -radius..=radius {
            for x in -radius..=radius {
                if x * x + y * y > r2 {
                    continue;
                }
                let turns = (x as f64).atan2(-(y as f64)) / std::f64::consts::TAU;
                let turns = if turns < 0.0 { turns + 1.0 } else { turns };
                let color = pick(turns);
                self.put(center.0 + x, center.1 + y, color);
            }
        }
    }

    pub fn encode_png(self) -> Result<Vec<u8>, ChartError> {
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(self.img)
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .map_err(|e| ChartError::Encode(e.to_string()))?;
        Ok(cursor.into_inner())
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> Color {
        self.img.get_pixel(x, y).0
    }
}

/// Lighter tint of `color`, `amount` out of 255 toward white.
pub fn tint(color: Color, amount: u16) -> Color {
    let mut out = color;
    for c in out.iter_mut() {
        *c = ((*c as u16 * (255 - amount) + 255 * amount) / 255) as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_is_clipped_to_canvas() {
        let mut c = Canvas::new(10, 10);
        c.fill_rect(-5, -5, 3, 3, RED);
        assert_eq!(c.pixel(0, 0), RED);
        assert_eq!(c.pixel(2, 2), RED);
        assert_eq!(c.pixel(3, 3), WHITE);
    }

    #[test]
    fn line_reaches_both_endpoints() {
        let mut c = Canvas::new(20, 20);
        c.line((1, 1), (15, 9), 1, BLUE);
        assert_eq!(c.pixel(1, 1), BLUE);
        assert_eq!(c.pixel(15, 9), BLUE);
    }

    #[test]
    fn polygon_fill_covers_interior_only() {
        let mut c = Canvas::new(20, 20);
        c.fill_polygon(&[(2, 2), (12, 2), (12, 12), (2, 12)], GREEN, 255);
        assert_eq!(c.pixel(6, 6), GREEN);
        assert_eq!(c.pixel(15, 15), WHITE);
    }

    #[test]
    fn disc_quadrants_follow_clockwise_turns() {
        let mut c = Canvas::new(41, 41);
        c.fill_disc_by_angle((20, 20), 15, |t| if t < 0.25 { RED } else { BLUE });
        // Up and to the right is the first quarter turn.
        assert_eq!(c.pixel(25, 12), RED);
        // Down and to the left is later.
        assert_eq!(c.pixel(15, 28), BLUE);
    }

    #[test]
    fn png_starts_with_signature() {
        let bytes = Canvas::new(4, 4).encode_png().unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn tint_moves_toward_white() {
        assert_eq!(tint(RED, 0), RED);
        assert_eq!(tint(RED, 255), WHITE);
    }
}
