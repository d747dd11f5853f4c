//! Deterministic typeface for tests.
//!
//! Shared with the integration tests, which include this file by path;
//! `LineMetrics` and `Typeface` come from the including crate root.

use super::{LineMetrics, Typeface};

/// Every glyph is a solid block, 0.4 em wide and 0.7 em tall, on a 0.6 em
/// advance. Spaces draw nothing. At 100 px all metrics are whole pixels.
pub struct BlockFace;

impl Typeface for BlockFace {
    fn metrics(&self, px: f32) -> LineMetrics {
        LineMetrics {
            ascent: px * 8.0 / 10.0,
            descent: -px * 2.0 / 10.0,
            line_gap: 0.0,
        }
    }

    fn advance(&self, _ch: char, px: f32) -> f32 {
        px * 6.0 / 10.0
    }

    fn draw(&self, ch: char, px: f32, x: f32, baseline: f32, plot: &mut dyn FnMut(i32, i32, f32)) {
        if ch.is_whitespace() {
            return;
        }
        let left = (x + px / 10.0).round() as i32;
        let right = (x + px * 5.0 / 10.0).round() as i32;
        let top = (baseline - px * 7.0 / 10.0).round() as i32;
        let bottom = baseline.round() as i32;
        for y in top..bottom {
            for x in left..right {
                plot(x, y, 1.0);
            }
        }
    }
}
