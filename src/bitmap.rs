//! Grayscale canvases and the monochrome bitmaps made from them.
use std::io::Cursor;

use image::{GrayImage, ImageFormat, Luma};

use crate::{error::Error, params::Orientation};

pub const WHITE: u8 = 255;

/// Anti-aliased 8-bit canvas, 255 is paper and 0 is full ink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl GrayBuffer {
    pub fn blank(width: u32, height: u32) -> Self {
        GrayBuffer {
            width,
            height,
            data: vec![WHITE; width as usize * height as usize],
        }
    }

    /// Darken a pixel by `coverage`. Returns false, leaving the canvas
    /// untouched, for coordinates off the canvas.
    pub fn cover(&mut self, x: i32, y: i32, coverage: f32) -> bool {
        if x < 0 || y < 0 || x as i64 >= self.width as i64 || y as i64 >= self.height as i64 {
            return false;
        }
        let idx = y as usize * self.width as usize + x as usize;
        let ink = (coverage.clamp(0.0, 1.0) * 255.0).round() as u8;
        self.data[idx] = self.data[idx].saturating_sub(ink);
        true
    }

    /// Hard cutoff, a pixel is ink iff it is darker than `cutoff`.
    pub fn threshold(&self, cutoff: u8) -> Vec<bool> {
        self.data.iter().map(|&v| v < cutoff).collect()
    }

    /// Floyd-Steinberg error diffusion at the midpoint.
    pub fn dither(&self) -> Vec<bool> {
        let width = self.width as usize;
        let height = self.height as usize;
        let mut values: Vec<f32> = self.data.iter().map(|&v| v as f32).collect();
        let mut ink = vec![false; values.len()];

        for y in 0..height {
            for x in 0..width {
                let idx = y * width + x;
                let old = values[idx];
                let new = if old < 128.0 { 0.0 } else { 255.0 };
                ink[idx] = new == 0.0;
                let err = old - new;

                if x + 1 < width {
                    values[idx + 1] += err * 7.0 / 16.0;
                }
                if y + 1 < height {
                    if x > 0 {
                        values[idx + width - 1] += err * 3.0 / 16.0;
                    }
                    values[idx + width] += err * 5.0 / 16.0;
                    if x + 1 < width {
                        values[idx + width + 1] += err * 1.0 / 16.0;
                    }
                }
            }
        }
        ink
    }

    /// Anti-aliased 8-bit PNG of the canvas, as laid out.
    pub fn to_png(&self) -> Result<Vec<u8>, Error> {
        let width = self.width as usize;
        let image = GrayImage::from_fn(self.width, self.height, |x, y| {
            let idx = y as usize * width + x as usize;
            Luma([self.data.get(idx).copied().unwrap_or(WHITE)])
        });
        let mut bytes: Vec<u8> = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }
}

/// Map a 0..=100 threshold percentage onto the 8-bit cutoff.
///
/// A higher threshold keeps fewer pixels as ink: 70 gives a cutoff of 76.
pub fn threshold_cutoff(threshold: u8) -> u8 {
    let percent = 100u32.saturating_sub(threshold.min(100) as u32);
    (percent * 255 / 100) as u8
}

/// One label worth of ink, as laid out.
///
/// In rotated orientation the bitmap is laid out with the label length along
/// `width`; [`RenderedBitmap::upright`] turns it back onto the print head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBitmap {
    pub width: u32,
    pub height: u32,
    pub orientation: Orientation,
    /// Catalog identifier of the label this was rendered for.
    pub label: String,
    /// Printable width of the label across the print head, in dots.
    pub printable_width: u32,
    ink: Vec<bool>,
}

impl RenderedBitmap {
    pub fn new(
        width: u32,
        height: u32,
        ink: Vec<bool>,
        orientation: Orientation,
        label: &str,
        printable_width: u32,
    ) -> Self {
        debug_assert_eq!(ink.len(), width as usize * height as usize);
        RenderedBitmap {
            width,
            height,
            orientation,
            label: label.to_string(),
            printable_width,
            ink,
        }
    }

    pub fn is_ink(&self, x: u32, y: u32) -> bool {
        self.ink[y as usize * self.width as usize + x as usize]
    }

    pub fn row(&self, y: u32) -> &[bool] {
        let start = y as usize * self.width as usize;
        &self.ink[start..start + self.width as usize]
    }

    pub fn ink_count(&self) -> usize {
        self.ink.iter().filter(|&&v| v).count()
    }

    /// Rows in feed direction, rotating a rotated layout 90° counter-clockwise.
    pub fn upright(&self) -> RenderedBitmap {
        match self.orientation {
            Orientation::Standard => self.clone(),
            Orientation::Rotated => {
                let (w, h) = (self.height, self.width);
                let mut ink = Vec::with_capacity(self.ink.len());
                for y in 0..h {
                    for x in 0..w {
                        ink.push(self.is_ink(self.width - 1 - y, x));
                    }
                }
                RenderedBitmap {
                    width: w,
                    height: h,
                    orientation: Orientation::Standard,
                    label: self.label.clone(),
                    printable_width: self.printable_width,
                    ink,
                }
            }
        }
    }
}
