//! Text layout and rasterization.
//!
//! Places the request's text on a canvas the size of the label and turns it
//! into ink. Endless labels grow along the feed direction to fit the text,
//! die-cut labels keep their size and the text is centred vertically.
//!
//! ```text
//!  standard, endless                 rotated, endless
//!  +---------------------+           +-------------------------+
//!  |      margin_top     |           |                         |
//!  |  ml  Hello  mr      |           |  ml  Hello World!  mr   |  width
//!  |      World!         |           |                         |  of the
//!  |    margin_bottom    |           +-------------------------+  label
//!  +---------------------+                 grows with text
//!        label width
//! ```

use log::debug;
use serde::Serialize;

use crate::{
    bitmap::{threshold_cutoff, GrayBuffer, RenderedBitmap},
    error::Error,
    font::{FontCatalog, Typeface},
    params::{Align, LabelParameters, Orientation},
};

/// One laid out line of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineBox {
    pub text: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
}

/// Longest label the engine grows an endless tape to, 1 m at 300 dpi.
pub const MAX_LENGTH_DOTS: u32 = 11_811;

/// Computed placement of the text on the label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Geometry {
    /// Catalog identifier of the label.
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub orientation: Orientation,
    /// Printable size of the label, as `(width, length)` dots; length 0 is endless.
    pub printable: (u32, u32),
    pub text_width: u32,
    pub text_height: u32,
    pub line_height: u32,
    pub vertical_offset: i32,
    pub lines: Vec<LineBox>,
}

impl Geometry {
    fn too_large(&self, size: u64, max: u32) -> Error {
        too_large(&self.label, size, max)
    }
}

fn too_large(label: &str, size: u64, max: u32) -> Error {
    Error::UnsupportedLabelSize {
        label: label.to_string(),
        width: u32::try_from(size).unwrap_or(u32::MAX),
        max,
    }
}

/// Measure `text` on one line, kerning included.
fn measure(face: &dyn Typeface, px: f32, text: &str) -> f32 {
    let mut width = 0.0;
    let mut previous: Option<char> = None;
    for ch in text.chars() {
        if let Some(prev) = previous {
            width += face.kern(prev, ch, px);
        }
        width += face.advance(ch, px);
        previous = Some(ch);
    }
    width
}

fn text_width(face: &dyn Typeface, px: f32, text: &str) -> u32 {
    measure(face, px, text).ceil().max(0.0) as u32
}

/// Split a word wider than `max` between characters.
fn break_word(face: &dyn Typeface, px: f32, word: &str, max: u32, lines: &mut Vec<String>) -> String {
    let mut current = String::new();
    for ch in word.chars() {
        current.push(ch);
        if current.chars().count() > 1 && text_width(face, px, &current) > max {
            current.pop();
            lines.push(std::mem::take(&mut current));
            current.push(ch);
        }
    }
    current
}

/// Greedy word wrap of one paragraph.
fn wrap_paragraph(face: &dyn Typeface, px: f32, paragraph: &str, max: u32, lines: &mut Vec<String>) {
    let mut current = String::new();
    for word in paragraph.split(' ') {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if text_width(face, px, &candidate) <= max {
            current = candidate;
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        current = if text_width(face, px, word) > max {
            break_word(face, px, word, max, lines)
        } else {
            word.to_string()
        };
    }
    lines.push(current);
}

/// Split on newlines, then wrap each paragraph to `max` when the label is
/// bounded in that direction.
pub fn wrap(face: &dyn Typeface, px: f32, text: &str, max: Option<u32>) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let paragraph = paragraph.trim_end_matches('\r');
        match max {
            Some(max) => wrap_paragraph(face, px, paragraph, max, &mut lines),
            None => lines.push(paragraph.to_string()),
        }
    }
    lines
}

/// Lay out the text of `parameters` with `face` and compute where it goes.
///
/// Fails with [`Error::UnsupportedLabelSize`] when the text block does not
/// fit a fixed side of the label, or an endless label would have to grow
/// past [`MAX_LENGTH_DOTS`].
pub fn place(parameters: &LabelParameters, face: &dyn Typeface) -> Result<Geometry, Error> {
    let label = parameters.label();
    let id = label.identifier;
    let px = parameters.font_size as f32;
    let printable = (label.dots_printable.width, label.dots_printable.length);

    let (mut width, mut height) = match parameters.orientation {
        Orientation::Standard => printable,
        Orientation::Rotated => (printable.1, printable.0),
    };

    let (ml, mr) = (parameters.margin_left, parameters.margin_right);
    let (mt, mb) = (parameters.margin_top as i64, parameters.margin_bottom as i64);

    let wrap_width = if width > 0 {
        Some(width.saturating_sub(ml + mr).max(1))
    } else {
        None
    };
    let lines = wrap(face, px, &parameters.text, wrap_width);

    let metrics = face.metrics(px);
    let line_height = metrics.height().ceil() as u64;
    let line_advance = (metrics.height() + metrics.line_gap).ceil() as u64;
    let text_height = line_advance
        .saturating_mul(lines.len() as u64 - 1)
        .saturating_add(line_height);
    let widths: Vec<u32> = lines.iter().map(|l| text_width(face, px, l)).collect();
    let block_width = widths.iter().copied().max().unwrap_or(0);

    let endless = label.is_endless();
    let grows_down = parameters.orientation == Orientation::Standard && endless;
    let grows_across = parameters.orientation == Orientation::Rotated && endless;

    if grows_down {
        let grown = text_height.saturating_add(mt as u64 + mb as u64);
        if grown > MAX_LENGTH_DOTS as u64 {
            return Err(too_large(id, grown, MAX_LENGTH_DOTS));
        }
        height = grown as u32;
    } else if text_height > height as u64 {
        return Err(too_large(id, text_height, height));
    }
    if grows_across {
        let grown = block_width as u64 + ml as u64 + mr as u64;
        if grown > MAX_LENGTH_DOTS as u64 {
            return Err(too_large(id, grown, MAX_LENGTH_DOTS));
        }
        width = grown as u32;
    } else if block_width > width {
        return Err(too_large(id, block_width as u64, width));
    }
    let (width, height) = (width.max(1), height.max(1));
    let (text_height, line_height, line_advance) =
        (text_height as i64, line_height as u32, line_advance as i64);

    let vertical_offset = if grows_down {
        mt
    } else {
        (height as i64 - text_height).div_euclid(2) + (mt - mb).div_euclid(2)
    };

    let area = width.saturating_sub(ml + mr) as i64;
    let lines = lines
        .into_iter()
        .zip(widths)
        .enumerate()
        .map(|(i, (text, line_width))| {
            let slack = area - line_width as i64;
            let x = ml as i64
                + match parameters.align {
                    Align::Left => 0,
                    Align::Center => slack.div_euclid(2),
                    Align::Right => slack,
                };
            LineBox {
                text,
                x: x.max(0) as i32,
                y: (vertical_offset + i as i64 * line_advance) as i32,
                width: line_width,
            }
        })
        .collect();

    Ok(Geometry {
        label: id.to_string(),
        width,
        height,
        orientation: parameters.orientation,
        printable,
        text_width: block_width,
        text_height: text_height as u32,
        line_height,
        vertical_offset: vertical_offset as i32,
        lines,
    })
}

/// Draw the placed lines onto a white canvas.
///
/// Fails when ink of at least half coverage falls off the canvas, so text is
/// never cut off silently.
pub fn rasterize(geometry: &Geometry, face: &dyn Typeface, px: f32) -> Result<GrayBuffer, Error> {
    let mut canvas = GrayBuffer::blank(geometry.width, geometry.height);
    let ascent = face.metrics(px).ascent;
    let (mut over_x, mut over_y) = (0i64, 0i64);

    for line in &geometry.lines {
        let baseline = line.y as f32 + ascent;
        let mut caret = line.x as f32;
        let mut previous: Option<char> = None;
        for ch in line.text.chars() {
            if let Some(prev) = previous {
                caret += face.kern(prev, ch, px);
            }
            face.draw(ch, px, caret, baseline, &mut |x, y, coverage| {
                if !canvas.cover(x, y, coverage) && coverage >= 0.5 {
                    over_x = over_x.max(overhang(x, geometry.width));
                    over_y = over_y.max(overhang(y, geometry.height));
                }
            });
            caret += face.advance(ch, px);
            previous = Some(ch);
        }
    }

    if over_y > 0 {
        let needed = geometry.height as u64 + over_y as u64;
        return Err(geometry.too_large(needed, geometry.height));
    }
    if over_x > 0 {
        let needed = geometry.width as u64 + over_x as u64;
        return Err(geometry.too_large(needed, geometry.width));
    }
    Ok(canvas)
}

/// How far `pos` lies outside `0..size`.
fn overhang(pos: i32, size: u32) -> i64 {
    let pos = pos as i64;
    if pos < 0 {
        -pos
    } else {
        (pos + 1 - size as i64).max(0)
    }
}

/// Lay out and draw the label, anti-aliased and before any thresholding.
pub fn draw(parameters: &LabelParameters, face: &dyn Typeface) -> Result<(Geometry, GrayBuffer), Error> {
    let geometry = place(parameters, face)?;
    let canvas = rasterize(&geometry, face, parameters.font_size as f32)?;
    Ok((geometry, canvas))
}

/// Render the label described by `parameters`.
///
/// Fails with [`Error::FontNotFound`] when the catalog cannot load the font.
pub fn render(
    parameters: &LabelParameters,
    fonts: &dyn FontCatalog,
) -> Result<(Geometry, RenderedBitmap), Error> {
    let face = fonts.load(&parameters.font_family, &parameters.font_style)?;
    render_with(parameters, face.as_ref())
}

pub fn render_with(
    parameters: &LabelParameters,
    face: &dyn Typeface,
) -> Result<(Geometry, RenderedBitmap), Error> {
    let (geometry, canvas) = draw(parameters, face)?;

    let ink = if parameters.high_quality {
        canvas.dither()
    } else {
        canvas.threshold(threshold_cutoff(parameters.threshold))
    };
    debug!(
        "rendered {}x{} label with {} line(s)",
        geometry.width,
        geometry.height,
        geometry.lines.len()
    );

    let bitmap = RenderedBitmap::new(
        geometry.width,
        geometry.height,
        ink,
        geometry.orientation,
        &parameters.label_size,
        geometry.printable.0,
    );
    Ok((geometry, bitmap))
}
