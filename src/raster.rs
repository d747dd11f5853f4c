//! Brother QL raster command stream.
//!
//! A job is a preamble followed by one page per copy:
//!
//! ```text
//! NUL x 200           invalidate
//! ESC @               initialize
//! ESC i S             status information request
//! ESC i a 01          switch to raster mode (not on the oldest models)
//! -- per page --
//! ESC i z ...         print information, media and raster line count
//! ESC i M / ESC i A   auto cut, cut every label
//! ESC i K             expanded mode, cut at end
//! ESC i d nn          feed margin
//! M 02                PackBits compression
//! g 00 n <row>        raster line (or `Z` for a blank compressed line)
//! FF / ^Z             print, ^Z also ejects after the last page
//! ```

use bitflags::bitflags;
use log::debug;
use serde::Serialize;

use crate::{bitmap::RenderedBitmap, error::Error, media::LabelSpec, model::Model, Matrix};

const INVALIDATE_LEN: usize = 200;

const ESC: u8 = 0x1B;
const FF: u8 = 0x0C;
const CTRL_Z: u8 = 0x1A;

bitflags! {
    struct PrintInfo: u8 {
        const MEDIA_TYPE = 0b0000_0010;
        const MEDIA_WIDTH = 0b0000_0100;
        const MEDIA_LENGTH = 0b0000_1000;
        const QUALITY = 0b0100_0000;
        const RECOVER = 0b1000_0000;
    }
}

bitflags! {
    struct VariousMode: u8 {
        const AUTO_CUT = 0b0100_0000;
    }
}

bitflags! {
    struct ExpandedMode: u8 {
        const CUT_AT_END = 0b0000_1000;
    }
}

/// Encoder settings, fixed per printer.
#[derive(Debug, Clone, Copy)]
pub struct RasterConfig {
    model: Model,
    compress: bool,
    auto_cut: bool,
    cut_at_end: bool,
    high_quality: bool,
}

impl RasterConfig {
    /// Defaults: compressed rows, cut after every label and at the end.
    pub fn new(model: Model) -> Self {
        RasterConfig {
            model,
            compress: true,
            auto_cut: true,
            cut_at_end: true,
            high_quality: false,
        }
    }

    pub fn compress(self, flag: bool) -> Self {
        RasterConfig {
            compress: flag,
            ..self
        }
    }

    pub fn auto_cut(self, flag: bool) -> Self {
        RasterConfig {
            auto_cut: flag,
            ..self
        }
    }

    pub fn cut_at_end(self, flag: bool) -> Self {
        RasterConfig {
            cut_at_end: flag,
            ..self
        }
    }

    pub fn high_quality(self, flag: bool) -> Self {
        RasterConfig {
            high_quality: flag,
            ..self
        }
    }
}

/// Encoded command bytes of one print job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RasterJob {
    pub label_size: String,
    pub copies: u32,
    pub rows: u32,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// Place a row of label pixels on the print head.
///
/// The head prints right to left, so the row is mirrored: label column `x`
/// lands on pin `right_margin + width - 1 - x`, leaving `right_margin`
/// blank pins at the start of the line. Packed MSB first, ink is 1.
fn head_row(row: &[bool], pins: u32, right_margin: u32) -> Vec<u8> {
    let mut buf = vec![0u8; (pins / 8) as usize];
    let offset = right_margin as usize;
    for (x, &ink) in row.iter().rev().enumerate() {
        if ink {
            let pin = offset + x;
            buf[pin / 8] |= 0x80 >> (pin % 8);
        }
    }
    buf
}

/// Inverse of [`head_row`], for reading a stream back.
pub fn label_row(head: &[u8], width: u32, right_margin: u32) -> Vec<bool> {
    let offset = right_margin as usize;
    (0..width as usize)
        .rev()
        .map(|x| {
            let pin = offset + x;
            head.get(pin / 8)
                .map_or(false, |byte| byte & (0x80 >> (pin % 8)) != 0)
        })
        .collect()
}

/// Rows of the bitmap in feed order, laid out on the print head.
fn head_matrix(bitmap: &RenderedBitmap, pins: u32, right_margin: u32) -> Matrix {
    (0..bitmap.height)
        .map(|y| head_row(bitmap.row(y), pins, right_margin))
        .collect()
}

pub fn pack_bits(data: &[u8]) -> Vec<u8> {
    let mut packed = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let mut run_length = 1;
        while i + run_length < data.len()
            && run_length < 128
            && data[i + run_length] == data[i]
        {
            run_length += 1;
        }

        if run_length > 1 {
            packed.push((1 - run_length as i16) as i8 as u8);
            packed.push(data[i]);
            i += run_length;
        } else {
            let start = i;
            while i < data.len()
                && i - start < 128
                && !(i + 1 < data.len() && data[i] == data[i + 1])
            {
                i += 1;
            }
            packed.push((i - start - 1) as u8);
            packed.extend_from_slice(&data[start..i]);
        }
    }

    packed
}

pub fn unpack_bits(data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let n = data[i] as i8;
        i += 1;
        match n {
            0..=127 => {
                let len = n as usize + 1;
                out.extend_from_slice(data.get(i..i + len)?);
                i += len;
            }
            -127..=-1 => {
                let value = *data.get(i)?;
                out.extend(std::iter::repeat(value).take((1 - n as i16) as usize));
                i += 1;
            }
            _ => {}
        }
    }
    Some(out)
}

fn preamble(model: Model) -> Vec<u8> {
    let mut buf: Vec<u8> = vec![0x00; INVALIDATE_LEN];
    buf.extend_from_slice(&[ESC, b'@']); // initialize
    buf.extend_from_slice(&[ESC, b'i', b'S']); // status information request
    if model.mode_setting() {
        buf.extend_from_slice(&[ESC, b'i', b'a', 0x01]); // raster mode
    }
    buf
}

fn page_setup(config: &RasterConfig, label: &LabelSpec, rows: u32, page: u32) -> Vec<u8> {
    let mut buf: Vec<u8> = Vec::new();

    // ESC i z : print information
    let mut info = PrintInfo::RECOVER
        | PrintInfo::MEDIA_TYPE
        | PrintInfo::MEDIA_WIDTH
        | PrintInfo::MEDIA_LENGTH;
    if config.high_quality {
        info |= PrintInfo::QUALITY;
    }
    buf.extend_from_slice(&[
        ESC,
        b'i',
        b'z',
        info.bits(),
        label.form_factor.media_type(),
        label.tape_mm.0,
        label.tape_mm.1,
    ]);
    buf.extend_from_slice(&rows.to_le_bytes());
    buf.push(if page == 0 { 0x00 } else { 0x01 });
    buf.push(0x00);

    let mut various = VariousMode::empty();
    if config.auto_cut {
        various |= VariousMode::AUTO_CUT;
    }
    buf.extend_from_slice(&[ESC, b'i', b'M', various.bits()]);
    if config.auto_cut {
        buf.extend_from_slice(&[ESC, b'i', b'A', 0x01]); // cut every label
    }

    let mut expanded = ExpandedMode::empty();
    if config.cut_at_end {
        expanded |= ExpandedMode::CUT_AT_END;
    }
    debug!("Various mode: {:X}, expanded mode: {:X}", various.bits(), expanded.bits());
    buf.extend_from_slice(&[ESC, b'i', b'K', expanded.bits()]);

    buf.extend_from_slice(&[ESC, b'i', b'd']);
    buf.extend_from_slice(&label.feed_margin.to_le_bytes());

    buf.extend_from_slice(&[b'M', if config.compress { 0x02 } else { 0x00 }]);
    buf
}

fn raster_lines(config: &RasterConfig, matrix: &Matrix, buf: &mut Vec<u8>) {
    for row in matrix {
        if config.compress {
            if row.iter().all(|&b| b == 0) {
                buf.push(b'Z');
                continue;
            }
            let packed = pack_bits(row);
            buf.extend_from_slice(&[b'g', 0x00, packed.len() as u8]);
            buf.extend_from_slice(&packed);
        } else {
            buf.extend_from_slice(&[b'g', 0x00, row.len() as u8]);
            buf.extend_from_slice(row);
        }
    }
}

/// Encode `copies` prints of `bitmap` on `label`.
///
/// Fails when the bitmap does not fit the label or the label does not fit
/// the print head of the configured model.
pub fn encode(
    bitmap: &RenderedBitmap,
    label: &LabelSpec,
    copies: u32,
    config: &RasterConfig,
) -> Result<RasterJob, Error> {
    let upright = bitmap.upright();
    let pins = config.model.pins();
    let printable = label.dots_printable;

    if upright.width > printable.width {
        return Err(Error::UnsupportedLabelSize {
            label: label.identifier.to_string(),
            width: upright.width,
            max: printable.width,
        });
    }
    if upright.width + label.right_margin_dots > pins {
        return Err(Error::UnsupportedLabelSize {
            label: label.identifier.to_string(),
            width: upright.width + label.right_margin_dots,
            max: pins,
        });
    }
    if !label.is_endless() && upright.height > printable.length {
        return Err(Error::UnsupportedLabelSize {
            label: label.identifier.to_string(),
            width: upright.height,
            max: printable.length,
        });
    }

    let matrix = head_matrix(&upright, pins, label.right_margin_dots);
    let rows = matrix.len() as u32;

    let mut bytes = preamble(config.model);
    for page in 0..copies {
        bytes.extend(page_setup(config, label, rows, page));
        raster_lines(config, &matrix, &mut bytes);
        if page + 1 < copies {
            bytes.push(FF); // print
        } else {
            bytes.push(CTRL_Z); // print then eject
        }
    }
    debug!(
        "encoded {} copies of {} rows for label {} into {} bytes",
        copies,
        rows,
        label.identifier,
        bytes.len()
    );

    Ok(RasterJob {
        label_size: label.identifier.to_string(),
        copies,
        rows,
        bytes,
    })
}

/// One page read back from a raster stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSummary {
    pub media_type: u8,
    pub width_mm: u8,
    pub length_mm: u8,
    /// Raster line count announced by `ESC i z`.
    pub declared_rows: u32,
    /// Decompressed raster lines.
    pub rows: Matrix,
    /// Ended with ^Z rather than FF.
    pub last: bool,
}

/// Structure of a raster stream, for inspection and tests.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RasterSummary {
    pub raster_mode: bool,
    pub compressed: bool,
    pub pages: Vec<PageSummary>,
}

fn invalid(offset: usize, message: &str) -> Error {
    Error::InvalidRaster {
        offset,
        message: message.to_string(),
    }
}

impl RasterSummary {
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        let mut summary = RasterSummary::default();
        let mut page: Option<PageSummary> = None;
        let mut zero_rows: Vec<(usize, usize)> = Vec::new();
        let mut row_bytes = 0usize;
        let mut i = 0;

        let take = move |i: usize, n: usize| {
            bytes
                .get(i..i + n)
                .ok_or_else(|| invalid(i, "truncated command"))
        };

        while i < bytes.len() {
            match bytes[i] {
                0x00 => i += 1,
                ESC => match take(i, 2)?[1] {
                    b'@' => i += 2,
                    b'i' => match take(i, 3)?[2] {
                        b'S' => i += 3,
                        b'a' => {
                            summary.raster_mode = take(i, 4)?[3] == 0x01;
                            i += 4;
                        }
                        b'z' => {
                            let cmd = take(i, 13)?;
                            if let Some(done) = page.take() {
                                summary.pages.push(done);
                            }
                            page = Some(PageSummary {
                                media_type: cmd[4],
                                width_mm: cmd[5],
                                length_mm: cmd[6],
                                declared_rows: u32::from_le_bytes([cmd[7], cmd[8], cmd[9], cmd[10]]),
                                rows: Matrix::new(),
                                last: false,
                            });
                            i += 13;
                        }
                        b'M' | b'A' | b'K' => i += 4,
                        b'd' => i += 5,
                        _ => return Err(invalid(i, "unknown ESC i command")),
                    },
                    _ => return Err(invalid(i, "unknown escape sequence")),
                },
                b'M' => {
                    summary.compressed = take(i, 2)?[1] == 0x02;
                    i += 2;
                }
                b'g' => {
                    let header = take(i, 3)?;
                    let len = header[2] as usize;
                    let data = take(i + 3, len)?;
                    let row = if summary.compressed {
                        unpack_bits(data).ok_or_else(|| invalid(i, "bad PackBits data"))?
                    } else {
                        data.to_vec()
                    };
                    row_bytes = row_bytes.max(row.len());
                    page.as_mut()
                        .ok_or_else(|| invalid(i, "raster line outside a page"))?
                        .rows
                        .push(row);
                    i += 3 + len;
                }
                b'Z' => {
                    let current = page
                        .as_mut()
                        .ok_or_else(|| invalid(i, "raster line outside a page"))?;
                    zero_rows.push((summary.pages.len(), current.rows.len()));
                    current.rows.push(Vec::new());
                    i += 1;
                }
                FF | CTRL_Z => {
                    let mut done = page.take().ok_or_else(|| invalid(i, "print without a page"))?;
                    done.last = bytes[i] == CTRL_Z;
                    summary.pages.push(done);
                    i += 1;
                }
                _ => return Err(invalid(i, "unknown command")),
            }
        }
        if let Some(done) = page.take() {
            summary.pages.push(done);
        }

        if row_bytes == 0 {
            row_bytes = (crate::NORMAL_PRINTER_WIDTH / 8) as usize;
        }
        for (p, r) in zero_rows {
            summary.pages[p].rows[r] = vec![0; row_bytes];
        }
        Ok(summary)
    }
}
