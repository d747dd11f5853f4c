//! Debug traces.
//!
//! In debug mode the pipeline stops short of the printer and reports what it
//! would have sent. A trace contains no timestamps, so the same request
//! always produces the same document.

use std::fmt::Write;

use serde::Serialize;

use crate::{
    bitmap::RenderedBitmap, error::Error, layout::Geometry, params::LabelParameters,
    raster::RasterJob, sink::Target,
};

/// Where a job's bytes go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineSink {
    /// Write to a printer target.
    Real(Target),
    /// Record a [`Trace`] and leave every target alone.
    Trace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BitmapTrace {
    pub width: u32,
    pub height: u32,
    pub label: String,
    pub printable_width: u32,
    pub ink_dots: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RasterTrace {
    #[serde(flatten)]
    pub job: RasterJob,
    pub length: usize,
    /// Command bytes, lowercase hex.
    pub bytes: String,
}

/// Intermediate results of one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    pub parameters: LabelParameters,
    pub geometry: Geometry,
    pub bitmap: BitmapTrace,
    pub raster: RasterTrace,
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        // writing to a String cannot fail
        let _ = write!(out, "{:02x}", b);
    }
    out
}

impl Trace {
    pub fn new(
        parameters: &LabelParameters,
        geometry: &Geometry,
        bitmap: &RenderedBitmap,
        job: &RasterJob,
    ) -> Self {
        Trace {
            parameters: parameters.clone(),
            geometry: geometry.clone(),
            bitmap: BitmapTrace {
                width: bitmap.width,
                height: bitmap.height,
                label: bitmap.label.clone(),
                printable_width: bitmap.printable_width,
                ink_dots: bitmap.ink_count(),
            },
            raster: RasterTrace {
                job: job.clone(),
                length: job.bytes.len(),
                bytes: hex(&job.bytes),
            },
        }
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_is_lowercase_and_padded() {
        assert_eq!(hex(&[0x00, 0x1B, 0xAB, 0x0C]), "001bab0c");
        assert_eq!(hex(&[]), "");
    }
}
