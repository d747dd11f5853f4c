//! Text labels for Brother QL series label printers
//!
//! This crate turns a request of text plus layout parameters into a
//! monochrome bitmap and the Brother QL raster command stream, and sends the
//! stream to a file, TCP or USB printer target.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::{collections::HashMap, sync::Arc};
//! use qltext::{Configuration, FontDirectory, LabelService};
//!
//! let config = Arc::new(Configuration::from_path("config.json").unwrap());
//! let fonts = Arc::new(FontDirectory::scan(&config.font_folders()));
//! let service = LabelService::new(config, fonts);
//!
//! let mut request = HashMap::new();
//! request.insert("font_family".to_string(), "DejaVu Sans (Book)".to_string());
//! request.insert("text".to_string(), "Hello World!".to_string());
//! let response = service.print(&request, false);
//! println!("{}", response.to_json().unwrap());
//! ```

mod bitmap;
mod config;
mod error;
mod font;
mod layout;
mod media;
mod model;
mod params;
mod raster;
mod service;
mod sink;
mod trace;

#[cfg(test)]
mod testing;

pub use crate::{
    bitmap::{threshold_cutoff, GrayBuffer, RenderedBitmap},
    config::{Configuration, LabelConfig, PrinterConfig, ServerConfig},
    error::Error,
    font::{FontCatalog, FontDirectory, FontReference, FontSet, LineMetrics, Typeface},
    layout::{draw, place, rasterize, render, render_with, wrap, Geometry, LineBox, MAX_LENGTH_DOTS},
    media::{Dots, FormFactor, LabelCatalog, LabelSpec},
    model::Model,
    params::{Align, LabelParameters, Orientation},
    raster::{
        encode, label_row, pack_bits, unpack_bits, PageSummary, RasterConfig, RasterJob,
        RasterSummary,
    },
    service::{LabelService, PreviewFormat, Response},
    sink::{Sink, Target, TargetLocks, BROTHER_VENDOR_ID},
    trace::{BitmapTrace, PipelineSink, RasterTrace, Trace},
};

/// Type alias for 1-bit bitmap data sent to the print head.
///
/// Each inner `Vec<u8>` is one raster line with 8 pins packed into each
/// byte, most significant bit first.
///
/// For normal printers: each row is 90 bytes (720 pins / 8)
/// For wide printers: each row is 162 bytes (1296 pins / 8)
pub type Matrix = Vec<Vec<u8>>;

/// Print head width in pins for normal QL printers (QL-500 to QL-820NWB).
pub const NORMAL_PRINTER_WIDTH: u32 = 720;

/// Print head width in pins for wide QL printers (QL-1050, QL-1100 series).
pub const WIDE_PRINTER_WIDTH: u32 = 1296;
