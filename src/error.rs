//! Error types for label rendering and printing.
//!
//! Every failure is scoped to the request that produced it. Only
//! [`Error::SinkWrite`] can happen after bytes have reached a printer target.

use thiserror::Error;

/// Main error type for the label pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// A request parameter could not be parsed or is out of range.
    #[error("Invalid value for {field}: {message}")]
    Validation { field: String, message: String },

    /// No font specification was supplied with the request.
    ///
    /// The message matches what the web front end has always returned for
    /// this case, so clients matching on it keep working.
    #[error("'NoneType' object has no attribute 'rpartition'")]
    MissingFont,

    /// The font catalog has no font for this family and style, or the
    /// font file could not be loaded.
    #[error("Font not found: {family} ({style})")]
    FontNotFound { family: String, style: String },

    /// The rendered label does not fit the print head or the die-cut label.
    #[error("Label {label} is {width} dots but at most {max} dots are printable")]
    UnsupportedLabelSize { label: String, width: u32, max: u32 },

    /// Writing to the printer target failed.
    ///
    /// An unknown number of bytes may already have been written.
    #[error("Failed to write to {target}: {source}")]
    SinkWrite {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// A raster stream read back for inspection is malformed.
    #[error("Invalid raster data at byte {offset}: {message}")]
    InvalidRaster { offset: usize, message: String },

    /// The configuration file is malformed.
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Encoding a preview image failed.
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl Error {
    pub(crate) fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Whether the error was raised before any byte could reach a target.
    pub fn is_before_output(&self) -> bool {
        !matches!(self, Self::SinkWrite { .. })
    }
}
