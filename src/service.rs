//! Request boundary.
//!
//! [`LabelService`] owns the shared configuration, the font catalog and the
//! per-target locks, and runs one request at a time per call:
//! parameters, layout, raster encoding, then either the printer target or a
//! debug trace.

use std::{collections::HashMap, io, str::FromStr, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::ser::Formatter;

use crate::{
    config::Configuration,
    error::Error,
    font::FontCatalog,
    layout,
    params::LabelParameters,
    raster::{self, RasterConfig},
    sink::{Sink, Target, TargetLocks, BROTHER_VENDOR_ID},
    trace::{PipelineSink, Trace},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreviewFormat {
    #[default]
    Png,
    Base64,
}

impl FromStr for PreviewFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(PreviewFormat::Png),
            "base64" => Ok(PreviewFormat::Base64),
            _ => Err(Error::validation(
                "return_format",
                format!("{:?} is neither png nor base64", s),
            )),
        }
    }
}

/// Result of a print request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Trace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `", "` and `": "` separators, as web clients of the print endpoint
/// have always received them.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

impl Response {
    pub fn success() -> Self {
        Response {
            success: true,
            trace: None,
            error: None,
        }
    }

    pub fn traced(trace: Trace) -> Self {
        Response {
            success: true,
            trace: Some(trace),
            error: None,
        }
    }

    pub fn failure(err: &Error) -> Self {
        Response {
            success: false,
            trace: None,
            error: Some(err.to_string()),
        }
    }

    pub fn to_json(&self) -> Result<String, Error> {
        let mut out = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, SpacedFormatter);
        self.serialize(&mut serializer)?;
        // serde_json only emits UTF-8
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

pub struct LabelService {
    config: Arc<Configuration>,
    fonts: Arc<dyn FontCatalog>,
    locks: TargetLocks,
}

impl LabelService {
    pub fn new(config: Arc<Configuration>, fonts: Arc<dyn FontCatalog>) -> Self {
        LabelService {
            config,
            fonts,
            locks: TargetLocks::default(),
        }
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.config
    }

    pub fn fonts(&self) -> &dyn FontCatalog {
        self.fonts.as_ref()
    }

    /// The printer from the configuration, or the first USB printer of the
    /// configured model.
    pub fn default_target(&self) -> Result<Target, Error> {
        match &self.config.printer.printer {
            Some(uri) => Target::parse(uri),
            None => Ok(Target::Usb {
                vendor: BROTHER_VENDOR_ID,
                product: self.config.printer.model.pid(),
                serial: None,
            }),
        }
    }

    fn raster_config(&self, parameters: &LabelParameters) -> RasterConfig {
        let printer = &self.config.printer;
        RasterConfig::new(printer.model)
            .compress(printer.compress)
            .auto_cut(printer.cut)
            .cut_at_end(printer.cut)
            .high_quality(parameters.high_quality)
    }

    /// Print on the configured printer.
    pub fn print(&self, raw: &HashMap<String, String>, debug: bool) -> Response {
        self.print_to(raw, None, debug)
    }

    /// Print on `target`, or on the configured printer when `None`.
    ///
    /// Never fails; errors are reported in the response.
    pub fn print_to(
        &self,
        raw: &HashMap<String, String>,
        target: Option<&Target>,
        debug: bool,
    ) -> Response {
        let sink = || -> Result<PipelineSink, Error> {
            if debug {
                return Ok(PipelineSink::Trace);
            }
            match target {
                Some(target) => Ok(PipelineSink::Real(target.clone())),
                None => Ok(PipelineSink::Real(self.default_target()?)),
            }
        };
        let result = LabelParameters::resolve(&self.config, raw)
            .and_then(|parameters| Ok((sink()?, parameters)))
            .and_then(|(sink, parameters)| self.run(&parameters, &sink));
        match result {
            Ok(Some(trace)) => Response::traced(trace),
            Ok(None) => Response::success(),
            Err(err) => {
                warn!("print failed: {}", err);
                Response::failure(&err)
            }
        }
    }

    /// Render, encode and deliver one job.
    ///
    /// Returns the trace when `sink` is [`PipelineSink::Trace`].
    pub fn run(
        &self,
        parameters: &LabelParameters,
        sink: &PipelineSink,
    ) -> Result<Option<Trace>, Error> {
        let (geometry, bitmap) = layout::render(parameters, self.fonts.as_ref())?;
        let job = raster::encode(
            &bitmap,
            parameters.label(),
            parameters.label_count,
            &self.raster_config(parameters),
        )?;

        match sink {
            PipelineSink::Trace => {
                debug!("debug mode, {} bytes not sent", job.bytes.len());
                Ok(Some(Trace::new(parameters, &geometry, &bitmap, &job)))
            }
            PipelineSink::Real(target) => {
                info!(
                    "printing {} label(s) of size {} on {}",
                    job.copies, job.label_size, target
                );
                self.locks.with(target, || {
                    let mut out = Sink::open(target)?;
                    out.write(&job.bytes)?;
                    out.close()
                })?;
                Ok(None)
            }
        }
    }

    /// PNG preview of the label, raw or base64 encoded as chosen by the
    /// `return_format` parameter.
    ///
    /// The preview is the anti-aliased grayscale label, before threshold or
    /// dithering.
    pub fn preview(&self, raw: &HashMap<String, String>) -> Result<Vec<u8>, Error> {
        let parameters = LabelParameters::resolve(&self.config, raw)?;
        let format = match raw.get("return_format") {
            Some(value) => value.parse::<PreviewFormat>()?,
            None => PreviewFormat::default(),
        };
        let face = self
            .fonts
            .load(&parameters.font_family, &parameters.font_style)?;
        let (_, canvas) = layout::draw(&parameters, face.as_ref())?;
        let png = canvas.to_png()?;
        debug!("preview of {}x{} as {:?}", canvas.width, canvas.height, format);
        Ok(match format {
            PreviewFormat::Png => png,
            PreviewFormat::Base64 => STANDARD.encode(png).into_bytes(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{font::FontSet, testing::BlockFace};
    use pretty_assertions::assert_eq;

    fn service(config: Configuration) -> LabelService {
        let fonts = FontSet::default().with("Roboto", "Medium", Arc::new(BlockFace));
        LabelService::new(Arc::new(config), Arc::new(fonts))
    }

    fn request(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn envelopes_use_spaced_separators() {
        assert_eq!(Response::success().to_json().unwrap(), r#"{"success": true}"#);
        assert_eq!(
            Response::failure(&Error::MissingFont).to_json().unwrap(),
            r#"{"success": false, "error": "'NoneType' object has no attribute 'rpartition'"}"#
        );
    }

    #[test]
    fn missing_font_is_reported() {
        let response = service(Configuration::default()).print(&request(&[("text", "x")]), false);
        assert!(!response.success);
        assert_eq!(
            response.error.as_deref(),
            Some("'NoneType' object has no attribute 'rpartition'")
        );
    }

    #[test]
    fn unknown_font_is_reported() {
        let response = service(Configuration::default()).print(
            &request(&[("font_family", "Comic Sans (Bold)")]),
            true,
        );
        assert_eq!(
            response.error.as_deref(),
            Some("Font not found: Comic Sans (Bold)")
        );
    }

    #[test]
    fn unconfigured_printer_falls_back_to_usb() {
        let service = service(Configuration::default());
        assert_eq!(
            service.default_target().unwrap().to_string(),
            "usb://04f9:2015"
        );

        let config = Configuration::from_json(r#"{"printer": {"printer": "lpr://queue"}}"#).unwrap();
        let response = self::service(config)
            .print(&request(&[("font_family", "Roboto (Medium)")]), false);
        assert!(!response.success);
        assert!(response.error.unwrap().contains("unsupported scheme"));
    }

    #[test]
    fn debug_print_needs_no_printer() {
        let response = service(Configuration::default()).print(
            &request(&[("font_family", "Roboto (Medium)"), ("text", "Hi")]),
            true,
        );
        assert!(response.success);
        let trace = response.trace.unwrap();
        assert_eq!(trace.raster.job.label_size, "62");
        assert_eq!(trace.raster.length * 2, trace.raster.bytes.len());
    }

    #[test]
    fn configured_printer_settings_reach_the_encoder() {
        let config = Configuration::from_json(
            r#"{"printer": {"model": "QL-800", "compress": false, "cut": false}}"#,
        )
        .unwrap();
        let response = service(config).print(
            &request(&[("font_family", "Roboto (Medium)"), ("high_quality", "true")]),
            true,
        );
        let bytes = response.trace.unwrap().raster.bytes;
        // ESC i z with the quality flag, then ESC i M 00 ... M 00
        assert_eq!(&bytes[418..426], "1b697ace");
        assert!(bytes.contains("1b694d00"));
        assert!(bytes.contains("1b694b00"));
        assert!(bytes.contains("1b696423004d00"));
    }

    #[test]
    fn preview_formats() {
        let service = service(Configuration::default());
        let png = service
            .preview(&request(&[("font_family", "Roboto (Medium)"), ("text", "Hi")]))
            .unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let encoded = service
            .preview(&request(&[
                ("font_family", "Roboto (Medium)"),
                ("text", "Hi"),
                ("return_format", "base64"),
            ]))
            .unwrap();
        assert_eq!(STANDARD.decode(encoded).unwrap(), png);

        let err = service
            .preview(&request(&[
                ("font_family", "Roboto (Medium)"),
                ("return_format", "gif"),
            ]))
            .unwrap_err();
        assert!(matches!(err, Error::Validation { field, .. } if field == "return_format"));
    }
}
