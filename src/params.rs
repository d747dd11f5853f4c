//! Request parameters.
//!
//! Raw string key/value pairs, as they arrive from a query string or form,
//! are resolved into a [`LabelParameters`] with every default filled in.
//! Unknown keys are ignored.

use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};

use serde::Serialize;

use crate::{config::Configuration, error::Error, font::FontReference, media::LabelSpec};

pub const DEFAULT_FONT_SIZE: u32 = 100;
pub const DEFAULT_LABEL_SIZE: &str = "62";
pub const DEFAULT_MARGIN: u32 = 10;
pub const DEFAULT_THRESHOLD: u8 = 70;
pub const DEFAULT_MARGIN_TOP: u32 = 24;
pub const DEFAULT_MARGIN_BOTTOM: u32 = 45;
pub const DEFAULT_MARGIN_LEFT: u32 = 35;
pub const DEFAULT_MARGIN_RIGHT: u32 = 35;

const MAX_DOTS: u32 = u16::MAX as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Left,
    #[default]
    Center,
    Right,
}

impl FromStr for Align {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Self::Left),
            "center" => Ok(Self::Center),
            "right" => Ok(Self::Right),
            _ => Err(Error::validation(
                "align",
                format!("{:?} is not one of left, center, right", s),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Standard,
    Rotated,
}

impl FromStr for Orientation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "rotated" => Ok(Self::Rotated),
            _ => Err(Error::validation(
                "orientation",
                format!("{:?} is not one of standard, rotated", s),
            )),
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => f.write_str("standard"),
            Self::Rotated => f.write_str("rotated"),
        }
    }
}

/// Everything needed to render and print one label job.
#[derive(Debug, Clone, Serialize)]
pub struct LabelParameters {
    #[serde(skip)]
    pub configuration: Arc<Configuration>,
    pub font_family: String,
    pub font_style: String,
    pub text: String,
    pub font_size: u32,
    pub label_size: String,
    pub margin: u32,
    pub threshold: u8,
    pub align: Align,
    pub orientation: Orientation,
    pub margin_top: u32,
    pub margin_bottom: u32,
    pub margin_left: u32,
    pub margin_right: u32,
    pub label_count: u32,
    pub high_quality: bool,
    #[serde(skip)]
    label: LabelSpec,
}

impl PartialEq for LabelParameters {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.configuration, &other.configuration)
            && self.font_family == other.font_family
            && self.font_style == other.font_style
            && self.text == other.text
            && self.font_size == other.font_size
            && self.label_size == other.label_size
            && self.margin == other.margin
            && self.threshold == other.threshold
            && self.align == other.align
            && self.orientation == other.orientation
            && self.margin_top == other.margin_top
            && self.margin_bottom == other.margin_bottom
            && self.margin_left == other.margin_left
            && self.margin_right == other.margin_right
            && self.label_count == other.label_count
            && self.high_quality == other.high_quality
    }
}

struct Raw<'a>(&'a HashMap<String, String>);

impl<'a> Raw<'a> {
    fn get(&self, key: &str) -> Option<&'a str> {
        self.0.get(key).map(|v| v.trim())
    }

    fn int(&self, key: &str, default: u32, min: u32, max: u32) -> Result<u32, Error> {
        let value = match self.get(key) {
            Some(v) => v.parse::<i64>().map_err(|_| {
                Error::validation(key, format!("{:?} is not an integer", v))
            })?,
            None => return Ok(default),
        };
        if value < min as i64 || value > max as i64 {
            return Err(Error::validation(
                key,
                format!("{} is outside {}..={}", value, min, max),
            ));
        }
        Ok(value as u32)
    }

    fn boolean(&self, key: &str, default: bool) -> Result<bool, Error> {
        match self.get(key) {
            None => Ok(default),
            Some(v) if v.eq_ignore_ascii_case("true") => Ok(true),
            Some(v) if v.eq_ignore_ascii_case("false") => Ok(false),
            Some(v) => Err(Error::validation(
                key,
                format!("{:?} is neither true nor false", v),
            )),
        }
    }

    fn parsed<T: FromStr<Err = Error> + Default>(&self, key: &str) -> Result<T, Error> {
        self.get(key).map(str::parse).unwrap_or_else(|| Ok(T::default()))
    }
}

impl LabelParameters {
    /// Resolve raw request values against the configuration.
    ///
    /// The font is checked first, so a request without `font_family` fails
    /// with [`Error::MissingFont`] whatever else it contains.
    pub fn resolve(
        configuration: &Arc<Configuration>,
        raw: &HashMap<String, String>,
    ) -> Result<Self, Error> {
        let font = FontReference::parse(raw.get("font_family").map(String::as_str))?;
        let raw = Raw(raw);

        let label_size = raw.get("label_size").unwrap_or(DEFAULT_LABEL_SIZE).to_string();
        let label = configuration
            .labels
            .get(&label_size)
            .cloned()
            .ok_or_else(|| {
                Error::validation("label_size", format!("unknown label size {:?}", label_size))
            })?;

        let margin = raw.int("margin", DEFAULT_MARGIN, 0, MAX_DOTS)?;
        let margin_default = |own: u32| {
            if configuration.label.unify_margins {
                margin
            } else {
                own
            }
        };

        let parameters = LabelParameters {
            configuration: Arc::clone(configuration),
            font_family: font.family,
            font_style: font.style,
            text: raw.0.get("text").cloned().unwrap_or_default(),
            font_size: raw.int("font_size", DEFAULT_FONT_SIZE, 1, MAX_DOTS)?,
            label_size,
            margin,
            threshold: raw.int("threshold", DEFAULT_THRESHOLD as u32, 0, 100)? as u8,
            align: raw.parsed("align")?,
            orientation: raw.parsed("orientation")?,
            margin_top: raw.int("margin_top", margin_default(DEFAULT_MARGIN_TOP), 0, MAX_DOTS)?,
            margin_bottom: raw.int(
                "margin_bottom",
                margin_default(DEFAULT_MARGIN_BOTTOM),
                0,
                MAX_DOTS,
            )?,
            margin_left: raw.int(
                "margin_left",
                margin_default(DEFAULT_MARGIN_LEFT),
                0,
                MAX_DOTS,
            )?,
            margin_right: raw.int(
                "margin_right",
                margin_default(DEFAULT_MARGIN_RIGHT),
                0,
                MAX_DOTS,
            )?,
            label_count: raw.int("label_count", 1, 1, MAX_DOTS)?,
            high_quality: raw.boolean("high_quality", false)?,
            label,
        };
        log::debug!("resolved parameters: {:?}", parameters);
        Ok(parameters)
    }

    /// The catalog entry for `label_size`.
    pub fn label(&self) -> &LabelSpec {
        &self.label
    }
}
