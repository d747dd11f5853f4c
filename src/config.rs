//! Process-wide configuration.
//!
//! Loaded once at startup from a JSON file and then shared read-only with
//! every request through an `Arc`.
//!
//! ```json
//! {
//!   "server": { "logLevel": "WARNING", "additionalFontFolder": "/opt/fonts" },
//!   "printer": { "model": "QL-800", "printer": "file:///dev/usb/lp1" },
//!   "label": { "unify_margins": false }
//! }
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{de, Deserialize, Deserializer};

use crate::{error::Error, media::LabelCatalog, model::Model};

const SYSTEM_FONT_FOLDERS: &[&str] = &["/usr/share/fonts", "/usr/local/share/fonts"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// `DEBUG`, `INFO`, `WARNING`, `ERROR` or any `RUST_LOG` filter.
    pub log_level: Option<String>,
    /// Extra font folder; `false` or `null` for none.
    #[serde(deserialize_with = "optional_folder")]
    pub additional_font_folder: Option<PathBuf>,
}

/// A folder path, or `false`/`null` when there is none.
fn optional_folder<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Folder {
        Path(PathBuf),
        Flag(bool),
    }

    match Option::<Folder>::deserialize(deserializer)? {
        Some(Folder::Path(path)) if !path.as_os_str().is_empty() => Ok(Some(path)),
        Some(Folder::Path(_)) | Some(Folder::Flag(false)) | None => Ok(None),
        Some(Folder::Flag(true)) => Err(de::Error::custom(
            "additionalFontFolder must be a path or false",
        )),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    pub model: Model,
    /// Default printer target, e.g. `file:///dev/usb/lp0` or `tcp://10.0.0.5:9100`.
    pub printer: Option<String>,
    /// Pack raster lines with PackBits.
    pub compress: bool,
    /// Cut after every label and at the end of the job.
    pub cut: bool,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        PrinterConfig {
            model: Model::default(),
            printer: None,
            compress: true,
            cut: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Omitted `margin_*` parameters take the value of `margin`.
    pub unify_margins: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub server: ServerConfig,
    pub printer: PrinterConfig,
    pub label: LabelConfig,
    #[serde(skip)]
    pub labels: LabelCatalog,
}

impl Configuration {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let config = Self::from_json(&raw)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Folders scanned by the font catalog, system folders first.
    pub fn font_folders(&self) -> Vec<PathBuf> {
        let mut folders: Vec<PathBuf> = SYSTEM_FONT_FOLDERS.iter().map(PathBuf::from).collect();
        if let Some(home) = std::env::var_os("HOME") {
            folders.push(Path::new(&home).join(".fonts"));
        }
        if let Some(extra) = &self.server.additional_font_folder {
            folders.push(extra.clone());
        }
        folders
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Configuration::from_json("{}").unwrap();
        assert_eq!(config.printer.model, Model::QL500);
        assert!(config.printer.compress);
        assert!(!config.label.unify_margins);
        assert!(config.labels.get("62").is_some());
    }

    #[test]
    fn parses_original_layout() {
        let config = Configuration::from_json(
            r#"{
                "server": {"port": 8013, "logLevel": "DEBUG", "additionalFontFolder": "/opt/fonts"},
                "printer": {"model": "QL-820NWB", "printer": "tcp://192.168.1.20:9100"},
                "label": {"default_size": "62", "unify_margins": true},
                "website": {"html_title": "Label Designer"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.server.log_level.as_deref(), Some("DEBUG"));
        assert_eq!(config.printer.model, Model::QL820NWB);
        assert_eq!(
            config.printer.printer.as_deref(),
            Some("tcp://192.168.1.20:9100")
        );
        assert!(config.label.unify_margins);
        assert!(config
            .font_folders()
            .contains(&PathBuf::from("/opt/fonts")));
    }

    #[test]
    fn font_folder_may_be_switched_off() {
        let config = Configuration::from_json(
            r#"{
                "server": {"port": 8013, "logLevel": "WARNING", "additionalFontFolder": false},
                "printer": {"model": "QL-500", "printer": "file:///dev/usb/lp1"},
                "label": {"default_size": "62", "default_orientation": "standard",
                          "default_font_size": 70, "default_fonts": [
                              {"family": "Minion Pro", "style": "Semibold"}]},
                "website": {"html_title": "Label Designer", "page_title": "Brother QL Label Designer"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.server.additional_font_folder, None);
        assert_eq!(config.printer.printer.as_deref(), Some("file:///dev/usb/lp1"));

        let config =
            Configuration::from_json(r#"{"server": {"additionalFontFolder": null}}"#).unwrap();
        assert_eq!(config.server.additional_font_folder, None);

        let err = Configuration::from_json(r#"{"server": {"additionalFontFolder": true}}"#)
            .unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn unknown_model_is_rejected() {
        let err = Configuration::from_json(r#"{"printer": {"model": "QL-9"}}"#).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }
}
