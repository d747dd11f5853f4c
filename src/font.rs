//! Font lookup and glyph rasterization.
//!
//! Requests name a font with a single `"Family (Style)"` string. The
//! [`FontCatalog`] turns that pair into a [`Typeface`] the layout engine can
//! measure and draw with.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use log::{debug, warn};

use crate::error::Error;

/// Family and style split out of a `"Family (Style)"` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontReference {
    pub family: String,
    pub style: String,
}

impl FontReference {
    /// Split at the last `" ("`, dropping the trailing `")"` from the style.
    ///
    /// A string without `" ("` leaves the family empty and keeps the whole
    /// string as style.
    pub fn parse(combined: Option<&str>) -> Result<Self, Error> {
        let combined = combined.ok_or(Error::MissingFont)?;
        let (family, style) = match combined.rfind(" (") {
            Some(idx) => (&combined[..idx], &combined[idx + 2..]),
            None => ("", combined),
        };
        let style = style.strip_suffix(')').unwrap_or(style);
        Ok(FontReference {
            family: family.trim().to_string(),
            style: style.to_string(),
        })
    }
}

/// Vertical metrics of a typeface at a given pixel size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineMetrics {
    pub ascent: f32,
    /// Below the baseline, negative.
    pub descent: f32,
    pub line_gap: f32,
}

impl LineMetrics {
    pub fn height(&self) -> f32 {
        self.ascent - self.descent
    }
}

/// What the layout engine needs from a font.
pub trait Typeface: Send + Sync {
    fn metrics(&self, px: f32) -> LineMetrics;

    fn advance(&self, ch: char, px: f32) -> f32;

    fn kern(&self, _left: char, _right: char, _px: f32) -> f32 {
        0.0
    }

    /// Rasterize `ch` with its origin at `(x, baseline)`, calling `plot`
    /// with absolute pixel coordinates and a coverage in `[0, 1]`.
    fn draw(&self, ch: char, px: f32, x: f32, baseline: f32, plot: &mut dyn FnMut(i32, i32, f32));
}

/// Scale for an em square of `px` pixels.
///
/// `ab_glyph` scales so that ascent minus descent is `px`; font sizes in
/// requests are em sizes.
fn em_scale(font: &FontArc, px: f32) -> PxScale {
    match font.units_per_em() {
        Some(units) if units > 0.0 => PxScale::from(px * font.height_unscaled() / units),
        _ => PxScale::from(px),
    }
}

impl Typeface for FontArc {
    fn metrics(&self, px: f32) -> LineMetrics {
        let scaled = self.as_scaled(em_scale(self, px));
        LineMetrics {
            ascent: scaled.ascent(),
            descent: scaled.descent(),
            line_gap: scaled.line_gap(),
        }
    }

    fn advance(&self, ch: char, px: f32) -> f32 {
        self.as_scaled(em_scale(self, px))
            .h_advance(self.glyph_id(ch))
    }

    fn kern(&self, left: char, right: char, px: f32) -> f32 {
        self.as_scaled(em_scale(self, px))
            .kern(self.glyph_id(left), self.glyph_id(right))
    }

    fn draw(&self, ch: char, px: f32, x: f32, baseline: f32, plot: &mut dyn FnMut(i32, i32, f32)) {
        let glyph = self
            .glyph_id(ch)
            .with_scale_and_position(em_scale(self, px), ab_glyph::point(x, baseline));

        if let Some(outlined) = self.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                plot(
                    gx as i32 + bounds.min.x as i32,
                    gy as i32 + bounds.min.y as i32,
                    coverage,
                );
            });
        }
    }
}

/// Maps a family and style to a loadable typeface.
pub trait FontCatalog: Send + Sync {
    fn load(&self, family: &str, style: &str) -> Result<Arc<dyn Typeface>, Error>;

    /// Every `(family, style)` pair the catalog can load, sorted.
    fn fonts(&self) -> Vec<(String, String)>;
}

/// Font files found on disk, indexed by the names stored inside them.
#[derive(Debug, Default)]
pub struct FontDirectory {
    files: BTreeMap<(String, String), PathBuf>,
}

impl FontDirectory {
    /// Recursively index every `.ttf`/`.otf` below `folders`.
    ///
    /// Missing folders are skipped; unreadable or malformed files are logged
    /// and left out.
    pub fn scan<P: AsRef<Path>>(folders: &[P]) -> Self {
        let mut directory = FontDirectory::default();
        for folder in folders {
            directory.scan_folder(folder.as_ref());
        }
        debug!("indexed {} fonts", directory.files.len());
        directory
    }

    fn scan_folder(&mut self, folder: &Path) {
        let entries = match fs::read_dir(folder) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                self.scan_folder(&path);
                continue;
            }
            let is_font = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| matches!(e.to_ascii_lowercase().as_str(), "ttf" | "otf"))
                .unwrap_or(false);
            if !is_font {
                continue;
            }
            match fs::read(&path).ok().and_then(|data| font_names(&data)) {
                Some(key) => {
                    // first one wins, system folders are scanned first
                    self.files.entry(key).or_insert(path);
                }
                None => warn!("skipping unreadable font {}", path.display()),
            }
        }
    }

    pub fn path(&self, family: &str, style: &str) -> Option<&Path> {
        self.files
            .get(&(family.to_string(), style.to_string()))
            .map(PathBuf::as_path)
    }
}

/// Family and subfamily from the name table, preferring the typographic names.
fn font_names(data: &[u8]) -> Option<(String, String)> {
    let face = ttf_parser::Face::parse(data, 0).ok()?;
    let lookup = |preferred: u16, fallback: u16| {
        let find = |id: u16| {
            face.names()
                .into_iter()
                .filter(|name| name.name_id == id)
                .find_map(|name| name.to_string())
        };
        find(preferred).or_else(|| find(fallback))
    };
    let family = lookup(
        ttf_parser::name_id::TYPOGRAPHIC_FAMILY,
        ttf_parser::name_id::FAMILY,
    )?;
    let style = lookup(
        ttf_parser::name_id::TYPOGRAPHIC_SUBFAMILY,
        ttf_parser::name_id::SUBFAMILY,
    )
    .unwrap_or_else(|| "Regular".to_string());
    Some((family, style))
}

impl FontCatalog for FontDirectory {
    fn load(&self, family: &str, style: &str) -> Result<Arc<dyn Typeface>, Error> {
        let not_found = || Error::FontNotFound {
            family: family.to_string(),
            style: style.to_string(),
        };
        let path = self.path(family, style).ok_or_else(not_found)?;
        let data = fs::read(path).map_err(|_| not_found())?;
        let font = FontArc::try_from_vec(data).map_err(|_| not_found())?;
        debug!("loaded font {} ({}) from {}", family, style, path.display());
        Ok(Arc::new(font))
    }

    fn fonts(&self) -> Vec<(String, String)> {
        self.files.keys().cloned().collect()
    }
}

/// Typefaces registered in memory, for embedded fonts and tests.
#[derive(Default)]
pub struct FontSet {
    faces: BTreeMap<(String, String), Arc<dyn Typeface>>,
}

impl FontSet {
    pub fn insert(&mut self, family: &str, style: &str, face: Arc<dyn Typeface>) {
        self.faces
            .insert((family.to_string(), style.to_string()), face);
    }

    pub fn with(mut self, family: &str, style: &str, face: Arc<dyn Typeface>) -> Self {
        self.insert(family, style, face);
        self
    }
}

impl FontCatalog for FontSet {
    fn load(&self, family: &str, style: &str) -> Result<Arc<dyn Typeface>, Error> {
        self.faces
            .get(&(family.to_string(), style.to_string()))
            .cloned()
            .ok_or_else(|| Error::FontNotFound {
                family: family.to_string(),
                style: style.to_string(),
            })
    }

    fn fonts(&self) -> Vec<(String, String)> {
        self.faces.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::BlockFace;

    #[test]
    fn split_family_and_style() {
        let font = FontReference::parse(Some("DejaVu Serif (Book)")).unwrap();
        assert_eq!(font.family, "DejaVu Serif");
        assert_eq!(font.style, "Book");
    }

    #[test]
    fn split_at_last_separator() {
        let font = FontReference::parse(Some("Odd (Name) (Bold Italic)")).unwrap();
        assert_eq!(font.family, "Odd (Name)");
        assert_eq!(font.style, "Bold Italic");
    }

    #[test]
    fn no_separator_leaves_family_empty() {
        let font = FontReference::parse(Some("Roboto")).unwrap();
        assert_eq!(font.family, "");
        assert_eq!(font.style, "Roboto");
    }

    #[test]
    fn absent_font_is_an_error() {
        assert!(matches!(
            FontReference::parse(None),
            Err(Error::MissingFont)
        ));
    }

    #[test]
    fn font_set_lookup() {
        let set = FontSet::default().with("Block", "Regular", Arc::new(BlockFace));
        assert!(set.load("Block", "Regular").is_ok());
        assert!(matches!(
            set.load("Block", "Bold"),
            Err(Error::FontNotFound { .. })
        ));
        assert_eq!(
            set.fonts(),
            vec![("Block".to_string(), "Regular".to_string())]
        );
    }

    #[test]
    fn directory_skips_missing_folders() {
        let dir = FontDirectory::scan(&["/nonexistent/fonts"]);
        assert!(dir.fonts().is_empty());
        assert!(matches!(
            dir.load("Roboto", "Medium"),
            Err(Error::FontNotFound { .. })
        ));
    }

    #[test]
    fn directory_ignores_non_font_files() {
        let folder = std::env::temp_dir().join(format!("qltext-fonts-{}", std::process::id()));
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("broken.ttf"), b"not a font").unwrap();
        fs::write(folder.join("notes.txt"), b"hello").unwrap();
        let dir = FontDirectory::scan(&[&folder]);
        assert!(dir.fonts().is_empty());
        fs::remove_dir_all(&folder).unwrap();
    }
}
