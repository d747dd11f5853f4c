use std::{collections::HashMap, fs, path::PathBuf, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use pretty_assertions::assert_eq;
use qltext::{
    pack_bits, Configuration, FontSet, LabelService, LineMetrics, RasterSummary, Target, Typeface,
};

#[path = "../src/testing.rs"]
mod testing;

use testing::BlockFace;

fn service() -> LabelService {
    let config = Configuration::from_json(r#"{"printer": {"model": "QL-800"}}"#).unwrap();
    let fonts = FontSet::default().with("Roboto", "Medium", Arc::new(BlockFace));
    LabelService::new(Arc::new(config), Arc::new(fonts))
}

fn request(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn hello_world() -> HashMap<String, String> {
    request(&[
        ("text", "Hello World!"),
        ("label_size", "62"),
        ("font_family", "Roboto (Medium)"),
        ("orientation", "standard"),
    ])
}

/// An empty printer file, removed again on drop.
struct PrinterFile(PathBuf);

impl PrinterFile {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "qltext-pipeline-{}-{}",
            std::process::id(),
            name
        ));
        fs::write(&path, b"").unwrap();
        PrinterFile(path)
    }

    fn target(&self) -> Target {
        Target::File(self.0.clone())
    }

    fn contents(&self) -> Vec<u8> {
        fs::read(&self.0).unwrap()
    }
}

impl Drop for PrinterFile {
    fn drop(&mut self) {
        fs::remove_file(&self.0).ok();
    }
}

fn from_hex(hex: &str) -> Vec<u8> {
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
        .collect()
}

/// A 62 mm raster line with ink on the given label columns.
fn raster_line(spans: &[(u32, u32)]) -> Vec<u8> {
    let mut head = vec![0u8; 90];
    for &(start, end) in spans {
        for x in start..end {
            // mirrored, 12 pins of right margin
            let pin = (707 - x) as usize;
            head[pin / 8] |= 0x80 >> (pin % 8);
        }
    }
    let packed = pack_bits(&head);
    let mut line = vec![b'g', 0x00, packed.len() as u8];
    line.extend_from_slice(&packed);
    line
}

#[test]
fn missing_font_keeps_the_printer_untouched() {
    let printer = PrinterFile::new("missing-font");
    let response = service().print_to(&HashMap::new(), Some(&printer.target()), false);
    assert_eq!(
        response.to_json().unwrap(),
        r#"{"success": false, "error": "'NoneType' object has no attribute 'rpartition'"}"#
    );
    assert_eq!(printer.contents(), Vec::<u8>::new());
}

#[test]
fn validation_failure_keeps_the_printer_untouched() {
    let printer = PrinterFile::new("validation");
    let mut raw = hello_world();
    raw.insert("threshold".to_string(), "150".to_string());
    let response = service().print_to(&raw, Some(&printer.target()), false);
    assert!(!response.success);
    assert!(response.error.unwrap().contains("threshold"));
    assert_eq!(printer.contents(), Vec::<u8>::new());
}

#[test]
fn oversized_label_keeps_the_printer_untouched() {
    let printer = PrinterFile::new("oversized");
    let mut raw = hello_world();
    raw.insert("label_size".to_string(), "102".to_string());
    let response = service().print_to(&raw, Some(&printer.target()), false);
    assert!(!response.success);
    assert_eq!(
        response.error.as_deref(),
        Some("Label 102 is 1176 dots but at most 720 dots are printable")
    );
    assert_eq!(printer.contents(), Vec::<u8>::new());
}

#[test]
fn regular_mode_writes_the_raster_stream() {
    let printer = PrinterFile::new("regular");
    let response = service().print_to(&hello_world(), Some(&printer.target()), false);
    assert_eq!(response.to_json().unwrap(), r#"{"success": true}"#);

    let mut expected = vec![0x00; 200];
    expected.extend_from_slice(&[0x1B, b'@', 0x1B, b'i', b'S', 0x1B, b'i', b'a', 0x01]);
    // 269 rows: 24 margin + two lines of 100 + 45 margin
    expected.extend_from_slice(&[
        0x1B, b'i', b'z', 0x8E, 0x0A, 62, 0, 0x0D, 0x01, 0x00, 0x00, 0x00, 0x00,
    ]);
    expected.extend_from_slice(&[
        0x1B, b'i', b'M', 0x40, 0x1B, b'i', b'A', 0x01, 0x1B, b'i', b'K', 0x08, 0x1B, b'i',
        b'd', 35, 0, b'M', 0x02,
    ]);
    let hello: Vec<(u32, u32)> = (0..5).map(|i| (208 + 60 * i, 248 + 60 * i)).collect();
    let world: Vec<(u32, u32)> = (0..6).map(|i| (178 + 60 * i, 218 + 60 * i)).collect();
    for y in 0..269 {
        match y {
            34..=103 => expected.extend(raster_line(&hello)),
            134..=203 => expected.extend(raster_line(&world)),
            _ => expected.push(b'Z'),
        }
    }
    expected.push(0x1A);

    assert_eq!(printer.contents(), expected);
}

#[test]
fn narrow_tape_is_printed_after_its_right_margin() {
    let printer = PrinterFile::new("narrow");
    let raw = request(&[
        ("text", "I"),
        ("label_size", "12"),
        ("font_family", "Roboto (Medium)"),
        ("font_size", "50"),
    ]);
    let response = service().print_to(&raw, Some(&printer.target()), false);
    assert!(response.success, "{:?}", response.error);

    let summary = RasterSummary::parse(&printer.contents()).unwrap();
    let rows = &summary.pages[0].rows;
    // 24 + 50 + 45 rows, the block covers rows 29..64 and columns 43..63
    assert_eq!(rows.len(), 119);
    let lit = |row: &[u8]| -> Vec<usize> {
        (0..row.len() * 8)
            .filter(|&pin| row[pin / 8] & (0x80 >> (pin % 8)) != 0)
            .collect()
    };
    // column x lands on pin 29 + 105 - x
    assert_eq!(lit(&rows[40]), (72..=91).collect::<Vec<_>>());
    assert!(lit(&rows[28]).is_empty());
}

#[test]
fn debug_mode_traces_instead_of_printing() {
    let printer = PrinterFile::new("debug");
    let service = service();
    let first = service.print_to(&hello_world(), Some(&printer.target()), true);
    let second = service.print_to(&hello_world(), Some(&printer.target()), true);

    assert!(first.success);
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    assert_eq!(printer.contents(), Vec::<u8>::new());

    let trace = first.trace.unwrap();
    assert_eq!(trace.parameters.text, "Hello World!");
    assert_eq!(trace.geometry.lines.len(), 2);
    assert_eq!((trace.bitmap.width, trace.bitmap.height), (696, 269));
    assert_eq!(trace.raster.job.rows, 269);
    assert_eq!(trace.raster.job.copies, 1);
    assert_eq!(trace.to_json().unwrap(), trace.clone().to_json().unwrap());
}

#[test]
fn trace_bytes_match_what_the_printer_receives() {
    let printer = PrinterFile::new("trace-vs-file");
    let service = service();
    let mut raw = hello_world();
    raw.insert("label_count".to_string(), "2".to_string());

    let traced = service.print_to(&raw, Some(&printer.target()), true);
    let printed = service.print_to(&raw, Some(&printer.target()), false);
    assert!(printed.success);

    let trace = traced.trace.unwrap();
    let written = printer.contents();
    assert_eq!(trace.raster.length, written.len());
    assert_eq!(from_hex(&trace.raster.bytes), written);

    let summary = RasterSummary::parse(&written).unwrap();
    assert!(summary.raster_mode);
    assert!(summary.compressed);
    assert_eq!(summary.pages.len(), 2);
    assert!(summary
        .pages
        .iter()
        .all(|page| page.rows.len() == 269 && page.declared_rows == 269));
}

#[test]
fn rotated_text_runs_along_the_tape() {
    let printer = PrinterFile::new("rotated");
    let mut raw = hello_world();
    raw.insert("orientation".to_string(), "rotated".to_string());
    let response = service().print_to(&raw, Some(&printer.target()), false);
    assert!(response.success);

    let summary = RasterSummary::parse(&printer.contents()).unwrap();
    // 12 glyphs of 60 dots plus 35 dots of margin either side
    assert_eq!(summary.pages[0].rows.len(), 790);
    assert_eq!(summary.pages[0].length_mm, 0);
}

#[test]
fn base64_preview_decodes_to_the_png_preview() {
    let service = service();
    let mut raw = hello_world();
    raw.insert("return_format".to_string(), "png".to_string());
    let png = service.preview(&raw).unwrap();

    raw.insert("return_format".to_string(), "base64".to_string());
    let encoded = service.preview(&raw).unwrap();
    assert_eq!(STANDARD.decode(&encoded).unwrap(), png);

    let image = image::load_from_memory(&png).unwrap().to_luma8();
    assert_eq!(image.dimensions(), (696, 269));
    assert_eq!(image.get_pixel(208, 34).0, [0]);
    assert_eq!(image.get_pixel(0, 0).0, [255]);
}

#[test]
fn printer_from_configuration_is_used_by_default() {
    let printer = PrinterFile::new("configured");
    let config = Configuration::from_json(&format!(
        r#"{{"printer": {{"model": "QL-800", "printer": "file://{}"}}}}"#,
        printer.0.display()
    ))
    .unwrap();
    let fonts = FontSet::default().with("Roboto", "Medium", Arc::new(BlockFace));
    let service = LabelService::new(Arc::new(config), Arc::new(fonts));

    let response = service.print(&hello_world(), false);
    assert!(response.success);
    assert!(!printer.contents().is_empty());
}
