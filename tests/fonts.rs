use std::{collections::HashMap, path::PathBuf, sync::Arc};

use pretty_assertions::assert_eq;
use qltext::{render, Configuration, FontCatalog, FontDirectory, LabelParameters, LabelService};

const FAMILY: &str = "DejaVu Sans Mono (Book)";

fn fonts() -> FontDirectory {
    FontDirectory::scan(&[PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data")])
}

fn request(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    let mut raw: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    raw.insert("font_family".to_string(), FAMILY.to_string());
    raw
}

fn service() -> LabelService {
    LabelService::new(Arc::new(Configuration::default()), Arc::new(fonts()))
}

#[test]
fn family_and_style_come_from_the_name_table() {
    let fonts = fonts();
    assert_eq!(
        fonts.fonts(),
        vec![("DejaVu Sans Mono".to_string(), "Book".to_string())]
    );
    assert!(fonts
        .path("DejaVu Sans Mono", "Book")
        .unwrap()
        .ends_with("DejaVuSansMono.ttf"));
    assert!(fonts.load("DejaVu Sans Mono", "Bold").is_err());
}

#[test]
fn outline_font_metrics() {
    let face = fonts().load("DejaVu Sans Mono", "Book").unwrap();
    let metrics = face.metrics(100.0);
    assert!(metrics.ascent > 70.0 && metrics.ascent < 100.0);
    assert!(metrics.descent < 0.0);
    // monospaced
    assert_eq!(face.advance('i', 100.0), face.advance('W', 100.0));
    assert!((face.advance('W', 100.0) - 60.2).abs() < 0.1);
}

#[test]
fn outline_glyphs_land_inside_their_lines() {
    let config = Arc::new(Configuration::default());
    let parameters = LabelParameters::resolve(&config, &request(&[("text", "Hello World!")])).unwrap();
    let (geometry, bitmap) = render(&parameters, &fonts()).unwrap();

    let texts: Vec<_> = geometry.lines.iter().map(|l| l.text.as_str()).collect();
    assert_eq!(texts, vec!["Hello", "World!"]);

    for line in &geometry.lines {
        let rows = line.y.max(0) as u32..(line.y as u32 + geometry.line_height).min(bitmap.height);
        let ink: Vec<(u32, u32)> = rows
            .flat_map(|y| (0..bitmap.width).map(move |x| (x, y)))
            .filter(|&(x, y)| bitmap.is_ink(x, y))
            .collect();
        assert!(!ink.is_empty(), "no ink for {:?}", line.text);

        let left = ink.iter().map(|&(x, _)| x).min().unwrap();
        let right = ink.iter().map(|&(x, _)| x).max().unwrap();
        assert!(left + 1 >= line.x as u32, "{:?} starts at {}", line.text, left);
        assert!(right <= line.x as u32 + line.width + 1, "{:?} ends at {}", line.text, right);
    }
}

#[test]
fn print_with_a_font_from_disk() {
    let response = service().print(&request(&[("text", "Hello World!")]), true);
    assert!(response.success, "{:?}", response.error);
    let trace = response.trace.unwrap();
    assert!(trace.bitmap.ink_dots > 0);
    assert_eq!(trace.raster.job.rows, trace.bitmap.height);
}

#[test]
fn preview_is_grayscale_and_ignores_the_threshold() {
    let service = service();
    let light = request(&[("text", "Hi"), ("threshold", "10")]);
    let dark = request(&[("text", "Hi"), ("threshold", "90")]);

    let preview = service.preview(&light).unwrap();
    assert_eq!(service.preview(&dark).unwrap(), preview);
    let image = image::load_from_memory(&preview).unwrap().to_luma8();
    assert!(image.pixels().any(|p| p.0[0] > 0 && p.0[0] < 255));

    // the printed bitmap does follow the threshold
    let ink = |raw: &HashMap<String, String>| {
        service.print(raw, true).trace.unwrap().bitmap.ink_dots
    };
    assert!(ink(&light) > ink(&dark));
}
