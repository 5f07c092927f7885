use std::path::PathBuf;

use aura_dashboard::export::neutralize::{NeutralizeGuard, CAPTURE_MARKER_CLASS, NEUTRALIZE_STYLE_ID};
use aura_dashboard::export::paginate::{PageFormat, PageLayout};
use aura_dashboard::export::raster::{BoxRasterizer, Rasterizer};
use aura_dashboard::export::tree::{Rgba, ViewDocument};
use aura_dashboard::{ClientConfig, ExportError, ExportPipeline, ExportSettings};
use tempfile::TempDir;

const BRAND: Rgba = Rgba::opaque(0x93, 0x33, 0xea);

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn load_view() -> ViewDocument {
    let content = std::fs::read_to_string(fixture_path("dashboard_view.json")).expect("Failed to read fixture");
    serde_json::from_str(&content).expect("Failed to parse view fixture")
}

fn settings(dir: &TempDir) -> ExportSettings {
    let mut config = ClientConfig::default();
    config.export.directory = Some(dir.path().to_path_buf());
    ExportSettings::from_config(&config.export).expect("default export config must resolve")
}

#[test]
fn test_translucent_white_card_is_opaque_before_capture() {
    let mut doc = load_view();
    let guard = NeutralizeGuard::acquire(&mut doc, "dashboard-content").unwrap();
    let clone = guard.sanitized_clone(BRAND).unwrap();

    let card = clone.find("status-card").unwrap();
    assert_eq!(card.style.background_color, Some(Rgba::WHITE));
    assert!(card.style.backdrop_filter.is_none());

    let title = clone.find("title").unwrap();
    assert_eq!(title.style.color, BRAND);
    assert!(title.style.background_image.is_none());

    let button = clone.find("export-button").unwrap();
    assert_eq!(button.style.background_color, Some(BRAND));

    let chart = clone.find("fft-chart").unwrap();
    assert_eq!(chart.style.opacity, 1.0);
    assert!(chart.style.filter.is_none());
}

#[test]
fn test_sanitized_capture_paints_solid_colors() {
    let mut doc = load_view();
    let guard = NeutralizeGuard::acquire(&mut doc, "dashboard-content").unwrap();
    let clone = guard.sanitized_clone(BRAND).unwrap();
    let background = Rgba::parse("#faf5ff").unwrap();
    let raster = BoxRasterizer.rasterize(&clone, 2.0, background).unwrap();
    drop(guard);

    // full scroll height at 2x, not the 350px visible frame
    assert_eq!((raster.width(), raster.height()), (960, 2400));
    // inside the card, away from the gauge
    assert_eq!(raster.pixels().get_pixel(600, 100).0, [255, 255, 255, 255]);
    // the gradient gauge fill became the brand color
    assert_eq!(raster.pixels().get_pixel(100, 100).0, [0x93, 0x33, 0xea, 255]);
    // outside every element the page background shows
    assert_eq!(raster.pixels().get_pixel(5, 5).0, [0xfa, 0xf5, 0xff, 255]);
}

#[test]
fn test_pages_cover_scaled_height_without_gaps() {
    let format = PageFormat::A4;
    for height in [1u32, 500, 2400, 2800, 2801, 9000] {
        let layout = PageLayout::compute(format, 960, height);
        let expected = (layout.print_height_mm / format.body_height_mm()).ceil() as usize;
        let tolerance = format.body_width_mm() / 960.0 / 2.0;
        let count = layout.page_count();
        assert!(
            count == expected || (count + 1 == expected && layout.print_height_mm - count as f64 * format.body_height_mm() <= tolerance),
            "height {}: {} pages, expected {}",
            height,
            count,
            expected
        );

        let mut covered = 0.0;
        for page in &layout.pages {
            assert!((page.band_start_mm - covered).abs() < 1e-9, "gap before page {}", page.page);
            covered = page.band_end_mm;
        }
        assert!((covered - layout.print_height_mm).abs() < tolerance.max(1e-9));
    }
}

#[tokio::test]
async fn test_export_fixture_to_dated_pdf() {
    let dir = TempDir::new().unwrap();
    let pipeline = ExportPipeline::new(settings(&dir));
    let mut doc = load_view();
    let original = doc.clone();

    let artifact = pipeline.export(&mut doc, "dashboard-content").await.unwrap();

    // 2400 px at 190/960 mm per px is 475 mm, over a 277 mm body
    assert_eq!(artifact.pages, 2);
    assert!(artifact.path.starts_with(dir.path()));
    let name = artifact.path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("relatorio-aura-"), "unexpected name {}", name);
    assert_eq!(name.len(), "relatorio-aura-YYYY-MM-DD.pdf".len());

    let bytes = std::fs::read(&artifact.path).unwrap();
    assert!(bytes.starts_with(b"%PDF-"));
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("/Count 2"));

    assert_eq!(doc, original);
}

#[tokio::test]
async fn test_cleanup_after_success_and_failure() {
    let dir = TempDir::new().unwrap();
    let pipeline = ExportPipeline::new(settings(&dir));
    let mut doc = load_view();

    pipeline.export(&mut doc, "dashboard-content").await.unwrap();
    assert!(doc.style_element(NEUTRALIZE_STYLE_ID).is_none());
    assert!(!doc.find("dashboard-content").unwrap().has_class(CAPTURE_MARKER_CLASS));

    let err = pipeline.export(&mut doc, "not-rendered").await.unwrap_err();
    assert!(matches!(err, ExportError::RootNotFound(ref id) if id == "not-rendered"));
    assert!(doc.style_element(NEUTRALIZE_STYLE_ID).is_none());
    // the theme stylesheet is untouched
    assert!(doc.style_element("app-theme").is_some());
}

#[tokio::test]
async fn test_missing_root_produces_no_document() {
    let dir = TempDir::new().unwrap();
    let pipeline = ExportPipeline::new(settings(&dir));
    let mut doc = load_view();
    let original = doc.clone();

    assert!(pipeline.export(&mut doc, "missing").await.is_err());
    assert_eq!(doc, original);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
