//! Snapshot export: neutralize, rasterize and paginate a rendered view tree
//! into a dated PDF.

pub mod document;
pub mod neutralize;
pub mod paginate;
pub mod raster;
pub mod tree;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ExportConfig;
use crate::error::ExportError;
use neutralize::NeutralizeGuard;
use paginate::{PageFormat, PageLayout};
use document::render_pdf;
use raster::{BoxRasterizer, Rasterizer};
use tree::{Rgba, ViewDocument};

/// Resolved export settings.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub format: PageFormat,
    pub scale: f32,
    pub background: Rgba,
    pub brand: Rgba,
    pub output_dir: PathBuf,
    pub file_prefix: String,
}

impl ExportSettings {
    pub fn from_config(config: &ExportConfig) -> anyhow::Result<Self> {
        Ok(Self {
            format: PageFormat {
                width_mm: config.page_width_mm,
                height_mm: config.page_height_mm,
                margin_mm: config.margin_mm,
            },
            scale: config.scale,
            background: config.background_rgba()?,
            brand: config.brand_rgba()?,
            output_dir: config.output_dir(),
            file_prefix: config.file_prefix.clone(),
        })
    }
}

/// What a finished export produced.
#[derive(Debug, Clone, Serialize)]
pub struct ExportArtifact {
    pub path: PathBuf,
    pub pages: usize,
    pub width_px: u32,
    pub height_px: u32,
}

/// `<prefix>-<YYYY-MM-DD>.pdf`
pub fn export_file_name(prefix: &str, date: NaiveDate) -> String {
    format!("{}-{}.pdf", prefix, date.format("%Y-%m-%d"))
}

/// Clears the in-progress flag when an export ends, however it ends.
struct InProgress<'a>(&'a AtomicBool);

impl<'a> InProgress<'a> {
    fn claim(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One export trigger point. At most one export runs through it at a time.
///
/// Rasterization and encoding run on the blocking pool, so an export never
/// stalls the tasks feeding the live view.
pub struct ExportPipeline<R: Rasterizer + 'static = BoxRasterizer> {
    settings: ExportSettings,
    rasterizer: Arc<R>,
    in_progress: AtomicBool,
}

impl ExportPipeline<BoxRasterizer> {
    pub fn new(settings: ExportSettings) -> Self {
        Self::with_rasterizer(settings, BoxRasterizer)
    }
}

impl<R: Rasterizer + 'static> ExportPipeline<R> {
    pub fn with_rasterizer(settings: ExportSettings, rasterizer: R) -> Self {
        Self {
            settings,
            rasterizer: Arc::new(rasterizer),
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Export the subtree `root_id` of `document` to a dated PDF.
    ///
    /// The document is back in its original state when this returns, on
    /// success and on every error.
    pub async fn export(&self, document: &mut ViewDocument, root_id: &str) -> Result<ExportArtifact, ExportError> {
        let _slot = InProgress::claim(&self.in_progress).ok_or(ExportError::AlreadyRunning)?;
        info!("Starting export of '{}'", root_id);

        let raster = {
            let guard = NeutralizeGuard::acquire(document, root_id)?;
            let clone = guard
                .sanitized_clone(self.settings.brand)
                .ok_or_else(|| ExportError::RootNotFound(root_id.to_string()))?;
            let rasterizer = Arc::clone(&self.rasterizer);
            let (scale, background) = (self.settings.scale, self.settings.background);
            let captured = tokio::task::spawn_blocking(move || rasterizer.rasterize(&clone, scale, background)).await;
            drop(guard);
            captured.map_err(|e| ExportError::RasterizationFailed(format!("Capture task failed: {}", e)))??
        };

        if raster.is_empty() {
            warn!("Capture of '{}' produced an empty image", root_id);
            return Err(ExportError::RasterizationFailed(format!(
                "capture of '{}' produced an empty image",
                root_id
            )));
        }

        let layout = PageLayout::compute(self.settings.format, raster.width(), raster.height());
        let pages = layout.page_count();
        let (width_px, height_px) = (raster.width(), raster.height());
        let background = self.settings.background;
        let title = self.settings.file_prefix.clone();

        let pdf = tokio::task::spawn_blocking(move || render_pdf(raster.to_rgb(background), &layout, &title))
            .await
            .map_err(|e| ExportError::Encode(format!("Encoder task failed: {}", e)))??;

        let dir = &self.settings.output_dir;
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(export_file_name(
            &self.settings.file_prefix,
            Local::now().date_naive(),
        ));
        tokio::fs::write(&path, &pdf).await?;

        info!("Exported {} page(s) to {:?}", pages, path);
        Ok(ExportArtifact {
            path,
            pages,
            width_px,
            height_px,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::neutralize::{CAPTURE_MARKER_CLASS, NEUTRALIZE_STYLE_ID};
    use crate::export::raster::RasterImage;
    use crate::export::tree::{Rect, ViewNode};
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> ExportSettings {
        ExportSettings {
            format: PageFormat::A4,
            scale: 2.0,
            background: Rgba::opaque(0xfa, 0xf5, 0xff),
            brand: Rgba::opaque(0x93, 0x33, 0xea),
            output_dir: dir.path().to_path_buf(),
            file_prefix: "relatorio-aura".to_string(),
        }
    }

    fn document(height: f32) -> ViewDocument {
        let frame = Rect { x: 0.0, y: 0.0, width: 95.0, height: 40.0 };
        let mut content = ViewNode::new("div", frame).with_id("dashboard-content");
        content.scroll_size = Some((95.0, height));
        ViewDocument::new(ViewNode::new("body", frame).with_child(content))
    }

    struct EmptyRasterizer;

    impl Rasterizer for EmptyRasterizer {
        fn rasterize(&self, _root: &ViewNode, scale: f32, _background: Rgba) -> Result<RasterImage, ExportError> {
            Ok(RasterImage::new(image::RgbaImage::new(0, 0), scale))
        }
    }

    struct FailingRasterizer;

    impl Rasterizer for FailingRasterizer {
        fn rasterize(&self, _root: &ViewNode, _scale: f32, _background: Rgba) -> Result<RasterImage, ExportError> {
            Err(ExportError::RasterizationFailed("backend crashed".into()))
        }
    }

    struct SlowRasterizer;

    impl Rasterizer for SlowRasterizer {
        fn rasterize(&self, _root: &ViewNode, scale: f32, background: Rgba) -> Result<RasterImage, ExportError> {
            std::thread::sleep(Duration::from_millis(200));
            let px = image::Rgba([background.r, background.g, background.b, 255]);
            Ok(RasterImage::new(image::RgbaImage::from_pixel(40, 20, px), scale))
        }
    }

    fn assert_clean(doc: &ViewDocument) {
        assert!(doc.style_element(NEUTRALIZE_STYLE_ID).is_none());
        if let Some(root) = doc.find("dashboard-content") {
            assert!(!root.has_class(CAPTURE_MARKER_CLASS));
        }
    }

    #[test]
    fn test_file_name_uses_prefix_and_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(export_file_name("relatorio-aura", date), "relatorio-aura-2024-03-07.pdf");
    }

    #[tokio::test]
    async fn test_export_writes_paginated_pdf() {
        let dir = TempDir::new().unwrap();
        let pipeline = ExportPipeline::new(settings(&dir));
        // 95 x 300 css px -> 190 x 600 device px -> 600 mm over 277 mm bodies
        let mut doc = document(300.0);
        let artifact = pipeline.export(&mut doc, "dashboard-content").await.unwrap();

        assert_eq!(artifact.pages, 3);
        assert_eq!((artifact.width_px, artifact.height_px), (190, 600));
        let bytes = std::fs::read(&artifact.path).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        let name = artifact.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("relatorio-aura-") && name.ends_with(".pdf"));
        assert_clean(&doc);
        assert!(!pipeline.is_running());
    }

    #[tokio::test]
    async fn test_missing_root_aborts_without_document() {
        let dir = TempDir::new().unwrap();
        let pipeline = ExportPipeline::new(settings(&dir));
        let mut doc = document(100.0);
        let before = doc.clone();

        let result = pipeline.export(&mut doc, "missing").await;
        assert!(matches!(result, Err(ExportError::RootNotFound(_))));
        assert_eq!(doc, before);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_empty_raster_is_distinct_failure_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let pipeline = ExportPipeline::with_rasterizer(settings(&dir), EmptyRasterizer);
        let mut doc = document(100.0);
        let before = doc.clone();

        let result = pipeline.export(&mut doc, "dashboard-content").await;
        assert!(matches!(result, Err(ExportError::RasterizationFailed(_))));
        assert_eq!(doc, before);
        assert!(!pipeline.is_running());
    }

    #[tokio::test]
    async fn test_rasterizer_error_still_cleans_up() {
        let dir = TempDir::new().unwrap();
        let pipeline = ExportPipeline::with_rasterizer(settings(&dir), FailingRasterizer);
        let mut doc = document(100.0);

        assert!(pipeline.export(&mut doc, "dashboard-content").await.is_err());
        assert_clean(&doc);
        // the trigger is usable again
        let retry = pipeline.export(&mut doc, "dashboard-content").await;
        assert!(matches!(retry, Err(ExportError::RasterizationFailed(_))));
    }

    #[tokio::test]
    async fn test_slow_capture_does_not_stall_other_tasks() {
        // single-threaded runtime: the ticker only advances if the capture
        // runs somewhere else
        let dir = TempDir::new().unwrap();
        let pipeline = ExportPipeline::with_rasterizer(settings(&dir), SlowRasterizer);
        let ticks = Arc::new(AtomicU64::new(0));
        let ticker = tokio::spawn({
            let ticks = ticks.clone();
            async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        let mut doc = document(100.0);
        let artifact = pipeline.export(&mut doc, "dashboard-content").await.unwrap();
        ticker.abort();

        assert_eq!(artifact.pages, 1);
        let ticks = ticks.load(Ordering::SeqCst);
        assert!(ticks >= 10, "only {} tick(s) during a 200 ms capture", ticks);
        assert_clean(&doc);
    }

    #[tokio::test]
    async fn test_second_trigger_while_running_is_refused() {
        let dir = TempDir::new().unwrap();
        let pipeline = ExportPipeline::new(settings(&dir));
        let _held = InProgress::claim(&pipeline.in_progress).unwrap();

        let mut doc = document(100.0);
        let result = pipeline.export(&mut doc, "dashboard-content").await;
        assert!(matches!(result, Err(ExportError::AlreadyRunning)));
        assert_clean(&doc);
    }
}
