//! Rasterization of a (sanitized) view subtree.

use image::{RgbImage, RgbaImage};
use tracing::info;

use super::tree::{Rgba, ViewNode};
use crate::error::ExportError;

/// Largest raster edge the document encoder accepts.
pub const MAX_RASTER_DIMENSION: u32 = 65_535;
/// Largest capture area, 512 MiB of RGBA.
pub const MAX_RASTER_PIXELS: u64 = 1 << 27;

/// A rendered capture, in device pixels.
pub struct RasterImage {
    pixels: RgbaImage,
    scale: f32,
}

impl RasterImage {
    pub fn new(pixels: RgbaImage, scale: f32) -> Self {
        Self { pixels, scale }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// An empty payload means the capture backend produced nothing usable.
    pub fn is_empty(&self) -> bool {
        self.pixels.width() == 0 || self.pixels.height() == 0
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Flatten onto an opaque background for encoders without alpha.
    pub fn to_rgb(&self, background: Rgba) -> RgbImage {
        let mut out = RgbImage::new(self.width(), self.height());
        for (x, y, px) in self.pixels.enumerate_pixels() {
            let [r, g, b, a] = px.0;
            let c = Rgba { r, g, b, a: a as f32 / 255.0 }.over(background.solid());
            out.put_pixel(x, y, image::Rgb([c.r, c.g, c.b]));
        }
        out
    }
}

/// Turns a view subtree into pixels. The subtree's full natural size is
/// rendered, not just its visible frame.
pub trait Rasterizer: Send + Sync {
    fn rasterize(&self, root: &ViewNode, scale: f32, background: Rgba) -> Result<RasterImage, ExportError>;
}

/// Paints every element's background box in document order.
///
/// Gradients and text are not painted, which is exactly why the subtree is
/// neutralized first: after sanitization every visual is a solid box.
#[derive(Debug, Default, Clone, Copy)]
pub struct BoxRasterizer;

impl Rasterizer for BoxRasterizer {
    fn rasterize(&self, root: &ViewNode, scale: f32, background: Rgba) -> Result<RasterImage, ExportError> {
        let (width, height) = root.natural_size();
        let px_width = (width * scale).ceil().max(0.0) as u32;
        let px_height = (height * scale).ceil().max(0.0) as u32;

        if px_width > MAX_RASTER_DIMENSION || px_height > MAX_RASTER_DIMENSION {
            return Err(ExportError::RasterizationFailed(format!(
                "capture of {}x{} px exceeds the {} px limit",
                px_width, px_height, MAX_RASTER_DIMENSION
            )));
        }
        if px_width as u64 * px_height as u64 > MAX_RASTER_PIXELS {
            return Err(ExportError::RasterizationFailed(format!(
                "capture of {}x{} px exceeds the {} pixel area limit",
                px_width, px_height, MAX_RASTER_PIXELS
            )));
        }

        let base = background.solid();
        let mut pixels = RgbaImage::from_pixel(px_width, px_height, image::Rgba([base.r, base.g, base.b, 255]));
        if px_width == 0 || px_height == 0 {
            return Ok(RasterImage::new(pixels, scale));
        }

        let origin = root.frame;
        root.walk(&mut |node| {
            let Some(color) = node.style.background_color else {
                return;
            };
            let alpha = (color.a * node.style.opacity).clamp(0.0, 1.0);
            if alpha <= 0.0 {
                return;
            }
            let x0 = ((node.frame.x - origin.x) * scale).round().max(0.0) as u32;
            let y0 = ((node.frame.y - origin.y) * scale).round().max(0.0) as u32;
            let x1 = (((node.frame.right() - origin.x) * scale).round().max(0.0) as u32).min(px_width);
            let y1 = (((node.frame.bottom() - origin.y) * scale).round().max(0.0) as u32).min(px_height);
            let paint = Rgba { a: alpha, ..color };
            for y in y0..y1 {
                for x in x0..x1 {
                    let px = pixels.get_pixel_mut(x, y);
                    let [r, g, b, _] = px.0;
                    let out = paint.over(Rgba::opaque(r, g, b));
                    *px = image::Rgba([out.r, out.g, out.b, 255]);
                }
            }
        });

        info!("Rasterized capture at {}x: {}x{} px", scale, px_width, px_height);
        Ok(RasterImage::new(pixels, scale))
    }
}
