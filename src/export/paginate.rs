//! Page geometry for slicing one tall capture across fixed-size pages.
//!
//! The capture is scaled to the printable width and drawn once per page,
//! shifted up by one page body per page and clipped to the body, so page
//! `k` shows the band `[(k-1)·P, k·P)` of the scaled image.

use serde::Serialize;

/// Fixed page format, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageFormat {
    pub width_mm: f64,
    pub height_mm: f64,
    pub margin_mm: f64,
}

impl PageFormat {
    /// Portrait A4 with a 10 mm margin on every side.
    pub const A4: PageFormat = PageFormat {
        width_mm: 210.0,
        height_mm: 297.0,
        margin_mm: 10.0,
    };

    pub fn body_width_mm(&self) -> f64 {
        self.width_mm - 2.0 * self.margin_mm
    }

    pub fn body_height_mm(&self) -> f64 {
        self.height_mm - 2.0 * self.margin_mm
    }
}

/// Where the full image sits on one page, and which band of it shows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PagePlacement {
    /// 1-based page number.
    pub page: usize,
    /// Vertical offset of the image's top edge from the page's top edge.
    pub image_offset_mm: f64,
    pub band_start_mm: f64,
    pub band_end_mm: f64,
}

impl PagePlacement {
    pub fn band_height_mm(&self) -> f64 {
        self.band_end_mm - self.band_start_mm
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageLayout {
    pub format: PageFormat,
    pub print_width_mm: f64,
    pub print_height_mm: f64,
    pub pages: Vec<PagePlacement>,
}

impl PageLayout {
    /// Lay out a `px_width` x `px_height` capture.
    ///
    /// Page 1 places the image at `margin`; page `k` at
    /// `margin - (k-1)·P`. Pages are added while the unrendered height is
    /// more than half a device pixel, so the count is `ceil(H / P)` except
    /// when the last band would hold less than half a pixel of image; that
    /// sliver is dropped and the count is one lower.
    pub fn compute(format: PageFormat, px_width: u32, px_height: u32) -> Self {
        let print_width_mm = format.body_width_mm();
        if px_width == 0 || px_height == 0 {
            return Self {
                format,
                print_width_mm,
                print_height_mm: 0.0,
                pages: Vec::new(),
            };
        }

        let mm_per_px = print_width_mm / px_width as f64;
        let print_height_mm = px_height as f64 * mm_per_px;
        let body = format.body_height_mm();
        let tolerance = mm_per_px / 2.0;

        let mut pages = Vec::new();
        let mut remaining = print_height_mm;
        let mut page = 1;
        loop {
            let band_start_mm = (page - 1) as f64 * body;
            pages.push(PagePlacement {
                page,
                image_offset_mm: format.margin_mm - band_start_mm,
                band_start_mm,
                band_end_mm: (band_start_mm + body).min(print_height_mm),
            });
            remaining -= body;
            if remaining <= tolerance {
                break;
            }
            page += 1;
        }

        Self {
            format,
            print_width_mm,
            print_height_mm,
            pages,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}
