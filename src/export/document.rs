//! Paginated document (PDF) writer.
//!
//! The capture is embedded once as a JPEG image XObject. Every page draws
//! that same image at its `PagePlacement` offset, clipped to the page body,
//! so consecutive pages show consecutive, non-overlapping bands.

use std::io::{Cursor, Write};

use image::{DynamicImage, ImageFormat, RgbImage};
use tracing::info;

use super::paginate::PageLayout;
use crate::error::ExportError;

const PT_PER_MM: f64 = 72.0 / 25.4;

fn pt(mm: f64) -> f64 {
    mm * PT_PER_MM
}

/// Encode an RGB image to JPEG bytes.
fn encode_to_jpeg(img: RgbImage) -> Result<Vec<u8>, ExportError> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buffer, ImageFormat::Jpeg)
        .map_err(|e| ExportError::Encode(format!("Failed to encode capture to JPEG: {}", e)))?;
    Ok(buffer.into_inner())
}

/// Drawing operators for one page.
fn page_content(layout: &PageLayout, image_offset_mm: f64) -> String {
    let format = layout.format;
    let page_h = pt(format.height_mm);
    let margin = pt(format.margin_mm);
    let image_w = pt(layout.print_width_mm);
    let image_h = pt(layout.print_height_mm);
    // PDF space grows upward from the bottom-left corner
    let image_y = page_h - pt(image_offset_mm) - image_h;

    format!(
        "q\n{:.3} {:.3} {:.3} {:.3} re W n\n{:.3} 0 0 {:.3} {:.3} {:.3} cm\n/Im0 Do\nQ\n",
        margin,
        margin,
        pt(format.body_width_mm()),
        pt(format.body_height_mm()),
        image_w,
        image_h,
        margin,
        image_y,
    )
}

/// Build the complete PDF for `capture` laid out by `layout`.
pub fn render_pdf(capture: RgbImage, layout: &PageLayout, title: &str) -> Result<Vec<u8>, ExportError> {
    if layout.pages.is_empty() {
        return Err(ExportError::Encode("layout has no pages".to_string()));
    }
    let (px_w, px_h) = capture.dimensions();
    let jpeg = encode_to_jpeg(capture)?;

    let page_count = layout.pages.len();
    // 1 catalog, 2 page tree, 3 image, 4 info, then (page, content) pairs
    let first_page_obj = 5;
    let total_objects = 4 + 2 * page_count;

    let mut out: Vec<u8> = Vec::with_capacity(jpeg.len() + 4096);
    let mut offsets = vec![0usize; total_objects + 1];

    out.write_all(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n")?;

    offsets[1] = out.len();
    write!(out, "1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n")?;

    let kids: Vec<String> = (0..page_count)
        .map(|i| format!("{} 0 R", first_page_obj + 2 * i))
        .collect();
    offsets[2] = out.len();
    write!(
        out,
        "2 0 obj\n<< /Type /Pages /Kids [{}] /Count {} >>\nendobj\n",
        kids.join(" "),
        page_count
    )?;

    offsets[3] = out.len();
    write!(
        out,
        "3 0 obj\n<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceRGB \
         /BitsPerComponent 8 /Filter /DCTDecode /Length {} >>\nstream\n",
        px_w,
        px_h,
        jpeg.len()
    )?;
    out.write_all(&jpeg)?;
    write!(out, "\nendstream\nendobj\n")?;

    offsets[4] = out.len();
    write!(
        out,
        "4 0 obj\n<< /Title ({}) /Producer (aura-dashboard) >>\nendobj\n",
        escape_pdf_string(title)
    )?;

    for (i, placement) in layout.pages.iter().enumerate() {
        let page_obj = first_page_obj + 2 * i;
        let content_obj = page_obj + 1;
        let content = page_content(layout, placement.image_offset_mm);

        offsets[page_obj] = out.len();
        write!(
            out,
            "{} 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.3} {:.3}] \
             /Resources << /XObject << /Im0 3 0 R >> >> /Contents {} 0 R >>\nendobj\n",
            page_obj,
            pt(layout.format.width_mm),
            pt(layout.format.height_mm),
            content_obj
        )?;

        offsets[content_obj] = out.len();
        write!(
            out,
            "{} 0 obj\n<< /Length {} >>\nstream\n{}endstream\nendobj\n",
            content_obj,
            content.len(),
            content
        )?;
    }

    let xref_at = out.len();
    write!(out, "xref\n0 {}\n0000000000 65535 f \n", total_objects + 1)?;
    for offset in &offsets[1..] {
        write!(out, "{:010} 00000 n \n", offset)?;
    }
    write!(
        out,
        "trailer\n<< /Size {} /Root 1 0 R /Info 4 0 R >>\nstartxref\n{}\n%%EOF\n",
        total_objects + 1,
        xref_at
    )?;

    info!(
        "Rendered {}-page document ({} bytes, capture {}x{} px)",
        page_count,
        out.len(),
        px_w,
        px_h
    );
    Ok(out)
}

fn escape_pdf_string(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control())
        .flat_map(|c| match c {
            '(' | ')' | '\\' => vec!['\\', c],
            _ => vec![c],
        })
        .collect()
}
