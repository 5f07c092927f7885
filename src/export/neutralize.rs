//! Visual-effect neutralization ahead of rasterization.
//!
//! Translucency, blur/filter compositing, opacity layering and gradient text
//! rasterize inconsistently, so the capture works on a sanitized *clone* of
//! the export root. The only thing touched on the live document is a marker
//! class on the root plus one injected stylesheet, both owned by
//! [`NeutralizeGuard`] and removed when it drops.

use tracing::{debug, info};

use super::tree::{BackgroundClip, Rgba, StyleElement, ViewDocument, ViewNode};
use crate::error::ExportError;

/// Id of the temporary stylesheet injected for the duration of a capture.
pub const NEUTRALIZE_STYLE_ID: &str = "aura-export-neutralize";
/// Marker class added to the export root for the duration of a capture.
pub const CAPTURE_MARKER_CLASS: &str = "aura-exporting";

const NEUTRALIZE_CSS: &str = "\
.aura-exporting, .aura-exporting * {
  opacity: 1 !important;
  filter: none !important;
  backdrop-filter: none !important;
  -webkit-backdrop-filter: none !important;
  animation: none !important;
  transition: none !important;
}";

/// Scoped ownership of the live-document side effects of one capture.
///
/// Acquiring it checks the export root exists before anything is mutated.
/// Dropping it removes the injected stylesheet and the marker class, on both
/// the success path and every error path.
pub struct NeutralizeGuard<'a> {
    document: &'a mut ViewDocument,
    root_id: String,
}

impl<'a> NeutralizeGuard<'a> {
    pub fn acquire(document: &'a mut ViewDocument, root_id: &str) -> Result<Self, ExportError> {
        if document.find(root_id).is_none() {
            return Err(ExportError::RootNotFound(root_id.to_string()));
        }
        if document.style_element(NEUTRALIZE_STYLE_ID).is_some() {
            return Err(ExportError::StyleConflict(NEUTRALIZE_STYLE_ID.to_string()));
        }

        document.head.push(StyleElement {
            id: NEUTRALIZE_STYLE_ID.to_string(),
            css: NEUTRALIZE_CSS.to_string(),
        });
        if let Some(root) = document.find_mut(root_id) {
            if !root.has_class(CAPTURE_MARKER_CLASS) {
                root.classes.push(CAPTURE_MARKER_CLASS.to_string());
            }
        }
        debug!("Injected neutralization style for '{}'", root_id);

        Ok(Self {
            document,
            root_id: root_id.to_string(),
        })
    }

    /// Clone the export root and neutralize the clone. The live tree is left
    /// as it was (apart from the guard's own marker).
    pub fn sanitized_clone(&self, brand: Rgba) -> Option<ViewNode> {
        let mut clone = self.document.find(&self.root_id)?.clone();
        let rewritten = sanitize_subtree(&mut clone, brand);
        info!(
            "Neutralized {} element(s) under '{}' for capture",
            rewritten, self.root_id
        );
        Some(clone)
    }
}

impl Drop for NeutralizeGuard<'_> {
    fn drop(&mut self) {
        self.document.head.retain(|s| s.id != NEUTRALIZE_STYLE_ID);
        if let Some(root) = self.document.find_mut(&self.root_id) {
            root.classes.retain(|c| c != CAPTURE_MARKER_CLASS);
        }
        debug!("Removed neutralization style for '{}'", self.root_id);
    }
}

/// Rewrite every element of `root` so it rasterizes deterministically.
/// Returns the number of elements whose style changed.
pub fn sanitize_subtree(root: &mut ViewNode, brand: Rgba) -> usize {
    let mut rewritten = 0;
    root.walk_mut(&mut |node| {
        if sanitize_node(node, brand) {
            rewritten += 1;
        }
    });
    rewritten
}

fn sanitize_node(node: &mut ViewNode, brand: Rgba) -> bool {
    let before = node.style.clone();
    let style = &mut node.style;

    style.opacity = 1.0;
    style.filter = None;
    style.backdrop_filter = None;

    let gradient = style
        .background_image
        .as_ref()
        .is_some_and(|image| image.is_gradient());
    if gradient && style.background_clip == BackgroundClip::Text {
        // Gradient-clipped text becomes plain text in the brand color
        style.background_clip = BackgroundClip::BorderBox;
        style.background_image = None;
        style.color = brand;
    } else if gradient {
        style.background_image = None;
        style.background_color = Some(brand);
    }

    if let Some(color) = style.background_color {
        if color.is_translucent() {
            style.background_color = Some(color.solid());
        }
    }
    if style.color.is_translucent() {
        style.color = style.color.solid();
    }

    *style != before
}
