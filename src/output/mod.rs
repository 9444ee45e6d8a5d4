//! Aligned output: three line-per-image text streams, one overlay image per
//! input, and a manifest describing the run.
//!
//! Line `i` of every stream describes the same image. The writer commits the
//! three lines for an image together or not at all, so a failed run leaves
//! each stream holding the same prefix of images.

pub mod manifest;
pub mod overlay;
mod writer;

pub use manifest::{RunManifest, SkippedImage, StreamDigest, MANIFEST_FILE};
pub use overlay::{draw_rect, render_overlay, BOX_COLOR, BOX_THICKNESS};
pub use writer::{
    AnnotationWriter, GROUND_TRUTH_FILE, OCCLUSION_FILE, OUT_OF_VIEW_FILE, OVERLAY_DIR,
};
