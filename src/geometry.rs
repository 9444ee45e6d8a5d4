//! Box geometry relative to a frame.
//!
//! Both classifiers are pure: they look only at the box and the frame
//! dimensions, never at pixels.

use serde::{Deserialize, Serialize};

/// Default box/frame area ratio below which an object counts as fully occluded.
pub const DEFAULT_FULLY_OCCLUDED_RATIO: f64 = 0.01;
/// Default box/frame area ratio below which an object counts as partially occluded.
pub const DEFAULT_PARTIALLY_OCCLUDED_RATIO: f64 = 0.5;

/// Axis-aligned box in integer pixel coordinates, `(x, y)` is the top-left corner.
///
/// Coordinates may be negative or exceed the frame; that is how out-of-view
/// objects show up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from corner coordinates. Each corner is truncated toward zero
    /// before the extent is taken.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        let (x1, y1, x2, y2) = (x1 as i32, y1 as i32, x2 as i32, y2 as i32);
        Self {
            x: x1,
            y: y1,
            width: x2.saturating_sub(x1),
            height: y2.saturating_sub(y1),
        }
    }

    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

/// Frame dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// How much of an object is visible, judged from its box area alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OcclusionLevel {
    NotOccluded,
    PartiallyOccluded,
    FullyOccluded,
}

impl OcclusionLevel {
    /// Numeric code written to the occlusion stream.
    ///
    /// `NotOccluded` has no code of its own; it never overwrites the per-image
    /// status (see [`crate::annotation`]).
    pub fn code(self) -> Option<u8> {
        match self {
            OcclusionLevel::FullyOccluded => Some(0),
            OcclusionLevel::PartiallyOccluded => Some(1),
            OcclusionLevel::NotOccluded => None,
        }
    }
}

/// Area-ratio band edges. Each edge belongs to the band above it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OcclusionThresholds {
    pub fully: f64,
    pub partially: f64,
}

impl Default for OcclusionThresholds {
    fn default() -> Self {
        Self {
            fully: DEFAULT_FULLY_OCCLUDED_RATIO,
            partially: DEFAULT_PARTIALLY_OCCLUDED_RATIO,
        }
    }
}

pub fn classify_occlusion(bbox: &BoundingBox, frame: FrameSize) -> OcclusionLevel {
    classify_occlusion_with(bbox, frame, OcclusionThresholds::default())
}

pub fn classify_occlusion_with(
    bbox: &BoundingBox,
    frame: FrameSize,
    thresholds: OcclusionThresholds,
) -> OcclusionLevel {
    let ratio = bbox.area() as f64 / frame.area() as f64;
    if ratio < thresholds.fully {
        OcclusionLevel::FullyOccluded
    } else if ratio < thresholds.partially {
        OcclusionLevel::PartiallyOccluded
    } else {
        // NaN (zero-area frame) also lands here.
        OcclusionLevel::NotOccluded
    }
}

/// True when the box crosses any frame edge. Touching an edge is in view.
pub fn is_out_of_view(bbox: &BoundingBox, frame: FrameSize) -> bool {
    bbox.x < 0
        || bbox.y < 0
        || bbox.right() > frame.width as i64
        || bbox.bottom() > frame.height as i64
}
