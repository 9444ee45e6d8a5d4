//! Per-image reduction of qualifying detections into one annotation record.
//!
//! Occlusion is last-write-wins: every qualifying detection that is partially
//! or fully occluded overwrites the image status, so the final value belongs
//! to the last such detection in filter order, not the most severe one.
//! Out-of-view is sticky: once any detection crosses a frame edge the image
//! stays out of view.
//!
//! "Nothing observed" is tracked as `None` and shares wire code `0` with
//! fully occluded only when the status is serialized.

use crate::detect::{DetectionFilter, QualifyingDetection, RawDetection};
use crate::geometry::{
    classify_occlusion_with, is_out_of_view, BoundingBox, FrameSize, OcclusionLevel,
    OcclusionThresholds,
};

/// Wire code when no qualifying detection reported any occlusion.
pub const NO_OCCLUSION_CODE: u8 = 0;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageAnnotation {
    /// Kept boxes in filter order.
    pub ground_truth_boxes: Vec<BoundingBox>,
    /// Level of the last occluded qualifying detection, if any.
    pub occlusion: Option<OcclusionLevel>,
    pub out_of_view: bool,
}

impl ImageAnnotation {
    pub fn occlusion_status(&self) -> u8 {
        self.occlusion
            .and_then(OcclusionLevel::code)
            .unwrap_or(NO_OCCLUSION_CODE)
    }

    pub fn out_of_view_status(&self) -> u8 {
        u8::from(self.out_of_view)
    }

    /// `x,y,w,h` records separated by single spaces; empty when no boxes.
    pub fn ground_truth_line(&self) -> String {
        self.ground_truth_boxes
            .iter()
            .map(BoundingBox::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub fn reduce(detections: &[QualifyingDetection], frame: FrameSize) -> ImageAnnotation {
    reduce_with(detections, frame, OcclusionThresholds::default())
}

pub fn reduce_with(
    detections: &[QualifyingDetection],
    frame: FrameSize,
    thresholds: OcclusionThresholds,
) -> ImageAnnotation {
    let mut annotation = ImageAnnotation::default();
    for det in detections {
        annotation.ground_truth_boxes.push(det.bbox);

        let level = classify_occlusion_with(&det.bbox, frame, thresholds);
        if level != OcclusionLevel::NotOccluded {
            annotation.occlusion = Some(level);
        }

        if is_out_of_view(&det.bbox, frame) {
            annotation.out_of_view = true;
        }
    }
    annotation
}

/// Filter plus reducer, configured once per run.
#[derive(Clone, Copy, Debug, Default)]
pub struct Annotator {
    pub filter: DetectionFilter,
    pub thresholds: OcclusionThresholds,
}

impl Annotator {
    pub fn new(filter: DetectionFilter, thresholds: OcclusionThresholds) -> Self {
        Self { filter, thresholds }
    }

    pub fn annotate(&self, detections: &[RawDetection], frame: FrameSize) -> ImageAnnotation {
        let qualifying = self.filter.apply(detections);
        reduce_with(&qualifying, frame, self.thresholds)
    }
}
