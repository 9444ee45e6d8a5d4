use crate::detect::result::RawDetection;
use crate::geometry::BoundingBox;

/// Airplane in the 80-class COCO indexing of YOLOv8 exports.
pub const DEFAULT_TARGET_CLASS: u32 = 4;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// A detection of the target class at or above the confidence threshold,
/// converted to an integer `(x, y, width, height)` box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QualifyingDetection {
    pub bbox: BoundingBox,
    pub class_id: u32,
    pub confidence: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionFilter {
    pub target_class: u32,
    /// `0.0` accepts every detection of the target class.
    pub confidence_threshold: f32,
}

impl Default for DetectionFilter {
    fn default() -> Self {
        Self {
            target_class: DEFAULT_TARGET_CLASS,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl DetectionFilter {
    pub fn new(target_class: u32, confidence_threshold: f32) -> Self {
        Self {
            target_class,
            confidence_threshold,
        }
    }

    pub fn accepts(&self, det: &RawDetection) -> bool {
        det.class_id == self.target_class && det.confidence >= self.confidence_threshold
    }

    pub fn apply(&self, detections: &[RawDetection]) -> Vec<QualifyingDetection> {
        filter_qualifying(detections, self.target_class, self.confidence_threshold)
    }
}

/// Keep qualifying detections in detector order. Never re-sorts.
pub fn filter_qualifying(
    detections: &[RawDetection],
    target_class: u32,
    confidence_threshold: f32,
) -> Vec<QualifyingDetection> {
    let filter = DetectionFilter::new(target_class, confidence_threshold);
    detections
        .iter()
        .filter(|det| {
            let keep = filter.accepts(det);
            if !keep {
                log::debug!(
                    "dropping detection class={} conf={:.3}",
                    det.class_id,
                    det.confidence
                );
            }
            keep
        })
        .map(|det| QualifyingDetection {
            bbox: det.bounding_box(),
            class_id: det.class_id,
            confidence: det.confidence,
        })
        .collect()
}
