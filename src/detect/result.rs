use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;

/// One detector output, in source-image pixel coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    /// Corners `[x1, y1, x2, y2]`.
    pub bbox: [f32; 4],
    pub class_id: u32,
    pub confidence: f32,
}

impl RawDetection {
    pub fn new(bbox: [f32; 4], class_id: u32, confidence: f32) -> Self {
        Self {
            bbox,
            class_id,
            confidence,
        }
    }

    /// Integer `(x, y, width, height)` box.
    pub fn bounding_box(&self) -> BoundingBox {
        let [x1, y1, x2, y2] = self.bbox;
        BoundingBox::from_corners(x1, y1, x2, y2)
    }

    /// Reject output no real detector could have produced.
    pub fn validate(&self) -> Result<()> {
        if self.bbox.iter().any(|v| !v.is_finite()) {
            return Err(anyhow!("non-finite box coordinates {:?}", self.bbox));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(anyhow!(
                "confidence {} outside [0, 1] for class {}",
                self.confidence,
                self.class_id
            ));
        }
        Ok(())
    }
}
