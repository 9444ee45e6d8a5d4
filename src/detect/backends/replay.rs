//! Replay of recorded detector output.
//!
//! Detections produced elsewhere (another runtime, a previous run, a test
//! fixture) are loaded from a JSON object keyed by image file name:
//!
//! ```json
//! { "a.jpg": [ { "bbox": [10.0, 20.0, 110.0, 90.0], "class_id": 4, "confidence": 0.91 } ],
//!   "b.jpg": [] }
//! ```
//!
//! An image with no entry is an error, not an empty result: a missing record
//! means the detector never ran on it.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::Path;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetection;
use crate::frame::Frame;

pub struct ReplayBackend {
    recorded: HashMap<String, Vec<RawDetection>>,
}

impl ReplayBackend {
    pub fn new(recorded: HashMap<String, Vec<RawDetection>>) -> Self {
        Self { recorded }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read detections file {}", path.display()))?;
        let recorded = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid detections file {}: {}", path.display(), e))?;
        Ok(Self::new(recorded))
    }

    pub fn len(&self) -> usize {
        self.recorded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recorded.is_empty()
    }
}

impl DetectorBackend for ReplayBackend {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        self.recorded
            .get(frame.name())
            .cloned()
            .ok_or_else(|| anyhow!("no recorded detections for {}", frame.name()))
    }
}
