use anyhow::{anyhow, Result};

use crate::detect::result::RawDetection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// A backend turns one decoded frame into zero or more raw detections in
/// source-pixel coordinates. The order it returns them in is the order the
/// annotations are written in, so a backend must be deterministic for a fixed
/// frame and model.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook, called once before the first frame.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Run a backend and validate everything it returns.
pub fn run_detector(backend: &mut dyn DetectorBackend, frame: &Frame) -> Result<Vec<RawDetection>> {
    let detections = backend.detect(frame)?;
    for (idx, det) in detections.iter().enumerate() {
        det.validate().map_err(|e| {
            anyhow!(
                "{} backend returned malformed detection #{} for {}: {}",
                backend.name(),
                idx,
                frame.name(),
                e
            )
        })?;
    }
    Ok(detections)
}
