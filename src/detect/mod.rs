//! Detector collaborator and detection filtering.
//!
//! The detector itself is opaque: anything implementing [`DetectorBackend`]
//! can feed the annotator. Everything a backend returns passes through
//! [`run_detector`] so malformed output is rejected before it reaches the
//! reducer.

mod backend;
mod backends;
mod filter;
mod registry;
mod result;

pub use backend::{run_detector, DetectorBackend};
pub use backends::{ReplayBackend, StubBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use filter::{
    filter_qualifying, DetectionFilter, QualifyingDetection, DEFAULT_CONFIDENCE_THRESHOLD,
    DEFAULT_TARGET_CLASS,
};
pub use registry::BackendRegistry;
pub use result::RawDetection;
