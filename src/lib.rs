//! Detection-to-annotation reducer.
//!
//! Turns per-image object detections into a line-aligned annotation dataset:
//! for every input image, one ground-truth box line, one occlusion status line
//! and one out-of-view status line, plus an overlay image with the kept boxes
//! drawn.
//!
//! # Module Structure
//!
//! - `geometry`: box/frame classifiers (occlusion level, out-of-view)
//! - `detect`: detector backends and the qualifying-detection filter
//! - `annotation`: per-image reducer
//! - `output`: aligned stream writer, overlays, run manifest
//! - `ingest`: sorted input listing
//! - `pipeline`: dataset driver and fatal error model
//! - `config`, `ui`: ambient configuration and CLI reporting

pub mod annotation;
pub mod config;
pub mod detect;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod ui;

pub use annotation::{reduce, Annotator, ImageAnnotation};
pub use config::{AnnotateConfig, UnreadablePolicy};
pub use detect::{
    filter_qualifying, BackendRegistry, DetectionFilter, DetectorBackend, QualifyingDetection,
    RawDetection, ReplayBackend, StubBackend,
};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use frame::Frame;
pub use geometry::{
    classify_occlusion, is_out_of_view, BoundingBox, FrameSize, OcclusionLevel,
    OcclusionThresholds,
};
pub use output::{AnnotationWriter, RunManifest};
pub use pipeline::{ErrorKind, Pipeline, PipelineError, RunSummary, Stage};
