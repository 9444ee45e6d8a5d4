//! Dataset driver.
//!
//! Images are processed one at a time in sorted order. For each image the
//! overlay is written first and the three stream lines last, so an image that
//! fails at any stage contributes nothing to the streams and they keep a
//! consistent prefix.
//!
//! Failure policy:
//! - unreadable input: skip with a warning, or abort, per [`UnreadablePolicy`]
//! - detector error or malformed detector output: abort
//! - missing source directory: abort before the outputs are touched
//! - any output target unwritable: abort (before the first image when the
//!   targets cannot be opened)

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::annotation::{Annotator, ImageAnnotation};
use crate::config::{AnnotateConfig, UnreadablePolicy};
use crate::detect::{run_detector, DetectionFilter, DetectorBackend};
use crate::frame::Frame;
use crate::ingest::list_images;
use crate::output::{AnnotationWriter, RunManifest, SkippedImage, OVERLAY_DIR};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InputUnreadable,
    DetectorFailure,
    OutputUnwritable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    OpenOutputs,
    ListInputs,
    Decode,
    Detect,
    Overlay,
    WriteAnnotations,
    Finish,
}

impl Stage {
    fn as_str(self) -> &'static str {
        match self {
            Stage::OpenOutputs => "open outputs",
            Stage::ListInputs => "list inputs",
            Stage::Decode => "decode",
            Stage::Detect => "detect",
            Stage::Overlay => "overlay",
            Stage::WriteAnnotations => "write annotations",
            Stage::Finish => "finish",
        }
    }
}

/// Fatal pipeline error. Travels inside `anyhow::Error`; recover it with
/// `downcast_ref::<PipelineError>()`.
#[derive(Debug)]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub stage: Stage,
    pub image: Option<String>,
    pub message: String,
}

impl PipelineError {
    fn new(kind: ErrorKind, stage: Stage, image: Option<&str>, cause: anyhow::Error) -> Self {
        Self {
            kind,
            stage,
            image: image.map(str::to_string),
            message: format!("{:#}", cause),
        }
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} during {}", self.kind, self.stage.as_str())?;
        if let Some(image) = &self.image {
            write!(f, " of {}", image)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for PipelineError {}

trait StageContext<T> {
    fn at(self, kind: ErrorKind, stage: Stage, image: Option<&str>) -> Result<T>;
}

impl<T> StageContext<T> for Result<T> {
    fn at(self, kind: ErrorKind, stage: Stage, image: Option<&str>) -> Result<T> {
        self.map_err(|e| PipelineError::new(kind, stage, image, e).into())
    }
}

/// Outcome of one input image, reported to the progress callback.
#[derive(Debug)]
pub enum ImageOutcome<'a> {
    Annotated {
        name: &'a str,
        annotation: &'a ImageAnnotation,
    },
    Skipped {
        name: &'a str,
        reason: &'a str,
    },
}

#[derive(Clone, Debug)]
pub struct RunSummary {
    pub output_dir: PathBuf,
    pub overlay_dir: PathBuf,
    pub processed: Vec<String>,
    pub skipped: Vec<SkippedImage>,
    pub boxes_written: usize,
    pub manifest_path: PathBuf,
}

pub struct Pipeline {
    source_dir: PathBuf,
    output_dir: PathBuf,
    on_unreadable: UnreadablePolicy,
    annotator: Annotator,
}

impl Pipeline {
    pub fn new(config: &AnnotateConfig) -> Self {
        Self {
            source_dir: config.source_dir.clone(),
            output_dir: config.output_dir.clone(),
            on_unreadable: config.on_unreadable,
            annotator: Annotator::new(
                DetectionFilter::new(
                    config.filter.target_class,
                    config.filter.confidence_threshold,
                ),
                config.occlusion,
            ),
        }
    }

    /// Inputs in processing order.
    pub fn inputs(&self) -> Result<Vec<PathBuf>> {
        list_images(&self.source_dir).at(ErrorKind::InputUnreadable, Stage::ListInputs, None)
    }

    pub fn run(&self, detector: &mut dyn DetectorBackend) -> Result<RunSummary> {
        self.run_with(detector, |_| {})
    }

    /// Run the whole batch, calling `on_image` after each input is written or
    /// skipped.
    pub fn run_with<F>(
        &self,
        detector: &mut dyn DetectorBackend,
        mut on_image: F,
    ) -> Result<RunSummary>
    where
        F: FnMut(ImageOutcome<'_>),
    {
        let inputs = self.inputs()?;
        let mut writer = AnnotationWriter::create(&self.output_dir).at(
            ErrorKind::OutputUnwritable,
            Stage::OpenOutputs,
            None,
        )?;
        log::info!(
            "annotating {} images from {} with {} backend",
            inputs.len(),
            self.source_dir.display(),
            detector.name()
        );
        detector
            .warm_up()
            .at(ErrorKind::DetectorFailure, Stage::Detect, None)?;

        let mut processed = Vec::with_capacity(inputs.len());
        let mut skipped = Vec::new();
        let mut boxes_written = 0;

        for path in &inputs {
            let name = display_name(path);
            let frame = match Frame::open(path) {
                Ok(frame) => frame,
                Err(e) => match self.on_unreadable {
                    UnreadablePolicy::Skip => {
                        let reason = format!("{:#}", e);
                        log::warn!("skipping unreadable image {}: {}", name, reason);
                        on_image(ImageOutcome::Skipped {
                            name: &name,
                            reason: &reason,
                        });
                        skipped.push(SkippedImage { name, reason });
                        continue;
                    }
                    UnreadablePolicy::Abort => {
                        return Err(PipelineError::new(
                            ErrorKind::InputUnreadable,
                            Stage::Decode,
                            Some(&name),
                            e,
                        )
                        .into());
                    }
                },
            };

            let annotation = self.process(detector, &frame, &mut writer)?;
            boxes_written += annotation.ground_truth_boxes.len();
            log::info!(
                "processed {}: {} boxes, occlusion={}, out_of_view={}",
                name,
                annotation.ground_truth_boxes.len(),
                annotation.occlusion_status(),
                annotation.out_of_view_status()
            );
            on_image(ImageOutcome::Annotated {
                name: &name,
                annotation: &annotation,
            });
            processed.push(name);
        }

        let streams = writer
            .finish()
            .at(ErrorKind::OutputUnwritable, Stage::Finish, None)?;
        let manifest = RunManifest {
            source_dir: self.source_dir.display().to_string(),
            backend: detector.name().to_string(),
            images: processed.clone(),
            skipped: skipped.clone(),
            streams,
        };
        let manifest_path = manifest
            .write(&self.output_dir)
            .at(ErrorKind::OutputUnwritable, Stage::Finish, None)?;

        Ok(RunSummary {
            output_dir: self.output_dir.clone(),
            overlay_dir: self.output_dir.join(OVERLAY_DIR),
            processed,
            skipped,
            boxes_written,
            manifest_path,
        })
    }

    fn process(
        &self,
        detector: &mut dyn DetectorBackend,
        frame: &Frame,
        writer: &mut AnnotationWriter,
    ) -> Result<ImageAnnotation> {
        let image = Some(frame.name());
        let detections = run_detector(detector, frame).at(
            ErrorKind::DetectorFailure,
            Stage::Detect,
            image,
        )?;
        let annotation = self.annotator.annotate(&detections, frame.size());
        let overlay = writer
            .write_overlay(frame, &annotation)
            .at(ErrorKind::OutputUnwritable, Stage::Overlay, image)?;
        if let Err(e) = writer.append(&annotation) {
            // The streams were rolled back; drop the overlay too.
            if let Err(rm) = std::fs::remove_file(&overlay) {
                log::warn!("failed to remove {}: {}", overlay.display(), rm);
            }
            return Err(PipelineError::new(
                ErrorKind::OutputUnwritable,
                Stage::WriteAnnotations,
                image,
                e,
            )
            .into());
        }
        Ok(annotation)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
