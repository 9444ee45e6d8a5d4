#![cfg(feature = "backend-tract")]

use std::cmp::Ordering;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetection;
use crate::frame::Frame;

const LETTERBOX_FILL: f32 = 114.0 / 255.0;
const DEFAULT_IOU_THRESHOLD: f32 = 0.7;
const MAX_DETECTIONS: usize = 300;

/// Tract-based backend for YOLOv8-style ONNX exports.
///
/// Expects a `[1, 3, S, S]` input and a `[1, 4 + C, N]` output (center x,
/// center y, width, height, then one score per class). Boxes are mapped back
/// to source pixels and clipped to the frame.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if input_size == 0 {
            return Err(anyhow!("model input size must be > 0"));
        }
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            confidence_threshold: 0.25,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        })
    }

    /// Drop candidates below this score before NMS.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<(Tensor, Letterbox)> {
        let side = self.input_size;
        let scale =
            (side as f32 / frame.width() as f32).min(side as f32 / frame.height() as f32);
        let new_w = ((frame.width() as f32 * scale).round() as u32).clamp(1, side);
        let new_h = ((frame.height() as f32 * scale).round() as u32).clamp(1, side);
        let resized = image::imageops::resize(frame.image(), new_w, new_h, FilterType::Triangle);

        let offset_x = (side - new_w) / 2;
        let offset_y = (side - new_h) / 2;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, side as usize, side as usize),
            |(_, channel, y, x)| {
                let (x, y) = (x as u32, y as u32);
                if x < offset_x || y < offset_y || x >= offset_x + new_w || y >= offset_y + new_h {
                    return LETTERBOX_FILL;
                }
                resized.get_pixel(x - offset_x, y - offset_y)[channel] as f32 / 255.0
            },
        );

        Ok((
            input.into_tensor(),
            Letterbox {
                scale,
                pad_x: offset_x as f32,
                pad_y: offset_y as f32,
            },
        ))
    }

    fn decode(
        &self,
        outputs: TVec<TValue>,
        letterbox: &Letterbox,
        frame: &Frame,
    ) -> Result<Vec<RawDetection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output was not [batch, features, anchors]")?;

        // Anchors outnumber features in every YOLOv8 export.
        let (_, d1, d2) = view.dim();
        let transposed = d1 > d2;
        let (features, anchors) = if transposed { (d2, d1) } else { (d1, d2) };
        if features < 5 {
            return Err(anyhow!(
                "model output has {} features, expected 4 + classes",
                features
            ));
        }
        let at = |feature: usize, anchor: usize| {
            if transposed {
                view[[0, anchor, feature]]
            } else {
                view[[0, feature, anchor]]
            }
        };

        let max_x = frame.width() as f32;
        let max_y = frame.height() as f32;
        let mut candidates = Vec::new();
        for anchor in 0..anchors {
            let (class_id, score) = (4..features)
                .map(|f| (f - 4, at(f, anchor)))
                .fold((0, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            if !score.is_finite() || score < self.confidence_threshold {
                continue;
            }
            let (cx, cy, w, h) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
            let unletter_x = |v: f32| ((v - letterbox.pad_x) / letterbox.scale).clamp(0.0, max_x);
            let unletter_y = |v: f32| ((v - letterbox.pad_y) / letterbox.scale).clamp(0.0, max_y);
            candidates.push(RawDetection::new(
                [
                    unletter_x(cx - w / 2.0),
                    unletter_y(cy - h / 2.0),
                    unletter_x(cx + w / 2.0),
                    unletter_y(cy + h / 2.0),
                ],
                class_id as u32,
                score.min(1.0),
            ));
        }

        Ok(non_max_suppression(candidates, self.iou_threshold, MAX_DETECTIONS))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        let (input, letterbox) = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, &letterbox, frame)
    }
}

/// Per-class greedy NMS. Output is ordered by descending confidence, ties
/// keep anchor order.
fn non_max_suppression(
    mut candidates: Vec<RawDetection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });
    let mut kept: Vec<RawDetection> = Vec::new();
    for cand in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == cand.class_id && iou(&k.bbox, &cand.bbox) > iou_threshold);
        if !suppressed {
            kept.push(cand);
        }
    }
    kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = ix * iy;
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}
