//! annotate - turn detector output for a directory of images into aligned
//! ground-truth, occlusion and out-of-view annotation files

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use detect_annotate::ui::Ui;
use detect_annotate::{AnnotateConfig, BackendRegistry, Pipeline, UnreadablePolicy};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (.toml, otherwise JSON).
    #[arg(long, env = "ANNOTATE_CONFIG")]
    config: Option<PathBuf>,
    /// Directory of .jpg/.jpeg/.png inputs.
    #[arg(long)]
    source: Option<PathBuf>,
    /// Output directory for the annotation files and overlays.
    #[arg(long)]
    output: Option<PathBuf>,
    /// ONNX model for the tract backend.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Detector backend (stub|replay|tract).
    #[arg(long)]
    backend: Option<String>,
    /// Recorded detections for the replay backend.
    #[arg(long)]
    detections: Option<PathBuf>,
    /// Class id to annotate.
    #[arg(long)]
    target_class: Option<u32>,
    /// Minimum confidence for a detection to qualify (0 keeps all).
    #[arg(long)]
    confidence: Option<f32>,
    /// What to do with images that fail to decode (skip|abort).
    #[arg(long, value_name = "POLICY")]
    on_unreadable: Option<UnreadablePolicy>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = Ui::from_args(Some(args.ui.as_str()), std::io::stderr().is_terminal());

    let cfg = {
        let _stage = ui.stage("load config");
        let mut cfg = AnnotateConfig::load(args.config.as_deref())?;
        if let Some(source) = args.source {
            cfg.source_dir = source;
        }
        if let Some(output) = args.output {
            cfg.output_dir = output;
        }
        if let Some(model) = args.model {
            cfg.detector.model_path = model;
        }
        if let Some(detections) = args.detections {
            cfg.detector.detections_path = Some(detections);
            if args.backend.is_none() {
                cfg.detector.backend = "replay".to_string();
            }
        }
        if let Some(backend) = args.backend {
            cfg.detector.backend = backend;
        }
        if let Some(class) = args.target_class {
            cfg.filter.target_class = class;
        }
        if let Some(conf) = args.confidence {
            cfg.filter.confidence_threshold = conf;
        }
        if let Some(policy) = args.on_unreadable {
            cfg.on_unreadable = policy;
        }
        cfg.validate()?;
        cfg
    };

    let mut registry = {
        let _stage = ui.stage(&format!("load {} detector", cfg.detector.backend));
        BackendRegistry::from_config(&cfg)?
    };
    log::debug!("registered backends: {}", registry.list().join(", "));
    let detector = registry.default_backend_mut()?;

    let pipeline = Pipeline::new(&cfg);
    let total = pipeline.inputs()?.len();
    if total == 0 {
        log::warn!("no images found in {}", cfg.source_dir.display());
    }

    let summary = {
        let mut stage = ui.stage("annotate images");
        let mut batch = ui.batch(total as u64);
        let result = pipeline.run_with(detector, |outcome| batch.record(&outcome));
        stage.note(batch.finish());
        result
    }
    .context("annotation run failed")?;

    println!(
        "annotated {} images ({} skipped, {} boxes) into {}",
        summary.processed.len(),
        summary.skipped.len(),
        summary.boxes_written,
        summary.output_dir.display()
    );
    println!("overlays: {}", summary.overlay_dir.display());
    println!("manifest: {}", summary.manifest_path.display());
    Ok(())
}
