use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::detect::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_TARGET_CLASS};
use crate::geometry::{
    OcclusionThresholds, DEFAULT_FULLY_OCCLUDED_RATIO, DEFAULT_PARTIALLY_OCCLUDED_RATIO,
};

const DEFAULT_SOURCE_DIR: &str = "images";
const DEFAULT_OUTPUT_DIR: &str = "result";
const DEFAULT_MODEL_PATH: &str = "yolov8n.onnx";
const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_INPUT_SIZE: u32 = 640;

#[derive(Debug, Deserialize, Default)]
struct AnnotateConfigFile {
    source_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    on_unreadable: Option<String>,
    detector: Option<DetectorConfigFile>,
    filter: Option<FilterConfigFile>,
    occlusion: Option<OcclusionConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    detections_path: Option<PathBuf>,
    input_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct FilterConfigFile {
    target_class: Option<u32>,
    confidence_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct OcclusionConfigFile {
    fully: Option<f64>,
    partially: Option<f64>,
}

/// What to do with an input that fails to decode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnreadablePolicy {
    /// Log a warning and leave the image out of every stream.
    #[default]
    Skip,
    /// Stop the run.
    Abort,
}

impl FromStr for UnreadablePolicy {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(UnreadablePolicy::Skip),
            "abort" => Ok(UnreadablePolicy::Abort),
            other => Err(format!(
                "unreadable-input policy must be 'skip' or 'abort', got '{}'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnnotateConfig {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub on_unreadable: UnreadablePolicy,
    pub detector: DetectorSettings,
    pub filter: FilterSettings,
    pub occlusion: OcclusionThresholds,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// Registered backend name: `stub`, `replay` or `tract`.
    pub backend: String,
    pub model_path: PathBuf,
    /// Recorded detections for the replay backend.
    pub detections_path: Option<PathBuf>,
    /// Square model input side in pixels.
    pub input_size: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct FilterSettings {
    pub target_class: u32,
    pub confidence_threshold: f32,
}

impl Default for AnnotateConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from(DEFAULT_SOURCE_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            on_unreadable: UnreadablePolicy::default(),
            detector: DetectorSettings {
                backend: DEFAULT_BACKEND.to_string(),
                model_path: PathBuf::from(DEFAULT_MODEL_PATH),
                detections_path: None,
                input_size: DEFAULT_INPUT_SIZE,
            },
            filter: FilterSettings {
                target_class: DEFAULT_TARGET_CLASS,
                confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            },
            occlusion: OcclusionThresholds {
                fully: DEFAULT_FULLY_OCCLUDED_RATIO,
                partially: DEFAULT_PARTIALLY_OCCLUDED_RATIO,
            },
        }
    }
}

impl AnnotateConfig {
    /// Defaults, then the config file (`path`, else `ANNOTATE_CONFIG`), then
    /// `ANNOTATE_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("ANNOTATE_CONFIG")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        let file_cfg = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => read_config_file(&path)?,
            None => AnnotateConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AnnotateConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let on_unreadable = match file.on_unreadable.as_deref() {
            Some(policy) => policy.parse().map_err(|e: String| anyhow!(e))?,
            None => defaults.on_unreadable,
        };
        let detector = file.detector.unwrap_or_default();
        let filter = file.filter.unwrap_or_default();
        let occlusion = file.occlusion.unwrap_or_default();
        Ok(Self {
            source_dir: file.source_dir.unwrap_or(defaults.source_dir),
            output_dir: file.output_dir.unwrap_or(defaults.output_dir),
            on_unreadable,
            detector: DetectorSettings {
                backend: detector.backend.unwrap_or(defaults.detector.backend),
                model_path: detector.model_path.unwrap_or(defaults.detector.model_path),
                detections_path: detector.detections_path,
                input_size: detector.input_size.unwrap_or(defaults.detector.input_size),
            },
            filter: FilterSettings {
                target_class: filter.target_class.unwrap_or(defaults.filter.target_class),
                confidence_threshold: filter
                    .confidence_threshold
                    .unwrap_or(defaults.filter.confidence_threshold),
            },
            occlusion: OcclusionThresholds {
                fully: occlusion.fully.unwrap_or(defaults.occlusion.fully),
                partially: occlusion.partially.unwrap_or(defaults.occlusion.partially),
            },
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(dir) = non_empty_env("ANNOTATE_SOURCE_DIR") {
            self.source_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty_env("ANNOTATE_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(path) = non_empty_env("ANNOTATE_MODEL_PATH") {
            self.detector.model_path = PathBuf::from(path);
        }
        if let Some(backend) = non_empty_env("ANNOTATE_BACKEND") {
            self.detector.backend = backend;
        }
        if let Some(class) = non_empty_env("ANNOTATE_TARGET_CLASS") {
            self.filter.target_class = class
                .parse()
                .map_err(|_| anyhow!("ANNOTATE_TARGET_CLASS must be a non-negative integer"))?;
        }
        if let Some(conf) = non_empty_env("ANNOTATE_CONFIDENCE") {
            self.filter.confidence_threshold = conf
                .parse()
                .map_err(|_| anyhow!("ANNOTATE_CONFIDENCE must be a number in [0, 1]"))?;
        }
        if let Some(policy) = non_empty_env("ANNOTATE_ON_UNREADABLE") {
            self.on_unreadable = policy.parse().map_err(|e: String| anyhow!(e))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let conf = self.filter.confidence_threshold;
        if !(0.0..=1.0).contains(&conf) {
            return Err(anyhow!("confidence threshold must be in [0, 1], got {}", conf));
        }
        let OcclusionThresholds { fully, partially } = self.occlusion;
        if !(0.0 <= fully && fully < partially && partially <= 1.0) {
            return Err(anyhow!(
                "occlusion ratios must satisfy 0 <= fully < partially <= 1 (got {} / {})",
                fully,
                partially
            ));
        }
        if self.source_dir.as_os_str().is_empty() {
            return Err(anyhow!("source directory must not be empty"));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(anyhow!("output directory must not be empty"));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("model input size must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<AnnotateConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
