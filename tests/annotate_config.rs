use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use detect_annotate::config::{AnnotateConfig, UnreadablePolicy};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "ANNOTATE_CONFIG",
        "ANNOTATE_SOURCE_DIR",
        "ANNOTATE_OUTPUT_DIR",
        "ANNOTATE_MODEL_PATH",
        "ANNOTATE_BACKEND",
        "ANNOTATE_TARGET_CLASS",
        "ANNOTATE_CONFIDENCE",
        "ANNOTATE_ON_UNREADABLE",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_from_env_path_with_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "source_dir": "/data/airplanes",
        "output_dir": "/data/airplanes_out",
        "on_unreadable": "abort",
        "detector": {
            "backend": "replay",
            "detections_path": "/data/detections.json",
            "input_size": 1280
        },
        "filter": {
            "target_class": 2,
            "confidence_threshold": 0.35
        },
        "occlusion": {
            "fully": 0.02,
            "partially": 0.4
        }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("ANNOTATE_CONFIG", file.path());
    std::env::set_var("ANNOTATE_OUTPUT_DIR", "/scratch/out");
    std::env::set_var("ANNOTATE_CONFIDENCE", "0.6");

    let cfg = AnnotateConfig::load(None).expect("load config");

    assert_eq!(cfg.source_dir, PathBuf::from("/data/airplanes"));
    assert_eq!(cfg.output_dir, PathBuf::from("/scratch/out"));
    assert_eq!(cfg.on_unreadable, UnreadablePolicy::Abort);
    assert_eq!(cfg.detector.backend, "replay");
    assert_eq!(
        cfg.detector.detections_path,
        Some(PathBuf::from("/data/detections.json"))
    );
    assert_eq!(cfg.detector.input_size, 1280);
    assert_eq!(cfg.detector.model_path, PathBuf::from("yolov8n.onnx"));
    assert_eq!(cfg.filter.target_class, 2);
    assert_eq!(cfg.filter.confidence_threshold, 0.6);
    assert_eq!(cfg.occlusion.fully, 0.02);
    assert_eq!(cfg.occlusion.partially, 0.4);

    clear_env();
}

#[test]
fn loads_toml_config_from_explicit_path() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    file.write_all(
        br#"
source_dir = "frames"

[detector]
backend = "tract"
model_path = "models/yolov8s.onnx"

[filter]
confidence_threshold = 0.0
"#,
    )
    .expect("write config");
    std::env::set_var("ANNOTATE_TARGET_CLASS", "14");

    let cfg = AnnotateConfig::load(Some(file.path())).expect("load config");

    assert_eq!(cfg.source_dir, PathBuf::from("frames"));
    assert_eq!(cfg.output_dir, PathBuf::from("result"));
    assert_eq!(cfg.detector.backend, "tract");
    assert_eq!(cfg.detector.model_path, PathBuf::from("models/yolov8s.onnx"));
    assert_eq!(cfg.filter.confidence_threshold, 0.0);
    assert_eq!(cfg.filter.target_class, 14);
    assert_eq!(cfg.on_unreadable, UnreadablePolicy::Skip);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("ANNOTATE_CONFIDENCE", "high");
    assert!(AnnotateConfig::load(None).is_err());
    clear_env();

    std::env::set_var("ANNOTATE_ON_UNREADABLE", "retry");
    assert!(AnnotateConfig::load(None).is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(br#"{"occlusion": {"fully": 0.5, "partially": 0.1}}"#)
        .expect("write config");
    let err = AnnotateConfig::load(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("occlusion ratios"));

    let err = AnnotateConfig::load(Some(&PathBuf::from("/nonexistent/annotate.json")))
        .unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));

    clear_env();
}
