use std::collections::HashMap;

use anyhow::Result;
use image::{Rgb, RgbImage};
use sha2::{Digest, Sha256};
use tempfile::TempDir;

use detect_annotate::output::{
    GROUND_TRUTH_FILE, MANIFEST_FILE, OCCLUSION_FILE, OUT_OF_VIEW_FILE, OVERLAY_DIR,
};
use detect_annotate::{
    AnnotateConfig, DetectorBackend, ErrorKind, Frame, Pipeline, PipelineError, RawDetection,
    ReplayBackend, RunManifest, Stage, StubBackend, UnreadablePolicy,
};

struct Workspace {
    _root: TempDir,
    config: AnnotateConfig,
}

impl Workspace {
    fn new() -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let source = root.path().join("images");
        std::fs::create_dir(&source).expect("source dir");
        let mut config = AnnotateConfig::default();
        config.source_dir = source;
        config.output_dir = root.path().join("result");
        Self {
            _root: root,
            config,
        }
    }

    fn add_image(&self, name: &str, width: u32, height: u32) {
        let img = RgbImage::from_pixel(width, height, Rgb([40, 40, 40]));
        img.save(self.config.source_dir.join(name)).expect("save image");
    }

    fn add_file(&self, name: &str, bytes: &[u8]) {
        std::fs::write(self.config.source_dir.join(name), bytes).expect("write file");
    }

    fn read(&self, name: &str) -> String {
        std::fs::read_to_string(self.config.output_dir.join(name)).expect("read output")
    }

    fn lines(&self, name: &str) -> Vec<String> {
        self.read(name).lines().map(str::to_string).collect()
    }

    fn overlay_exists(&self, name: &str) -> bool {
        self.config.output_dir.join(OVERLAY_DIR).join(name).exists()
    }
}

fn det(bbox: [f32; 4], class_id: u32, confidence: f32) -> RawDetection {
    RawDetection::new(bbox, class_id, confidence)
}

fn replay(entries: Vec<(&str, Vec<RawDetection>)>) -> ReplayBackend {
    ReplayBackend::new(
        entries
            .into_iter()
            .map(|(name, dets)| (name.to_string(), dets))
            .collect::<HashMap<_, _>>(),
    )
}

fn pipeline_error(err: &anyhow::Error) -> &PipelineError {
    err.downcast_ref::<PipelineError>().expect("pipeline error")
}

#[test]
fn three_image_scenario_produces_aligned_streams() {
    let ws = Workspace::new();
    ws.add_image("a.jpg", 100, 100);
    ws.add_image("b.jpg", 100, 100);
    ws.add_image("c.jpg", 100, 100);
    ws.add_file("notes.txt", b"not an image");

    let mut backend = replay(vec![
        // 100 x 80 of a 100 x 100 frame: 80%, fully in view
        ("a.jpg", vec![det([0.0, 0.0, 100.0, 80.0], 4, 0.92)]),
        // wrong class and too unsure
        (
            "b.jpg",
            vec![
                det([10.0, 10.0, 90.0, 90.0], 0, 0.99),
                det([10.0, 10.0, 90.0, 90.0], 4, 0.2),
            ],
        ),
        // 5 x 10 = 0.5% of the frame, hanging off the left edge
        ("c.jpg", vec![det([-2.0, 10.0, 3.0, 20.0], 4, 0.81)]),
    ]);

    let summary = Pipeline::new(&ws.config).run(&mut backend).unwrap();

    assert_eq!(summary.processed, vec!["a.jpg", "b.jpg", "c.jpg"]);
    assert!(summary.skipped.is_empty());
    assert_eq!(summary.boxes_written, 2);

    assert_eq!(ws.read(GROUND_TRUTH_FILE), "0,0,100,80\n\n-2,10,5,10\n");
    assert_eq!(ws.read(OCCLUSION_FILE), "0\n0\n0\n");
    assert_eq!(ws.read(OUT_OF_VIEW_FILE), "0\n0\n1\n");

    for name in ["a.jpg", "b.jpg", "c.jpg"] {
        assert!(ws.overlay_exists(name), "missing overlay for {}", name);
    }
    assert!(!ws.overlay_exists("notes.txt"));
}

#[test]
fn alignment_holds_across_empty_and_multi_box_images() {
    let ws = Workspace::new();
    for name in ["04.png", "01.png", "03.png", "02.png"] {
        ws.add_image(name, 200, 100);
    }

    let mut backend = replay(vec![
        ("01.png", vec![]),
        (
            "02.png",
            vec![
                // 30 x 30 = 4.5%: partial
                det([10.0, 10.0, 40.0, 40.0], 4, 0.9),
                det([0.0, 0.0, 200.0, 100.0], 7, 0.9),
                // 10 x 10 = 0.5%: full, and last
                det([150.0, 50.0, 160.0, 60.0], 4, 0.7),
            ],
        ),
        (
            "03.png",
            vec![
                det([150.0, 50.0, 160.0, 60.0], 4, 0.7),
                det([10.0, 10.0, 40.0, 40.0], 4, 0.9),
            ],
        ),
        ("04.png", vec![det([190.0, 0.0, 210.0, 50.0], 4, 0.6)]),
    ]);

    let summary = Pipeline::new(&ws.config).run(&mut backend).unwrap();
    assert_eq!(summary.processed, vec!["01.png", "02.png", "03.png", "04.png"]);

    let gt = ws.lines(GROUND_TRUTH_FILE);
    let occ = ws.lines(OCCLUSION_FILE);
    let oov = ws.lines(OUT_OF_VIEW_FILE);
    assert_eq!(gt.len(), 4);
    assert_eq!(occ.len(), 4);
    assert_eq!(oov.len(), 4);

    assert_eq!(gt[0], "");
    assert_eq!(gt[1], "10,10,30,30 150,50,10,10");
    assert_eq!(gt[2], "150,50,10,10 10,10,30,30");
    assert_eq!(gt[3], "190,0,20,50");

    // last occluded detection wins, so the two orderings disagree
    assert_eq!(occ, vec!["0", "0", "1", "1"]);
    assert_eq!(oov, vec!["0", "0", "0", "1"]);
}

#[test]
fn zero_confidence_threshold_keeps_every_target_detection() {
    let mut ws = Workspace::new();
    ws.add_image("a.png", 100, 100);
    ws.config.filter.confidence_threshold = 0.0;

    let mut backend = replay(vec![(
        "a.png",
        vec![
            det([0.0, 0.0, 60.0, 60.0], 4, 0.05),
            det([0.0, 0.0, 10.0, 10.0], 3, 0.99),
        ],
    )]);
    Pipeline::new(&ws.config).run(&mut backend).unwrap();
    assert_eq!(ws.read(GROUND_TRUTH_FILE), "0,0,60,60\n");
    assert_eq!(ws.read(OCCLUSION_FILE), "1\n");
}

#[test]
fn stub_backend_writes_default_lines_for_every_image() {
    let ws = Workspace::new();
    ws.add_image("x.png", 16, 16);
    ws.add_image("y.JPG", 16, 16);

    let mut backend = StubBackend::new();
    Pipeline::new(&ws.config).run(&mut backend).unwrap();

    assert_eq!(ws.read(GROUND_TRUTH_FILE), "\n\n");
    assert_eq!(ws.read(OCCLUSION_FILE), "0\n0\n");
    assert_eq!(ws.read(OUT_OF_VIEW_FILE), "0\n0\n");
    assert_eq!(backend.frames_seen(), 2);
}

#[test]
fn unreadable_images_are_skipped_and_recorded() {
    let ws = Workspace::new();
    ws.add_image("a.png", 50, 50);
    ws.add_file("b.jpg", b"truncated");
    ws.add_image("c.png", 50, 50);

    let mut backend = replay(vec![
        ("a.png", vec![det([0.0, 0.0, 50.0, 50.0], 4, 0.9)]),
        ("c.png", vec![]),
    ]);
    let summary = Pipeline::new(&ws.config).run(&mut backend).unwrap();

    assert_eq!(summary.processed, vec!["a.png", "c.png"]);
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(summary.skipped[0].name, "b.jpg");
    assert_eq!(ws.lines(GROUND_TRUTH_FILE), vec!["0,0,50,50", ""]);
    assert!(!ws.overlay_exists("b.jpg"));

    let manifest = RunManifest::read(&summary.manifest_path).unwrap();
    assert_eq!(manifest.images, vec!["a.png", "c.png"]);
    assert_eq!(manifest.skipped, summary.skipped);
    assert_eq!(manifest.backend, "replay");
    assert!(manifest.is_aligned());
}

#[test]
fn abort_policy_stops_at_unreadable_image() {
    let mut ws = Workspace::new();
    ws.add_image("a.png", 50, 50);
    ws.add_file("b.png", b"\x89PNG garbage");
    ws.add_image("c.png", 50, 50);
    ws.config.on_unreadable = UnreadablePolicy::Abort;

    let mut backend = replay(vec![("a.png", vec![]), ("c.png", vec![])]);
    let err = Pipeline::new(&ws.config).run(&mut backend).unwrap_err();

    let err = pipeline_error(&err);
    assert_eq!(err.kind, ErrorKind::InputUnreadable);
    assert_eq!(err.stage, Stage::Decode);
    assert_eq!(err.image.as_deref(), Some("b.png"));

    assert_eq!(ws.lines(GROUND_TRUTH_FILE).len(), 1);
    assert_eq!(ws.lines(OCCLUSION_FILE).len(), 1);
    assert_eq!(ws.lines(OUT_OF_VIEW_FILE).len(), 1);
    assert!(!ws.overlay_exists("c.png"));
}

#[test]
fn detector_failure_aborts_with_consistent_prefix() {
    let ws = Workspace::new();
    ws.add_image("a.png", 40, 40);
    ws.add_image("b.png", 40, 40);
    ws.add_image("c.png", 40, 40);

    // nothing recorded for b.png
    let mut backend = replay(vec![
        ("a.png", vec![det([0.0, 0.0, 20.0, 20.0], 4, 0.9)]),
        ("c.png", vec![]),
    ]);
    let err = Pipeline::new(&ws.config).run(&mut backend).unwrap_err();

    let err = pipeline_error(&err);
    assert_eq!(err.kind, ErrorKind::DetectorFailure);
    assert_eq!(err.stage, Stage::Detect);
    assert_eq!(err.image.as_deref(), Some("b.png"));
    assert!(err.to_string().contains("b.png"));

    assert_eq!(ws.read(GROUND_TRUTH_FILE), "0,0,20,20\n");
    assert_eq!(ws.read(OCCLUSION_FILE), "1\n");
    assert_eq!(ws.read(OUT_OF_VIEW_FILE), "0\n");
    assert!(ws.overlay_exists("a.png"));
    assert!(!ws.overlay_exists("b.png"));
    assert!(!ws.config.output_dir.join(MANIFEST_FILE).exists());
}

struct MalformedBackend;

impl DetectorBackend for MalformedBackend {
    fn name(&self) -> &'static str {
        "malformed"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>> {
        Ok(vec![det([0.0, 0.0, f32::NAN, 5.0], 4, 0.9)])
    }
}

#[test]
fn malformed_detector_output_is_fatal() {
    let ws = Workspace::new();
    ws.add_image("a.png", 10, 10);

    let err = Pipeline::new(&ws.config)
        .run(&mut MalformedBackend)
        .unwrap_err();
    let err = pipeline_error(&err);
    assert_eq!(err.kind, ErrorKind::DetectorFailure);
    assert!(ws.lines(GROUND_TRUTH_FILE).is_empty());
}

struct CountingBackend {
    calls: usize,
}

impl DetectorBackend for CountingBackend {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>> {
        self.calls += 1;
        Ok(Vec::new())
    }
}

#[test]
fn unwritable_output_fails_before_processing() {
    let mut ws = Workspace::new();
    ws.add_image("a.png", 10, 10);
    let blocker = ws.config.source_dir.parent().unwrap().join("occupied");
    std::fs::write(&blocker, b"a file, not a directory").unwrap();
    ws.config.output_dir = blocker;

    let mut backend = CountingBackend { calls: 0 };
    let err = Pipeline::new(&ws.config).run(&mut backend).unwrap_err();

    let err = pipeline_error(&err);
    assert_eq!(err.kind, ErrorKind::OutputUnwritable);
    assert_eq!(err.stage, Stage::OpenOutputs);
    assert_eq!(backend.calls, 0);
}

#[test]
fn manifest_digests_match_stream_files() {
    let ws = Workspace::new();
    ws.add_image("a.png", 30, 30);
    ws.add_image("b.png", 30, 30);

    let mut backend = replay(vec![
        ("a.png", vec![det([1.0, 1.0, 11.0, 11.0], 4, 0.9)]),
        ("b.png", vec![]),
    ]);
    let summary = Pipeline::new(&ws.config).run(&mut backend).unwrap();
    assert_eq!(summary.overlay_dir, ws.config.output_dir.join(OVERLAY_DIR));
    let manifest = RunManifest::read(&summary.manifest_path).unwrap();

    assert_eq!(manifest.streams.len(), 3);
    for stream in &manifest.streams {
        let bytes = std::fs::read(ws.config.output_dir.join(&stream.file)).unwrap();
        assert_eq!(stream.sha256, hex_digest(&bytes), "{}", stream.file);
        assert_eq!(stream.lines, 2);
    }
}

#[test]
fn overlay_outlines_kept_boxes() {
    let ws = Workspace::new();
    ws.add_image("a.png", 40, 40);

    let mut backend = replay(vec![(
        "a.png",
        vec![
            det([5.0, 5.0, 25.0, 25.0], 4, 0.9),
            det([30.0, 30.0, 39.0, 39.0], 1, 0.9),
        ],
    )]);
    Pipeline::new(&ws.config).run(&mut backend).unwrap();

    let overlay = Frame::open(&ws.config.output_dir.join(OVERLAY_DIR).join("a.png")).unwrap();
    let img = overlay.image();
    assert_eq!(*img.get_pixel(5, 5), Rgb([0, 255, 0]));
    assert_eq!(*img.get_pixel(25, 15), Rgb([0, 255, 0]));
    assert_eq!(*img.get_pixel(15, 15), Rgb([40, 40, 40]));
    // filtered-out detection is not drawn
    assert_eq!(*img.get_pixel(30, 30), Rgb([40, 40, 40]));
}

#[test]
fn rerun_replaces_previous_output() {
    let ws = Workspace::new();
    ws.add_image("a.png", 20, 20);

    let mut backend = replay(vec![("a.png", vec![det([0.0, 0.0, 20.0, 20.0], 4, 0.9)])]);
    Pipeline::new(&ws.config).run(&mut backend).unwrap();
    Pipeline::new(&ws.config).run(&mut backend).unwrap();

    assert_eq!(ws.lines(GROUND_TRUTH_FILE), vec!["0,0,20,20"]);
}

#[test]
fn failed_rerun_leaves_no_manifest() {
    let ws = Workspace::new();
    ws.add_image("a.png", 20, 20);
    ws.add_image("b.png", 20, 20);

    let mut complete = replay(vec![("a.png", vec![]), ("b.png", vec![])]);
    let summary = Pipeline::new(&ws.config).run(&mut complete).unwrap();
    assert!(summary.manifest_path.exists());

    // b.png has no recorded result this time
    let mut partial = replay(vec![("a.png", vec![])]);
    let err = Pipeline::new(&ws.config).run(&mut partial).unwrap_err();
    assert_eq!(pipeline_error(&err).kind, ErrorKind::DetectorFailure);

    assert_eq!(ws.read(GROUND_TRUTH_FILE), "\n");
    assert!(!ws.config.output_dir.join(MANIFEST_FILE).exists());
}

#[test]
fn missing_source_keeps_previous_output() {
    let mut ws = Workspace::new();
    ws.add_image("a.png", 20, 20);

    let mut backend = replay(vec![("a.png", vec![det([0.0, 0.0, 20.0, 20.0], 4, 0.9)])]);
    Pipeline::new(&ws.config).run(&mut backend).unwrap();

    ws.config.source_dir = ws.config.source_dir.with_file_name("imgaes");
    let err = Pipeline::new(&ws.config).run(&mut backend).unwrap_err();
    let err = pipeline_error(&err);
    assert_eq!(err.kind, ErrorKind::InputUnreadable);
    assert_eq!(err.stage, Stage::ListInputs);

    assert_eq!(ws.read(GROUND_TRUTH_FILE), "0,0,20,20\n");
    assert!(ws.config.output_dir.join(MANIFEST_FILE).exists());
}

fn hex_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
