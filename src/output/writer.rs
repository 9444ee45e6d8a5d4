use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Cursor, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::manifest::{StreamDigest, MANIFEST_FILE};
use super::overlay::render_overlay;
use crate::annotation::ImageAnnotation;
use crate::frame::Frame;

pub const GROUND_TRUTH_FILE: &str = "Groundtruth.txt";
pub const OCCLUSION_FILE: &str = "fully_occlusion.txt";
pub const OUT_OF_VIEW_FILE: &str = "out_of_view.txt";
pub const OVERLAY_DIR: &str = "annotated_images";

const OVERLAY_PROBE: &str = ".write_probe";

/// Owns the three text streams and the overlay directory for one run.
///
/// All four targets are opened by [`AnnotationWriter::create`] before any
/// image is processed. Every committed append is synced to disk before it
/// returns, so dropping the writer on any path (including `?` returns)
/// closes the files with nothing pending.
pub struct AnnotationWriter {
    overlay_dir: PathBuf,
    streams: AlignedStreams<File>,
}

impl AnnotationWriter {
    /// Create the output directory layout and open every target. Existing
    /// stream files are truncated and a previous run's manifest is removed,
    /// so a run that fails part way never leaves a manifest describing
    /// other streams.
    pub fn create(out_dir: &Path) -> Result<Self> {
        let overlay_dir = out_dir.join(OVERLAY_DIR);
        std::fs::create_dir_all(&overlay_dir)
            .with_context(|| format!("failed to create {}", overlay_dir.display()))?;
        probe_writable(&overlay_dir)?;
        remove_stale_manifest(out_dir)?;

        let open = |name: &'static str| -> Result<LineStream<File>> {
            let path = out_dir.join(name);
            let file = File::create(&path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            Ok(LineStream::new(name, file))
        };
        let streams = AlignedStreams::new([
            open(GROUND_TRUTH_FILE)?,
            open(OCCLUSION_FILE)?,
            open(OUT_OF_VIEW_FILE)?,
        ]);

        Ok(Self {
            overlay_dir,
            streams,
        })
    }

    /// Lines committed to each stream so far.
    pub fn lines(&self) -> usize {
        self.streams.lines
    }

    /// Save the frame with every kept box outlined, under the frame's own
    /// file name.
    pub fn write_overlay(&self, frame: &Frame, annotation: &ImageAnnotation) -> Result<PathBuf> {
        let path = self.overlay_dir.join(frame.name());
        render_overlay(frame.image(), &annotation.ground_truth_boxes)
            .save(&path)
            .with_context(|| format!("failed to write overlay {}", path.display()))?;
        Ok(path)
    }

    /// Append one line to each stream. Either all three lines are committed
    /// or none is.
    pub fn append(&mut self, annotation: &ImageAnnotation) -> Result<()> {
        self.streams.append([
            format!("{}\n", annotation.ground_truth_line()),
            format!("{}\n", annotation.occlusion_status()),
            format!("{}\n", annotation.out_of_view_status()),
        ])
    }

    /// Flush to disk and report per-stream digests.
    pub fn finish(mut self) -> Result<Vec<StreamDigest>> {
        for stream in &mut self.streams.streams {
            stream
                .sink
                .sync_all()
                .with_context(|| format!("failed to sync {}", stream.name))?;
        }
        Ok(self.streams.digests())
    }
}

fn remove_stale_manifest(out_dir: &Path) -> Result<()> {
    let path = out_dir.join(MANIFEST_FILE);
    match std::fs::remove_file(&path) {
        Ok(()) => {
            log::debug!("removed previous manifest {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
    }
}

fn probe_writable(dir: &Path) -> Result<()> {
    let probe = dir.join(OVERLAY_PROBE);
    File::create(&probe)
        .with_context(|| format!("overlay directory {} is not writable", dir.display()))?;
    std::fs::remove_file(&probe)
        .with_context(|| format!("failed to remove {}", probe.display()))?;
    Ok(())
}

/// A stream target that can be synced to storage and cut back to an
/// earlier length.
pub(crate) trait LineSink: Write {
    fn sync(&mut self) -> io::Result<()>;
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl LineSink for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.seek(SeekFrom::Start(len))?;
        Ok(())
    }
}

impl LineSink for Cursor<Vec<u8>> {
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.get_mut().truncate(len as usize);
        self.set_position(len);
        Ok(())
    }
}

pub(crate) struct LineStream<W> {
    name: &'static str,
    sink: W,
    committed: u64,
    hasher: Sha256,
}

impl<W> LineStream<W> {
    pub(crate) fn new(name: &'static str, sink: W) -> Self {
        Self {
            name,
            sink,
            committed: 0,
            hasher: Sha256::new(),
        }
    }
}

pub(crate) struct AlignedStreams<W> {
    streams: [LineStream<W>; 3],
    lines: usize,
}

impl<W: LineSink> AlignedStreams<W> {
    pub(crate) fn new(streams: [LineStream<W>; 3]) -> Self {
        Self { streams, lines: 0 }
    }

    /// Write one line to every stream and sync them. On any failure the
    /// streams are truncated back to the previous commit.
    fn append(&mut self, lines: [String; 3]) -> Result<()> {
        let mut failure = None;
        for (stream, line) in self.streams.iter_mut().zip(&lines) {
            if let Err(e) = stream
                .sink
                .write_all(line.as_bytes())
                .and_then(|_| stream.sink.flush())
            {
                failure = Some(anyhow!("failed to append to {}: {}", stream.name, e));
                break;
            }
        }
        if failure.is_none() {
            for stream in &mut self.streams {
                if let Err(e) = stream.sink.sync() {
                    failure = Some(anyhow!("failed to sync {}: {}", stream.name, e));
                    break;
                }
            }
        }
        if let Some(err) = failure {
            self.rollback();
            return Err(err);
        }

        for (stream, line) in self.streams.iter_mut().zip(&lines) {
            stream.committed += line.len() as u64;
            stream.hasher.update(line.as_bytes());
        }
        self.lines += 1;
        Ok(())
    }

    fn rollback(&mut self) {
        for stream in &mut self.streams {
            if let Err(e) = stream.sink.truncate_to(stream.committed) {
                log::error!(
                    "failed to roll {} back to {} bytes: {}",
                    stream.name,
                    stream.committed,
                    e
                );
            }
        }
    }

    fn digests(&self) -> Vec<StreamDigest> {
        self.streams
            .iter()
            .map(|s| StreamDigest {
                file: s.name.to_string(),
                lines: self.lines,
                sha256: hex::encode(s.hasher.clone().finalize()),
            })
            .collect()
    }
}
