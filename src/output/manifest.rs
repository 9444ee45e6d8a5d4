//! Run manifest.
//!
//! The streams carry no file names, so the manifest records which image each
//! line belongs to, which inputs were skipped, and a SHA-256 of every stream
//! so a consumer can tell whether the files still match the run.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    pub source_dir: String,
    pub backend: String,
    /// Processed images; entry `i` is described by line `i` of every stream.
    pub images: Vec<String>,
    pub skipped: Vec<SkippedImage>,
    pub streams: Vec<StreamDigest>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedImage {
    pub name: String,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDigest {
    pub file: String,
    pub lines: usize,
    /// Lowercase hex.
    pub sha256: String,
}

impl RunManifest {
    pub fn write(&self, out_dir: &Path) -> Result<PathBuf> {
        let path = out_dir.join(MANIFEST_FILE);
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write manifest {}", path.display()))?;
        Ok(path)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        serde_json::from_str(&raw).map_err(|e| anyhow!("invalid manifest {}: {}", path.display(), e))
    }

    /// Every stream has one line per listed image.
    pub fn is_aligned(&self) -> bool {
        self.streams.iter().all(|s| s.lines == self.images.len())
    }
}
