//! Input listing.
//!
//! The sorted listing is the processing order and the line index of every
//! output stream.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Image files directly inside `dir`, sorted by file name.
///
/// Subdirectories and other extensions are ignored, as are names that are not
/// valid UTF-8 (they cannot be written back out as overlay names).
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to list source directory {}", dir.display()))?;

    let mut named = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to list {}", dir.display()))?;
        let path = entry.path();
        if !entry.file_type()?.is_file() && !path.is_file() {
            continue;
        }
        if !is_supported_image(&path) {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => named.push((name, path)),
            Err(raw) => log::warn!("ignoring non UTF-8 file name {:?}", raw),
        }
    }
    named.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(named.into_iter().map(|(_, path)| path).collect())
}
