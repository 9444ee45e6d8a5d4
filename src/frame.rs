//! Decoded input frames.
//!
//! A `Frame` owns the RGB pixels of one input image for the duration of its
//! processing. Detectors read it; the overlay renderer draws on a copy; nothing
//! mutates it.

use anyhow::{anyhow, Context, Result};
use image::{ImageReader, RgbImage};
use std::path::Path;

use crate::geometry::FrameSize;

pub struct Frame {
    /// File name (no directory) the frame was decoded from.
    name: String,
    pixels: RgbImage,
}

impl Frame {
    /// Decode an image file. The format is sniffed from the file contents;
    /// the extension is used only when the contents are not recognized.
    pub fn open(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("image path {} has no usable file name", path.display()))?
            .to_string();
        let decoded = ImageReader::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?
            .with_guessed_format()
            .with_context(|| format!("failed to read {}", path.display()))?
            .decode()
            .with_context(|| format!("failed to decode {}", path.display()))?;
        Self::from_rgb(name, decoded.to_rgb8())
    }

    pub fn from_rgb(name: impl Into<String>, pixels: RgbImage) -> Result<Self> {
        let name = name.into();
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(anyhow!("image {} has zero width or height", name));
        }
        Ok(Self { name, pixels })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width(), self.height())
    }

    /// Interleaved RGB bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    pub fn image(&self) -> &RgbImage {
        &self.pixels
    }
}
