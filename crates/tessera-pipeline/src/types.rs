//! Shared types for the tessera pipeline.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::color::ColorParseError;

/// Re-export `RgbaImage` so downstream crates can inspect a rendered
/// canvas without depending on `image` directly.
pub use image::RgbaImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create a new dimensions pair.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width divided by height.
    #[must_use]
    pub fn aspect_ratio(self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Encoded output formats supported by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Portable Network Graphics, alpha preserved.
    Png,
    /// JPEG, encoded with the configured quality. Alpha is discarded.
    #[serde(alias = "jpeg")]
    Jpg,
    /// Graphics Interchange Format.
    Gif,
}

impl Format {
    /// All supported formats.
    pub const ALL: [Self; 3] = [Self::Png, Self::Jpg, Self::Gif];

    /// Look up a format by file extension.
    ///
    /// Matching is case-insensitive and `jpeg` is accepted as an alias
    /// for [`Format::Jpg`].
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpg),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Infer the format from a path's extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Canonical file extension (`png`, `jpg`, `gif`).
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
            Self::Gif => "gif",
        }
    }

    /// The registered MIME type for this format.
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpg => "image/jpeg",
            Self::Gif => "image/gif",
        }
    }

    /// Content type announced by the legacy streaming output.
    ///
    /// PNG and JPEG labels are swapped relative to [`mime_type`](Self::mime_type).
    /// Existing consumers depend on this exact mapping, so it is kept
    /// behind [`PipelineConfig::legacy_content_types`](crate::PipelineConfig::legacy_content_types).
    #[must_use]
    pub const fn legacy_content_type(self) -> &'static str {
        match self {
            Self::Png => "image/jpeg",
            Self::Jpg => "image/png",
            Self::Gif => "image/gif",
        }
    }

    pub(crate) const fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Jpg => image::ImageFormat::Jpeg,
            Self::Gif => image::ImageFormat::Gif,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Format {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| PipelineError::UnsupportedFormat(s.to_owned()))
    }
}

/// Errors that can occur while configuring or resolving a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// No source was configured; call `load` or `create` first.
    #[error("pipeline has no source; call load() or create() first")]
    NotConfigured,

    /// The source path does not reference an existing file.
    #[error("source image not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// A color string did not match any accepted grammar.
    #[error(transparent)]
    ColorParse(#[from] ColorParseError),

    /// A canvas operation (copy, resample, rotate, draw) failed.
    #[error("canvas engine failure: {0}")]
    Engine(String),

    /// Decoding or encoding an image failed.
    #[error("image codec error: {0}")]
    ImageCodec(#[from] image::ImageError),

    /// The font file for a text operation does not exist.
    #[error("font not found: {}", .0.display())]
    FontNotFound(PathBuf),

    /// The requested format is not one of png, jpg, gif.
    #[error("unsupported image format: {0:?}")]
    UnsupportedFormat(String),

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// An overlay source could not be borrowed because it is already
    /// being resolved further up the chain.
    #[error("overlay source is already in use (cyclic overlay)")]
    OverlayCycle,

    /// Reading or writing the filesystem or cache failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
