//! Pipeline configuration.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::PipelineError;

/// Resampling filter used by the scaling operations.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResampleFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest/best for photos.
    Lanczos3,
}

impl ResampleFilter {
    /// Convert to the `image` crate's `FilterType`.
    #[must_use]
    pub const fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            Self::Nearest => image::imageops::FilterType::Nearest,
            Self::Triangle => image::imageops::FilterType::Triangle,
            Self::CatmullRom => image::imageops::FilterType::CatmullRom,
            Self::Gaussian => image::imageops::FilterType::Gaussian,
            Self::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for ResampleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// Settings shared by every resolution of a pipeline.
///
/// Every field that changes rendered output (quality for JPEG, the
/// resample filter, the fonts directory) is part of the cache
/// fingerprint, so changing it never serves a stale artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// JPEG encoder quality, 1-100. Only used for [`Format::Jpg`](crate::Format::Jpg).
    pub jpeg_quality: u8,

    /// Directory that text operations resolve font names against.
    pub fonts_dir: PathBuf,

    /// Filter used by `Scale` and `ScaleAndCrop`.
    pub resample_filter: ResampleFilter,

    /// Announce streamed output with the legacy content-type labels
    /// (see [`Format::legacy_content_type`](crate::Format::legacy_content_type)).
    /// When `false`, the registered MIME types are used instead.
    pub legacy_content_types: bool,
}

impl PipelineConfig {
    /// Default JPEG quality.
    pub const DEFAULT_JPEG_QUALITY: u8 = 100;

    /// Default fonts directory, relative to the working directory.
    pub const DEFAULT_FONTS_DIR: &str = "fonts";

    /// Check invariants that serde and the public fields cannot enforce.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `jpeg_quality` is
    /// outside 1..=100.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(PipelineError::InvalidConfig(format!(
                "jpeg_quality must be between 1 and 100, got {}",
                self.jpeg_quality
            )));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: Self::DEFAULT_JPEG_QUALITY,
            fonts_dir: PathBuf::from(Self::DEFAULT_FONTS_DIR),
            resample_filter: ResampleFilter::default(),
            legacy_content_types: true,
        }
    }
}
