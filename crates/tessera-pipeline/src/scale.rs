//! Aspect-preserving resize operations.

use crate::canvas::Canvas;
use crate::fingerprint::CacheValue;
use crate::operation::{ImageOperation, RenderContext, Rendered};
use crate::types::{Dimensions, PipelineError};

/// Truncate a positive pixel extent, keeping at least one pixel.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn truncate(extent: f64) -> u32 {
    if extent.is_finite() {
        (extent.trunc() as u32).max(1)
    } else {
        1
    }
}

/// Treat zero the same as an absent bound.
fn bound(value: Option<u32>) -> Option<u32> {
    value.filter(|&v| v > 0)
}

/// Shrink to fit inside a bounding box, keeping the aspect ratio.
///
/// Images already inside the box are left alone. A missing bound is
/// derived from the other one using the current aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scale {
    max_width: Option<u32>,
    max_height: Option<u32>,
}

impl Scale {
    /// A bound of `None` or `0` is unset.
    #[must_use]
    pub fn new(max_width: Option<u32>, max_height: Option<u32>) -> Self {
        Self {
            max_width: bound(max_width),
            max_height: bound(max_height),
        }
    }

    /// The size `current` is scaled to, or `None` if it already fits.
    #[must_use]
    pub fn target(&self, current: Dimensions) -> Option<Dimensions> {
        let ratio = current.aspect_ratio();
        let (max_width, max_height) = match (self.max_width, self.max_height) {
            (None, None) => return None,
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => (w, truncate(f64::from(w) / ratio)),
            (None, Some(h)) => (truncate(f64::from(h) * ratio), h),
        };
        if current.width <= max_width && current.height <= max_height {
            return None;
        }

        let expected = Dimensions::new(max_width, max_height).aspect_ratio();
        let target = if ratio > expected {
            Dimensions::new(max_width, truncate(f64::from(max_width) / ratio))
        } else {
            Dimensions::new(truncate(f64::from(max_height) * ratio), max_height)
        };
        Some(target)
    }
}

impl ImageOperation for Scale {
    fn name(&self) -> &'static str {
        "scale"
    }

    fn render(&self, canvas: &mut Canvas, ctx: &RenderContext<'_>) -> Result<Rendered, PipelineError> {
        let current = canvas.dimensions();
        let Some(target) = self.target(current) else {
            return Ok(Rendered::InPlace);
        };
        let scaled = canvas.resample((0, 0, current.width, current.height), target, ctx.filter())?;
        Ok(Rendered::Replaced(scaled))
    }

    fn cache_key_values(&self) -> Result<Vec<CacheValue>, PipelineError> {
        Ok(vec![self.max_width.into(), self.max_height.into()])
    }
}

/// Resize to an exact size, cropping the excess centrally ("cover").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleAndCrop {
    width: Option<u32>,
    height: Option<u32>,
}

impl ScaleAndCrop {
    /// An unset (or zero) dimension keeps the current size on that axis.
    #[must_use]
    pub fn new(width: Option<u32>, height: Option<u32>) -> Self {
        Self {
            width: bound(width),
            height: bound(height),
        }
    }

    /// Target size and source region `(x, y, width, height)` for
    /// `current`, or `None` if no change is needed.
    #[must_use]
    pub fn plan(&self, current: Dimensions) -> Option<(Dimensions, (u32, u32, u32, u32))> {
        let target = Dimensions::new(
            self.width.unwrap_or(current.width),
            self.height.unwrap_or(current.height),
        );
        if target == current {
            return None;
        }

        let ratio = current.aspect_ratio();
        let expected = target.aspect_ratio();
        let region = if ratio > expected {
            let width = truncate(f64::from(current.height) * expected).min(current.width);
            (((current.width - width) / 2), 0, width, current.height)
        } else {
            let height = truncate(f64::from(current.width) / expected).min(current.height);
            (0, ((current.height - height) / 2), current.width, height)
        };
        Some((target, region))
    }
}

impl ImageOperation for ScaleAndCrop {
    fn name(&self) -> &'static str {
        "scale_and_crop"
    }

    fn render(&self, canvas: &mut Canvas, ctx: &RenderContext<'_>) -> Result<Rendered, PipelineError> {
        let Some((target, region)) = self.plan(canvas.dimensions()) else {
            return Ok(Rendered::InPlace);
        };
        let scaled = canvas.resample(region, target, ctx.filter())?;
        Ok(Rendered::Replaced(scaled))
    }

    fn cache_key_values(&self) -> Result<Vec<CacheValue>, PipelineError> {
        Ok(vec![self.width.into(), self.height.into()])
    }
}
