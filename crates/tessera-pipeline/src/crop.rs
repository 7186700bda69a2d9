//! Rectangular crop.

use crate::canvas::Canvas;
use crate::fingerprint::CacheValue;
use crate::operation::{ImageOperation, RenderContext, Rendered};
use crate::types::PipelineError;

/// Copy a `width`×`height` region starting at (`x`, `y`) into a new
/// canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crop {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl Crop {
    /// Negative origins are clamped to zero.
    #[must_use]
    pub fn new(x: i64, y: i64, width: u32, height: u32) -> Self {
        let clamp = |v: i64| u32::try_from(v.max(0)).unwrap_or(u32::MAX);
        Self {
            x: clamp(x),
            y: clamp(y),
            width,
            height,
        }
    }
}

impl ImageOperation for Crop {
    fn name(&self) -> &'static str {
        "crop"
    }

    fn render(&self, canvas: &mut Canvas, _ctx: &RenderContext<'_>) -> Result<Rendered, PipelineError> {
        let region = canvas.copy_region(self.x, self.y, self.width, self.height)?;
        Ok(Rendered::Replaced(region))
    }

    fn cache_key_values(&self) -> Result<Vec<CacheValue>, PipelineError> {
        Ok(vec![
            self.x.into(),
            self.y.into(),
            self.width.into(),
            self.height.into(),
        ])
    }
}
