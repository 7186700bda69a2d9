//! Counter-clockwise rotation.

use crate::canvas::Canvas;
use crate::color::Color;
use crate::fingerprint::CacheValue;
use crate::operation::{ImageOperation, RenderContext, Rendered};
use crate::types::PipelineError;

/// Rotate by `angle` degrees counter-clockwise. The canvas grows to the
/// rotated bounding box and uncovered area is filled with `background`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotate {
    angle: f64,
    background: Color,
}

impl Rotate {
    /// Default background for uncovered area.
    pub const DEFAULT_BACKGROUND: Color = Color::BLACK;

    /// Rotate with a black background.
    #[must_use]
    pub const fn new(angle: f64) -> Self {
        Self {
            angle,
            background: Self::DEFAULT_BACKGROUND,
        }
    }

    /// Use `background` for uncovered area.
    #[must_use]
    pub const fn background(mut self, background: Color) -> Self {
        self.background = background;
        self
    }
}

impl ImageOperation for Rotate {
    fn name(&self) -> &'static str {
        "rotate"
    }

    fn render(&self, canvas: &mut Canvas, _ctx: &RenderContext<'_>) -> Result<Rendered, PipelineError> {
        canvas.set_alpha_blending(true);
        Ok(Rendered::Replaced(canvas.rotate(self.angle, self.background)))
    }

    fn cache_key_values(&self) -> Result<Vec<CacheValue>, PipelineError> {
        let mut values = vec![CacheValue::from(self.angle)];
        values.extend(self.background.channels().into_iter().map(CacheValue::from));
        Ok(values)
    }
}
