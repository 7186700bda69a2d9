//! Compositing another pipeline's output.

use crate::canvas::Canvas;
use crate::fingerprint::CacheValue;
use crate::operation::{ImageOperation, RenderContext, Rendered};
use crate::pipeline::PipelineHandle;
use crate::types::{Format, PipelineError};

/// Copy the resolved canvas of another pipeline onto this one with its
/// top-left corner at (`x`, `y`).
///
/// The embedded pipeline resolves through its own cache. Its PNG
/// fingerprint is part of this step's key, so any change to it
/// invalidates the outer result.
#[derive(Debug, Clone)]
pub struct Overlay {
    source: PipelineHandle,
    x: i64,
    y: i64,
    alpha_blending: bool,
}

impl Overlay {
    /// Composite `source` with alpha blending.
    #[must_use]
    pub const fn new(source: PipelineHandle, x: i64, y: i64) -> Self {
        Self {
            source,
            x,
            y,
            alpha_blending: true,
        }
    }

    /// Blend (`true`) or replace (`false`) destination pixels.
    #[must_use]
    pub const fn alpha_blending(mut self, enabled: bool) -> Self {
        self.alpha_blending = enabled;
        self
    }

    /// The embedded pipeline.
    #[must_use]
    pub const fn source(&self) -> &PipelineHandle {
        &self.source
    }
}

impl ImageOperation for Overlay {
    fn name(&self) -> &'static str {
        "overlay"
    }

    fn render(&self, canvas: &mut Canvas, _ctx: &RenderContext<'_>) -> Result<Rendered, PipelineError> {
        let mut source = self
            .source
            .try_borrow_mut()
            .map_err(|_| PipelineError::OverlayCycle)?;
        let top = source.canvas()?;
        canvas.set_alpha_blending(self.alpha_blending);
        canvas.overlay(top, self.x, self.y);
        canvas.set_alpha_blending(false);
        Ok(Rendered::InPlace)
    }

    fn cache_key_values(&self) -> Result<Vec<CacheValue>, PipelineError> {
        let source = self
            .source
            .try_borrow()
            .map_err(|_| PipelineError::OverlayCycle)?;
        Ok(vec![
            source.fingerprint(Format::Png)?.into(),
            self.x.into(),
            self.y.into(),
            self.alpha_blending.into(),
        ])
    }

    fn nested_revision(&self) -> Result<Option<u64>, PipelineError> {
        let source = self
            .source
            .try_borrow()
            .map_err(|_| PipelineError::OverlayCycle)?;
        source.tree_revision().map(Some)
    }
}
