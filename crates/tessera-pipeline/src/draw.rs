//! Shape drawing: lines and filled rectangles.

use crate::canvas::Canvas;
use crate::color::Color;
use crate::fingerprint::CacheValue;
use crate::operation::{ImageOperation, RenderContext, Rendered};
use crate::types::PipelineError;

/// Default stroke and fill color.
pub const DEFAULT_SHAPE_COLOR: Color = Color::WHITE;

fn with_channels(mut values: Vec<CacheValue>, color: Color) -> Vec<CacheValue> {
    values.extend(color.channels().into_iter().map(CacheValue::from));
    values
}

/// A one-pixel line from (`x1`, `y1`) to (`x2`, `y2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line {
    start: (i32, i32),
    end: (i32, i32),
    color: Color,
}

impl Line {
    /// A white line.
    #[must_use]
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            start: (x1, y1),
            end: (x2, y2),
            color: DEFAULT_SHAPE_COLOR,
        }
    }

    /// Stroke with `color`.
    #[must_use]
    pub const fn color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }
}

impl ImageOperation for Line {
    fn name(&self) -> &'static str {
        "line"
    }

    fn render(&self, canvas: &mut Canvas, _ctx: &RenderContext<'_>) -> Result<Rendered, PipelineError> {
        canvas.draw_line(self.start, self.end, self.color);
        Ok(Rendered::InPlace)
    }

    fn cache_key_values(&self) -> Result<Vec<CacheValue>, PipelineError> {
        let values = vec![
            self.start.0.into(),
            self.start.1.into(),
            self.end.0.into(),
            self.end.1.into(),
        ];
        Ok(with_channels(values, self.color))
    }
}

/// A filled rectangle covering (`x`, `y`) through (`x + width`,
/// `y + height`) inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rectangle {
    x: i32,
    y: i32,
    width: i32,
    height: i32,
    color: Color,
}

impl Rectangle {
    /// A white rectangle.
    #[must_use]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            color: DEFAULT_SHAPE_COLOR,
        }
    }

    /// Fill with `color`.
    #[must_use]
    pub const fn color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }
}

impl ImageOperation for Rectangle {
    fn name(&self) -> &'static str {
        "rectangle"
    }

    fn render(&self, canvas: &mut Canvas, _ctx: &RenderContext<'_>) -> Result<Rendered, PipelineError> {
        let far = (
            self.x.saturating_add(self.width),
            self.y.saturating_add(self.height),
        );
        canvas.fill_rect((self.x, self.y), far, self.color);
        Ok(Rendered::InPlace)
    }

    fn cache_key_values(&self) -> Result<Vec<CacheValue>, PipelineError> {
        // Height precedes width; existing cache entries are keyed this way.
        let values = vec![
            self.x.into(),
            self.y.into(),
            self.height.into(),
            self.width.into(),
        ];
        Ok(with_channels(values, self.color))
    }
}
