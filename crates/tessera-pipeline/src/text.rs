//! TrueType text rendering.

use std::path::{Component, Path, PathBuf};

use ab_glyph::FontArc;

use crate::canvas::{Canvas, check_text_params};
use crate::color::Color;
use crate::entities::decode_entities;
use crate::fingerprint::CacheValue;
use crate::operation::{ImageOperation, RenderContext, Rendered};
use crate::types::PipelineError;

/// Draw `text` with its baseline starting at (`x`, `y`).
///
/// The font is a file name inside the configured fonts directory.
/// HTML entities in the text are decoded before drawing.
#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    text: String,
    x: i32,
    y: i32,
    size: f32,
    color: Color,
    font: String,
    angle: f64,
}

impl Text {
    /// Font used when none is given.
    pub const DEFAULT_FONT: &str = "dejavusans.ttf";

    /// Default text color.
    pub const DEFAULT_COLOR: Color = Color::BLACK;

    /// Black, unrotated text in the default font. `size` is in points.
    pub fn new(text: impl Into<String>, x: i32, y: i32, size: f32) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            size,
            color: Self::DEFAULT_COLOR,
            font: Self::DEFAULT_FONT.to_owned(),
            angle: 0.0,
        }
    }

    /// Draw in `color`.
    #[must_use]
    pub fn color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    /// Use the font file `font` from the fonts directory.
    #[must_use]
    pub fn font(mut self, font: impl Into<String>) -> Self {
        self.font = font.into();
        self
    }

    /// Rotate counter-clockwise by `angle` degrees around the origin.
    #[must_use]
    pub fn angle(mut self, angle: f64) -> Self {
        self.angle = angle;
        self
    }

    /// Resolve the font name to a path inside `fonts_dir`.
    ///
    /// Names that are empty or would leave the directory are rejected.
    fn font_path(&self, fonts_dir: &Path) -> Result<PathBuf, PipelineError> {
        let name = Path::new(&self.font);
        let contained = !self.font.is_empty()
            && name.components().all(|c| matches!(c, Component::Normal(_)));
        if !contained {
            return Err(PipelineError::FontNotFound(fonts_dir.join(name)));
        }
        Ok(fonts_dir.join(name))
    }

    fn load_font(&self, ctx: &RenderContext<'_>) -> Result<FontArc, PipelineError> {
        let path = self.font_path(ctx.fonts_dir())?;
        if !ctx.fs().exists(&path) {
            return Err(PipelineError::FontNotFound(path));
        }
        let bytes = ctx.fs().read(&path)?;
        FontArc::try_from_vec(bytes).map_err(|e| {
            PipelineError::Engine(format!("cannot load font {}: {e}", path.display()))
        })
    }
}

impl ImageOperation for Text {
    fn name(&self) -> &'static str {
        "text"
    }

    fn render(&self, canvas: &mut Canvas, ctx: &RenderContext<'_>) -> Result<Rendered, PipelineError> {
        check_text_params(self.size, self.angle)?;
        let font = self.load_font(ctx)?;
        let text = decode_entities(&self.text);
        canvas.set_alpha_blending(true);
        let drawn = canvas.draw_text(&font, self.size, self.angle, (self.x, self.y), self.color, &text);
        canvas.set_alpha_blending(false);
        drawn?;
        Ok(Rendered::InPlace)
    }

    fn cache_key_values(&self) -> Result<Vec<CacheValue>, PipelineError> {
        let mut values = vec![
            CacheValue::from(self.text.as_str()),
            self.x.into(),
            self.y.into(),
            self.size.into(),
            self.font.as_str().into(),
            self.angle.into(),
        ];
        values.extend(self.color.channels().into_iter().map(CacheValue::from));
        Ok(values)
    }
}
