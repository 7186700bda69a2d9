//! The canvas engine: an owned RGBA raster plus the primitive
//! operations the pipeline composes (decode, encode, copy, resample,
//! rotate, draw).
//!
//! Pixel work is delegated to the `image` and `imageproc` crates. A
//! [`Canvas`] additionally carries two engine flags:
//!
//! - `alpha_blending`: when set, drawing composites over existing pixels;
//!   when clear, drawn pixels (including their alpha) replace them.
//! - `save_alpha`: when set, PNG output keeps the alpha channel.
//!
//! Freshly created or replaced canvases start with blending off and
//! alpha saving on.

use ab_glyph::{Font, FontArc, Glyph, GlyphId, OutlinedGlyph, PxScale, Rect, ScaleFont, point};
use image::buffer::ConvertBuffer;
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Pixel, Rgba, RgbImage, imageops};
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};

use crate::color::Color;
use crate::config::ResampleFilter;
use crate::types::{Dimensions, Format, PipelineError, RgbaImage};

/// Text sizes are given in points; the engine renders at 96 dpi.
const PIXELS_PER_POINT: f32 = 96.0 / 72.0;

/// An owned, mutable raster buffer.
#[derive(Debug, Clone)]
pub struct Canvas {
    image: RgbaImage,
    alpha_blending: bool,
    save_alpha: bool,
}

impl Canvas {
    /// Wrap an existing RGBA image.
    #[must_use]
    pub const fn from_image(image: RgbaImage) -> Self {
        Self {
            image,
            alpha_blending: false,
            save_alpha: true,
        }
    }

    /// Create an opaque black canvas.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Engine`] if either dimension is zero.
    pub fn blank(width: u32, height: u32) -> Result<Self, PipelineError> {
        if width == 0 || height == 0 {
            return Err(PipelineError::Engine(format!(
                "cannot create a {width}x{height} canvas"
            )));
        }
        Ok(Self::from_image(RgbaImage::from_pixel(
            width,
            height,
            Rgba([0, 0, 0, 255]),
        )))
    }

    /// Decode encoded image bytes of the given format.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Engine`] if `bytes` is empty and
    /// [`PipelineError::ImageCodec`] if decoding fails.
    pub fn decode(bytes: &[u8], format: Format) -> Result<Self, PipelineError> {
        if bytes.is_empty() {
            return Err(PipelineError::Engine("input image data is empty".into()));
        }
        let image = image::load_from_memory_with_format(bytes, format.image_format())?;
        Ok(Self::from_image(image.to_rgba8()))
    }

    /// Encode to `format`. `jpeg_quality` only applies to JPEG.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ImageCodec`] if the encoder fails.
    pub fn encode(&self, format: Format, jpeg_quality: u8) -> Result<Vec<u8>, PipelineError> {
        let (width, height) = self.image.dimensions();
        let mut buf = Vec::new();
        match format {
            Format::Png if self.save_alpha => {
                PngEncoder::new(&mut buf).write_image(
                    self.image.as_raw(),
                    width,
                    height,
                    ExtendedColorType::Rgba8,
                )?;
            }
            Format::Png => {
                let rgb: RgbImage = self.image.convert();
                PngEncoder::new(&mut buf).write_image(
                    rgb.as_raw(),
                    width,
                    height,
                    ExtendedColorType::Rgb8,
                )?;
            }
            Format::Jpg => {
                let rgb: RgbImage = self.image.convert();
                JpegEncoder::new_with_quality(&mut buf, jpeg_quality).write_image(
                    rgb.as_raw(),
                    width,
                    height,
                    ExtendedColorType::Rgb8,
                )?;
            }
            Format::Gif => {
                let mut encoder = GifEncoder::new(&mut buf);
                encoder.encode(self.image.as_raw(), width, height, ExtendedColorType::Rgba8)?;
            }
        }
        Ok(buf)
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Current dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width(), self.height())
    }

    /// The underlying pixels.
    #[must_use]
    pub const fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Consume the canvas and return its pixels.
    #[must_use]
    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Whether drawing composites over existing pixels.
    #[must_use]
    pub const fn alpha_blending(&self) -> bool {
        self.alpha_blending
    }

    /// Enable or disable compositing for subsequent drawing.
    pub const fn set_alpha_blending(&mut self, enabled: bool) {
        self.alpha_blending = enabled;
    }

    /// Whether PNG output keeps the alpha channel.
    #[must_use]
    pub const fn save_alpha(&self) -> bool {
        self.save_alpha
    }

    /// Keep or drop the alpha channel in PNG output.
    pub const fn set_save_alpha(&mut self, enabled: bool) {
        self.save_alpha = enabled;
    }

    /// Restore the flags a fresh canvas starts with.
    pub const fn reset_flags(&mut self) {
        self.alpha_blending = false;
        self.save_alpha = true;
    }

    /// Copy a `width`×`height` region starting at (`x`, `y`) into a new canvas.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Engine`] if the region is empty or does
    /// not lie entirely inside this canvas.
    pub fn copy_region(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Self, PipelineError> {
        self.check_region(x, y, width, height)?;
        let region = imageops::crop_imm(&self.image, x, y, width, height).to_image();
        Ok(Self::from_image(region))
    }

    /// Resample the source region `(x, y, width, height)` into a new
    /// canvas of `target` size.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Engine`] if the source region is invalid
    /// or the target has a zero dimension.
    pub fn resample(
        &self,
        (x, y, width, height): (u32, u32, u32, u32),
        target: Dimensions,
        filter: ResampleFilter,
    ) -> Result<Self, PipelineError> {
        self.check_region(x, y, width, height)?;
        if target.width == 0 || target.height == 0 {
            return Err(PipelineError::Engine(format!(
                "cannot resample into a {target} canvas"
            )));
        }
        let filter = filter.to_image_filter();
        let resized = if (x, y, width, height) == (0, 0, self.width(), self.height()) {
            imageops::resize(&self.image, target.width, target.height, filter)
        } else {
            let region = imageops::crop_imm(&self.image, x, y, width, height).to_image();
            imageops::resize(&region, target.width, target.height, filter)
        };
        Ok(Self::from_image(resized))
    }

    /// Rotate counter-clockwise by `degrees`, expanding the bounding box.
    ///
    /// Exposed background is filled with `background`. Quarter turns are
    /// exact; other angles are sampled bilinearly.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn rotate(&self, degrees: f64, background: Color) -> Self {
        let turn = degrees.rem_euclid(360.0);
        let exact = match turn {
            t if t == 0.0 => Some(self.image.clone()),
            t if t == 90.0 => Some(imageops::rotate270(&self.image)),
            t if t == 180.0 => Some(imageops::rotate180(&self.image)),
            t if t == 270.0 => Some(imageops::rotate90(&self.image)),
            _ => None,
        };
        if let Some(image) = exact {
            return Self::from_image(image);
        }

        let fill = background.to_rgba();
        let (width, height) = (f64::from(self.width()), f64::from(self.height()));
        let (sin, cos) = turn.to_radians().sin_cos();
        let new_width = bounding_extent(width.mul_add(cos.abs(), height * sin.abs()));
        let new_height = bounding_extent(width.mul_add(sin.abs(), height * cos.abs()));

        // Pad into a square large enough for both the source and the
        // rotated result, rotate about its center, then cut out the box.
        let side = self.width().max(self.height()).max(new_width).max(new_height);
        let mut padded = RgbaImage::from_pixel(side, side, fill);
        imageops::replace(
            &mut padded,
            &self.image,
            i64::from((side - self.width()) / 2),
            i64::from((side - self.height()) / 2),
        );
        // imageproc rotates clockwise.
        #[allow(clippy::cast_possible_truncation)]
        let theta = -turn.to_radians() as f32;
        let rotated = rotate_about_center(&padded, theta, Interpolation::Bilinear, fill);
        let boxed = imageops::crop_imm(
            &rotated,
            (side - new_width) / 2,
            (side - new_height) / 2,
            new_width,
            new_height,
        )
        .to_image();
        Self::from_image(boxed)
    }

    /// Draw a line segment between two points.
    #[allow(clippy::cast_precision_loss)]
    pub fn draw_line(&mut self, from: (i32, i32), to: (i32, i32), color: Color) {
        let mut target = self.target();
        imageproc::drawing::draw_line_segment_mut(
            &mut target,
            (from.0 as f32, from.1 as f32),
            (to.0 as f32, to.1 as f32),
            color.to_rgba(),
        );
    }

    /// Fill the rectangle spanning (`x1`, `y1`) to (`x2`, `y2`), both
    /// corners inclusive.
    pub fn fill_rect(&mut self, (x1, y1): (i32, i32), (x2, y2): (i32, i32), color: Color) {
        let (left, right) = (x1.min(x2), x1.max(x2));
        let (top, bottom) = (y1.min(y2), y1.max(y2));
        let width = right.abs_diff(left) + 1;
        let height = bottom.abs_diff(top) + 1;
        let rect = imageproc::rect::Rect::at(left, top).of_size(width, height);
        let mut target = self.target();
        imageproc::drawing::draw_filled_rect_mut(&mut target, rect, color.to_rgba());
    }

    /// Render `text` with its baseline starting at `origin`, rotated
    /// counter-clockwise by `angle` degrees around that point.
    ///
    /// Text is always composited over the canvas regardless of the
    /// blending flag. Glyphs are rasterized one at a time and only where
    /// they land on the canvas.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `size` is not in
    /// `(0, MAX_TEXT_SIZE]` or `angle` is not finite.
    pub fn draw_text(
        &mut self,
        font: &FontArc,
        size: f32,
        angle: f64,
        origin: (i32, i32),
        color: Color,
        text: &str,
    ) -> Result<(), PipelineError> {
        check_text_params(size, angle)?;
        let ink = color.to_rgba();
        let placement = Placement::new(origin, angle);
        let (width, height) = (self.width(), self.height());

        for glyph in layout_glyphs(font, PxScale::from(size * PIXELS_PER_POINT), text) {
            let Some(outlined) = font.outline_glyph(glyph) else {
                continue;
            };
            let Some(region) = placement.canvas_region(outlined.px_bounds(), width, height) else {
                continue;
            };
            let coverage = GlyphCoverage::rasterize(&outlined);
            for y in region.top..region.bottom {
                for x in region.left..region.right {
                    let (tx, ty) = placement.to_text(f64::from(x) + 0.5, f64::from(y) + 0.5);
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let alpha = (coverage.sample(tx, ty).clamp(0.0, 1.0) * f32::from(ink[3])).round() as u8;
                    if alpha > 0 {
                        self.image
                            .get_pixel_mut(x, y)
                            .blend(&Rgba([ink[0], ink[1], ink[2], alpha]));
                    }
                }
            }
        }
        Ok(())
    }

    /// Copy `top` onto this canvas with its top-left corner at (`x`, `y`).
    ///
    /// With alpha blending enabled `top` is composited; otherwise its
    /// pixels replace the destination. Parts outside this canvas are
    /// clipped.
    pub fn overlay(&mut self, top: &Self, x: i64, y: i64) {
        if self.alpha_blending {
            imageops::overlay(&mut self.image, &top.image, x, y);
        } else {
            imageops::replace(&mut self.image, &top.image, x, y);
        }
    }

    fn check_region(&self, x: u32, y: u32, width: u32, height: u32) -> Result<(), PipelineError> {
        let fits = |start: u32, len: u32, limit: u32| {
            len > 0 && start.checked_add(len).is_some_and(|end| end <= limit)
        };
        if fits(x, width, self.width()) && fits(y, height, self.height()) {
            Ok(())
        } else {
            Err(PipelineError::Engine(format!(
                "region {width}x{height} at ({x}, {y}) is outside the {} canvas",
                self.dimensions()
            )))
        }
    }

    const fn target(&mut self) -> DrawTarget<'_> {
        DrawTarget {
            image: &mut self.image,
            blend: self.alpha_blending,
        }
    }
}

/// Bounding-box edge length for a rotated extent.
///
/// Trims floating-point noise so e.g. a 45° turn of an exact extent does
/// not gain a spurious pixel.
// Non-negative and bounded by the source diagonal.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn bounding_extent(extent: f64) -> u32 {
    (extent - 1e-6).ceil().max(1.0) as u32
}

/// Largest accepted text size, in points.
pub const MAX_TEXT_SIZE: f32 = 1000.0;

pub(crate) fn check_text_params(size: f32, angle: f64) -> Result<(), PipelineError> {
    if !(size.is_finite() && size > 0.0 && size <= MAX_TEXT_SIZE) {
        return Err(PipelineError::InvalidConfig(format!(
            "text size must be in (0, {MAX_TEXT_SIZE}] points, got {size}"
        )));
    }
    if !angle.is_finite() {
        return Err(PipelineError::InvalidConfig(format!(
            "text angle must be finite, got {angle}"
        )));
    }
    Ok(())
}

/// Lay out a single line of glyphs along a baseline at y = 0.
fn layout_glyphs(font: &FontArc, scale: PxScale, text: &str) -> Vec<Glyph> {
    let scaled = font.as_scaled(scale);
    let mut glyphs = Vec::new();
    let mut cursor = 0.0f32;
    let mut previous: Option<GlyphId> = None;
    for ch in text.chars() {
        let id = scaled.glyph_id(ch);
        if let Some(prev) = previous {
            cursor += scaled.kern(prev, id);
        }
        glyphs.push(id.with_scale_and_position(scale, point(cursor, 0.0)));
        cursor += scaled.h_advance(id);
        previous = Some(id);
    }
    glyphs
}

/// Maps between text space (baseline along +x, y down, origin at the
/// text origin) and canvas space.
struct Placement {
    origin: (f64, f64),
    sin: f64,
    cos: f64,
}

/// Half-open pixel rectangle on the canvas.
struct Region {
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
}

impl Placement {
    fn new(origin: (i32, i32), angle: f64) -> Self {
        let (sin, cos) = angle.to_radians().sin_cos();
        Self {
            origin: (f64::from(origin.0), f64::from(origin.1)),
            sin,
            cos,
        }
    }

    fn to_canvas(&self, tx: f64, ty: f64) -> (f64, f64) {
        (
            tx.mul_add(self.cos, ty * self.sin) + self.origin.0,
            ty.mul_add(self.cos, -tx * self.sin) + self.origin.1,
        )
    }

    fn to_text(&self, x: f64, y: f64) -> (f64, f64) {
        let (dx, dy) = (x - self.origin.0, y - self.origin.1);
        (dx.mul_add(self.cos, -dy * self.sin), dx.mul_add(self.sin, dy * self.cos))
    }

    /// Canvas pixels covered by a text-space box, clipped to the canvas.
    fn canvas_region(&self, bounds: Rect, width: u32, height: u32) -> Option<Region> {
        let corners = [
            (bounds.min.x, bounds.min.y),
            (bounds.max.x, bounds.min.y),
            (bounds.min.x, bounds.max.y),
            (bounds.max.x, bounds.max.y),
        ]
        .map(|(x, y)| self.to_canvas(f64::from(x), f64::from(y)));
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (x, y) in corners {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        let left = min_x.floor().max(0.0);
        let top = min_y.floor().max(0.0);
        let right = max_x.ceil().min(f64::from(width));
        let bottom = max_y.ceil().min(f64::from(height));
        if left >= right || top >= bottom {
            return None;
        }
        // Clamped to the canvas above.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let region = Region {
            left: left as u32,
            top: top as u32,
            right: right as u32,
            bottom: bottom as u32,
        };
        Some(region)
    }
}

/// Coverage of one outlined glyph over its pixel bounds in text space.
struct GlyphCoverage {
    left: f64,
    top: f64,
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl GlyphCoverage {
    fn rasterize(outlined: &OutlinedGlyph) -> Self {
        let bounds = outlined.px_bounds();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (width, height) = (bounds.width() as u32, bounds.height() as u32);
        let mut values = vec![0.0; width as usize * height as usize];
        outlined.draw(|x, y, coverage| {
            if x < width
                && let Some(value) = values.get_mut(y as usize * width as usize + x as usize)
            {
                *value = coverage;
            }
        });
        Self {
            left: f64::from(bounds.min.x),
            top: f64::from(bounds.min.y),
            width,
            height,
            values,
        }
    }

    fn at(&self, x: i64, y: i64) -> f32 {
        let (Ok(x), Ok(y)) = (u32::try_from(x), u32::try_from(y)) else {
            return 0.0;
        };
        if x >= self.width || y >= self.height {
            return 0.0;
        }
        self.values
            .get(y as usize * self.width as usize + x as usize)
            .copied()
            .unwrap_or(0.0)
    }

    /// Bilinear coverage at a text-space point.
    #[allow(clippy::cast_possible_truncation)]
    fn sample(&self, tx: f64, ty: f64) -> f32 {
        let u = tx - self.left - 0.5;
        let v = ty - self.top - 0.5;
        let (u0, v0) = (u.floor(), v.floor());
        let (fu, fv) = ((u - u0) as f32, (v - v0) as f32);
        let (x, y) = (u0 as i64, v0 as i64);
        let upper = self.at(x, y).mul_add(1.0 - fu, self.at(x + 1, y) * fu);
        let lower = self.at(x, y + 1).mul_add(1.0 - fu, self.at(x + 1, y + 1) * fu);
        upper.mul_add(1.0 - fv, lower * fv)
    }
}

/// Adapts a canvas to `imageproc`'s drawing functions, honoring the
/// blending flag per pixel.
struct DrawTarget<'a> {
    image: &'a mut RgbaImage,
    blend: bool,
}

impl imageproc::drawing::Canvas for DrawTarget<'_> {
    type Pixel = Rgba<u8>;

    fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn get_pixel(&self, x: u32, y: u32) -> Self::Pixel {
        *self.image.get_pixel(x, y)
    }

    fn draw_pixel(&mut self, x: u32, y: u32, color: Self::Pixel) {
        if self.blend {
            self.image.get_pixel_mut(x, y).blend(&color);
        } else {
            self.image.put_pixel(x, y, color);
        }
    }
}
