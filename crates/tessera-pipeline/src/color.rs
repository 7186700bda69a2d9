//! Color parsing.
//!
//! Accepts the textual forms used throughout operation configuration:
//!
//! - `#rrggbb` and `#rrggbbaa` (hex, case-insensitive)
//! - `rgb(r, g, b)` with decimal channels
//! - `rgba(r, g, b, a)` with a fractional alpha between 0.0 and 1.0
//!
//! Alpha is stored in the canvas engine's half range: 0 is opaque and
//! [`MAX_ALPHA`] (127) is fully transparent. Hex alpha is halved and
//! `rgba()` alpha is scaled by 127, so every grammar lands in that range.

use std::fmt;
use std::str::FromStr;

use image::Rgba;
use serde::{Deserialize, Serialize};

/// Largest alpha value accepted by the canvas engine (fully transparent).
pub const MAX_ALPHA: u8 = 127;

/// An RGB color with optional engine-range alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    /// Red channel, 0-255.
    pub red: u8,
    /// Green channel, 0-255.
    pub green: u8,
    /// Blue channel, 0-255.
    pub blue: u8,
    /// Alpha in 0..=127, `None` for an opaque three-component color.
    pub alpha: Option<u8>,
}

impl Color {
    /// Opaque black, `#000000`.
    pub const BLACK: Self = Self::rgb(0, 0, 0);

    /// Opaque white, `#ffffff`.
    pub const WHITE: Self = Self::rgb(255, 255, 255);

    /// An opaque three-component color.
    #[must_use]
    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self {
            red,
            green,
            blue,
            alpha: None,
        }
    }

    /// A four-component color. `alpha` is clamped to [`MAX_ALPHA`].
    #[must_use]
    pub const fn rgba(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        let alpha = if alpha > MAX_ALPHA { MAX_ALPHA } else { alpha };
        Self {
            red,
            green,
            blue,
            alpha: Some(alpha),
        }
    }

    /// Parse a color string.
    ///
    /// Grammars are tried in order: hex, `rgb()`, `rgba()`. Surrounding
    /// whitespace is ignored and function names are case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns [`ColorParseError`] if the text matches none of them.
    pub fn parse(text: &str) -> Result<Self, ColorParseError> {
        let trimmed = text.trim();
        parse_hex(trimmed)
            .or_else(|| parse_rgb(trimmed))
            .or_else(|| parse_rgba(trimmed))
            .ok_or_else(|| ColorParseError {
                input: text.to_owned(),
            })
    }

    /// The channel values in order: three for RGB, four for RGBA.
    #[must_use]
    pub fn channels(self) -> Vec<u8> {
        let mut channels = vec![self.red, self.green, self.blue];
        channels.extend(self.alpha);
        channels
    }

    /// Convert to an 8-bit straight-alpha pixel.
    ///
    /// Engine alpha 0 maps to 255 (opaque), 127 maps to 0 (transparent).
    #[must_use]
    pub fn to_rgba(self) -> Rgba<u8> {
        let alpha = u16::from(self.alpha.unwrap_or(0).min(MAX_ALPHA));
        let opacity = 255 - alpha * 255 / u16::from(MAX_ALPHA);
        Rgba([
            self.red,
            self.green,
            self.blue,
            u8::try_from(opacity).unwrap_or(u8::MAX),
        ])
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)?;
        if let Some(alpha) = self.alpha {
            // Written back in the 0-255 hex range so Display round-trips.
            write!(f, "{:02x}", u16::from(alpha) * 2)?;
        }
        Ok(())
    }
}

impl FromStr for Color {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// The text matched none of the accepted color grammars.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid color format: {input:?}")]
pub struct ColorParseError {
    input: String,
}

impl ColorParseError {
    /// The rejected input.
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }
}

fn parse_hex(text: &str) -> Option<Color> {
    let digits = text.strip_prefix('#')?;
    if !matches!(digits.len(), 6 | 8) || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let byte = |at: usize| u8::from_str_radix(&digits[at..at + 2], 16).ok();

    let mut color = Color::rgb(byte(0)?, byte(2)?, byte(4)?);
    if digits.len() == 8 {
        color.alpha = Some(byte(6)? / 2);
    }
    Some(color)
}

fn parse_rgb(text: &str) -> Option<Color> {
    let args = call_arguments(text, "rgb")?;
    let [r, g, b] = args.as_slice() else {
        return None;
    };
    Some(Color::rgb(channel(r)?, channel(g)?, channel(b)?))
}

fn parse_rgba(text: &str) -> Option<Color> {
    let args = call_arguments(text, "rgba")?;
    let [r, g, b, a] = args.as_slice() else {
        return None;
    };
    Some(Color::rgba(channel(r)?, channel(g)?, channel(b)?, alpha(a)?))
}

/// Split `name(a, b, ...)` into trimmed arguments.
fn call_arguments<'a>(text: &'a str, name: &str) -> Option<Vec<&'a str>> {
    let (head, rest) = text.split_at(text.find('(')?);
    if !head.eq_ignore_ascii_case(name) {
        return None;
    }
    let inner = rest.strip_prefix('(')?.strip_suffix(')')?;
    Some(inner.split(',').map(str::trim).collect())
}

/// One to three decimal digits, clamped to 255.
fn channel(text: &str) -> Option<u8> {
    if text.is_empty() || text.len() > 3 || !is_digits(text) {
        return None;
    }
    let value: u16 = text.parse().ok()?;
    Some(u8::try_from(value.min(255)).unwrap_or(u8::MAX))
}

/// `\d+(\.\d+)?`, clamped to 1.0 and scaled into 0..=127.
fn alpha(text: &str) -> Option<u8> {
    let valid = match text.split_once('.') {
        Some((int, frac)) => is_digits(int) && is_digits(frac),
        None => is_digits(text),
    };
    if !valid {
        return None;
    }
    let value: f64 = text.parse().ok()?;
    let scaled = (value.min(1.0) * f64::from(MAX_ALPHA)).floor();
    // `scaled` is a whole number in 0.0..=127.0.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some(scaled as u8)
}

fn is_digits(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}
