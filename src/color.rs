//! Colors and colormaps
//!
//! A GIF palette is an ordered list of opaque RGB colors; image pixels are
//! indices into one. This module provides the [`Color`] and [`Colormap`]
//! value types plus parsing of color strings used in configuration:
//! - Hex: `#RGB`, `#RRGGBB` (and the alpha forms, whose alpha is ignored)
//! - Functional: `rgb()`, `hsl()`, `hwb()`, `oklch()`
//! - Named: `red`, `blue`, etc.

use std::fmt;
use std::str::FromStr;

use lightningcss::traits::Parse;
use lightningcss::values::color::CssColor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Largest number of entries a GIF colormap can hold.
pub const MAX_COLORS: usize = 256;

/// Error type for color parsing failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColorError {
    /// Input string was empty
    #[error("empty color string")]
    Empty,
    /// Invalid length (must be 3, 4, 6, or 8 hex chars after #)
    #[error("invalid color length {0}, expected 3, 4, 6, or 8")]
    InvalidLength(usize),
    /// Contains non-hex characters
    #[error("invalid hex character '{0}'")]
    InvalidHex(char),
    /// CSS parsing error from lightningcss
    #[error("CSS parse error: {0}")]
    CssParse(String),
}

/// An opaque RGB palette color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Squared euclidean distance in RGB space.
    pub fn distance_sq(self, other: Color) -> u32 {
        let dr = self.r as i32 - other.r as i32;
        let dg = self.g as i32 - other.g as i32;
        let db = self.b as i32 - other.b as i32;
        (dr * dr + dg * dg + db * db) as u32
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Color {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_color(s)
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_color(&s).map_err(serde::de::Error::custom)
    }
}

/// An ordered sequence of at most [`MAX_COLORS`] colors.
///
/// Entries are never reordered once placed: image pixels and merge-time
/// caches refer to colors by position.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Colormap {
    colors: Vec<Color>,
}

impl Colormap {
    pub fn new() -> Self {
        Self { colors: Vec::new() }
    }

    /// Build a colormap from a list of colors, truncated to [`MAX_COLORS`].
    pub fn from_colors(colors: impl IntoIterator<Item = Color>) -> Self {
        Self { colors: colors.into_iter().take(MAX_COLORS).collect() }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.colors.len() >= MAX_COLORS
    }

    pub fn get(&self, index: usize) -> Option<Color> {
        self.colors.get(index).copied()
    }

    /// Append a color, returning its index, or `None` when the map is full.
    pub fn push(&mut self, color: Color) -> Option<u8> {
        if self.is_full() {
            return None;
        }
        self.colors.push(color);
        Some((self.colors.len() - 1) as u8)
    }

    /// Index of the first entry exactly equal to `color`.
    pub fn find(&self, color: Color) -> Option<u8> {
        self.colors.iter().position(|c| *c == color).map(|i| i as u8)
    }

    /// Index of the entry closest to `color` in RGB space.
    pub fn nearest(&self, color: Color) -> Option<u8> {
        self.colors
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| c.distance_sq(color))
            .map(|(i, _)| i as u8)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Color> {
        self.colors.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Color> {
        self.colors.iter_mut()
    }

    pub fn as_slice(&self) -> &[Color] {
        &self.colors
    }
}

impl Serialize for Colormap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.colors.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Colormap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let colors = Vec::<Color>::deserialize(deserializer)?;
        if colors.len() > MAX_COLORS {
            return Err(serde::de::Error::custom(format!(
                "colormap has {} colors, at most {} allowed",
                colors.len(),
                MAX_COLORS
            )));
        }
        Ok(Self { colors })
    }
}

impl std::ops::Index<usize> for Colormap {
    type Output = Color;

    fn index(&self, index: usize) -> &Color {
        &self.colors[index]
    }
}

/// Parse a color string into an opaque RGB color.
///
/// # Examples
///
/// ```
/// use gifmerge::color::{parse_color, Color};
///
/// assert_eq!(parse_color("#F00").unwrap(), Color::new(255, 0, 0));
/// assert_eq!(parse_color("rgb(0, 255, 0)").unwrap(), Color::new(0, 255, 0));
/// assert_eq!(parse_color("blue").unwrap(), Color::new(0, 0, 255));
/// ```
///
/// # Errors
///
/// Returns `ColorError` if the input is invalid or unparseable.
pub fn parse_color(s: &str) -> Result<Color, ColorError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ColorError::Empty);
    }

    // Fast path for hex colors
    if let Some(hex) = s.strip_prefix('#') {
        return parse_hex_color(hex);
    }

    parse_css_color(s)
}

/// Parse the digits of a hex color (#RGB, #RGBA, #RRGGBB, #RRGGBBAA)
fn parse_hex_color(hex: &str) -> Result<Color, ColorError> {
    if let Some(c) = hex.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(ColorError::InvalidHex(c));
    }
    let digits: Vec<u8> = hex.bytes().map(hex_value).collect();

    match digits.len() {
        // Short forms double each digit; alpha is dropped
        3 | 4 => Ok(Color::new(digits[0] * 17, digits[1] * 17, digits[2] * 17)),
        6 | 8 => Ok(Color::new(
            digits[0] * 16 + digits[1],
            digits[2] * 16 + digits[3],
            digits[4] * 16 + digits[5],
        )),
        len => Err(ColorError::InvalidLength(len)),
    }
}

/// Parse a CSS color using lightningcss (rgb, hsl, hwb, oklch, named colors)
fn parse_css_color(s: &str) -> Result<Color, ColorError> {
    use lightningcss::values::color::FloatColor;

    let css_color = CssColor::parse_string(s).map_err(|e| ColorError::CssParse(e.to_string()))?;
    let rgb_color = css_color
        .to_rgb()
        .map_err(|_| ColorError::CssParse("cannot convert color to RGB".to_string()))?;

    match rgb_color {
        CssColor::RGBA(rgba) => Ok(Color::new(rgba.red, rgba.green, rgba.blue)),
        CssColor::Float(float_color) => match float_color.as_ref() {
            FloatColor::RGB(rgb) => Ok(Color::new(
                (rgb.r * 255.0).round() as u8,
                (rgb.g * 255.0).round() as u8,
                (rgb.b * 255.0).round() as u8,
            )),
            _ => Err(ColorError::CssParse("unexpected float color format".to_string())),
        },
        _ => Err(ColorError::CssParse("color conversion did not produce RGB".to_string())),
    }
}

/// Value of an ASCII hex digit already known to be valid.
fn hex_value(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        _ => c - b'A' + 10,
    }
}
