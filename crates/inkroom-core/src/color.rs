//! RGB colors as they travel on the wire (`#rrggbb`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Color parsing errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ColorError {
    #[error("Color must start with '#': {0}")]
    MissingHash(String),
    #[error("Invalid hex color: {0}")]
    InvalidHex(String),
}

/// An opaque 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Pixel value with full alpha.
    pub fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, 255]
    }

    /// A darker shade, used for note outlines in exports.
    pub fn darken(self, factor: f32) -> Self {
        let scale = |c: u8| (c as f32 * (1.0 - factor).clamp(0.0, 1.0)).round() as u8;
        Self::new(scale(self.r), scale(self.g), scale(self.b))
    }
}

impl Default for Rgb {
    fn default() -> Self {
        Self::BLACK
    }
}

impl FromStr for Rgb {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .trim()
            .strip_prefix('#')
            .ok_or_else(|| ColorError::MissingHash(s.to_string()))?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ColorError::InvalidHex(s.to_string()));
        }

        let channel = |digits: &str| {
            u8::from_str_radix(digits, 16).map_err(|_| ColorError::InvalidHex(s.to_string()))
        };

        match hex.len() {
            // Short form: #abc == #aabbcc
            3 => {
                let expand = |i: usize| channel(hex[i..=i].repeat(2).as_str());
                Ok(Self::new(expand(0)?, expand(1)?, expand(2)?))
            }
            6 => Ok(Self::new(channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?)),
            _ => Err(ColorError::InvalidHex(s.to_string())),
        }
    }
}

impl TryFrom<String> for Rgb {
    type Error = ColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgb> for String {
    fn from(color: Rgb) -> Self {
        color.to_string()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}
