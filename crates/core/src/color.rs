//! Annotation colors
//!
//! Colors are structured values everywhere in memory. The packed ARGB
//! integer form exists only at the persistence boundary, see
//! [`Color::to_argb`] and [`Color::from_argb`].

use serde::{Deserialize, Serialize};

/// ARGB color with 8 bits per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub a: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    /// Create a new color
    pub const fn new(a: u8, r: u8, g: u8, b: u8) -> Self {
        Self { a, r, g, b }
    }

    /// Create an opaque color
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { a: 255, r, g, b }
    }

    /// Same color with a different alpha channel
    pub const fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    /// Pack into a `0xAARRGGBB` integer for storage
    pub const fn to_argb(self) -> u32 {
        (self.a as u32) << 24 | (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }

    /// Unpack a `0xAARRGGBB` integer read from storage
    pub const fn from_argb(argb: u32) -> Self {
        Self {
            a: (argb >> 24) as u8,
            r: (argb >> 16) as u8,
            g: (argb >> 8) as u8,
            b: argb as u8,
        }
    }

    /// Convert to normalized RGBA values (0.0 to 1.0)
    pub fn to_normalized(&self) -> (f32, f32, f32, f32) {
        (
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        )
    }
}

/// Default ink palette
impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const RED: Color = Color::rgb(229, 57, 53);
    pub const BLUE: Color = Color::rgb(30, 136, 229);
    pub const GREEN: Color = Color::rgb(67, 160, 71);
    /// Translucent yellow used by the highlighter tool
    pub const HIGHLIGHT_YELLOW: Color = Color::new(0x66, 255, 235, 59);
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}
