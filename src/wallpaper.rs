//! Wallpaper records and their label settings.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::palette::PaletteColor;
use crate::{Error, Result};

/// Wallpaper identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WallpaperId(pub u64);

impl fmt::Display for WallpaperId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for WallpaperId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Where the time label sits, as fractions of the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PlacementFields")]
pub struct LabelPlacement {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

#[derive(Deserialize)]
struct PlacementFields {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

impl TryFrom<PlacementFields> for LabelPlacement {
    type Error = Error;

    fn try_from(f: PlacementFields) -> Result<Self> {
        Self::new(f.x, f.y, f.width, f.height)
    }
}

fn check_fraction(name: &str, value: f32) -> Result<f32> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(Error::invalid_input(format!(
            "label {} must be within [0, 1], got {}",
            name, value
        )))
    }
}

impl LabelPlacement {
    /// Validate and build a placement. Every fraction must lie in `[0, 1]`.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Result<Self> {
        Ok(Self {
            x: check_fraction("x", x)?,
            y: check_fraction("y", y)?,
            width: check_fraction("width", width)?,
            height: check_fraction("height", height)?,
        })
    }

    /// Left edge fraction.
    pub fn x(&self) -> f32 {
        self.x
    }

    /// Top edge fraction.
    pub fn y(&self) -> f32 {
        self.y
    }

    /// Width fraction.
    pub fn width(&self) -> f32 {
        self.width
    }

    /// Height fraction.
    pub fn height(&self) -> f32 {
        self.height
    }

    /// Pixel box (x, y, width, height) on a canvas of the given size.
    pub fn to_pixels(&self, canvas_width: u32, canvas_height: u32) -> (u32, u32, u32, u32) {
        let px = |f: f32, total: u32| (f * total as f32).round() as u32;
        (
            px(self.x, canvas_width),
            px(self.y, canvas_height),
            px(self.width, canvas_width),
            px(self.height, canvas_height),
        )
    }
}

impl Default for LabelPlacement {
    fn default() -> Self {
        Self {
            x: 0.05,
            y: 0.05,
            width: 0.4,
            height: 0.2,
        }
    }
}

/// A processed wallpaper in the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallpaper {
    /// Identifier
    pub id: WallpaperId,
    /// SHA-256 hex digest of the processed asset, also its storage key
    pub hash: String,
    /// Processed asset size in bytes
    pub size_bytes: u64,
    /// Label box
    pub placement: LabelPlacement,
    /// Label text colour
    pub text_color: PaletteColor,
    /// Label shadow colour
    pub shadow_color: PaletteColor,
}

impl Wallpaper {
    /// Asset filename under the asset directory.
    pub fn filename(&self, extension: &str) -> String {
        format!("{}.{}", self.hash, extension)
    }

    /// Apply `update`, validating every field before touching any.
    pub fn apply(&mut self, update: &LabelUpdate) -> Result<()> {
        let placement = LabelPlacement::new(
            update.x.unwrap_or(self.placement.x),
            update.y.unwrap_or(self.placement.y),
            update.width.unwrap_or(self.placement.width),
            update.height.unwrap_or(self.placement.height),
        )?;
        let text_color = match &update.text_color {
            Some(c) => c.parse()?,
            None => self.text_color,
        };
        let shadow_color = match &update.shadow_color {
            Some(c) => c.parse()?,
            None => self.shadow_color,
        };

        self.placement = placement;
        self.text_color = text_color;
        self.shadow_color = shadow_color;
        Ok(())
    }
}

/// Partial label settings change. Absent fields keep their current value.
///
/// Colours are names (`"black"`, `"red"`, ...) so the update can come
/// straight from a request body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabelUpdate {
    /// New left edge fraction
    #[serde(default)]
    pub x: Option<f32>,
    /// New top edge fraction
    #[serde(default)]
    pub y: Option<f32>,
    /// New width fraction
    #[serde(default)]
    pub width: Option<f32>,
    /// New height fraction
    #[serde(default)]
    pub height: Option<f32>,
    /// New text colour name
    #[serde(default)]
    pub text_color: Option<String>,
    /// New shadow colour name
    #[serde(default)]
    pub shadow_color: Option<String>,
}
