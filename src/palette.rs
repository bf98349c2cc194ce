//! Panel colours and the device types that can show them.
//!
//! Each panel accepts a 4-bit code per pixel. The codes are not contiguous on
//! every controller (the Spectra 6 skips code 4), so a palette is a table of
//! `(colour, code)` pairs rather than a plain list.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// A colour an e-paper panel can physically show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaletteColor {
    /// Black ink
    Black,
    /// Paper white
    White,
    /// Yellow pigment
    Yellow,
    /// Red pigment
    Red,
    /// Blue pigment
    Blue,
    /// Green pigment
    Green,
    /// Orange pigment (7-colour ACeP panels only)
    Orange,
}

const RGB_TABLE: [(PaletteColor, [u8; 3]); 7] = [
    (PaletteColor::Black, [0, 0, 0]),
    (PaletteColor::White, [255, 255, 255]),
    (PaletteColor::Yellow, [255, 255, 0]),
    (PaletteColor::Red, [255, 0, 0]),
    (PaletteColor::Blue, [0, 0, 255]),
    (PaletteColor::Green, [0, 255, 0]),
    (PaletteColor::Orange, [255, 128, 0]),
];

impl PaletteColor {
    /// All colours, in declaration order.
    pub const ALL: [PaletteColor; 7] = [
        PaletteColor::Black,
        PaletteColor::White,
        PaletteColor::Yellow,
        PaletteColor::Red,
        PaletteColor::Blue,
        PaletteColor::Green,
        PaletteColor::Orange,
    ];

    /// sRGB value used when compositing and quantizing.
    pub const fn rgb(self) -> [u8; 3] {
        RGB_TABLE[self as usize].1
    }

    /// Lowercase name, as accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            PaletteColor::Black => "black",
            PaletteColor::White => "white",
            PaletteColor::Yellow => "yellow",
            PaletteColor::Red => "red",
            PaletteColor::Blue => "blue",
            PaletteColor::Green => "green",
            PaletteColor::Orange => "orange",
        }
    }
}

impl fmt::Display for PaletteColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PaletteColor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        PaletteColor::ALL
            .into_iter()
            .find(|c| c.name() == lower)
            .ok_or_else(|| Error::invalid_input(format!("unsupported palette colour '{}'", s)))
    }
}

/// One palette slot: the colour and the nibble the controller expects for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaletteEntry {
    /// Colour shown by the panel
    pub color: PaletteColor,
    /// 4-bit controller code
    pub code: u8,
}

const fn entry(color: PaletteColor, code: u8) -> PaletteEntry {
    PaletteEntry { color, code }
}

const SPECTRA6: [PaletteEntry; 6] = [
    entry(PaletteColor::Black, 0x0),
    entry(PaletteColor::White, 0x1),
    entry(PaletteColor::Yellow, 0x2),
    entry(PaletteColor::Red, 0x3),
    entry(PaletteColor::Blue, 0x5),
    entry(PaletteColor::Green, 0x6),
];

const ACEP7: [PaletteEntry; 7] = [
    entry(PaletteColor::Black, 0x0),
    entry(PaletteColor::White, 0x1),
    entry(PaletteColor::Green, 0x2),
    entry(PaletteColor::Blue, 0x3),
    entry(PaletteColor::Red, 0x4),
    entry(PaletteColor::Yellow, 0x5),
    entry(PaletteColor::Orange, 0x6),
];

/// Fixed target palette for quantization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    entries: &'static [PaletteEntry],
}

impl Palette {
    /// Palette entries in lookup order.
    pub fn entries(&self) -> &'static [PaletteEntry] {
        self.entries
    }

    /// Number of colours.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false for the built-in palettes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Controller code for `color`, if the panel can show it.
    pub fn code_of(&self, color: PaletteColor) -> Option<u8> {
        self.entries
            .iter()
            .find(|e| e.color == color)
            .map(|e| e.code)
    }

    /// Colour for a controller code.
    pub fn color_of(&self, code: u8) -> Option<PaletteColor> {
        self.entries
            .iter()
            .find(|e| e.code == code)
            .map(|e| e.color)
    }

    /// Whether the panel can show `color`.
    pub fn supports(&self, color: PaletteColor) -> bool {
        self.code_of(color).is_some()
    }

    /// Entry whose colour is exactly `rgb`.
    pub fn exact(&self, rgb: [u8; 3]) -> Option<PaletteEntry> {
        self.entries.iter().find(|e| e.color.rgb() == rgb).copied()
    }

    /// Entry closest to `rgb` by squared Euclidean distance.
    ///
    /// Ties resolve to the earlier entry.
    pub fn nearest(&self, rgb: [u8; 3]) -> PaletteEntry {
        let mut best = self.entries[0];
        let mut best_dist = u32::MAX;
        for e in self.entries {
            let p = e.color.rgb();
            let dist: u32 = (0..3)
                .map(|c| {
                    let d = i32::from(rgb[c]) - i32::from(p[c]);
                    (d * d) as u32
                })
                .sum();
            if dist < best_dist {
                best = *e;
                best_dist = dist;
            }
        }
        best
    }
}

/// Panel models in the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    /// 7.3" Spectra 6 panel (six colours)
    #[default]
    Spectra6,
    /// 7.3" ACeP panel (seven colours including orange)
    Acep7,
}

impl DeviceType {
    /// Native panel resolution as (width, height), landscape.
    pub fn native_size(self) -> (u32, u32) {
        match self {
            DeviceType::Spectra6 | DeviceType::Acep7 => (crate::PANEL_WIDTH, crate::PANEL_HEIGHT),
        }
    }

    /// Colours supported by this panel.
    pub fn palette(self) -> Palette {
        match self {
            DeviceType::Spectra6 => Palette { entries: &SPECTRA6 },
            DeviceType::Acep7 => Palette { entries: &ACEP7 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_lookup_is_total() {
        for color in PaletteColor::ALL {
            let name = color.name();
            assert_eq!(name.parse::<PaletteColor>().unwrap(), color);
        }
        assert_eq!(PaletteColor::Orange.rgb(), [255, 128, 0]);
        assert_eq!(PaletteColor::Blue.rgb(), [0, 0, 255]);
    }

    #[test]
    fn test_parse_rejects_unknown_colour() {
        assert!(matches!(
            "magenta".parse::<PaletteColor>(),
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(" Red ".parse::<PaletteColor>().unwrap(), PaletteColor::Red);
    }

    #[test]
    fn test_spectra6_skips_code_four() {
        let palette = DeviceType::Spectra6.palette();
        assert_eq!(palette.len(), 6);
        assert_eq!(palette.code_of(PaletteColor::Blue), Some(5));
        assert_eq!(palette.color_of(4), None);
        assert!(!palette.supports(PaletteColor::Orange));
    }

    #[test]
    fn test_codes_fit_in_a_nibble() {
        for device in [DeviceType::Spectra6, DeviceType::Acep7] {
            assert!(device.palette().entries().iter().all(|e| e.code <= 0x0F));
        }
    }

    #[test]
    fn test_exact_only_matches_supported_colours() {
        let acep = DeviceType::Acep7.palette();
        assert_eq!(acep.exact([255, 128, 0]).map(|e| e.code), Some(0x6));
        assert_eq!(acep.exact([255, 128, 1]), None);
        assert_eq!(DeviceType::Spectra6.palette().exact([255, 128, 0]), None);
    }

    #[test]
    fn test_nearest() {
        let palette = DeviceType::Acep7.palette();
        assert_eq!(palette.nearest([250, 120, 10]).color, PaletteColor::Orange);
        assert_eq!(palette.nearest([10, 10, 10]).color, PaletteColor::Black);
        let palette = DeviceType::Spectra6.palette();
        assert_eq!(palette.nearest([250, 120, 10]).color, PaletteColor::Red);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&PaletteColor::Yellow).unwrap();
        assert_eq!(json, "\"yellow\"");
        let device: DeviceType = serde_json::from_str("\"acep7\"").unwrap();
        assert_eq!(device, DeviceType::Acep7);
    }
}
