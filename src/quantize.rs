//! Floyd–Steinberg quantization onto a fixed panel palette.
//!
//! The quantizer works in two passes:
//!
//! 1. **Error diffusion.** Every channel is independently snapped to one of
//!    `levels` evenly spaced values in `[0, 1]`, in raster order, pushing the
//!    rounding error onto the unvisited neighbours:
//!
//!    ```text
//!              *    7/16
//!      3/16  5/16   1/16
//!    ```
//!
//!    Neighbours outside the canvas are skipped, so edge pixels simply lose
//!    that share of the error.
//!
//! 2. **Palette reduction.** Each channel is renormalized by its maximum after
//!    diffusion, scaled back to 8 bits, and every pixel is mapped to its
//!    nearest palette entry.
//!
//! A channel that never rises above zero (an all-black canvas, or a canvas
//! with no red at all) has nothing to normalize by and is left at zero.
//!
//! Pixels that already hold an exact palette colour are passed through both
//! passes untouched: they neither take on nor hand out diffusion error. At two
//! levels a per-channel snap cannot represent a mid value such as orange's
//! green channel, so without this a palette-exact canvas would not survive.

use image::RgbImage;

use crate::palette::{Palette, PaletteColor};
use crate::{Error, Result};

/// Right, bottom-left, bottom, bottom-right.
const KERNEL: [(isize, usize, f32); 4] = [
    (1, 0, 7.0 / 16.0),
    (-1, 1, 3.0 / 16.0),
    (0, 1, 5.0 / 16.0),
    (1, 1, 1.0 / 16.0),
];

/// An image whose pixels are 4-bit panel codes rather than RGB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedImage {
    width: u32,
    height: u32,
    codes: Vec<u8>,
}

impl IndexedImage {
    /// Wrap raw codes laid out in raster order.
    pub fn from_codes(width: u32, height: u32, codes: Vec<u8>) -> Result<Self> {
        if codes.len() != width as usize * height as usize {
            return Err(Error::invalid_input(format!(
                "{} codes cannot fill a {}x{} image",
                codes.len(),
                width,
                height
            )));
        }
        if let Some(bad) = codes.iter().find(|c| **c > 0x0F) {
            return Err(Error::invalid_input(format!(
                "palette code {} does not fit in 4 bits",
                bad
            )));
        }
        Ok(Self {
            width,
            height,
            codes,
        })
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Codes in raster order.
    pub fn codes(&self) -> &[u8] {
        &self.codes
    }

    /// Code at (x, y), or `None` outside the image.
    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.codes.get(y as usize * self.width as usize + x as usize).copied()
    }

    /// Expand back to RGB through `palette`.
    ///
    /// Codes the palette does not know render as white.
    pub fn to_rgb(&self, palette: &Palette) -> RgbImage {
        let mut out = RgbImage::new(self.width, self.height);
        for (pixel, code) in out.pixels_mut().zip(&self.codes) {
            let color = palette.color_of(*code).unwrap_or(PaletteColor::White);
            pixel.0 = color.rgb();
        }
        out
    }

    pub(crate) fn into_codes(self) -> Vec<u8> {
        self.codes
    }
}

/// Maps RGB canvases onto a panel palette with error diffusion.
#[derive(Debug, Clone, Copy)]
pub struct PaletteQuantizer {
    palette: Palette,
    levels: u32,
}

impl PaletteQuantizer {
    /// Create a quantizer diffusing each channel onto `levels` values.
    ///
    /// Two levels suits palettes whose colours are all channel extremes
    /// (black, white and the primaries). `levels` must be at least 2.
    pub fn new(palette: Palette, levels: u32) -> Result<Self> {
        if levels < 2 {
            return Err(Error::invalid_input(format!(
                "dither needs at least 2 levels per channel, got {}",
                levels
            )));
        }
        Ok(Self { palette, levels })
    }

    /// Target palette.
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Run error diffusion and renormalization, returning the dithered RGB canvas.
    pub fn dither(&self, img: &RgbImage) -> Result<RgbImage> {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(Error::InvalidImage("canvas has zero area".to_string()));
        }
        let (w, h) = (width as usize, height as usize);

        let mut buf: Vec<f32> = img.as_raw().iter().map(|v| f32::from(*v) / 255.0).collect();
        let exact: Vec<bool> = img
            .pixels()
            .map(|p| self.palette.exact(p.0).is_some())
            .collect();
        let steps = (self.levels - 1) as f32;

        for y in 0..h {
            for x in 0..w {
                let base = (y * w + x) * 3;
                if exact[y * w + x] {
                    continue;
                }
                for c in 0..3 {
                    let old = buf[base + c];
                    let new = (old * steps).round() / steps;
                    buf[base + c] = new;
                    let err = old - new;
                    if err == 0.0 {
                        continue;
                    }
                    for (dx, dy, weight) in KERNEL {
                        let nx = x as isize + dx;
                        let ny = y + dy;
                        if nx < 0 || nx as usize >= w || ny >= h {
                            continue;
                        }
                        buf[(ny * w + nx as usize) * 3 + c] += err * weight;
                    }
                }
            }
        }

        let mut max = [0.0f32; 3];
        for (px, _) in buf.chunks_exact(3).zip(&exact).filter(|(_, e)| !**e) {
            for c in 0..3 {
                max[c] = max[c].max(px[c]);
            }
        }
        tracing::debug!(
            "Dithered {}x{} at {} levels, channel max {:?}",
            width,
            height,
            self.levels,
            max
        );

        let mut out = img.clone();
        for ((pixel, px), _) in out
            .pixels_mut()
            .zip(buf.chunks_exact(3))
            .zip(&exact)
            .filter(|(_, e)| !**e)
        {
            for c in 0..3 {
                let v = if max[c] > 0.0 { px[c] / max[c] } else { px[c] };
                pixel.0[c] = (v * 255.0).round().clamp(0.0, 255.0) as u8;
            }
        }
        Ok(out)
    }

    /// Snap every pixel of `img` to its nearest palette entry without diffusion.
    pub fn reduce(&self, img: &RgbImage) -> IndexedImage {
        let codes = img
            .pixels()
            .map(|p| self.palette.nearest(p.0).code)
            .collect();
        IndexedImage {
            width: img.width(),
            height: img.height(),
            codes,
        }
    }

    /// Dither `img` and reduce it to panel codes.
    pub fn quantize(&self, img: &RgbImage) -> Result<IndexedImage> {
        let dithered = self.dither(img)?;
        Ok(self.reduce(&dithered))
    }
}
