//! Packing indexed canvases into the panel's wire format.
//!
//! Panels take two pixels per byte, high nibble first:
//!
//! ```text
//! byte[i] = (code[2i] << 4) | code[2i + 1]
//! ```
//!
//! A canvas drawn for a portrait device arrives as (H, W) and is rotated a
//! quarter turn counter-clockwise so it lines up with the landscape scan order.

use image::{imageops, GrayImage};

use crate::palette::DeviceType;
use crate::quantize::IndexedImage;
use crate::{Error, Result};

/// A packed frame, exactly `width * height / 2` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer(Vec<u8>);

impl FrameBuffer {
    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True only for a zero-area panel, which [`FrameEncoder`] rejects.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Unpack back into raster-order codes.
    pub fn unpack(&self) -> Vec<u8> {
        self.0.iter().flat_map(|b| [b >> 4, b & 0x0F]).collect()
    }

    /// Consume into the underlying bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// Turns indexed canvases into frames for one panel geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEncoder {
    width: u32,
    height: u32,
}

impl FrameEncoder {
    /// Encoder for a panel of the given native (landscape) size.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 || (u64::from(width) * u64::from(height)) % 2 != 0 {
            return Err(Error::invalid_input(format!(
                "panel {}x{} cannot be packed two pixels per byte",
                width, height
            )));
        }
        Ok(Self { width, height })
    }

    /// Encoder for a device type's native panel.
    pub fn for_device(device_type: DeviceType) -> Self {
        let (width, height) = device_type.native_size();
        Self { width, height }
    }

    /// Frame size in bytes.
    pub fn frame_len(&self) -> usize {
        crate::frame_len(self.width, self.height)
    }

    /// Wrap bytes received off the wire, checking they fill exactly one frame.
    pub fn frame_from_bytes(&self, bytes: Vec<u8>) -> Result<FrameBuffer> {
        if bytes.len() != self.frame_len() {
            return Err(Error::invalid_input(format!(
                "{} bytes is not a {}x{} frame ({} bytes)",
                bytes.len(),
                self.width,
                self.height,
                self.frame_len()
            )));
        }
        Ok(FrameBuffer(bytes))
    }

    /// Align `img` with the panel, rotating portrait canvases.
    pub fn orient(&self, img: IndexedImage) -> Result<IndexedImage> {
        let (w, h) = (img.width(), img.height());
        if (w, h) == (self.width, self.height) {
            return Ok(img);
        }
        if (w, h) != (self.height, self.width) {
            return Err(Error::DimensionMismatch {
                width: self.width,
                height: self.height,
                actual_width: w,
                actual_height: h,
            });
        }

        tracing::debug!("Rotating {}x{} canvas onto {}x{} panel", w, h, self.width, self.height);
        let gray = GrayImage::from_raw(w, h, img.into_codes())
            .ok_or_else(|| Error::InvalidImage("indexed buffer shorter than its size".to_string()))?;
        let rotated = imageops::rotate270(&gray);
        IndexedImage::from_codes(rotated.width(), rotated.height(), rotated.into_raw())
    }

    /// Orient and pack `img` into a frame.
    pub fn encode(&self, img: IndexedImage) -> Result<FrameBuffer> {
        let oriented = self.orient(img)?;
        let bytes: Vec<u8> = oriented
            .codes()
            .chunks_exact(2)
            .map(|pair| (pair[0] << 4) | (pair[1] & 0x0F))
            .collect();
        debug_assert_eq!(bytes.len(), self.frame_len());
        Ok(FrameBuffer(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexed(width: u32, height: u32, f: impl Fn(u32, u32) -> u8) -> IndexedImage {
        let mut codes = Vec::new();
        for y in 0..height {
            for x in 0..width {
                codes.push(f(x, y));
            }
        }
        IndexedImage::from_codes(width, height, codes).unwrap()
    }

    #[test]
    fn test_pack_high_nibble_first() {
        let encoder = FrameEncoder::new(4, 2).unwrap();
        let img = IndexedImage::from_codes(4, 2, vec![1, 2, 3, 5, 6, 0, 0, 1]).unwrap();
        let frame = encoder.encode(img).unwrap();
        assert_eq!(frame.as_bytes(), &[0x12, 0x35, 0x60, 0x01]);
        assert_eq!(frame.unpack(), vec![1, 2, 3, 5, 6, 0, 0, 1]);
    }

    #[test]
    fn test_native_size_is_not_rotated() {
        let encoder = FrameEncoder::for_device(DeviceType::Spectra6);
        let img = indexed(800, 480, |x, _| if x < 400 { 0 } else { 1 });
        let frame = encoder.encode(img).unwrap();
        assert_eq!(frame.len(), 800 * 480 / 2);
        // First row: 200 bytes of black pairs then 200 of white pairs.
        assert_eq!(frame.as_bytes()[0], 0x00);
        assert_eq!(frame.as_bytes()[199], 0x00);
        assert_eq!(frame.as_bytes()[200], 0x11);
    }

    #[test]
    fn test_swapped_size_is_rotated() {
        let encoder = FrameEncoder::for_device(DeviceType::Spectra6);
        // Portrait canvas: top half black, bottom half white.
        let img = indexed(480, 800, |_, y| if y < 400 { 0 } else { 1 });
        let frame = encoder.encode(img).unwrap();
        assert_eq!(frame.len(), 800 * 480 / 2);
        // After a counter-clockwise quarter turn the top half lands on the left.
        let codes = frame.unpack();
        assert_eq!(codes[0], 0);
        assert_eq!(codes[399], 0);
        assert_eq!(codes[400], 1);
        assert_eq!(codes[799], 1);
    }

    #[test]
    fn test_small_rotation_layout() {
        let encoder = FrameEncoder::new(4, 2).unwrap();
        let img = IndexedImage::from_codes(2, 4, (0..8).collect()).unwrap();
        let frame = encoder.encode(img).unwrap();
        assert_eq!(frame.as_bytes(), &[0x13, 0x57, 0x02, 0x46]);
    }

    #[test]
    fn test_other_sizes_are_rejected() {
        let encoder = FrameEncoder::for_device(DeviceType::Acep7);
        let img = indexed(800, 600, |_, _| 1);
        assert!(matches!(
            encoder.encode(img),
            Err(Error::DimensionMismatch {
                actual_width: 800,
                actual_height: 600,
                ..
            })
        ));
    }

    #[test]
    fn test_frame_from_bytes_checks_length() {
        let encoder = FrameEncoder::new(4, 2).unwrap();
        let frame = encoder.frame_from_bytes(vec![0x12, 0x35, 0x60, 0x01]).unwrap();
        assert_eq!(frame.unpack(), vec![1, 2, 3, 5, 6, 0, 0, 1]);
        assert!(matches!(
            encoder.frame_from_bytes(vec![0x12, 0x35, 0x60]),
            Err(Error::InvalidInput(_))
        ));
        assert!(encoder.frame_from_bytes(Vec::new()).is_err());
    }

    #[test]
    fn test_odd_panels_are_rejected() {
        assert!(FrameEncoder::new(3, 3).is_err());
        assert!(FrameEncoder::new(0, 4).is_err());
        assert_eq!(FrameEncoder::new(4, 3).unwrap().frame_len(), 6);
    }
}
