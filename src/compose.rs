//! Canvas composition: blur-fill backdrops, fitted foregrounds and the time label.
//!
//! Ingestion builds the static part of a wallpaper once:
//!
//! 1. scale the source to *cover* the canvas, blur it, centre-crop;
//! 2. scale the source to *fit* the canvas and paste it centred on top.
//!
//! Every tick then draws the current time into the wallpaper's label box,
//! shadow first, growing the font until the text spans the box width.

use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;

use embedded_graphics::mono_font::{ascii::FONT_10X20, MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::renderer::TextRenderer;
use embedded_graphics::text::{Baseline, Text};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use crate::palette::PaletteColor;
use crate::wallpaper::LabelPlacement;
use crate::{Error, Result};

/// Upper bound on label scale; keeps a degenerate box from looping forever.
const MAX_LABEL_SCALE: u32 = 64;

/// Grid tone for the third lines.
const GRID_THIRDS: Rgb<u8> = Rgb(PaletteColor::Red.rgb());

/// Grid tone for the half lines.
const GRID_HALVES: Rgb<u8> = Rgb(PaletteColor::Blue.rgb());

/// Measures and draws label text.
///
/// `scale` is an integer magnification of the font's base size.
pub trait LabelFont: Send + Sync {
    /// Rendered (width, height) of `text` at `scale`.
    fn measure(&self, text: &str, scale: u32) -> (u32, u32);

    /// Draw `text` with its top-left corner at (x, y), clipped to the canvas.
    fn draw(&self, canvas: &mut RgbImage, text: &str, x: i64, y: i64, scale: u32, color: Rgb<u8>);
}

/// [`LabelFont`] backed by an embedded-graphics bitmap font, scaled by pixel replication.
#[derive(Debug, Clone, Copy)]
pub struct MonoLabelFont {
    font: &'static MonoFont<'static>,
}

impl MonoLabelFont {
    /// Use a specific bitmap font.
    pub fn new(font: &'static MonoFont<'static>) -> Self {
        Self { font }
    }

    fn style(&self) -> MonoTextStyle<'static, BinaryColor> {
        MonoTextStyle::new(self.font, BinaryColor::On)
    }
}

impl Default for MonoLabelFont {
    fn default() -> Self {
        Self::new(&FONT_10X20)
    }
}

impl LabelFont for MonoLabelFont {
    fn measure(&self, text: &str, scale: u32) -> (u32, u32) {
        let size = self
            .style()
            .measure_string(text, Point::zero(), Baseline::Top)
            .bounding_box
            .size;
        (size.width * scale, size.height * scale)
    }

    fn draw(&self, canvas: &mut RgbImage, text: &str, x: i64, y: i64, scale: u32, color: Rgb<u8>) {
        let mut target = ScaledTarget {
            canvas,
            x,
            y,
            scale: scale.max(1),
            color,
        };
        Text::with_baseline(text, Point::zero(), self.style(), Baseline::Top)
            .draw(&mut target)
            .ok();
    }
}

/// Draw target that blows each glyph pixel up into a `scale`-sized block.
struct ScaledTarget<'a> {
    canvas: &'a mut RgbImage,
    x: i64,
    y: i64,
    scale: u32,
    color: Rgb<u8>,
}

impl OriginDimensions for ScaledTarget<'_> {
    fn size(&self) -> Size {
        Size::new(self.canvas.width(), self.canvas.height())
    }
}

impl DrawTarget for ScaledTarget<'_> {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> std::result::Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (cw, ch) = (i64::from(self.canvas.width()), i64::from(self.canvas.height()));
        let s = i64::from(self.scale);
        for Pixel(point, color) in pixels {
            if color != BinaryColor::On {
                continue;
            }
            let ox = self.x + i64::from(point.x) * s;
            let oy = self.y + i64::from(point.y) * s;
            for py in oy.max(0)..(oy + s).min(ch) {
                for px in ox.max(0)..(ox + s).min(cw) {
                    self.canvas.put_pixel(px as u32, py as u32, self.color);
                }
            }
        }
        Ok(())
    }
}

/// Read and decode a source image or stored asset.
///
/// A missing or unreadable file is [`Error::AssetUnavailable`]; bytes that do
/// not decode, or decode to an empty image, are [`Error::InvalidImage`].
pub fn load_image(path: &Path) -> Result<RgbImage> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::AssetUnavailable(format!("{}: {}", path.display(), e)))?;
    decode_image(&bytes)
}

/// Decode an in-memory image to RGB.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage> {
    let img = image::load_from_memory(bytes)?.into_rgb8();
    if img.width() == 0 || img.height() == 0 {
        return Err(Error::InvalidImage("image has zero area".to_string()));
    }
    Ok(img)
}

/// Scale `src` to cover `width`x`height` and centre-crop, blurring before the crop when asked.
fn cover(src: &RgbImage, width: u32, height: u32, blur_sigma: Option<f32>) -> RgbImage {
    let (iw, ih) = (src.width() as f32, src.height() as f32);
    let scale = (width as f32 / iw).max(height as f32 / ih);
    let sw = ((iw * scale).ceil() as u32).max(width);
    let sh = ((ih * scale).ceil() as u32).max(height);

    let mut scaled = imageops::resize(src, sw, sh, FilterType::Triangle);
    if let Some(sigma) = blur_sigma.filter(|s| *s > 0.0) {
        scaled = imageops::blur(&scaled, sigma);
    }
    let x = (sw - width) / 2;
    let y = (sh - height) / 2;
    imageops::crop_imm(&scaled, x, y, width, height).to_image()
}

/// Builds the canvases fed to the quantizer.
#[derive(Clone)]
pub struct Compositor {
    font: Arc<dyn LabelFont>,
    blur_sigma: f32,
}

impl std::fmt::Debug for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compositor")
            .field("blur_sigma", &self.blur_sigma)
            .finish_non_exhaustive()
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new(Arc::new(MonoLabelFont::default()), crate::config::DEFAULT_BLUR_SIGMA)
    }
}

impl Compositor {
    /// Create a compositor with a label font and backdrop blur strength.
    pub fn new(font: Arc<dyn LabelFont>, blur_sigma: f32) -> Self {
        Self { font, blur_sigma }
    }

    /// Blurred backdrop covering the whole canvas.
    pub fn blur_fill(&self, src: &RgbImage, width: u32, height: u32) -> RgbImage {
        cover(src, width, height, Some(self.blur_sigma))
    }

    /// Backdrop plus the unblurred source fitted and centred on top.
    pub fn compose_wallpaper(&self, src: &RgbImage, width: u32, height: u32) -> Result<RgbImage> {
        if width == 0 || height == 0 {
            return Err(Error::invalid_input("canvas must have non-zero size"));
        }
        let mut canvas = self.blur_fill(src, width, height);

        let (iw, ih) = (src.width() as f32, src.height() as f32);
        let scale = (width as f32 / iw).min(height as f32 / ih);
        let fw = ((iw * scale).round() as u32).clamp(1, width);
        let fh = ((ih * scale).round() as u32).clamp(1, height);
        let foreground = imageops::resize(src, fw, fh, FilterType::Lanczos3);
        imageops::overlay(
            &mut canvas,
            &foreground,
            i64::from((width - fw) / 2),
            i64::from((height - fh) / 2),
        );

        tracing::debug!(
            "Composed {}x{} source onto {}x{} canvas (foreground {}x{})",
            src.width(),
            src.height(),
            width,
            height,
            fw,
            fh
        );
        Ok(canvas)
    }

    /// Stretch-free resize of a stored asset onto a device's logical canvas.
    ///
    /// Assets already at the right size are copied as-is.
    pub fn fit_asset(&self, asset: &RgbImage, width: u32, height: u32) -> RgbImage {
        if asset.dimensions() == (width, height) {
            return asset.clone();
        }
        cover(asset, width, height, None)
    }

    /// Largest scale at which `text` still fits within `box_width`, at least 1.
    pub fn fit_scale(&self, text: &str, box_width: u32) -> u32 {
        let mut scale = 1;
        while scale < MAX_LABEL_SCALE && self.font.measure(text, scale + 1).0 <= box_width {
            scale += 1;
        }
        scale
    }

    /// Draw `text` into the placement box with a drop shadow.
    pub fn draw_label(
        &self,
        canvas: &mut RgbImage,
        placement: &LabelPlacement,
        text: &str,
        text_color: PaletteColor,
        shadow_color: PaletteColor,
    ) {
        let (width, height) = canvas.dimensions();
        let (x, y, box_w, _) = placement.to_pixels(width, height);
        let scale = self.fit_scale(text, box_w);
        let offset = i64::from(scale.max(2) / 2);
        let (x, y) = (i64::from(x), i64::from(y));

        self.font.draw(canvas, text, x + offset, y + offset, scale, Rgb(shadow_color.rgb()));
        self.font.draw(canvas, text, x, y, scale, Rgb(text_color.rgb()));
    }

    /// Full per-tick canvas: the asset on the device canvas, the label, and the optional grid.
    #[allow(clippy::too_many_arguments)]
    pub fn render_live(
        &self,
        asset: &RgbImage,
        width: u32,
        height: u32,
        placement: &LabelPlacement,
        text: &str,
        text_color: PaletteColor,
        shadow_color: PaletteColor,
        grid: bool,
    ) -> RgbImage {
        let mut canvas = self.fit_asset(asset, width, height);
        self.draw_label(&mut canvas, placement, text, text_color, shadow_color);
        if grid {
            draw_grid(&mut canvas);
        }
        canvas
    }
}

/// Overlay reference lines at thirds and halves of the canvas.
///
/// The lines are a fixed single pixel wide whatever the canvas size.
pub fn draw_grid(canvas: &mut RgbImage) {
    let (width, height) = canvas.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let lines = [
        (3, GRID_THIRDS, 1),
        (3, GRID_THIRDS, 2),
        (2, GRID_HALVES, 1),
    ];
    for (parts, tone, k) in lines {
        let gx = (width * k / parts).min(width - 1);
        for y in 0..height {
            canvas.put_pixel(gx, y, tone);
        }
        let gy = (height * k / parts).min(height - 1);
        for x in 0..width {
            canvas.put_pixel(x, gy, tone);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement(x: f32, y: f32, w: f32, h: f32) -> LabelPlacement {
        LabelPlacement::new(x, y, w, h).unwrap()
    }

    #[test]
    fn test_fit_scale_grows_to_box_width() {
        let compositor = Compositor::default();
        let font = MonoLabelFont::default();
        let scale = compositor.fit_scale("12:34", 400);
        assert!(font.measure("12:34", scale).0 <= 400);
        assert!(font.measure("12:34", scale + 1).0 > 400);
    }

    #[test]
    fn test_fit_scale_never_below_one() {
        let compositor = Compositor::default();
        assert_eq!(compositor.fit_scale("12:34", 0), 1);
    }

    #[test]
    fn test_measure_scales_linearly() {
        let font = MonoLabelFont::default();
        let (w1, h1) = font.measure("09:41", 1);
        let (w3, h3) = font.measure("09:41", 3);
        assert!(w1 > 0 && h1 > 0);
        assert_eq!((w3, h3), (w1 * 3, h1 * 3));
    }

    #[test]
    fn test_blur_fill_covers_canvas() {
        let src = RgbImage::from_pixel(100, 50, Rgb([10, 200, 30]));
        let out = Compositor::default().blur_fill(&src, 80, 120);
        assert_eq!(out.dimensions(), (80, 120));
    }

    #[test]
    fn test_compose_wallpaper_centres_foreground() {
        // Wide red strip on a tall canvas: foreground fills the width, backdrop shows above and below.
        let src = RgbImage::from_pixel(200, 50, Rgb([255, 0, 0]));
        let out = Compositor::default().compose_wallpaper(&src, 100, 100).unwrap();
        assert_eq!(out.dimensions(), (100, 100));
        assert_eq!(out.get_pixel(50, 50).0, [255, 0, 0]);
    }

    #[test]
    fn test_draw_label_marks_pixels_in_box() {
        let compositor = Compositor::default();
        let mut canvas = RgbImage::from_pixel(200, 100, Rgb([255, 255, 255]));
        compositor.draw_label(
            &mut canvas,
            &placement(0.1, 0.1, 0.8, 0.5),
            "12:34",
            PaletteColor::Black,
            PaletteColor::Yellow,
        );
        let black = canvas.pixels().filter(|p| p.0 == [0, 0, 0]).count();
        let yellow = canvas.pixels().filter(|p| p.0 == [255, 255, 0]).count();
        assert!(black > 0);
        assert!(yellow > 0);
        // Nothing is drawn left of the box.
        for y in 0..100 {
            for x in 0..20 {
                assert_eq!(canvas.get_pixel(x, y).0, [255, 255, 255]);
            }
        }
    }

    #[test]
    fn test_label_at_edge_is_clipped() {
        let compositor = Compositor::default();
        let mut canvas = RgbImage::from_pixel(50, 20, Rgb([255, 255, 255]));
        compositor.draw_label(
            &mut canvas,
            &placement(1.0, 1.0, 1.0, 1.0),
            "23:59",
            PaletteColor::Red,
            PaletteColor::Black,
        );
        assert_eq!(canvas.dimensions(), (50, 20));
    }

    #[test]
    fn test_grid_lines() {
        let mut canvas = RgbImage::from_pixel(90, 60, Rgb([255, 255, 255]));
        draw_grid(&mut canvas);
        assert_eq!(*canvas.get_pixel(30, 5), GRID_THIRDS);
        assert_eq!(*canvas.get_pixel(60, 5), GRID_THIRDS);
        assert_eq!(*canvas.get_pixel(45, 5), GRID_HALVES);
        assert_eq!(*canvas.get_pixel(5, 30), GRID_HALVES);
        assert_eq!(*canvas.get_pixel(5, 5), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_fit_asset_passthrough() {
        let asset = RgbImage::from_pixel(8, 4, Rgb([1, 2, 3]));
        let compositor = Compositor::default();
        assert_eq!(compositor.fit_asset(&asset, 8, 4), asset);
        assert_eq!(compositor.fit_asset(&asset, 4, 8).dimensions(), (4, 8));
    }

    #[test]
    fn test_missing_asset_is_unavailable() {
        let err = load_image(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, Error::AssetUnavailable(_)));
    }

    #[test]
    fn test_garbage_bytes_are_invalid_image() {
        let err = decode_image(b"not an image").unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));
    }
}
