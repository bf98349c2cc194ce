//! # paperclock
//!
//! Server-side core for a fleet of colour e-paper clocks.
//!
//! Each clock shows a wallpaper with the current time drawn on top. The
//! server owns the wallpapers, decides which one each clock shows, and
//! pushes finished frames over pub/sub:
//!
//! - **Ingestion**: uploads are blur-filled to the panel canvas, dithered onto
//!   the panel palette and stored under the SHA-256 of the result
//! - **Queues**: every device rotates through its own ordered list of wallpapers
//! - **Schedules**: weekly sleep windows blank the panel overnight
//! - **Rendering**: each tick draws the time label, re-dithers and packs the
//!   frame two pixels per byte, then publishes it compressed and base64-encoded
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use paperclock::{
//!     Device, DeviceId, DeviceType, MemoryPublisher, MemoryStore, QueueStore,
//!     RenderDispatcher, Settings,
//! };
//!
//! # fn main() -> paperclock::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! store.put_device(Device::new(DeviceId(1), "10.0.0.7", DeviceType::Spectra6));
//!
//! let dispatcher = RenderDispatcher::new(
//!     Settings::default().with_env(),
//!     store.clone(),
//!     store.clone(),
//!     Arc::new(QueueStore::new()),
//!     Arc::new(MemoryPublisher::new()),
//! )?;
//! let outcome = dispatcher.tick(DeviceId(1))?;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```
//!
//! ## Panels
//!
//! Both supported panels are 800x480 and address colours with 4-bit codes:
//!
//! | Panel | Colours |
//! |-------|---------|
//! | Spectra 6 | black, white, yellow, red, blue, green |
//! | ACeP 7 | the six above plus orange |
//!
//! Portrait devices compose at 480x800; frames are rotated back to the
//! panel's native orientation before packing.
//!
//! ## Feature Flags
//!
//! - `yaml` (default) - Load [`Settings`] and [`ScheduleSet`]s from YAML files

pub mod compose;
pub mod config;
pub mod device;
pub mod dispatch;
mod error;
pub mod frame;
pub mod ingest;
pub mod palette;
pub mod quantize;
pub mod queue;
pub mod schedule;
pub mod store;
pub mod transport;
pub mod wallpaper;

pub use compose::{Compositor, LabelFont, MonoLabelFont};
pub use config::Settings;
pub use device::{Device, DeviceId, Orientation, PowerState};
pub use dispatch::{RenderDispatcher, TickOutcome};
pub use error::{Error, Result};
pub use frame::{FrameBuffer, FrameEncoder};
pub use ingest::{IngestOutcome, Ingestor, UploadSpec};
pub use palette::{DeviceType, Palette, PaletteColor};
pub use quantize::{IndexedImage, PaletteQuantizer};
pub use queue::{QueueStore, WallpaperQueue};
pub use schedule::{
    should_sleep_at, should_sleep_now, Clock, DaySelector, FixedClock, Schedule, ScheduleSet,
    ScheduleSpec, SystemClock,
};
pub use store::{DeviceStore, MemoryStore, WallpaperStore};
pub use transport::{MemoryPublisher, Publisher};
pub use wallpaper::{LabelPlacement, LabelUpdate, Wallpaper, WallpaperId};

/// Native panel width in pixels
pub const PANEL_WIDTH: u32 = 800;

/// Native panel height in pixels
pub const PANEL_HEIGHT: u32 = 480;

/// Bytes in one packed frame for a `width` x `height` panel.
///
/// # Example
///
/// ```
/// use paperclock::{frame_len, PANEL_HEIGHT, PANEL_WIDTH};
///
/// assert_eq!(frame_len(PANEL_WIDTH, PANEL_HEIGHT), 192_000);
/// ```
pub fn frame_len(width: u32, height: u32) -> usize {
    (width as usize * height as usize) / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(PANEL_WIDTH, 800);
        assert_eq!(PANEL_HEIGHT, 480);
    }

    #[test]
    fn test_frame_len() {
        assert_eq!(frame_len(800, 480), 192_000);
        assert_eq!(frame_len(2, 1), 1);
    }
}
