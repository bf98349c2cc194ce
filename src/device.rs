//! Devices in the fleet and their power state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::palette::{DeviceType, Palette};

/// Device identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the panel is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Orientation {
    /// Landscape, the panel's native scan direction
    #[default]
    Horizontal,
    /// Portrait; the logical canvas is the native one with width and height swapped
    Vertical,
}

/// Whether a device is showing wallpapers or has been cleared for the night.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PowerState {
    /// Receiving frames
    #[default]
    Awake,
    /// Cleared and idle until its schedule ends
    Sleep,
}

/// A physical clock display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Identifier
    pub id: DeviceId,
    /// Network address, used to name the device's channels
    pub address: String,
    /// Panel model
    #[serde(default)]
    pub device_type: DeviceType,
    /// Mounting orientation
    #[serde(default)]
    orientation: Orientation,
    /// Overlay reference gridlines on every frame
    #[serde(default)]
    pub draw_grid: bool,
}

impl Device {
    /// Create a landscape device.
    pub fn new(id: DeviceId, address: impl Into<String>, device_type: DeviceType) -> Self {
        Self {
            id,
            address: address.into(),
            device_type,
            orientation: Orientation::Horizontal,
            draw_grid: false,
        }
    }

    /// Set mounting orientation.
    #[must_use]
    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Enable the debug grid.
    #[must_use]
    pub fn with_grid(mut self) -> Self {
        self.draw_grid = true;
        self
    }

    /// Current orientation.
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Change orientation; returns true when the logical canvas changed.
    ///
    /// A changed canvas means any frame rendered for the old orientation is stale.
    pub fn set_orientation(&mut self, orientation: Orientation) -> bool {
        let changed = self.orientation != orientation;
        self.orientation = orientation;
        changed
    }

    /// Logical canvas (width, height) to compose for.
    pub fn canvas_size(&self) -> (u32, u32) {
        let (w, h) = self.device_type.native_size();
        match self.orientation {
            Orientation::Horizontal => (w, h),
            Orientation::Vertical => (h, w),
        }
    }

    /// Colours the panel can show.
    pub fn palette(&self) -> Palette {
        self.device_type.palette()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canvas_size_follows_orientation() {
        let mut device = Device::new(DeviceId(1), "10.0.0.7", DeviceType::Spectra6);
        assert_eq!(device.canvas_size(), (800, 480));

        assert!(device.set_orientation(Orientation::Vertical));
        assert_eq!(device.canvas_size(), (480, 800));

        assert!(!device.set_orientation(Orientation::Vertical));
    }

    #[test]
    fn test_device_json() {
        let json = r#"{"id": 4, "address": "aa:bb", "orientation": "VERTICAL"}"#;
        let device: Device = serde_json::from_str(json).unwrap();
        assert_eq!(device.id, DeviceId(4));
        assert_eq!(device.device_type, DeviceType::Spectra6);
        assert_eq!(device.orientation(), Orientation::Vertical);
        assert!(!device.draw_grid);
    }

    #[test]
    fn test_power_state_default() {
        assert_eq!(PowerState::default(), PowerState::Awake);
    }
}
