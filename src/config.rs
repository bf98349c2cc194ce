//! Runtime settings.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. built-in defaults;
//! 2. an optional YAML file ([`Settings::load`], `yaml` feature);
//! 3. environment overrides ([`Settings::with_env`]).
//!
//! # Example (YAML)
//!
//! ```yaml
//! asset_dir: /var/lib/paperclock/assets
//! timezone: "Europe/Berlin"
//! tick_interval_secs: 60
//! draw_channel_prefix: draw
//! clear_channel_prefix: clear
//! ```

use std::path::PathBuf;
#[cfg(feature = "yaml")]
use std::path::Path;

use chrono_tz::Tz;
use serde::Deserialize;

use crate::transport::{DEFAULT_CLEAR_PREFIX, DEFAULT_CLEAR_TOKEN, DEFAULT_DRAW_PREFIX};
use crate::{Error, Result, PANEL_HEIGHT, PANEL_WIDTH};

/// Default backdrop blur strength.
pub const DEFAULT_BLUR_SIGMA: f32 = 12.0;

/// Environment variable overriding [`Settings::asset_dir`].
pub const ENV_ASSET_DIR: &str = "PAPERCLOCK_ASSET_DIR";

/// Environment variable overriding [`Settings::timezone`].
pub const ENV_TIMEZONE: &str = "PAPERCLOCK_TIMEZONE";

/// Server-wide settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding processed assets (default: "/tmp/paperclock/assets")
    pub asset_dir: PathBuf,

    /// Extension of processed assets (default: "png")
    pub asset_extension: String,

    /// Prefix of frame channels (default: "draw")
    pub draw_channel_prefix: String,

    /// Prefix of clear channels (default: "clear")
    pub clear_channel_prefix: String,

    /// Payload of a clear command (default: "clear")
    pub clear_token: String,

    /// IANA timezone schedules and labels are evaluated in (default: "UTC")
    pub timezone: String,

    /// Seconds between fleet ticks (default: 60)
    pub tick_interval_secs: u64,

    /// strftime format of the time label (default: "%H:%M")
    pub time_format: String,

    /// Levels per channel during error diffusion (default: 2)
    pub dither_levels: u32,

    /// Backdrop blur strength (default: 12.0)
    pub blur_sigma: f32,

    /// Width of the canvas uploads are processed at (default: 800)
    pub canvas_width: u32,

    /// Height of the canvas uploads are processed at (default: 480)
    pub canvas_height: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            asset_dir: PathBuf::from("/tmp/paperclock/assets"),
            asset_extension: "png".to_string(),
            draw_channel_prefix: DEFAULT_DRAW_PREFIX.to_string(),
            clear_channel_prefix: DEFAULT_CLEAR_PREFIX.to_string(),
            clear_token: DEFAULT_CLEAR_TOKEN.to_string(),
            timezone: "UTC".to_string(),
            tick_interval_secs: 60,
            time_format: "%H:%M".to_string(),
            dither_levels: 2,
            blur_sigma: DEFAULT_BLUR_SIGMA,
            canvas_width: PANEL_WIDTH,
            canvas_height: PANEL_HEIGHT,
        }
    }
}

impl Settings {
    /// Load settings from a YAML file.
    #[cfg(feature = "yaml")]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read settings file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse settings from a YAML string. Missing keys keep their defaults.
    #[cfg(feature = "yaml")]
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("Invalid settings YAML: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply environment overrides.
    #[must_use]
    pub fn with_env(mut self) -> Self {
        if let Ok(dir) = std::env::var(ENV_ASSET_DIR) {
            self.asset_dir = PathBuf::from(dir);
        }
        if let Ok(tz) = std::env::var(ENV_TIMEZONE) {
            self.timezone = tz;
        }
        self
    }

    /// Set the asset directory.
    #[must_use]
    pub fn with_asset_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.asset_dir = path.into();
        self
    }

    /// Set the timezone.
    #[must_use]
    pub fn with_timezone(mut self, tz: impl Into<String>) -> Self {
        self.timezone = tz.into();
        self
    }

    /// Set the ingestion canvas size.
    #[must_use]
    pub fn with_canvas(mut self, width: u32, height: u32) -> Self {
        self.canvas_width = width;
        self.canvas_height = height;
        self
    }

    /// Parsed timezone.
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse()
            .map_err(|e| Error::Config(format!("Unknown timezone '{}': {}", self.timezone, e)))
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        self.tz()?;
        if self.dither_levels < 2 {
            return Err(Error::Config("dither_levels must be at least 2".to_string()));
        }
        if self.tick_interval_secs == 0 {
            return Err(Error::Config("tick_interval_secs must be positive".to_string()));
        }
        if self.canvas_width == 0 || self.canvas_height == 0 {
            return Err(Error::Config("canvas size must be non-zero".to_string()));
        }
        if self.asset_extension.is_empty() || self.asset_extension.contains(['.', '/']) {
            return Err(Error::Config(format!(
                "asset_extension '{}' is not a bare extension",
                self.asset_extension
            )));
        }
        Ok(())
    }
}
