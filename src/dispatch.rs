//! Per-device render loop.
//!
//! Each tick asks the schedule whether the device should be asleep. Falling
//! asleep sends one clear command; staying awake re-renders the queue head
//! with the current time and publishes it, every tick.
//!
//! | State | In a sleep window | Outside sleep windows |
//! |-------|-------------------|-----------------------|
//! | `Awake` | send clear, become `Sleep` | render and publish |
//! | `Sleep` | nothing | render and publish, become `Awake` |
//!
//! An empty queue turns "render and publish" into a no-op.

use std::fmt::Write as _;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono_tz::Tz;

use crate::compose::{load_image, Compositor};
use crate::config::Settings;
use crate::device::{Device, DeviceId, PowerState};
use crate::frame::{FrameBuffer, FrameEncoder};
use crate::ingest::asset_path;
use crate::quantize::PaletteQuantizer;
use crate::queue::QueueStore;
use crate::schedule::{should_sleep_at, Clock, SystemClock};
use crate::store::{DeviceStore, WallpaperStore};
use crate::transport::{channel_name, encode_frame_message, Publisher};
use crate::wallpaper::{Wallpaper, WallpaperId};
use crate::{Error, Result};

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Published a frame of this wallpaper
    Rendered(WallpaperId),
    /// Fell asleep and sent a clear command
    Cleared,
    /// Already asleep; nothing sent
    Asleep,
    /// Awake with an empty queue; nothing sent
    Idle,
}

/// Renders and publishes frames for the fleet.
#[derive(Clone)]
pub struct RenderDispatcher {
    settings: Settings,
    tz: Tz,
    library: Arc<dyn WallpaperStore>,
    devices: Arc<dyn DeviceStore>,
    queues: Arc<QueueStore>,
    publisher: Arc<dyn Publisher>,
    compositor: Compositor,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RenderDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderDispatcher")
            .field("tz", &self.tz)
            .field("compositor", &self.compositor)
            .finish_non_exhaustive()
    }
}

impl RenderDispatcher {
    /// Create a dispatcher on the system clock.
    pub fn new(
        settings: Settings,
        library: Arc<dyn WallpaperStore>,
        devices: Arc<dyn DeviceStore>,
        queues: Arc<QueueStore>,
        publisher: Arc<dyn Publisher>,
    ) -> Result<Self> {
        settings.validate()?;
        let tz = settings.tz()?;
        let compositor = Compositor::new(
            Arc::new(crate::compose::MonoLabelFont::default()),
            settings.blur_sigma,
        );
        Ok(Self {
            settings,
            tz,
            library,
            devices,
            queues,
            publisher,
            compositor,
            clock: Arc::new(SystemClock),
        })
    }

    /// Use a different time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use a custom compositor.
    #[must_use]
    pub fn with_compositor(mut self, compositor: Compositor) -> Self {
        self.compositor = compositor;
        self
    }

    /// Queues this dispatcher reads from.
    pub fn queues(&self) -> &Arc<QueueStore> {
        &self.queues
    }

    fn now(&self) -> DateTime<Tz> {
        self.clock.now().with_timezone(&self.tz)
    }

    fn device(&self, id: DeviceId) -> Result<Device> {
        self.devices
            .device(id)
            .ok_or_else(|| Error::not_found(format!("device {}", id)))
    }

    fn should_sleep(&self, device: DeviceId, now: &DateTime<Tz>) -> bool {
        should_sleep_at(&self.devices.schedules(device), now)
    }

    /// Time label text for `now`.
    pub fn label_text(&self, now: &DateTime<Tz>) -> Result<String> {
        let mut text = String::new();
        write!(text, "{}", now.format(&self.settings.time_format)).map_err(|_| {
            Error::Config(format!("Invalid time_format '{}'", self.settings.time_format))
        })?;
        Ok(text)
    }

    /// Build the frame a device should show for `wallpaper` at `now`.
    pub fn render_frame(
        &self,
        device: &Device,
        wallpaper: &Wallpaper,
        now: &DateTime<Tz>,
    ) -> Result<FrameBuffer> {
        let asset = load_image(&asset_path(&self.settings, &wallpaper.hash))?;
        let (width, height) = device.canvas_size();
        let text = self.label_text(now)?;

        let canvas = self.compositor.render_live(
            &asset,
            width,
            height,
            &wallpaper.placement,
            &text,
            wallpaper.text_color,
            wallpaper.shadow_color,
            device.draw_grid,
        );
        let quantizer = PaletteQuantizer::new(device.palette(), self.settings.dither_levels)?;
        let indexed = quantizer.quantize(&canvas)?;
        FrameEncoder::for_device(device.device_type).encode(indexed)
    }

    fn publish_frame(&self, device: &Device, frame: &FrameBuffer) -> Result<()> {
        let channel = channel_name(&self.settings.draw_channel_prefix, &device.address);
        let payload = encode_frame_message(frame);
        self.publisher.publish(&channel, &payload)?;
        tracing::debug!("Published {} byte frame on {}", frame.len(), channel);
        Ok(())
    }

    fn send_clear(&self, device: &Device) -> Result<()> {
        let channel = channel_name(&self.settings.clear_channel_prefix, &device.address);
        self.publisher.publish(&channel, &self.settings.clear_token)
    }

    /// Render and publish the queue head; `None` if the queue is empty.
    fn render_head(&self, device: &Device, now: &DateTime<Tz>) -> Result<Option<WallpaperId>> {
        let Some(id) = self.queues.head(device.id) else {
            return Ok(None);
        };
        let wallpaper = self
            .library
            .wallpaper(id)
            .ok_or_else(|| Error::AssetUnavailable(format!("wallpaper {} has no record", id)))?;
        let frame = self.render_frame(device, &wallpaper, now)?;
        self.publish_frame(device, &frame)?;
        Ok(Some(id))
    }

    /// Advance one device's state machine.
    pub fn tick(&self, id: DeviceId) -> Result<TickOutcome> {
        let device = self.device(id)?;
        let now = self.now();
        let state = self.devices.power_state(id);

        if self.should_sleep(id, &now) {
            if state == PowerState::Sleep {
                return Ok(TickOutcome::Asleep);
            }
            self.send_clear(&device)?;
            self.devices.set_power_state(id, PowerState::Sleep);
            tracing::info!("Device {} going to sleep at {}", id, now);
            return Ok(TickOutcome::Cleared);
        }

        match self.render_head(&device, &now)? {
            None => {
                tracing::debug!("Device {} has an empty queue", id);
                Ok(TickOutcome::Idle)
            }
            Some(wallpaper) => {
                if state == PowerState::Sleep {
                    self.devices.set_power_state(id, PowerState::Awake);
                    tracing::info!("Device {} waking up at {}", id, now);
                }
                Ok(TickOutcome::Rendered(wallpaper))
            }
        }
    }

    /// Render the head now unless the device is inside a sleep window.
    pub fn refresh(&self, id: DeviceId) -> Result<Option<WallpaperId>> {
        let device = self.device(id)?;
        let now = self.now();
        if self.should_sleep(id, &now) {
            tracing::debug!("Device {} is in a sleep window; not refreshing", id);
            return Ok(None);
        }
        self.render_head(&device, &now)
    }

    /// Rotate the queue by one and show the new head.
    pub fn next(&self, id: DeviceId) -> Result<Option<WallpaperId>> {
        self.device(id)?;
        self.queues.shift_next(id);
        self.refresh(id)
    }

    /// Shuffle the queue. The display changes on the next tick.
    pub fn shuffle(&self, id: DeviceId) -> Result<Vec<WallpaperId>> {
        self.device(id)?;
        self.queues.shuffle(id);
        Ok(self.queues.snapshot(id))
    }

    /// Bring a queued wallpaper to the front and show it.
    pub fn show(&self, id: DeviceId, wallpaper: WallpaperId) -> Result<Option<WallpaperId>> {
        self.device(id)?;
        self.queues.move_to_front(id, wallpaper)?;
        self.refresh(id)
    }

    /// Blank the panel without touching the power state.
    pub fn clear(&self, id: DeviceId) -> Result<()> {
        let device = self.device(id)?;
        self.send_clear(&device)?;
        tracing::info!("Cleared device {}", id);
        Ok(())
    }

    /// Tick every device in parallel on the blocking pool.
    ///
    /// A failing device is logged and reported; the others are unaffected.
    pub async fn tick_all(self: &Arc<Self>) -> Vec<(DeviceId, Result<TickOutcome>)> {
        let handles: Vec<_> = self
            .devices
            .devices()
            .into_iter()
            .map(|device| {
                let this = Arc::clone(self);
                let id = device.id;
                (id, tokio::task::spawn_blocking(move || this.tick(id)))
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(e) => Err(Error::from(e)),
            };
            if let Err(e) = &outcome {
                tracing::warn!("Tick failed for device {}: {}", id, e);
            }
            outcomes.push((id, outcome));
        }
        outcomes
    }

    /// Tick the fleet every `tick_interval_secs` until `shutdown` resolves.
    pub async fn run<F>(self: Arc<Self>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let period = Duration::from_secs(self.settings.tick_interval_secs);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!("Dispatcher running every {}s", period.as_secs());

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    let outcomes = self.tick_all().await;
                    let failed = outcomes.iter().filter(|(_, r)| r.is_err()).count();
                    tracing::debug!("Fleet tick: {} devices, {} failed", outcomes.len(), failed);
                }
            }
        }
        tracing::info!("Dispatcher stopped");
    }
}
