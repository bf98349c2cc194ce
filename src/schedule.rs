//! Weekly sleep schedules.
//!
//! A schedule says "sleep for `duration` minutes starting at `start` on these
//! days". Devices may own several, and they may overlap. To decide whether a
//! device is asleep right now, the week is laid out as one line of 10,080
//! minutes (Monday 00:00 is minute 0) and every enabled schedule becomes one
//! `[start, end)` segment per day it applies to.
//!
//! A window that runs past Sunday midnight is split in two: the part up to
//! minute 10,080 and a wrapped part starting at minute 0, i.e. the following
//! Monday.
//!
//! Start times are wall-clock times in the deployment timezone
//! (`Settings::timezone`); every device's schedules are evaluated there.
//!
//! # Example Schedule Set (YAML)
//!
//! ```yaml
//! schedule:
//!   # Overnight, every day
//!   - days: everyday
//!     start: "23:30"
//!     duration: 480
//!
//!   # Weekend lie-in
//!   - days: [sat, sun]
//!     start: "07:30"
//!     duration: 120
//!
//!   # Office closed, currently ignored
//!   - days: weekdays
//!     start: "18:00"
//!     duration: 600
//!     enabled: false
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use paperclock::schedule::{ScheduleSet, should_sleep_at};
//!
//! let set = ScheduleSet::load("config/schedule.yaml")?;
//! let schedules = set.into_schedules(device.id)?;
//!
//! if should_sleep_at(&schedules, &now) {
//!     // clear the panel
//! }
//! ```

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
#[cfg(feature = "yaml")]
use std::path::Path;

use crate::device::DeviceId;
use crate::{Error, Result};

/// Minutes in one day.
pub const MINUTES_PER_DAY: u32 = 1440;

/// Minutes in one week; the length of the schedule timeline.
pub const MINUTES_PER_WEEK: u32 = 7 * MINUTES_PER_DAY;

/// Source of the current time, injectable for tests.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Day selector for schedule input.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum DaySelector {
    /// A specific list of days (e.g., ["mon", "tue", "wed"])
    List(Vec<String>),
    /// A named group: "all"/"everyday", "weekdays", "weekends", or a single day name
    Named(String),
}

/// The days a schedule applies to, Monday first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DaySet([bool; 7]);

impl DaySet {
    /// Every day of the week.
    pub const EVERYDAY: DaySet = DaySet([true; 7]);

    /// Build from explicit weekdays.
    pub fn from_days(days: &[Weekday]) -> Self {
        let mut set = [false; 7];
        for d in days {
            set[d.num_days_from_monday() as usize] = true;
        }
        Self(set)
    }

    /// Resolve a selector, rejecting unknown day names and empty sets.
    pub fn from_selector(selector: &DaySelector) -> Result<Self> {
        let set = match selector {
            DaySelector::Named(name) => match name.to_lowercase().as_str() {
                "all" | "everyday" | "daily" => Self::EVERYDAY,
                "weekdays" => Self([true, true, true, true, true, false, false]),
                "weekends" => Self([false, false, false, false, false, true, true]),
                _ => Self::from_days(&[weekday_from_str(name)?]),
            },
            DaySelector::List(days) => {
                let days = days
                    .iter()
                    .map(|d| weekday_from_str(d))
                    .collect::<Result<Vec<_>>>()?;
                Self::from_days(&days)
            }
        };
        if set.is_empty() {
            return Err(Error::invalid_input("schedule must apply to at least one day"));
        }
        Ok(set)
    }

    /// Whether the set includes `day`.
    pub fn contains(&self, day: Weekday) -> bool {
        self.0[day.num_days_from_monday() as usize]
    }

    /// True when no day is selected.
    pub fn is_empty(&self) -> bool {
        !self.0.iter().any(|d| *d)
    }

    /// Selected day indices, 0 = Monday.
    pub fn indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .map(|(i, _)| i as u32)
    }
}

impl Serialize for DaySet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        const NAMES: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];
        let names: Vec<&str> = self.indices().map(|i| NAMES[i as usize]).collect();
        names.serialize(serializer)
    }
}

/// Start of a sleep window, local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct StartTime {
    hour: u8,
    minute: u8,
}

impl StartTime {
    /// Build from hour (0..24) and minute (0..60).
    pub fn new(hour: u8, minute: u8) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(Error::invalid_input(format!(
                "start time {:02}:{:02} is out of range",
                hour, minute
            )));
        }
        Ok(Self { hour, minute })
    }

    /// Minutes since midnight.
    pub fn minute_of_day(&self) -> u32 {
        u32::from(self.hour) * 60 + u32::from(self.minute)
    }
}

impl std::fmt::Display for StartTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl Serialize for StartTime {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A validated recurring sleep window owned by one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schedule {
    /// Identifier
    pub id: u64,
    /// Owning device
    pub device_id: DeviceId,
    /// Days the window starts on
    pub days: DaySet,
    /// Local start time
    pub start: StartTime,
    /// Window length, 1..=1440
    pub duration_minutes: u32,
    /// Disabled schedules never put a device to sleep
    pub enabled: bool,
}

impl Schedule {
    /// Replace every field from `spec`, or none of them if `spec` is invalid.
    pub fn update(&mut self, spec: &ScheduleSpec) -> Result<()> {
        let updated = spec.validate(self.id, self.device_id)?;
        *self = updated;
        Ok(())
    }

    /// Timeline segments for this schedule, wrapped at the week boundary.
    pub fn segments(&self) -> Vec<(u32, u32)> {
        let mut out = Vec::new();
        if !self.enabled {
            return out;
        }
        for day in self.days.indices() {
            let start = day * MINUTES_PER_DAY + self.start.minute_of_day();
            let end = start + self.duration_minutes;
            if end > MINUTES_PER_WEEK {
                out.push((start, MINUTES_PER_WEEK));
                out.push((0, end % MINUTES_PER_WEEK));
            } else {
                out.push((start, end));
            }
        }
        out
    }
}

fn default_enabled() -> bool {
    true
}

/// Unvalidated schedule as supplied by a caller or a YAML file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScheduleSpec {
    /// Days this window starts on
    pub days: DaySelector,
    /// Start time (HH:MM, 24-hour format)
    pub start: String,
    /// Length in minutes (1..=1440)
    pub duration: u32,
    /// Whether the window is active
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ScheduleSpec {
    /// Check every field and build a [`Schedule`].
    pub fn validate(&self, id: u64, device_id: DeviceId) -> Result<Schedule> {
        let days = DaySet::from_selector(&self.days)?;
        let start = parse_time(&self.start)?;
        if !(1..=MINUTES_PER_DAY).contains(&self.duration) {
            return Err(Error::invalid_input(format!(
                "duration must be between 1 and {} minutes, got {}",
                MINUTES_PER_DAY, self.duration
            )));
        }
        Ok(Schedule {
            id,
            device_id,
            days,
            start,
            duration_minutes: self.duration,
            enabled: self.enabled,
        })
    }
}

/// A device's schedules as loaded from configuration.
///
/// Unknown keys are rejected, so a stray per-set `timezone` fails loudly
/// instead of being silently ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleSet {
    /// Sleep windows
    #[serde(default)]
    pub schedule: Vec<ScheduleSpec>,
}

impl ScheduleSet {
    /// Load a schedule set from a YAML file.
    #[cfg(feature = "yaml")]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read schedule file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse a schedule set from a YAML string.
    #[cfg(feature = "yaml")]
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::Config(format!("Invalid schedule YAML: {}", e)))
    }

    /// Validate every entry for `device`, numbering them from 1.
    ///
    /// One bad entry rejects the whole set.
    pub fn into_schedules(self, device: DeviceId) -> Result<Vec<Schedule>> {
        self.schedule
            .iter()
            .enumerate()
            .map(|(i, spec)| spec.validate(i as u64 + 1, device))
            .collect()
    }
}

/// Position of `dt` on the weekly timeline.
pub fn week_minute<T: TimeZone>(dt: &DateTime<T>) -> u32 {
    dt.weekday().num_days_from_monday() * MINUTES_PER_DAY + dt.hour() * 60 + dt.minute()
}

/// All enabled segments, sorted by `(start, end)`.
pub fn sleep_segments(schedules: &[Schedule]) -> Vec<(u32, u32)> {
    let mut segments: Vec<(u32, u32)> = schedules.iter().flat_map(Schedule::segments).collect();
    segments.sort_unstable();
    segments
}

/// Whether a device with these schedules should be asleep at `dt`.
///
/// `dt` must already be in the timezone the start times are written in.
/// Segments are scanned in start order and the scan stops at the first one
/// that starts after `now`. That is enough to answer membership with
/// overlapping segments, but does not identify *which* schedule matched.
pub fn should_sleep_at<T: TimeZone>(schedules: &[Schedule], dt: &DateTime<T>) -> bool {
    let now = week_minute(dt);
    for (start, end) in sleep_segments(schedules) {
        if now < start {
            break;
        }
        if now < end {
            tracing::debug!("Week minute {} inside sleep segment [{}, {})", now, start, end);
            return true;
        }
    }
    false
}

/// [`should_sleep_at`] for the clock's current time, viewed in `tz`.
pub fn should_sleep_now<Z: TimeZone>(schedules: &[Schedule], clock: &dyn Clock, tz: &Z) -> bool {
    should_sleep_at(schedules, &clock.now().with_timezone(tz))
}

/// Parse a time string (HH:MM) into a [`StartTime`].
pub fn parse_time(s: &str) -> Result<StartTime> {
    let bad = || Error::invalid_input(format!("start time '{}' is not HH:MM", s));
    let (h, m) = s.trim().split_once(':').ok_or_else(bad)?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return Err(bad());
    }
    let hour: u8 = h.parse().map_err(|_| bad())?;
    let minute: u8 = m.parse().map_err(|_| bad())?;
    StartTime::new(hour, minute)
}

/// Convert a day name to Weekday.
fn weekday_from_str(s: &str) -> Result<Weekday> {
    match s.to_lowercase().as_str() {
        "mon" | "monday" => Ok(Weekday::Mon),
        "tue" | "tuesday" => Ok(Weekday::Tue),
        "wed" | "wednesday" => Ok(Weekday::Wed),
        "thu" | "thursday" => Ok(Weekday::Thu),
        "fri" | "friday" => Ok(Weekday::Fri),
        "sat" | "saturday" => Ok(Weekday::Sat),
        "sun" | "sunday" => Ok(Weekday::Sun),
        _ => Err(Error::invalid_input(format!("unknown day '{}'", s))),
    }
}
