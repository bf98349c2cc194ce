//! Storage boundary.
//!
//! How wallpapers, devices and schedules are persisted is up to the host
//! application; the core only needs these lookups. [`MemoryStore`] backs the
//! tests and the demo, and is fine for a single-process deployment.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use crate::device::{Device, DeviceId, PowerState};
use crate::palette::PaletteColor;
use crate::schedule::Schedule;
use crate::wallpaper::{LabelPlacement, Wallpaper, WallpaperId};
use crate::{Error, Result};

/// Fields of a wallpaper that has been processed but not yet recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWallpaper {
    /// SHA-256 hex digest of the processed asset
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

/// Wallpaper records.
pub trait WallpaperStore: Send + Sync {
    /// Look up by id.
    fn wallpaper(&self, id: WallpaperId) -> Option<Wallpaper>;

    /// Look up by processed-asset digest.
    fn find_by_hash(&self, hash: &str) -> Option<Wallpaper>;

    /// Record a wallpaper. Fails with [`Error::DuplicateEntry`] if the digest is taken.
    fn insert_wallpaper(&self, new: NewWallpaper) -> Result<Wallpaper>;

    /// Change one record atomically.
    ///
    /// `change` edits a copy while the record is locked; the copy replaces the
    /// record only if `change` returns `Ok`. Returns the committed record.
    fn modify_wallpaper(
        &self,
        id: WallpaperId,
        change: &mut dyn FnMut(&mut Wallpaper) -> Result<()>,
    ) -> Result<Wallpaper>;

    /// Remove a record, returning it.
    fn delete_wallpaper(&self, id: WallpaperId) -> Result<Wallpaper>;
}

/// Device records, their schedules and their persisted power state.
pub trait DeviceStore: Send + Sync {
    /// Every known device.
    fn devices(&self) -> Vec<Device>;

    /// Look up by id.
    fn device(&self, id: DeviceId) -> Option<Device>;

    /// All schedules owned by a device, enabled or not.
    fn schedules(&self, device: DeviceId) -> Vec<Schedule>;

    /// Last persisted power state; [`PowerState::Awake`] if none.
    fn power_state(&self, device: DeviceId) -> PowerState;

    /// Persist a power state.
    fn set_power_state(&self, device: DeviceId, state: PowerState);
}

#[derive(Debug, Default)]
struct Inner {
    wallpapers: BTreeMap<WallpaperId, Wallpaper>,
    next_wallpaper: u64,
    devices: BTreeMap<DeviceId, Device>,
    schedules: HashMap<DeviceId, Vec<Schedule>>,
    power: HashMap<DeviceId, PowerState>,
}

/// In-process store implementing both storage traits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace a device.
    pub fn put_device(&self, device: Device) {
        self.write().devices.insert(device.id, device);
    }

    /// Replace a device's schedules.
    pub fn put_schedules(&self, device: DeviceId, schedules: Vec<Schedule>) {
        self.write().schedules.insert(device, schedules);
    }

    /// Number of wallpapers recorded.
    pub fn wallpaper_count(&self) -> usize {
        self.read().wallpapers.len()
    }
}

impl WallpaperStore for MemoryStore {
    fn wallpaper(&self, id: WallpaperId) -> Option<Wallpaper> {
        self.read().wallpapers.get(&id).cloned()
    }

    fn find_by_hash(&self, hash: &str) -> Option<Wallpaper> {
        self.read()
            .wallpapers
            .values()
            .find(|w| w.hash == hash)
            .cloned()
    }

    fn insert_wallpaper(&self, new: NewWallpaper) -> Result<Wallpaper> {
        let mut inner = self.write();
        if let Some(existing) = inner.wallpapers.values().find(|w| w.hash == new.hash) {
            return Err(Error::DuplicateEntry(existing.id.0));
        }
        inner.next_wallpaper += 1;
        let wallpaper = Wallpaper {
            id: WallpaperId(inner.next_wallpaper),
            hash: new.hash,
            size_bytes: new.size_bytes,
            placement: new.placement,
            text_color: new.text_color,
            shadow_color: new.shadow_color,
        };
        inner.wallpapers.insert(wallpaper.id, wallpaper.clone());
        Ok(wallpaper)
    }

    fn modify_wallpaper(
        &self,
        id: WallpaperId,
        change: &mut dyn FnMut(&mut Wallpaper) -> Result<()>,
    ) -> Result<Wallpaper> {
        let mut inner = self.write();
        let slot = inner
            .wallpapers
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("wallpaper {}", id)))?;
        let mut candidate = slot.clone();
        change(&mut candidate)?;
        *slot = candidate.clone();
        Ok(candidate)
    }

    fn delete_wallpaper(&self, id: WallpaperId) -> Result<Wallpaper> {
        self.write()
            .wallpapers
            .remove(&id)
            .ok_or_else(|| Error::not_found(format!("wallpaper {}", id)))
    }
}

impl DeviceStore for MemoryStore {
    fn devices(&self) -> Vec<Device> {
        self.read().devices.values().cloned().collect()
    }

    fn device(&self, id: DeviceId) -> Option<Device> {
        self.read().devices.get(&id).cloned()
    }

    fn schedules(&self, device: DeviceId) -> Vec<Schedule> {
        self.read()
            .schedules
            .get(&device)
            .cloned()
            .unwrap_or_default()
    }

    fn power_state(&self, device: DeviceId) -> PowerState {
        self.read().power.get(&device).copied().unwrap_or_default()
    }

    fn set_power_state(&self, device: DeviceId, state: PowerState) {
        self.write().power.insert(device, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::DeviceType;

    fn new_wallpaper(hash: &str) -> NewWallpaper {
        NewWallpaper {
            hash: hash.to_string(),
            size_bytes: 42,
            placement: LabelPlacement::default(),
            text_color: PaletteColor::White,
            shadow_color: PaletteColor::Black,
        }
    }

    #[test]
    fn test_insert_assigns_ids_and_dedups_by_hash() {
        let store = MemoryStore::new();
        let a = store.insert_wallpaper(new_wallpaper("aa")).unwrap();
        let b = store.insert_wallpaper(new_wallpaper("bb")).unwrap();
        assert_ne!(a.id, b.id);
        assert!(matches!(
            store.insert_wallpaper(new_wallpaper("aa")),
            Err(Error::DuplicateEntry(id)) if id == a.id.0
        ));
        assert_eq!(store.find_by_hash("bb").unwrap().id, b.id);
        assert_eq!(store.wallpaper_count(), 2);
    }

    #[test]
    fn test_modify_and_delete() {
        let store = MemoryStore::new();
        let wp = store.insert_wallpaper(new_wallpaper("aa")).unwrap();
        let modified = store
            .modify_wallpaper(wp.id, &mut |w| {
                w.text_color = PaletteColor::Red;
                Ok(())
            })
            .unwrap();
        assert_eq!(modified.text_color, PaletteColor::Red);
        assert_eq!(store.wallpaper(wp.id).unwrap().text_color, PaletteColor::Red);

        store.delete_wallpaper(wp.id).unwrap();
        assert!(store.wallpaper(wp.id).is_none());
        assert!(matches!(store.delete_wallpaper(wp.id), Err(Error::NotFound(_))));
        assert!(matches!(
            store.modify_wallpaper(wp.id, &mut |_| Ok(())),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_failed_modify_commits_nothing() {
        let store = MemoryStore::new();
        let wp = store.insert_wallpaper(new_wallpaper("aa")).unwrap();
        let result = store.modify_wallpaper(wp.id, &mut |w| {
            w.text_color = PaletteColor::Green;
            Err(Error::invalid_input("rejected"))
        });
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(store.wallpaper(wp.id).unwrap(), wp);
    }

    #[test]
    fn test_power_state_defaults_to_awake() {
        let store = MemoryStore::new();
        let device = Device::new(DeviceId(3), "10.0.0.3", DeviceType::Acep7);
        store.put_device(device.clone());
        assert_eq!(store.power_state(device.id), PowerState::Awake);
        store.set_power_state(device.id, PowerState::Sleep);
        assert_eq!(store.power_state(device.id), PowerState::Sleep);
        assert_eq!(store.devices(), vec![device]);
        assert!(store.schedules(DeviceId(3)).is_empty());
    }
}
