//! Per-device wallpaper queues.
//!
//! A queue is an ordered list of unique wallpaper ids; the head is what the
//! device shows. [`WallpaperQueue`] is the plain algorithm. [`QueueStore`]
//! owns one queue per device behind its own lock, so mutations on a device
//! are serialized while different devices never wait on each other.
//!
//! Appends and wallpaper removal also share a library-wide gate: an append
//! holds it shared across its existence check and the append, removal holds
//! it exclusively across the purge and the record delete, so a queue never
//! ends up holding an id whose record is gone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::device::DeviceId;
use crate::store::WallpaperStore;
use crate::wallpaper::WallpaperId;
use crate::{Error, Result};

/// Ordered, duplicate-free list of wallpapers for one device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WallpaperQueue {
    ids: Vec<WallpaperId>,
}

impl WallpaperQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an existing order, rejecting duplicates.
    pub fn from_ids(ids: impl IntoIterator<Item = WallpaperId>) -> Result<Self> {
        let mut queue = Self::new();
        for id in ids {
            queue.append(id)?;
        }
        Ok(queue)
    }

    /// Current wallpaper.
    pub fn head(&self) -> Option<WallpaperId> {
        self.ids.first().copied()
    }

    /// Ids in priority order.
    pub fn ids(&self) -> &[WallpaperId] {
        &self.ids
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether `id` is queued.
    pub fn contains(&self, id: WallpaperId) -> bool {
        self.ids.contains(&id)
    }

    /// Move the head to the tail.
    pub fn shift_next(&mut self) {
        if self.ids.len() > 1 {
            self.ids.rotate_left(1);
        }
    }

    /// Replace the order with a uniformly random permutation.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if self.ids.len() > 1 {
            self.ids.shuffle(rng);
        }
    }

    /// Add `id` at the tail.
    pub fn append(&mut self, id: WallpaperId) -> Result<()> {
        if self.contains(id) {
            return Err(Error::DuplicateEntry(id.0));
        }
        self.ids.push(id);
        Ok(())
    }

    /// Move `id` to the head, keeping everything else in order.
    pub fn move_to_front(&mut self, id: WallpaperId) -> Result<()> {
        let pos = self.position(id)?;
        let id = self.ids.remove(pos);
        self.ids.insert(0, id);
        Ok(())
    }

    /// Drop `id` from the queue.
    pub fn remove(&mut self, id: WallpaperId) -> Result<()> {
        let pos = self.position(id)?;
        self.ids.remove(pos);
        Ok(())
    }

    fn position(&self, id: WallpaperId) -> Result<usize> {
        self.ids
            .iter()
            .position(|x| *x == id)
            .ok_or_else(|| Error::not_found(format!("wallpaper {} is not queued", id)))
    }
}

type QueueHandle = Arc<Mutex<WallpaperQueue>>;

/// All device queues, keyed by device.
#[derive(Debug, Default)]
pub struct QueueStore {
    queues: RwLock<HashMap<DeviceId, QueueHandle>>,
    membership: RwLock<()>,
}

impl QueueStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, device: DeviceId) -> QueueHandle {
        if let Some(handle) = self
            .queues
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&device)
        {
            return Arc::clone(handle);
        }
        let mut map = self.queues.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(device).or_default())
    }

    /// Run `f` with exclusive access to one device's queue.
    ///
    /// Only that device's lock is held; other devices stay available.
    pub fn with_queue<T>(&self, device: DeviceId, f: impl FnOnce(&mut WallpaperQueue) -> T) -> T {
        let handle = self.handle(device);
        let mut queue = handle.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut queue)
    }

    /// Replace a device's queue, e.g. when restoring persisted state.
    pub fn load(&self, device: DeviceId, ids: impl IntoIterator<Item = WallpaperId>) -> Result<()> {
        let queue = WallpaperQueue::from_ids(ids)?;
        self.with_queue(device, |q| *q = queue);
        Ok(())
    }

    /// Copy of a device's current order.
    pub fn snapshot(&self, device: DeviceId) -> Vec<WallpaperId> {
        self.with_queue(device, |q| q.ids().to_vec())
    }

    /// Current wallpaper for a device.
    pub fn head(&self, device: DeviceId) -> Option<WallpaperId> {
        self.with_queue(device, |q| q.head())
    }

    /// Rotate a device's queue by one.
    pub fn shift_next(&self, device: DeviceId) {
        self.with_queue(device, WallpaperQueue::shift_next);
    }

    /// Shuffle a device's queue with the thread RNG.
    pub fn shuffle(&self, device: DeviceId) {
        let mut rng = rand::thread_rng();
        self.with_queue(device, |q| q.shuffle(&mut rng));
    }

    /// Queue a wallpaper on a device. The wallpaper must exist in `library`.
    pub fn append(
        &self,
        device: DeviceId,
        id: WallpaperId,
        library: &dyn WallpaperStore,
    ) -> Result<()> {
        let _gate = self.membership.read().unwrap_or_else(PoisonError::into_inner);
        if library.wallpaper(id).is_none() {
            return Err(Error::not_found(format!("wallpaper {} does not exist", id)));
        }
        self.with_queue(device, |q| q.append(id))
    }

    /// Bring a queued wallpaper to the front.
    pub fn move_to_front(&self, device: DeviceId, id: WallpaperId) -> Result<()> {
        self.with_queue(device, |q| q.move_to_front(id))
    }

    /// Unqueue a wallpaper from one device.
    pub fn remove(&self, device: DeviceId, id: WallpaperId) -> Result<()> {
        self.with_queue(device, |q| q.remove(id))
    }

    /// Unqueue a wallpaper everywhere, then run `delete` before any append can see it again.
    ///
    /// Returns the devices that held it along with `delete`'s output. If
    /// `delete` fails the wallpaper stays unqueued.
    pub fn remove_wallpaper<T>(
        &self,
        id: WallpaperId,
        delete: impl FnOnce() -> Result<T>,
    ) -> Result<(Vec<DeviceId>, T)> {
        let _gate = self.membership.write().unwrap_or_else(PoisonError::into_inner);
        let devices = self.purge(id);
        let out = delete()?;
        Ok((devices, out))
    }

    /// Unqueue a wallpaper from every device; returns the devices that held it.
    ///
    /// Appends may race with this; use [`QueueStore::remove_wallpaper`] when the record is going away.
    pub fn purge(&self, id: WallpaperId) -> Vec<DeviceId> {
        let handles: Vec<(DeviceId, QueueHandle)> = self
            .queues
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(d, h)| (*d, Arc::clone(h)))
            .collect();

        let mut touched = Vec::new();
        for (device, handle) in handles {
            let mut queue = handle.lock().unwrap_or_else(PoisonError::into_inner);
            if queue.remove(id).is_ok() {
                touched.push(device);
            }
        }
        touched.sort();
        touched
    }
}
