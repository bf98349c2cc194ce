//! Upload processing and content-addressed asset storage.
//!
//! An upload is composed onto the ingestion canvas, dithered onto the panel
//! palette and PNG-encoded. The PNG's SHA-256 digest names the file
//! (`{asset_dir}/{digest}.{ext}`) and is the dedup key: uploads that process
//! to the same bytes are the same wallpaper.
//!
//! Processing is slow (a blur and a full dither pass), so servers hand
//! uploads to [`Ingestor::spawn_ingest`] and return immediately.

use std::fmt::Write as _;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, ImageFormat};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;

use crate::compose::{decode_image, Compositor};
use crate::config::Settings;
use crate::palette::{DeviceType, PaletteColor};
use crate::quantize::PaletteQuantizer;
use crate::queue::QueueStore;
use crate::store::{NewWallpaper, WallpaperStore};
use crate::wallpaper::{LabelPlacement, LabelUpdate, Wallpaper, WallpaperId};
use crate::{Error, Result};

/// Label settings supplied with an upload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadSpec {
    /// Label left edge, fraction of canvas width
    pub x: f32,
    /// Label top edge, fraction of canvas height
    pub y: f32,
    /// Label width, fraction of canvas width
    pub width: f32,
    /// Label height, fraction of canvas height
    pub height: f32,
    /// Text colour name
    pub text_color: String,
    /// Shadow colour name
    pub shadow_color: String,
}

/// Validated [`UploadSpec`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelStyle {
    /// Label box
    pub placement: LabelPlacement,
    /// Text colour
    pub text_color: PaletteColor,
    /// Shadow colour
    pub shadow_color: PaletteColor,
}

impl UploadSpec {
    /// Parse upload metadata sent as JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Check fractions and colour names.
    pub fn validate(&self) -> Result<LabelStyle> {
        Ok(LabelStyle {
            placement: LabelPlacement::new(self.x, self.y, self.width, self.height)?,
            text_color: self.text_color.parse()?,
            shadow_color: self.shadow_color.parse()?,
        })
    }
}

/// A processed upload, ready to store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedAsset {
    /// Encoded PNG
    pub bytes: Vec<u8>,
    /// Lowercase SHA-256 hex digest of `bytes`
    pub hash: String,
}

/// Result of an ingestion.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// New wallpaper recorded
    Created(Wallpaper),
    /// Processed bytes matched an existing wallpaper
    Duplicate(Wallpaper),
}

impl IngestOutcome {
    /// The wallpaper, new or existing.
    pub fn wallpaper(&self) -> &Wallpaper {
        match self {
            IngestOutcome::Created(w) | IngestOutcome::Duplicate(w) => w,
        }
    }

    /// Whether the upload was already present.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, IngestOutcome::Duplicate(_))
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

/// Removes a partially written file unless disarmed.
struct CleanupGuard {
    path: Option<PathBuf>,
}

impl CleanupGuard {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn disarm(&mut self) {
        self.path = None;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to clean up {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// Processes uploads and manages the wallpaper library's files.
#[derive(Clone)]
pub struct Ingestor {
    settings: Settings,
    compositor: Compositor,
    quantizer: PaletteQuantizer,
    store: Arc<dyn WallpaperStore>,
}

impl std::fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor")
            .field("asset_dir", &self.settings.asset_dir)
            .field("compositor", &self.compositor)
            .finish_non_exhaustive()
    }
}

impl Ingestor {
    /// Create an ingestor dithering onto the six-colour palette every panel supports.
    pub fn new(settings: Settings, store: Arc<dyn WallpaperStore>) -> Result<Self> {
        settings.validate()?;
        let quantizer = PaletteQuantizer::new(DeviceType::Spectra6.palette(), settings.dither_levels)?;
        let compositor = Compositor::new(
            Arc::new(crate::compose::MonoLabelFont::default()),
            settings.blur_sigma,
        );
        Ok(Self {
            settings,
            compositor,
            quantizer,
            store,
        })
    }

    /// Dither uploads for a specific panel model instead.
    pub fn with_device_type(mut self, device_type: DeviceType) -> Result<Self> {
        self.quantizer = PaletteQuantizer::new(device_type.palette(), self.settings.dither_levels)?;
        Ok(self)
    }

    /// Use a custom compositor.
    #[must_use]
    pub fn with_compositor(mut self, compositor: Compositor) -> Self {
        self.compositor = compositor;
        self
    }

    /// Settings in use.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Where a wallpaper's asset lives.
    pub fn asset_path(&self, wallpaper: &Wallpaper) -> PathBuf {
        asset_path(&self.settings, &wallpaper.hash)
    }

    /// Compose, dither and encode an upload.
    pub fn process(&self, source: &[u8]) -> Result<ProcessedAsset> {
        let src = decode_image(source)?;
        let canvas = self.compositor.compose_wallpaper(
            &src,
            self.settings.canvas_width,
            self.settings.canvas_height,
        )?;
        let indexed = self.quantizer.quantize(&canvas)?;
        let rgb = indexed.to_rgb(self.quantizer.palette());

        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(rgb)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| Error::StorageFailure(format!("Failed to encode asset: {}", e)))?;
        let hash = sha256_hex(&bytes);
        Ok(ProcessedAsset { bytes, hash })
    }

    /// Process and store an upload held in memory.
    pub fn ingest_bytes(&self, source: &[u8], spec: &UploadSpec) -> Result<IngestOutcome> {
        let style = spec.validate()?;
        let asset = self.process(source)?;
        self.store_asset(asset, style)
    }

    /// Process and store an upload from disk.
    pub fn ingest_file(&self, path: &Path, spec: &UploadSpec) -> Result<IngestOutcome> {
        let style = spec.validate()?;
        let source = std::fs::read(path)
            .map_err(|e| Error::AssetUnavailable(format!("{}: {}", path.display(), e)))?;
        let asset = self.process(&source)?;
        self.store_asset(asset, style)
    }

    /// Validate now, process on the blocking pool.
    ///
    /// Invalid label settings are returned straight away; everything else
    /// surfaces through the join handle. Must be called inside a tokio runtime.
    pub fn spawn_ingest(
        self: &Arc<Self>,
        source: Vec<u8>,
        spec: UploadSpec,
    ) -> Result<JoinHandle<Result<IngestOutcome>>> {
        let style = spec.validate()?;
        let this = Arc::clone(self);
        Ok(tokio::task::spawn_blocking(move || {
            let result = this
                .process(&source)
                .and_then(|asset| this.store_asset(asset, style));
            match &result {
                Ok(outcome) => tracing::info!(
                    "Ingested wallpaper {} ({}{})",
                    outcome.wallpaper().id,
                    outcome.wallpaper().hash,
                    if outcome.is_duplicate() { ", duplicate" } else { "" }
                ),
                Err(e) => tracing::warn!("Ingestion failed: {}", e),
            }
            result
        }))
    }

    fn store_asset(&self, asset: ProcessedAsset, style: LabelStyle) -> Result<IngestOutcome> {
        if let Some(existing) = self.store.find_by_hash(&asset.hash) {
            tracing::debug!("Asset {} already present as wallpaper {}", asset.hash, existing.id);
            return Ok(IngestOutcome::Duplicate(existing));
        }

        std::fs::create_dir_all(&self.settings.asset_dir).map_err(|e| {
            Error::StorageFailure(format!(
                "Failed to create asset dir {}: {}",
                self.settings.asset_dir.display(),
                e
            ))
        })?;

        let final_path = asset_path(&self.settings, &asset.hash);
        let tmp_path = final_path.with_extension(format!(
            "{}.{:08x}.tmp",
            self.settings.asset_extension,
            rand::random::<u32>()
        ));

        let mut tmp_guard = CleanupGuard::new(tmp_path.clone());
        std::fs::write(&tmp_path, &asset.bytes)
            .map_err(|e| Error::StorageFailure(format!("Failed to write asset: {}", e)))?;
        std::fs::rename(&tmp_path, &final_path)
            .map_err(|e| Error::StorageFailure(format!("Failed to move asset into place: {}", e)))?;
        tmp_guard.disarm();

        let mut final_guard = CleanupGuard::new(final_path);
        let new = NewWallpaper {
            hash: asset.hash,
            size_bytes: asset.bytes.len() as u64,
            placement: style.placement,
            text_color: style.text_color,
            shadow_color: style.shadow_color,
        };
        match self.store.insert_wallpaper(new) {
            Ok(wallpaper) => {
                final_guard.disarm();
                Ok(IngestOutcome::Created(wallpaper))
            }
            Err(Error::DuplicateEntry(id)) => {
                // A concurrent upload of the same content won; the file is theirs now.
                final_guard.disarm();
                self.store
                    .wallpaper(WallpaperId(id))
                    .map(IngestOutcome::Duplicate)
                    .ok_or_else(|| Error::StorageFailure(format!("wallpaper {} vanished", id)))
            }
            Err(e) => Err(e),
        }
    }

    /// Change a wallpaper's label settings.
    pub fn update_label(&self, id: WallpaperId, update: &LabelUpdate) -> Result<Wallpaper> {
        self.store
            .modify_wallpaper(id, &mut |wallpaper| wallpaper.apply(update))
    }

    /// Unqueue a wallpaper everywhere, drop its record and delete its asset.
    pub fn delete(&self, id: WallpaperId, queues: &QueueStore) -> Result<Wallpaper> {
        if self.store.wallpaper(id).is_none() {
            return Err(Error::not_found(format!("wallpaper {}", id)));
        }
        let (devices, wallpaper) =
            queues.remove_wallpaper(id, || self.store.delete_wallpaper(id))?;

        let path = self.asset_path(&wallpaper);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Asset {} was already gone", path.display());
            }
            Err(e) => {
                return Err(Error::StorageFailure(format!(
                    "Failed to delete {}: {}",
                    path.display(),
                    e
                )))
            }
        }
        tracing::info!(
            "Deleted wallpaper {} (unqueued from {} devices)",
            id,
            devices.len()
        );
        Ok(wallpaper)
    }
}

/// `{asset_dir}/{hash}.{ext}`.
pub fn asset_path(settings: &Settings, hash: &str) -> PathBuf {
    settings
        .asset_dir
        .join(format!("{}.{}", hash, settings.asset_extension))
}
