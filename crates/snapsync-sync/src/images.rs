//! Local cache of downloaded image variants
//!
//! Variants are stored per size under the images directory:
//!
//! ```text
//! <images>/small/<key>
//! <images>/large/<key>
//! ```
//!
//! Lookup order for [`ImageCache::fetch`]: a cached variant, then a local
//! capture copy (placeholders and items uploaded from this device), then a
//! download into the size directory. [`ImageCache::maintenance`] deletes
//! variants older than the configured age.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use snapsync_core::config::CacheConfig;
use snapsync_core::domain::{Item, ItemSize};
use snapsync_core::ports::IPicsBackend;
use tracing::{debug, info, instrument, warn};

use crate::SyncError;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Result of a maintenance sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub deleted: usize,
    pub freed_bytes: u64,
    pub errors: usize,
}

/// Downloaded small and large variants of feed items
pub struct ImageCache {
    images_dir: PathBuf,
    local_dir: PathBuf,
    backend: Arc<dyn IPicsBackend>,
    max_age: Duration,
}

impl ImageCache {
    /// # Arguments
    /// * `images_dir` - Root of the size directories
    /// * `local_dir` - Directory of local capture copies
    /// * `backend` - Used to download missing variants
    /// * `max_age` - Age after which maintenance deletes a variant
    pub fn new(
        images_dir: impl Into<PathBuf>,
        local_dir: impl Into<PathBuf>,
        backend: Arc<dyn IPicsBackend>,
        max_age: Duration,
    ) -> Self {
        Self {
            images_dir: images_dir.into(),
            local_dir: local_dir.into(),
            backend,
            max_age,
        }
    }

    pub fn from_config(
        config: &CacheConfig,
        local_dir: impl Into<PathBuf>,
        backend: Arc<dyn IPicsBackend>,
    ) -> Self {
        let max_age = Duration::from_secs(u64::from(config.image_max_age_days) * SECONDS_PER_DAY);
        Self::new(config.images.clone(), local_dir, backend, max_age)
    }

    /// Path of the cached `size` variant of `item`, whether or not it exists
    pub fn variant_path(&self, item: &Item, size: ItemSize) -> PathBuf {
        self.images_dir
            .join(size.dir_name())
            .join(item.key.as_str())
    }

    /// Returns a local file holding the `size` variant of `item`
    #[instrument(skip(self, item), fields(key = %item.key, size = size.dir_name()))]
    pub async fn fetch(&self, item: &Item, size: ItemSize) -> Result<PathBuf, SyncError> {
        let cached = self.variant_path(item, size);
        if is_file(&cached).await? {
            debug!("Cache hit");
            return Ok(cached);
        }

        if let Some(local) = self.local_copy(item).await? {
            debug!(path = %local.display(), "Using local capture copy");
            return Ok(local);
        }

        let url = item.variant(size);
        if let Some(parent) = cached.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = self
            .backend
            .download(url, &cached)
            .await
            .map_err(SyncError::backend)?;
        info!(url = %url, bytes, "Downloaded image variant");
        Ok(cached)
    }

    /// A copy of the image captured on this device, if any
    async fn local_copy(&self, item: &Item) -> Result<Option<PathBuf>, SyncError> {
        if item.is_local {
            if let Ok(path) = item.url.to_file_path() {
                if is_file(&path).await? {
                    return Ok(Some(path));
                }
            }
        }

        let mut names = vec![item.key.as_str()];
        if let Some(client_key) = &item.client_key {
            names.push(client_key.as_str());
        }
        for name in names {
            // Keys come from the server; never let one escape the directory
            if name.contains(['/', '\\']) || name == ".." {
                continue;
            }
            let path = self.local_dir.join(name);
            if is_file(&path).await? {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    /// Deletes cached variants not modified within the maximum age
    pub async fn maintenance(&self) -> Result<MaintenanceReport, SyncError> {
        let now = SystemTime::now();
        let mut report = MaintenanceReport::default();

        for size in [ItemSize::Small, ItemSize::Large] {
            let dir = self.images_dir.join(size.dir_name());
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let metadata = match entry.metadata().await {
                    Ok(metadata) if metadata.is_file() => metadata,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(path = %entry.path().display(), error = %e, "Cannot stat cached image");
                        report.errors += 1;
                        continue;
                    }
                };
                let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
                if age <= self.max_age {
                    continue;
                }
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => {
                        report.deleted += 1;
                        report.freed_bytes += metadata.len();
                    }
                    Err(e) => {
                        warn!(path = %entry.path().display(), error = %e, "Failed to delete cached image");
                        report.errors += 1;
                    }
                }
            }
        }

        info!(
            deleted = report.deleted,
            freed_bytes = report.freed_bytes,
            errors = report.errors,
            "Image cache maintenance finished"
        );
        Ok(report)
    }
}

async fn is_file(path: &Path) -> Result<bool, SyncError> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Ok(metadata.is_file()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
