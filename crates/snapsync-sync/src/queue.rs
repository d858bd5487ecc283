//! Durable upload queue
//!
//! Each queued file moves through its user's partition directories:
//!
//! ```text
//! staging ──rename──→ uploading ──upload ok──→ deleted
//!    ↑                    │
//!    └──rename back───────┘  upload failed
//!    ↑                    │
//!    └──stale recovery────┘  left in uploading longer than the threshold
//! ```
//!
//! A run first recovers stale in-flight files, then uploads staged files
//! oldest first (by modification time) until staging is empty or a step
//! fails. A failing step stops the run; the next trigger resumes it. Empty
//! staged files are corrupt captures and are deleted outright.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use snapsync_core::domain::{Email, IdToken, UserInfo};
use snapsync_core::ports::IPicsBackend;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::capture::CaptureStore;
use crate::SyncError;

/// Default age after which an in-flight upload is considered orphaned
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(6 * 60 * 60);

/// Outcome of one queue run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueRunSummary {
    /// Stale files moved from uploading back to staging
    pub recovered: usize,
    /// Files uploaded and deleted
    pub uploaded: usize,
    /// Empty files deleted without uploading
    pub discarded: usize,
    /// Why the run stopped early, if it did
    pub failed: Option<String>,
}

impl QueueRunSummary {
    /// True when the run found nothing to do
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.recovered == 0 && self.uploaded == 0 && self.discarded == 0 && self.failed.is_none()
    }
}

/// A staged file picked for upload
struct StagedFile {
    path: PathBuf,
    name: String,
    len: u64,
}

/// Uploads queued files for one user partition per run
pub struct UploadQueue {
    store: Arc<CaptureStore>,
    backend: Arc<dyn IPicsBackend>,
    stale_after: Duration,
    /// Serializes runs so redundant triggers never race on the directories
    running: Mutex<()>,
}

impl UploadQueue {
    pub fn new(store: Arc<CaptureStore>, backend: Arc<dyn IPicsBackend>) -> Self {
        Self {
            store,
            backend,
            stale_after: DEFAULT_STALE_AFTER,
            running: Mutex::new(()),
        }
    }

    /// Overrides the staleness threshold
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn store(&self) -> &Arc<CaptureStore> {
        &self.store
    }

    /// Recovers stale uploads and uploads the staged files of `user`
    ///
    /// Safe to call concurrently and redundantly: runs are serialized and an
    /// empty staging directory makes a run a no-op. Errors are returned only
    /// for failures to read the queue directories; failures of individual
    /// files end the run and are reported in [`QueueRunSummary::failed`].
    #[instrument(skip(self, user), fields(user = user.map(|u| u.email.as_str())))]
    pub async fn run(&self, user: Option<&UserInfo>) -> Result<QueueRunSummary, SyncError> {
        let _running = self.running.lock().await;
        let email = user.map(|u| &u.email);
        let token = user.map(|u| &u.id_token);

        let mut summary = QueueRunSummary {
            recovered: self.recover_stale(email).await?,
            ..QueueRunSummary::default()
        };
        self.upload_oldest_first(email, token, &mut summary).await?;

        if summary.is_noop() {
            debug!("Nothing to upload");
        } else {
            info!(
                recovered = summary.recovered,
                uploaded = summary.uploaded,
                discarded = summary.discarded,
                failed = summary.failed.as_deref(),
                "Upload queue run finished"
            );
        }
        Ok(summary)
    }

    /// Moves files left in uploading for longer than the threshold back to staging
    async fn recover_stale(&self, user: Option<&Email>) -> Result<usize, SyncError> {
        let uploading = self.store.uploading_dir(user);
        let staging = self.store.staging_dir(user);
        let now = SystemTime::now();
        let mut recovered = 0;

        for (path, modified, _) in list_files(&uploading).await? {
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age <= self.stale_after {
                continue;
            }
            let Some(name) = path.file_name() else { continue };
            tokio::fs::create_dir_all(&staging).await?;
            let dest = staging.join(name);
            match tokio::fs::rename(&path, &dest).await {
                Ok(()) => {
                    info!(file = %dest.display(), age_secs = age.as_secs(), "Recovered stale upload");
                    recovered += 1;
                }
                Err(e) => warn!(file = %path.display(), error = %e, "Failed to recover stale upload"),
            }
        }
        Ok(recovered)
    }

    async fn upload_oldest_first(
        &self,
        user: Option<&Email>,
        token: Option<&IdToken>,
        summary: &mut QueueRunSummary,
    ) -> Result<(), SyncError> {
        let staging = self.store.staging_dir(user);
        let uploading = self.store.uploading_dir(user);

        while let Some(file) = oldest_staged(&staging).await? {
            if file.len == 0 {
                match tokio::fs::remove_file(&file.path).await {
                    Ok(()) => {
                        info!(file = %file.path.display(), "Deleted empty file");
                        summary.discarded += 1;
                        continue;
                    }
                    Err(e) => {
                        warn!(file = %file.path.display(), error = %e, "Failed to delete empty file");
                        summary.failed = Some(format!("failed to delete empty file {}: {e}", file.name));
                        return Ok(());
                    }
                }
            }

            let in_flight = uploading.join(&file.name);
            let moved = match tokio::fs::create_dir_all(&uploading).await {
                Ok(()) => tokio::fs::rename(&file.path, &in_flight).await,
                Err(e) => Err(e),
            };
            if let Err(e) = moved {
                error!(
                    from = %file.path.display(),
                    to = %in_flight.display(),
                    error = %e,
                    "Failed to move file to uploading"
                );
                summary.failed = Some(format!("failed to move {} to uploading: {e}", file.name));
                return Ok(());
            }

            match self.backend.upload_file(&in_flight, &file.name, token).await {
                Ok(()) => {
                    if let Err(e) = tokio::fs::remove_file(&in_flight).await {
                        warn!(file = %in_flight.display(), error = %e, "Failed to delete uploaded file");
                    }
                    summary.uploaded += 1;
                }
                Err(e) => {
                    warn!(file = %in_flight.display(), error = %format!("{e:#}"), "Upload failed");
                    match tokio::fs::rename(&in_flight, &file.path).await {
                        Ok(()) => info!(file = %file.path.display(), "Moved file back to staging"),
                        Err(move_err) => warn!(
                            file = %in_flight.display(),
                            error = %move_err,
                            "Failed to move file back to staging; it will be recovered once stale"
                        ),
                    }
                    summary.failed = Some(format!("{e:#}"));
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

/// Regular files in `dir` with their modification time and size
///
/// A missing directory is an empty queue.
async fn list_files(dir: &Path) -> Result<Vec<(PathBuf, SystemTime, u64)>, SyncError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            // Removed between listing and stat
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        files.push((entry.path(), modified, metadata.len()));
    }
    Ok(files)
}

/// The staged file with the oldest modification time (ties broken by name)
///
/// Files whose names are not valid UTF-8 cannot be named in the upload
/// request; they are skipped so the rest of the queue keeps moving.
async fn oldest_staged(staging: &Path) -> Result<Option<StagedFile>, SyncError> {
    let files = list_files(staging).await?;
    debug!(dir = %staging.display(), count = files.len(), "Listed staging directory");
    let oldest = files
        .into_iter()
        .filter_map(|(path, modified, len)| {
            match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => Some((name.to_string(), path, modified, len)),
                None => {
                    warn!(file = %path.display(), "Skipping staged file with a non UTF-8 name");
                    None
                }
            }
        })
        .min_by(|(a_name, _, a_time, _), (b_name, _, b_time, _)| {
            a_time.cmp(b_time).then_with(|| a_name.cmp(b_name))
        });
    Ok(oldest.map(|(name, path, _, len)| StagedFile { path, name, len }))
}
