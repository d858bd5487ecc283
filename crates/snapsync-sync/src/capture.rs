//! Capture store - the on-device queue directories
//!
//! Layout under the queue root:
//!
//! ```text
//! <root>/local/<name>                     copies kept for local display
//! <root>/staging/<partition>/<name>       waiting to be uploaded
//! <root>/uploading/<partition>/<name>     upload in flight
//! ```
//!
//! `<partition>` is derived from the owning user's email (see
//! [`Partition`]); files captured without a user go to `anonymous`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use snapsync_core::config::QueueConfig;
use snapsync_core::domain::{Email, Partition};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::SyncError;

/// Length of generated capture names, without extension
const NAME_LENGTH: usize = 7;

/// Attempts at finding an unused capture name
const MAX_NAME_ATTEMPTS: usize = 5;

/// Number of files waiting in a user's partition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingCounts {
    pub staged: usize,
    pub uploading: usize,
}

/// Owner of the `local`, `staging` and `uploading` directories
#[derive(Debug, Clone)]
pub struct CaptureStore {
    local: PathBuf,
    staging: PathBuf,
    uploading: PathBuf,
}

impl CaptureStore {
    /// Creates a store rooted at `root`; directories are created lazily
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            local: root.join("local"),
            staging: root.join("staging"),
            uploading: root.join("uploading"),
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.root.clone())
    }

    /// Creates the three base directories
    pub async fn init(&self) -> Result<(), SyncError> {
        for dir in [&self.local, &self.staging, &self.uploading] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    pub fn local_dir(&self) -> &Path {
        &self.local
    }

    /// Staging directory of `user`'s partition
    pub fn staging_dir(&self, user: Option<&Email>) -> PathBuf {
        self.staging.join(Partition::for_user(user).as_str())
    }

    /// Uploading directory of `user`'s partition
    pub fn uploading_dir(&self, user: Option<&Email>) -> PathBuf {
        self.uploading.join(Partition::for_user(user).as_str())
    }

    /// Creates a new, empty capture file in `user`'s staging partition
    ///
    /// The file is named with a random 7-character name and a `.jpg`
    /// extension. A file left empty is discarded by the next queue run.
    #[instrument(skip(self, user), fields(user = user.map(Email::as_str)))]
    pub async fn create_capture(&self, user: Option<&Email>) -> Result<PathBuf, SyncError> {
        let dir = self.staging_dir(user);
        tokio::fs::create_dir_all(&dir).await?;

        for _ in 0..MAX_NAME_ATTEMPTS {
            let path = dir.join(format!("{}.jpg", random_name()));
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => {
                    debug!(path = %path.display(), "Created capture file");
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to create capture file");
                    return Err(e.into());
                }
            }
        }
        Err(SyncError::IoError(std::io::Error::new(
            ErrorKind::AlreadyExists,
            "no unused capture name found",
        )))
    }

    /// Copies an existing file into `user`'s staging partition
    ///
    /// A copy is also kept in the `local` directory so the image can be shown
    /// before the upload is confirmed. The staged file only appears under its
    /// final name once fully written. Returns the staged path.
    #[instrument(skip(self, source, user), fields(source = %source.display(), user = user.map(Email::as_str)))]
    pub async fn import(&self, source: &Path, user: Option<&Email>) -> Result<PathBuf, SyncError> {
        if !tokio::fs::try_exists(source).await? {
            return Err(SyncError::PathNotFound(source.to_path_buf()));
        }
        let extension = source
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| "jpg".to_string());
        let name = format!("{}.{extension}", random_name());

        tokio::fs::create_dir_all(&self.local).await?;
        let local = self.local.join(&name);
        tokio::fs::copy(source, &local).await?;

        let dir = self.staging_dir(user);
        tokio::fs::create_dir_all(&dir).await?;
        let partial = self.staging.join(format!(".{name}.part"));
        tokio::fs::copy(&local, &partial).await?;
        let staged = dir.join(&name);
        tokio::fs::rename(&partial, &staged).await?;

        info!(staged = %staged.display(), "Imported file");
        Ok(staged)
    }

    /// Counts the staged and uploading files of `user`
    pub async fn pending(&self, user: Option<&Email>) -> Result<PendingCounts, SyncError> {
        Ok(PendingCounts {
            staged: count_files(&self.staging_dir(user)).await?,
            uploading: count_files(&self.uploading_dir(user)).await?,
        })
    }
}

/// Random lowercase alphanumeric name
fn random_name() -> String {
    Uuid::new_v4().simple().to_string()[..NAME_LENGTH].to_string()
}

async fn count_files(dir: &Path) -> Result<usize, SyncError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let mut count = 0;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            count += 1;
        }
    }
    Ok(count)
}
