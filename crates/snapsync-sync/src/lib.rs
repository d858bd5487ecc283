//! SnapSync Sync - offline-first upload and feed reconciliation
//!
//! Provides:
//! - A durable, directory-based upload queue with stale in-flight recovery
//! - A capture store creating and importing files into the queue
//! - A debounced upload scheduler
//! - The reconciliation engine merging pages, realtime events and local
//!   captures into one feed
//! - A local cache of downloaded image variants
//!
//! ## Modules
//!
//! - [`capture`] - Queue directories and new capture files
//! - [`queue`] - The upload queue state machine
//! - [`scheduler`] - Coalesces upload triggers into queue runs
//! - [`engine`] - Single-owner feed actor and its handle
//! - [`images`] - Downloaded image variants

pub mod capture;
pub mod engine;
pub mod images;
pub mod queue;
pub mod scheduler;

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during upload and feed operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error occurred during file operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// A backend or cache call failed
    #[error("Backend error: {0}")]
    Backend(String),

    /// The engine actor is no longer running
    #[error("Engine stopped")]
    EngineStopped,

    /// A domain-level error propagated from snapsync-core
    #[error("Domain error: {0}")]
    DomainError(#[from] snapsync_core::domain::DomainError),
}

impl SyncError {
    /// Wraps a port failure, keeping its context chain in the message
    pub(crate) fn backend(err: anyhow::Error) -> Self {
        SyncError::Backend(format!("{err:#}"))
    }
}
