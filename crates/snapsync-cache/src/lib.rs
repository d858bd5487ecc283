//! SnapSync Cache - Local state persistence
//!
//! SQLite-based storage for:
//! - User settings (private mode, last signed-in identity)
//! - The last fetched page per user and request URL
//!
//! ## Architecture
//!
//! This crate implements the `ISettingsStore` and `IPageCache` ports from
//! `snapsync-core` using SQLite as the storage backend. It is a driven
//! (secondary) adapter in the hexagonal architecture.
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use snapsync_cache::{DatabasePool, SqliteSettingsStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/snapsync/snapsync.db")).await?;
//! let store = SqliteSettingsStore::new(pool.pool().clone());
//! // Use store as ISettingsStore and IPageCache...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::SqliteSettingsStore;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of stored values failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}
