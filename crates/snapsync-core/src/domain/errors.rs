//! Domain error types
//!
//! Validation failures raised when constructing domain newtypes and items.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Item key is empty or contains a path separator
    #[error("Invalid item key: {0}")]
    InvalidItemKey(String),

    /// Invalid email address format
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    /// Token string is empty
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// A local path could not be expressed as a file URL
    #[error("Invalid local path: {0}")]
    InvalidLocalPath(String),

    /// A queued file name is not a plain file name
    #[error("Invalid file name: {0}")]
    InvalidFileName(String),
}
