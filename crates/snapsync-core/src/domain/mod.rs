//! Domain entities and business logic
//!
//! - Newtypes for keys, identities and tokens
//! - Remote items and their size variants
//! - The feed list and its reconciliation functions
//! - Domain-specific error types

pub mod errors;
pub mod feed;
pub mod item;
pub mod newtypes;

// Re-export commonly used types
pub use errors::DomainError;
pub use feed::{FeedDiff, FeedList, FeedSnapshot, FeedStatus};
pub use item::{Item, ItemSize};
pub use newtypes::*;
