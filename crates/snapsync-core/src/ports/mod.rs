//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the traits the sync engine depends on; their implementations
//! live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ITokenSource`] - Identity token acquisition (sign-in collaborator)
//! - [`IPicsBackend`] - REST operations against the photo backend
//! - [`IFeedListener`] - Receiver of realtime feed events
//! - [`ISettingsStore`] - Persisted user preferences
//! - [`IPageCache`] - Last fetched pages for cache-then-network loads

pub mod feed_listener;
pub mod pics_backend;
pub mod settings_store;
pub mod token_source;

pub use feed_listener::IFeedListener;
pub use pics_backend::IPicsBackend;
pub use settings_store::{IPageCache, ISettingsStore};
pub use token_source::ITokenSource;
