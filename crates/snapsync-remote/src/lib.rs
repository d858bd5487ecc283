//! SnapSync Remote - photo backend adapters
//!
//! Provides async adapters for:
//! - HTTP requests with a single token-refresh retry
//! - The typed REST API of the photo backend
//! - The realtime WebSocket feed
//! - Identity token sources (keyring, static, none)
//!
//! ## Modules
//!
//! - [`client`] - [`client::HttpExecutor`], the token-aware HTTP executor
//! - [`api`] - [`api::PicsClient`], implementing the `IPicsBackend` port
//! - [`socket`] - [`socket::RealtimeFeed`], the WebSocket event channel
//! - [`auth`] - `ITokenSource` implementations

pub mod api;
pub mod auth;
pub mod client;
pub mod socket;

use reqwest::StatusCode;
use thiserror::Error;

use crate::client::ApiError;

/// Errors that can occur when talking to the photo backend
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The request could not be sent or the response could not be read
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-2xx status
    #[error("Invalid status code {status} from '{url}'")]
    Status {
        status: StatusCode,
        url: String,
        /// Errors reported in the response body, if it had any
        errors: Vec<ApiError>,
    },

    /// The server reported `token_expired` and no fresh token fixed it
    #[error("Token expired for '{url}'")]
    AuthExpired { url: String, status: StatusCode },

    /// The response body was missing or malformed
    #[error("Invalid response body from '{url}': {message}")]
    Body { url: String, message: String },

    /// A header value could not be built (e.g. a token with control characters)
    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    /// Local file system failure while sending or receiving a file
    #[error("Local I/O error: {0}")]
    LocalIo(#[from] std::io::Error),

    /// The realtime channel failed or is not connected
    #[error("Socket error: {0}")]
    Socket(String),
}

impl RemoteError {
    /// Whether the failure was an expired token
    #[must_use]
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, RemoteError::AuthExpired { .. })
    }
}
