//! Photo backend port (driven/secondary port)
//!
//! REST operations the sync engine needs from the backend. Implementations
//! own authentication headers and the single-retry token refresh policy, so
//! callers never see an expired-token failure that could still be recovered.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because failures at this boundary are
//!   adapter-specific; the upload queue treats every failure the same way.
//! - `page_url` exposes the request URL so that page caches can be keyed by
//!   the exact request that produced them.

use std::path::Path;

use url::Url;

use crate::domain::{
    item::Item,
    newtypes::{IdToken, ItemKey},
};

#[async_trait::async_trait]
pub trait IPicsBackend: Send + Sync {
    /// Replaces the token used for list and delete requests
    fn set_token(&self, token: Option<IdToken>);

    /// The URL requested for a page of items
    fn page_url(&self, limit: usize, offset: usize) -> String;

    /// Fetches one page of items, newest first
    async fn list_items(&self, limit: usize, offset: usize) -> anyhow::Result<Vec<Item>>;

    /// Deletes an item on the server
    async fn delete_item(&self, key: &ItemKey) -> anyhow::Result<()>;

    /// Uploads a local file
    ///
    /// # Arguments
    /// * `path` - File to send as the request body
    /// * `client_name` - Original file name, sent for server-side correlation
    /// * `token` - Token of the user owning the file (None for anonymous)
    ///
    /// Succeeds only on a 2xx response.
    async fn upload_file(
        &self,
        path: &Path,
        client_name: &str,
        token: Option<&IdToken>,
    ) -> anyhow::Result<()>;

    /// Downloads `url` into `to`, returning the number of bytes written
    async fn download(&self, url: &Url, to: &Path) -> anyhow::Result<u64>;
}
