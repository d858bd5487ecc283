//! Settings and page cache ports (driven/secondary ports)
//!
//! Simple persisted key-value state: the "private mode" preference, the last
//! signed-in identity, and the last fetched page per `(user, url)`.

use crate::domain::{item::Item, newtypes::Email};

/// Persisted user preferences
#[async_trait::async_trait]
pub trait ISettingsStore: Send + Sync {
    /// Whether private mode is on (defaults to false)
    async fn is_private(&self) -> anyhow::Result<bool>;

    async fn set_private(&self, private: bool) -> anyhow::Result<()>;

    /// Last known signed-in identity
    async fn private_email(&self) -> anyhow::Result<Option<Email>>;

    async fn set_private_email(&self, email: Option<&Email>) -> anyhow::Result<()>;
}

/// Cache of previously fetched pages
///
/// `owner` is the signed-in user or `None` for the anonymous feed.
#[async_trait::async_trait]
pub trait IPageCache: Send + Sync {
    async fn load_page(&self, owner: Option<&Email>, url: &str)
        -> anyhow::Result<Option<Vec<Item>>>;

    async fn save_page(&self, owner: Option<&Email>, url: &str, items: &[Item])
        -> anyhow::Result<()>;
}
