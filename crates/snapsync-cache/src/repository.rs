//! SQLite implementation of ISettingsStore and IPageCache
//!
//! ## Type Mapping
//!
//! | Domain Type    | SQL Type | Strategy                                     |
//! |----------------|----------|----------------------------------------------|
//! | settings value | TEXT     | serde_json serialization                     |
//! | Email (owner)  | TEXT     | `.as_str()`, or `"anon"` without a user      |
//! | Vec<Item>      | TEXT     | serde_json array                             |
//! | DateTime<Utc>  | TEXT     | ISO 8601 via `to_rfc3339()`                  |

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::debug;

use snapsync_core::domain::{Email, Item};
use snapsync_core::ports::{IPageCache, ISettingsStore};

use crate::CacheError;

/// Owner column value for pages fetched without a signed-in user
const ANONYMOUS_OWNER: &str = "anon";

const KEY_PRIVATE: &str = "private";
const KEY_PRIVATE_EMAIL: &str = "private_email";

fn owner_of(user: Option<&Email>) -> &str {
    user.map_or(ANONYMOUS_OWNER, Email::as_str)
}

/// SQLite-backed settings and page cache
#[derive(Clone)]
pub struct SqliteSettingsStore {
    pool: SqlitePool,
}

impl SqliteSettingsStore {
    /// Creates a new store over the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        value
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(CacheError::from)
    }

    async fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let json = serde_json::to_string(value)?;
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(&json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deletes every cached page of `user`
    pub async fn clear_pages(&self, user: Option<&Email>) -> Result<u64, CacheError> {
        let result = sqlx::query("DELETE FROM page_cache WHERE owner = ?")
            .bind(owner_of(user))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl ISettingsStore for SqliteSettingsStore {
    async fn is_private(&self) -> anyhow::Result<bool> {
        Ok(self.get::<bool>(KEY_PRIVATE).await?.unwrap_or(false))
    }

    async fn set_private(&self, private: bool) -> anyhow::Result<()> {
        self.put(KEY_PRIVATE, &private).await?;
        debug!(private, "Saved private mode");
        Ok(())
    }

    async fn private_email(&self) -> anyhow::Result<Option<Email>> {
        Ok(self.get::<Email>(KEY_PRIVATE_EMAIL).await?)
    }

    async fn set_private_email(&self, email: Option<&Email>) -> anyhow::Result<()> {
        match email {
            Some(email) => self.put(KEY_PRIVATE_EMAIL, email).await?,
            None => self.remove(KEY_PRIVATE_EMAIL).await?,
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl IPageCache for SqliteSettingsStore {
    async fn load_page(
        &self,
        owner: Option<&Email>,
        url: &str,
    ) -> anyhow::Result<Option<Vec<Item>>> {
        let body: Option<String> =
            sqlx::query_scalar("SELECT body FROM page_cache WHERE owner = ? AND url = ?")
                .bind(owner_of(owner))
                .bind(url)
                .fetch_optional(&self.pool)
                .await
                .map_err(CacheError::from)?;
        let items = body
            .map(|json| serde_json::from_str::<Vec<Item>>(&json))
            .transpose()
            .map_err(CacheError::from)?;
        Ok(items)
    }

    async fn save_page(
        &self,
        owner: Option<&Email>,
        url: &str,
        items: &[Item],
    ) -> anyhow::Result<()> {
        let body = serde_json::to_string(items).map_err(CacheError::from)?;
        sqlx::query(
            "INSERT INTO page_cache (owner, url, body, saved_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT(owner, url) DO UPDATE SET body = excluded.body, saved_at = excluded.saved_at",
        )
        .bind(owner_of(owner))
        .bind(url)
        .bind(&body)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(CacheError::from)?;
        debug!(owner = owner_of(owner), url, count = items.len(), "Cached page");
        Ok(())
    }
}
