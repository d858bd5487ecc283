//! PicsClient - IPicsBackend implementation for the photo backend
//!
//! Wraps the [`HttpExecutor`] with the backend's conventions: versioned
//! `Accept` header, the `Csrf-Token: nocheck` header, the current identity
//! token and the REST paths under the configured base URL.
//!
//! ## Design Notes
//!
//! - The current token lives behind a `std::sync::RwLock` because
//!   `IPicsBackend::set_token` is synchronous and is called from the engine
//!   actor when the user changes.
//! - Uploads take an explicit token: a queued file belongs to the user who
//!   captured it, not necessarily to the user signed in now.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use snapsync_core::config::BackendConfig;
use snapsync_core::domain::{IdToken, Item, ItemKey};
use snapsync_core::ports::{IPicsBackend, ITokenSource};
use tracing::{debug, info};
use url::Url;

use crate::client::{bearer_header, HttpExecutor};
use crate::RemoteError;

/// Media type of version 10 of the backend's JSON API
pub const PICS_VERSION_10: &str = "application/vnd.pics.v10+json";

pub const CSRF_HEADER: &str = "Csrf-Token";
pub const CSRF_NO_CHECK: &str = "nocheck";

/// Header carrying the original file name of an upload
pub const CLIENT_ITEM_HEADER: &str = "X-Client-Item";

/// Response of `GET /items`
#[derive(Debug, Deserialize)]
struct ItemsResponse {
    items: Vec<Item>,
}

/// REST client for the photo backend
pub struct PicsClient {
    http: HttpExecutor,
    /// Base URL without trailing slash
    base_url: String,
    token: RwLock<Option<IdToken>>,
}

impl PicsClient {
    /// Creates a client for the configured backend
    pub fn new(config: &BackendConfig, token_source: Arc<dyn ITokenSource>) -> Self {
        Self::with_base_url(config.base_url.clone(), token_source)
    }

    /// Creates a client with a custom base URL (useful for testing)
    pub fn with_base_url(base_url: impl Into<String>, token_source: Arc<dyn ITokenSource>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: HttpExecutor::new(token_source),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        }
    }

    /// The underlying executor
    pub fn http(&self) -> &HttpExecutor {
        &self.http
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Replaces the token sent with list and delete requests
    pub fn set_token(&self, token: Option<IdToken>) {
        debug!(authenticated = token.is_some(), "Updated PicsClient token");
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn current_token(&self) -> Option<IdToken> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Default headers, plus `Authorization` when a token is given
    fn headers(&self, token: Option<&IdToken>) -> Result<HeaderMap, RemoteError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(PICS_VERSION_10));
        headers.insert(
            HeaderName::from_static("csrf-token"),
            HeaderValue::from_static(CSRF_NO_CHECK),
        );
        if let Some(token) = token {
            headers.insert(AUTHORIZATION, bearer_header(token)?);
        }
        Ok(headers)
    }

    /// URL of one page of items
    #[must_use]
    pub fn page_url(&self, limit: usize, offset: usize) -> String {
        format!("{}/items?limit={limit}&offset={offset}", self.base_url)
    }

    /// Fetches one page of items, newest first
    pub async fn items(&self, limit: usize, offset: usize) -> Result<Vec<Item>, RemoteError> {
        let url = self.page_url(limit, offset);
        let headers = self.headers(self.current_token().as_ref())?;
        let response: ItemsResponse = self.http.get_json(&url, &headers).await?;
        debug!(url, count = response.items.len(), "Fetched items");
        Ok(response.items)
    }

    /// Deletes an item
    pub async fn delete(&self, key: &ItemKey) -> Result<StatusCode, RemoteError> {
        let url = format!("{}/items/{}", self.base_url, key);
        let headers = self.headers(self.current_token().as_ref())?;
        let status = self.http.delete(&url, &headers).await?;
        info!(key = %key, "Deleted item");
        Ok(status)
    }

    /// Uploads a local file on behalf of the user owning `token`
    pub async fn upload(
        &self,
        path: &Path,
        client_name: &str,
        token: Option<&IdToken>,
    ) -> Result<StatusCode, RemoteError> {
        let url = format!("{}/items", self.base_url);
        let mut headers = self.headers(token)?;
        let client_item = HeaderValue::from_str(client_name)
            .map_err(|_| RemoteError::InvalidHeader(format!("{CLIENT_ITEM_HEADER}: {client_name}")))?;
        headers.insert(HeaderName::from_static("x-client-item"), client_item);
        self.http.post_file(path, &url, &headers).await
    }
}

#[async_trait::async_trait]
impl IPicsBackend for PicsClient {
    fn set_token(&self, token: Option<IdToken>) {
        PicsClient::set_token(self, token);
    }

    fn page_url(&self, limit: usize, offset: usize) -> String {
        PicsClient::page_url(self, limit, offset)
    }

    async fn list_items(&self, limit: usize, offset: usize) -> anyhow::Result<Vec<Item>> {
        self.items(limit, offset)
            .await
            .with_context(|| format!("Failed to list items (limit {limit}, offset {offset})"))
    }

    async fn delete_item(&self, key: &ItemKey) -> anyhow::Result<()> {
        self.delete(key)
            .await
            .with_context(|| format!("Failed to delete item {key}"))?;
        Ok(())
    }

    async fn upload_file(
        &self,
        path: &Path,
        client_name: &str,
        token: Option<&IdToken>,
    ) -> anyhow::Result<()> {
        self.upload(path, client_name, token)
            .await
            .with_context(|| format!("Failed to upload '{}'", path.display()))?;
        Ok(())
    }

    async fn download(&self, url: &Url, to: &Path) -> anyhow::Result<u64> {
        self.http
            .download(url.as_str(), to)
            .await
            .with_context(|| format!("Failed to download '{url}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::NoTokenSource;

    fn client() -> PicsClient {
        PicsClient::with_base_url("https://pics.example.com/", Arc::new(NoTokenSource))
    }

    #[test]
    fn test_page_url() {
        let client = client();
        assert_eq!(client.base_url(), "https://pics.example.com");
        assert_eq!(
            client.page_url(50, 100),
            "https://pics.example.com/items?limit=50&offset=100"
        );
    }

    #[test]
    fn test_headers_include_token_when_set() {
        let client = client();
        let anonymous = client.headers(None).unwrap();
        assert_eq!(anonymous.get(ACCEPT).unwrap(), PICS_VERSION_10);
        assert_eq!(anonymous.get(CSRF_HEADER).unwrap(), CSRF_NO_CHECK);
        assert!(anonymous.get(AUTHORIZATION).is_none());

        let token = IdToken::new("jwt").unwrap();
        let authed = client.headers(Some(&token)).unwrap();
        assert_eq!(authed.get(AUTHORIZATION).unwrap(), "Bearer jwt");
    }

    #[test]
    fn test_set_token_replaces_current() {
        let client = client();
        assert!(client.current_token().is_none());
        client.set_token(Some(IdToken::new("t1").unwrap()));
        assert_eq!(client.current_token().unwrap().as_str(), "t1");
        client.set_token(None);
        assert!(client.current_token().is_none());
    }
}
