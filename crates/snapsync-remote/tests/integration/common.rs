//! Shared test helpers for backend integration tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use snapsync_core::domain::IdToken;
use snapsync_core::ports::ITokenSource;
use wiremock::MockServer;

use snapsync_remote::api::PicsClient;

/// Token source returning a fixed token (or none) and counting calls
pub struct CountingTokenSource {
    token: Option<String>,
    calls: AtomicUsize,
}

impl CountingTokenSource {
    pub fn new(token: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            token: token.map(str::to_string),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ITokenSource for CountingTokenSource {
    async fn fetch_token(&self) -> anyhow::Result<Option<IdToken>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.token.as_deref().map(IdToken::new).transpose()?)
    }
}

/// Starts a mock server and a client pointing at it, signed in with `old-token`
pub async fn setup_backend(source: Arc<CountingTokenSource>) -> (MockServer, PicsClient) {
    let server = MockServer::start().await;
    let client = PicsClient::with_base_url(server.uri(), source);
    client.set_token(Some(IdToken::new("old-token").unwrap()));
    (server, client)
}

/// JSON for one item as the backend sends it
pub fn item_json(key: &str, client_key: Option<&str>) -> serde_json::Value {
    json!({
        "key": key,
        "added": 1_589_000_000_000_i64,
        "url": format!("https://pics.example.com/{key}"),
        "small": format!("https://pics.example.com/small/{key}"),
        "medium": format!("https://pics.example.com/medium/{key}"),
        "large": format!("https://pics.example.com/large/{key}"),
        "clientKey": client_key,
    })
}

/// The error payload for an expired token
pub fn token_expired_body() -> serde_json::Value {
    json!({ "errors": [{ "key": "token_expired", "message": "Token expired." }] })
}
