//! Identity token sources
//!
//! Implementations of the [`ITokenSource`] port:
//!
//! - [`NoTokenSource`] - no session; everything runs anonymously
//! - [`StaticTokenSource`] - a fixed token (tests, `--token`)
//! - [`KeyringTokenSource`] - the token stored by `snapsync auth login` in
//!   the system keyring

use anyhow::{Context, Result};
use snapsync_core::domain::{Email, IdToken};
use snapsync_core::ports::ITokenSource;
use tracing::{debug, info, warn};

/// Keyring service name for stored tokens
const KEYRING_SERVICE: &str = "snapsync";

/// Token source without a session
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTokenSource;

#[async_trait::async_trait]
impl ITokenSource for NoTokenSource {
    async fn fetch_token(&self) -> Result<Option<IdToken>> {
        Ok(None)
    }
}

/// Token source that always returns the same token
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: IdToken,
}

impl StaticTokenSource {
    pub fn new(token: IdToken) -> Self {
        Self { token }
    }
}

#[async_trait::async_trait]
impl ITokenSource for StaticTokenSource {
    async fn fetch_token(&self) -> Result<Option<IdToken>> {
        Ok(Some(self.token.clone()))
    }
}

/// Reads the signed-in user's token from the system keyring
///
/// Tokens are stored with the service name "snapsync" and the user's email
/// as the username. Read failures are logged and treated as "no session", so
/// callers fall back to anonymous operation instead of failing.
#[derive(Debug, Clone)]
pub struct KeyringTokenSource {
    email: Email,
}

impl KeyringTokenSource {
    pub fn new(email: Email) -> Self {
        Self { email }
    }

    pub fn email(&self) -> &Email {
        &self.email
    }

    /// Stores `token` for `email`, replacing any previous token
    pub fn store(email: &Email, token: &IdToken) -> Result<()> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, email.as_str())
            .context("Failed to create keyring entry")?;
        entry
            .set_password(token.as_str())
            .context("Failed to store token in keyring")?;
        debug!(email = %email, "Stored token in keyring");
        Ok(())
    }

    /// Loads the token stored for `email`, if any
    pub fn load(email: &Email) -> Result<Option<IdToken>> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, email.as_str())
            .context("Failed to create keyring entry")?;
        match entry.get_password() {
            Ok(secret) => {
                let token = IdToken::new(secret).context("Stored token is empty")?;
                Ok(Some(token))
            }
            Err(keyring::Error::NoEntry) => {
                debug!(email = %email, "No token found in keyring");
                Ok(None)
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to read from keyring")),
        }
    }

    /// Removes the token stored for `email`
    pub fn clear(email: &Email) -> Result<()> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, email.as_str())
            .context("Failed to create keyring entry")?;
        match entry.delete_credential() {
            Ok(()) => {
                info!(email = %email, "Cleared token from keyring");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => {
                debug!(email = %email, "No token to clear");
                Ok(())
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to delete from keyring")),
        }
    }
}

#[async_trait::async_trait]
impl ITokenSource for KeyringTokenSource {
    async fn fetch_token(&self) -> Result<Option<IdToken>> {
        let email = self.email.clone();
        let loaded = tokio::task::spawn_blocking(move || Self::load(&email))
            .await
            .context("Keyring task panicked")?;
        match loaded {
            Ok(token) => Ok(token),
            Err(e) => {
                warn!(email = %self.email, error = %e, "Failed to fetch token");
                Ok(None)
            }
        }
    }
}
