//! Token source port (driven/secondary port)
//!
//! Obtains a fresh identity token for the signed-in user. The concrete sign-in
//! flow is an external collaborator; the core only needs this contract:
//!
//! - `Ok(Some(token))` - a token is available
//! - `Ok(None)` - there is no session; callers continue anonymously
//! - `Err(_)` - a transient failure (e.g. network) while refreshing

use crate::domain::newtypes::IdToken;

#[async_trait::async_trait]
pub trait ITokenSource: Send + Sync {
    /// Fetches a token, refreshing it silently if the provider supports that
    async fn fetch_token(&self) -> anyhow::Result<Option<IdToken>>;
}
