//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for item keys, correlation keys, identities and
//! tokens. Each newtype checks its invariants at construction time.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use super::errors::DomainError;

// ============================================================================
// Item keys
// ============================================================================

/// Opaque server-assigned (or, for placeholders, client-assigned) item key
///
/// Keys are unique within a feed list and double as file names in the local
/// image cache, so they may not be empty or contain path separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemKey(String);

impl ItemKey {
    /// Create a validated ItemKey
    pub fn new(key: impl Into<String>) -> Result<Self, DomainError> {
        let key = key.into();
        if key.is_empty() || key.contains('/') || key.contains('\\') {
            return Err(DomainError::InvalidItemKey(key));
        }
        Ok(Self(key))
    }

    /// Returns the key as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ItemKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ItemKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ItemKey> for String {
    fn from(key: ItemKey) -> Self {
        key.0
    }
}

/// Client-chosen correlation key linking a local placeholder to its
/// eventual server-confirmed item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientKey(String);

impl ClientKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ClientKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Identity
// ============================================================================

/// Validated email address identifying a signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// Create a validated Email
    ///
    /// Only a structural check is made: a non-empty local part, an `@`, and
    /// a domain containing a dot.
    pub fn new(email: impl Into<String>) -> Result<Self, DomainError> {
        let email = email.into();
        let valid = match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            }
            None => false,
        };
        if !valid {
            return Err(DomainError::InvalidEmail(email));
        }
        Ok(Self(email))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Email {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Email {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

/// Short-lived signed identity token
///
/// `Debug` is redacted so tokens never end up in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdToken(String);

impl IdToken {
    pub fn new(token: impl Into<String>) -> Result<Self, DomainError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(DomainError::InvalidToken("token is empty".to_string()));
        }
        Ok(Self(token))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for an `Authorization` header
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for IdToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("IdToken(<redacted>)")
    }
}

/// A signed-in user: identity plus the token last issued for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub email: Email,
    pub id_token: IdToken,
}

impl UserInfo {
    pub fn new(email: Email, id_token: IdToken) -> Self {
        Self { email, id_token }
    }
}

// ============================================================================
// User partitions
// ============================================================================

/// Name of the directory partition used when nobody is signed in
pub const ANONYMOUS_PARTITION: &str = "anonymous";

/// Directory partition owning a user's queued files
///
/// Derived from the first 8 hex characters of the SHA-1 of the user's
/// email, or [`ANONYMOUS_PARTITION`] when there is no user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Partition(String);

impl Partition {
    #[must_use]
    pub fn for_user(user: Option<&Email>) -> Self {
        match user {
            Some(email) => {
                let digest = Sha1::digest(email.as_str().as_bytes());
                let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
                Self(hex[..8].to_string())
            }
            None => Self(ANONYMOUS_PARTITION.to_string()),
        }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self::for_user(None)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.0 == ANONYMOUS_PARTITION
    }
}

impl Display for Partition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_key_rejects_separators() {
        assert!(ItemKey::new("abc123").is_ok());
        assert!(ItemKey::new("").is_err());
        assert!(ItemKey::new("../etc").is_err());
        assert!(ItemKey::new("a\\b").is_err());
    }

    #[test]
    fn test_item_key_deserializes_from_plain_string() {
        let key: ItemKey = serde_json::from_str("\"k1\"").unwrap();
        assert_eq!(key.as_str(), "k1");
        assert!(serde_json::from_str::<ItemKey>("\"\"").is_err());
    }

    #[test]
    fn test_email_validation() {
        assert!(Email::new("user@example.com").is_ok());
        assert!(Email::new("user@localhost").is_err());
        assert!(Email::new("@example.com").is_err());
        assert!(Email::new("userexample.com").is_err());
        assert!(Email::new("user@example.").is_err());
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = IdToken::new("secret-jwt").unwrap();
        assert_eq!(format!("{token:?}"), "IdToken(<redacted>)");
        assert_eq!(token.bearer(), "Bearer secret-jwt");
        assert!(IdToken::new("  ").is_err());
    }

    #[test]
    fn test_partition_for_user_is_sha1_prefix() {
        // sha1("user@example.com") = 63a710569261a24b3766275b7000ce8d7b32e2f7
        let email = Email::new("user@example.com").unwrap();
        let partition = Partition::for_user(Some(&email));
        assert_eq!(partition.as_str(), "63a71056");
        assert!(!partition.is_anonymous());
    }

    #[test]
    fn test_partition_anonymous() {
        let partition = Partition::for_user(None);
        assert_eq!(partition.as_str(), "anonymous");
        assert!(partition.is_anonymous());
    }
}
