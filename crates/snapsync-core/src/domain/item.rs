//! Remote items
//!
//! An [`Item`] is one photo as the backend describes it: an opaque key, a
//! creation timestamp and the addresses of its size variants. Items are
//! immutable once created; the feed replaces them wholesale.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::errors::DomainError;
use super::newtypes::{ClientKey, ItemKey};

/// Size variant of an item's image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemSize {
    Small,
    Large,
}

impl ItemSize {
    /// Directory name used for cached variants of this size
    #[must_use]
    pub fn dir_name(&self) -> &'static str {
        match self {
            ItemSize::Small => "small",
            ItemSize::Large => "large",
        }
    }
}

/// A content record in the feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Unique key within the feed
    pub key: ItemKey,
    /// Creation time in milliseconds since the Unix epoch
    pub added: i64,
    /// Address of the original upload
    pub url: Url,
    pub small: Url,
    pub medium: Url,
    pub large: Url,
    /// Correlation key chosen by the uploading client, if any
    #[serde(default)]
    pub client_key: Option<ClientKey>,
    /// Whether this is an optimistic placeholder created on this device
    #[serde(skip)]
    pub is_local: bool,
}

impl Item {
    /// Builds an optimistic placeholder for a freshly captured file
    ///
    /// The file name is used as both key and correlation key, and every size
    /// variant points at the local file.
    pub fn local_placeholder(path: &Path, added: DateTime<Utc>) -> Result<Self, DomainError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DomainError::InvalidFileName(path.display().to_string()))?;
        let key = ItemKey::new(name)?;
        let url = Url::from_file_path(path)
            .map_err(|()| DomainError::InvalidLocalPath(path.display().to_string()))?;

        Ok(Self {
            key,
            added: added.timestamp_millis(),
            url: url.clone(),
            small: url.clone(),
            medium: url.clone(),
            large: url,
            client_key: Some(ClientKey::new(name)),
            is_local: true,
        })
    }

    /// Creation time as a UTC timestamp
    #[must_use]
    pub fn added_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.added).single()
    }

    /// Address of the given size variant
    #[must_use]
    pub fn variant(&self, size: ItemSize) -> &Url {
        match size {
            ItemSize::Small => &self.small,
            ItemSize::Large => &self.large,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_deserialization() {
        let json = r#"{
            "key": "abc123",
            "added": 1589000000000,
            "url": "https://pics.example.com/abc123",
            "small": "https://pics.example.com/small/abc123",
            "medium": "https://pics.example.com/medium/abc123",
            "large": "https://pics.example.com/large/abc123",
            "clientKey": "x7k2m9q.jpg"
        }"#;

        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.key.as_str(), "abc123");
        assert_eq!(item.client_key.unwrap().as_str(), "x7k2m9q.jpg");
        assert!(!item.is_local);
        assert_eq!(item.small.path(), "/small/abc123");
    }

    #[test]
    fn test_item_without_client_key() {
        let json = r#"{
            "key": "abc123",
            "added": 0,
            "url": "https://pics.example.com/abc123",
            "small": "https://pics.example.com/s",
            "medium": "https://pics.example.com/m",
            "large": "https://pics.example.com/l",
            "clientKey": null
        }"#;

        let item: Item = serde_json::from_str(json).unwrap();
        assert!(item.client_key.is_none());
        assert_eq!(item.added_at().unwrap().timestamp(), 0);
    }

    #[test]
    fn test_local_placeholder_uses_file_name_and_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q1w2e3r.jpg");
        let now = Utc::now();

        let item = Item::local_placeholder(&path, now).unwrap();
        assert_eq!(item.key.as_str(), "q1w2e3r.jpg");
        assert_eq!(item.client_key.as_ref().unwrap().as_str(), "q1w2e3r.jpg");
        assert!(item.is_local);
        assert_eq!(item.url.scheme(), "file");
        assert_eq!(item.small, item.large);
        assert_eq!(item.added, now.timestamp_millis());
    }

    #[test]
    fn test_local_placeholder_rejects_relative_path() {
        let result = Item::local_placeholder(Path::new("relative.jpg"), Utc::now());
        assert!(matches!(result, Err(DomainError::InvalidLocalPath(_))));
    }

    #[test]
    fn test_variant_selection() {
        let dir = tempfile::tempdir().unwrap();
        let item = Item::local_placeholder(&dir.path().join("a.jpg"), Utc::now()).unwrap();
        assert_eq!(item.variant(ItemSize::Small), &item.small);
        assert_eq!(item.variant(ItemSize::Large), &item.large);
        assert_eq!(ItemSize::Small.dir_name(), "small");
    }
}
