//! Shared fakes for upload queue and engine tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use snapsync_core::domain::{ClientKey, Email, IdToken, Item, ItemKey};
use snapsync_core::ports::{IPageCache, IPicsBackend};
use tokio::sync::Notify;
use url::Url;

/// A remote item with deterministic variant addresses
pub fn item(key: &str, client_key: Option<&str>) -> Item {
    let base = format!("https://pics.example.com/{key}");
    Item {
        key: ItemKey::new(key).unwrap(),
        added: 1_700_000_000_000,
        url: Url::parse(&base).unwrap(),
        small: Url::parse(&format!("{base}/small")).unwrap(),
        medium: Url::parse(&format!("{base}/medium")).unwrap(),
        large: Url::parse(&format!("{base}/large")).unwrap(),
        client_key: client_key.map(ClientKey::new),
        is_local: false,
    }
}

pub fn keys(items: &[Item]) -> Vec<&str> {
    items.iter().map(|i| i.key.as_str()).collect()
}

/// Scriptable in-memory backend
///
/// Pages are answered in the order they were queued; an empty script answers
/// with an empty page. When gated, `list_items` signals `started` and then
/// waits for `release`.
#[derive(Default)]
pub struct MockBackend {
    pages: Mutex<VecDeque<Result<Vec<Item>, String>>>,
    pub uploads: Mutex<Vec<(String, Option<String>)>>,
    pub deletes: Mutex<Vec<String>>,
    pub tokens: Mutex<Vec<Option<String>>>,
    failing_uploads: Mutex<Vec<String>>,
    gated: Mutex<bool>,
    pub started: Notify,
    pub release: Notify,
}

impl MockBackend {
    pub fn push_page(&self, items: Vec<Item>) {
        self.pages.lock().unwrap().push_back(Ok(items));
    }

    pub fn push_failure(&self, message: &str) {
        self.pages.lock().unwrap().push_back(Err(message.to_string()));
    }

    pub fn fail_uploads_of(&self, name: &str) {
        self.failing_uploads.lock().unwrap().push(name.to_string());
    }

    pub fn gate(&self) {
        *self.gated.lock().unwrap() = true;
    }

    pub fn uploaded_names(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl IPicsBackend for MockBackend {
    fn set_token(&self, token: Option<IdToken>) {
        self.tokens
            .lock()
            .unwrap()
            .push(token.map(|t| t.as_str().to_string()));
    }

    fn page_url(&self, limit: usize, offset: usize) -> String {
        format!("https://pics.example.com/items?limit={limit}&offset={offset}")
    }

    async fn list_items(&self, _limit: usize, _offset: usize) -> anyhow::Result<Vec<Item>> {
        let gated = *self.gated.lock().unwrap();
        if gated {
            self.started.notify_one();
            self.release.notified().await;
        }
        let next = self.pages.lock().unwrap().pop_front();
        match next {
            Some(Ok(items)) => Ok(items),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Ok(Vec::new()),
        }
    }

    async fn delete_item(&self, key: &ItemKey) -> anyhow::Result<()> {
        self.deletes.lock().unwrap().push(key.to_string());
        Ok(())
    }

    async fn upload_file(
        &self,
        path: &Path,
        client_name: &str,
        token: Option<&IdToken>,
    ) -> anyhow::Result<()> {
        anyhow::ensure!(path.exists(), "upload source {} missing", path.display());
        if self
            .failing_uploads
            .lock()
            .unwrap()
            .iter()
            .any(|n| n == client_name)
        {
            anyhow::bail!("HTTP 500 for {client_name}");
        }
        self.uploads.lock().unwrap().push((
            client_name.to_string(),
            token.map(|t| t.as_str().to_string()),
        ));
        Ok(())
    }

    async fn download(&self, _url: &Url, to: &Path) -> anyhow::Result<u64> {
        std::fs::write(to, b"image")?;
        Ok(5)
    }
}

/// Page cache kept in a map
#[derive(Default)]
pub struct MemoryPageCache {
    pub pages: Mutex<HashMap<(Option<String>, String), Vec<Item>>>,
}

impl MemoryPageCache {
    pub fn insert(&self, owner: Option<&Email>, url: &str, items: Vec<Item>) {
        self.pages
            .lock()
            .unwrap()
            .insert((owner.map(|e| e.to_string()), url.to_string()), items);
    }

    pub fn get(&self, owner: Option<&Email>, url: &str) -> Option<Vec<Item>> {
        self.pages
            .lock()
            .unwrap()
            .get(&(owner.map(|e| e.to_string()), url.to_string()))
            .cloned()
    }
}

#[async_trait::async_trait]
impl IPageCache for MemoryPageCache {
    async fn load_page(
        &self,
        owner: Option<&Email>,
        url: &str,
    ) -> anyhow::Result<Option<Vec<Item>>> {
        Ok(self.get(owner, url))
    }

    async fn save_page(
        &self,
        owner: Option<&Email>,
        url: &str,
        items: &[Item],
    ) -> anyhow::Result<()> {
        self.insert(owner, url, items.to_vec());
        Ok(())
    }
}
