//! Feed list reconciliation
//!
//! The feed is one ordered, key-unique list of [`Item`]s fed by three
//! independent sources: paginated REST loads, realtime add/remove events,
//! and optimistic placeholders for photos captured on this device.
//!
//! Every mutation is a pure function from the current items and the input to
//! the new items plus a [`FeedDiff`] describing what changed, so that a
//! renderer can animate precisely. [`FeedList`] is a thin owner over these
//! functions; serialization of concurrent mutations is the caller's job.
//!
//! ## Ordering
//!
//! - realtime additions are newer than everything loaded and are prepended
//! - page loads beyond the first are older and are appended
//! - local placeholders are prepended ahead of everything and survive
//!   refreshes until their server-confirmed counterpart arrives

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use super::item::Item;
use super::newtypes::{ClientKey, ItemKey};

// ============================================================================
// FeedDiff
// ============================================================================

/// Description of the last mutation applied to a feed list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedDiff {
    /// Number of items added at the head
    pub prepended: usize,
    /// Number of items added at the tail
    pub appended: usize,
    /// Indices in the new list of every item that was not there before
    pub inserted: Vec<usize>,
    /// Indices in the old list of every item that is gone
    pub removed: Vec<usize>,
    /// Nothing visible changed; renderers should neither animate nor scroll
    pub background: bool,
}

impl FeedDiff {
    /// A diff for a mutation that changed nothing
    #[must_use]
    pub fn unchanged() -> Self {
        Self {
            background: true,
            ..Self::default()
        }
    }

    /// True when the mutation neither inserted nor removed anything
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.inserted.is_empty() && self.removed.is_empty()
    }
}

// ============================================================================
// FeedStatus / FeedSnapshot
// ============================================================================

/// Externally visible load status of the feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum FeedStatus {
    /// First page of a cold list is in flight
    Loading,
    Success,
    /// No data could be loaded and none is cached
    Error(String),
}

/// Immutable view of the feed handed to consumers
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub items: Arc<[Item]>,
    pub diff: FeedDiff,
    pub status: FeedStatus,
    /// Monotonic counter incremented on every published change
    pub revision: u64,
}

impl FeedSnapshot {
    /// The snapshot before anything has been loaded
    #[must_use]
    pub fn empty() -> Self {
        Self {
            items: Arc::from(Vec::new()),
            diff: FeedDiff::unchanged(),
            status: FeedStatus::Success,
            revision: 0,
        }
    }
}

// ============================================================================
// Pure merge functions
// ============================================================================

/// Drops later duplicates (by key) from a batch, keeping the first occurrence
fn dedup_batch(batch: &[Item]) -> Vec<Item> {
    let mut seen = HashSet::new();
    batch
        .iter()
        .filter(|item| seen.insert(item.key.clone()))
        .cloned()
        .collect()
}

/// Merges realtime additions into the list
///
/// Existing items sharing a correlation key (or a key) with an incoming item
/// are evicted, then the batch is prepended. When every incoming item
/// replaced an existing one the list length is unchanged and the diff is
/// flagged as a background update.
pub fn merge_added(existing: &[Item], incoming: &[Item]) -> (Vec<Item>, FeedDiff) {
    let incoming = dedup_batch(incoming);
    if incoming.is_empty() {
        return (existing.to_vec(), FeedDiff::unchanged());
    }

    let client_keys: HashSet<&ClientKey> = incoming
        .iter()
        .filter_map(|item| item.client_key.as_ref())
        .collect();
    let keys: HashSet<&ItemKey> = incoming.iter().map(|item| &item.key).collect();

    let mut removed = Vec::new();
    let mut kept = Vec::with_capacity(existing.len());
    for (index, item) in existing.iter().enumerate() {
        let correlated = item
            .client_key
            .as_ref()
            .is_some_and(|ck| client_keys.contains(ck));
        if correlated || keys.contains(&item.key) {
            removed.push(index);
        } else {
            kept.push(item.clone());
        }
    }

    let matched = removed.len();
    let count = incoming.len();
    let mut items = incoming;
    items.extend(kept);

    let diff = FeedDiff {
        prepended: count,
        appended: 0,
        inserted: (0..count).collect(),
        removed,
        background: count == matched,
    };
    (items, diff)
}

/// Removes every item whose key is in `keys`, preserving relative order
pub fn apply_removed(existing: &[Item], keys: &[ItemKey]) -> (Vec<Item>, FeedDiff) {
    let keys: HashSet<&ItemKey> = keys.iter().collect();
    let mut removed = Vec::new();
    let mut items = Vec::with_capacity(existing.len());
    for (index, item) in existing.iter().enumerate() {
        if keys.contains(&item.key) {
            removed.push(index);
        } else {
            items.push(item.clone());
        }
    }

    if removed.is_empty() {
        return (items, FeedDiff::unchanged());
    }
    let diff = FeedDiff {
        removed,
        ..FeedDiff::default()
    };
    (items, diff)
}

/// Appends an older page at the tail, skipping keys already present
pub fn append_page(existing: &[Item], page: &[Item]) -> (Vec<Item>, FeedDiff) {
    let mut seen: HashSet<&ItemKey> = existing.iter().map(|item| &item.key).collect();
    let fresh: Vec<Item> = page
        .iter()
        .filter(|item| seen.insert(&item.key))
        .cloned()
        .collect();

    if fresh.is_empty() {
        return (existing.to_vec(), FeedDiff::unchanged());
    }

    let start = existing.len();
    let count = fresh.len();
    let mut items = existing.to_vec();
    items.extend(fresh);

    let diff = FeedDiff {
        appended: count,
        inserted: (start..start + count).collect(),
        ..FeedDiff::default()
    };
    (items, diff)
}

/// Compares two lists by key set
///
/// Produces the indices of removed items (in `old`) and inserted items (in
/// `new`). Identical key sets yield an unchanged diff even if the order
/// differs.
pub fn diff_keys(old: &[Item], new: &[Item]) -> FeedDiff {
    let old_keys: HashSet<&ItemKey> = old.iter().map(|item| &item.key).collect();
    let new_keys: HashSet<&ItemKey> = new.iter().map(|item| &item.key).collect();

    let removed: Vec<usize> = old
        .iter()
        .enumerate()
        .filter(|(_, item)| !new_keys.contains(&item.key))
        .map(|(index, _)| index)
        .collect();
    let inserted: Vec<usize> = new
        .iter()
        .enumerate()
        .filter(|(_, item)| !old_keys.contains(&item.key))
        .map(|(index, _)| index)
        .collect();

    if removed.is_empty() && inserted.is_empty() {
        return FeedDiff::unchanged();
    }
    FeedDiff {
        inserted,
        removed,
        ..FeedDiff::default()
    }
}

/// Replaces the confirmed contents with a fresh first page
///
/// Local placeholders not yet confirmed by the page stay at the head.
pub fn replace_page(existing: &[Item], page: &[Item]) -> (Vec<Item>, FeedDiff) {
    let page = dedup_batch(page);
    let page_keys: HashSet<&ItemKey> = page.iter().map(|item| &item.key).collect();
    let page_client_keys: HashSet<&ClientKey> = page
        .iter()
        .filter_map(|item| item.client_key.as_ref())
        .collect();

    let mut items: Vec<Item> = existing
        .iter()
        .filter(|item| item.is_local)
        .filter(|item| {
            let confirmed = item
                .client_key
                .as_ref()
                .is_some_and(|ck| page_client_keys.contains(ck));
            !confirmed && !page_keys.contains(&item.key)
        })
        .cloned()
        .collect();
    items.extend(page);

    let diff = diff_keys(existing, &items);
    (items, diff)
}

/// Prepends an optimistic placeholder ahead of everything
pub fn prepend_local(existing: &[Item], item: Item) -> (Vec<Item>, FeedDiff) {
    let removed: Vec<usize> = existing
        .iter()
        .enumerate()
        .filter(|(_, existing)| existing.key == item.key)
        .map(|(index, _)| index)
        .collect();

    let key = item.key.clone();
    let mut items = Vec::with_capacity(existing.len() + 1);
    items.push(item);
    items.extend(existing.iter().filter(|existing| existing.key != key).cloned());

    let diff = FeedDiff {
        prepended: 1,
        inserted: vec![0],
        removed,
        ..FeedDiff::default()
    };
    (items, diff)
}

// ============================================================================
// FeedList
// ============================================================================

/// The in-memory feed together with the diff of its last mutation
#[derive(Debug, Clone, Default)]
pub struct FeedList {
    items: Vec<Item>,
    last_diff: FeedDiff,
}

impl FeedList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a list from already ordered items (e.g. a cached page)
    #[must_use]
    pub fn from_items(items: Vec<Item>) -> Self {
        let (items, last_diff) = replace_page(&[], &items);
        Self { items, last_diff }
    }

    #[must_use]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn last_diff(&self) -> &FeedDiff {
        &self.last_diff
    }

    /// Number of items confirmed by the server (excludes placeholders)
    #[must_use]
    pub fn confirmed_len(&self) -> usize {
        self.items.iter().filter(|item| !item.is_local).count()
    }

    #[must_use]
    pub fn contains(&self, key: &ItemKey) -> bool {
        self.items.iter().any(|item| &item.key == key)
    }

    pub fn add(&mut self, incoming: &[Item]) -> FeedDiff {
        let (items, diff) = merge_added(&self.items, incoming);
        self.commit(items, diff)
    }

    pub fn remove(&mut self, keys: &[ItemKey]) -> FeedDiff {
        let (items, diff) = apply_removed(&self.items, keys);
        self.commit(items, diff)
    }

    pub fn append(&mut self, page: &[Item]) -> FeedDiff {
        let (items, diff) = append_page(&self.items, page);
        self.commit(items, diff)
    }

    pub fn replace(&mut self, page: &[Item]) -> FeedDiff {
        let (items, diff) = replace_page(&self.items, page);
        self.commit(items, diff)
    }

    pub fn prepend_local(&mut self, item: Item) -> FeedDiff {
        let (items, diff) = prepend_local(&self.items, item);
        self.commit(items, diff)
    }

    /// Removes everything, e.g. when the signed-in user changes
    pub fn clear(&mut self) -> FeedDiff {
        let diff = if self.items.is_empty() {
            FeedDiff::unchanged()
        } else {
            FeedDiff {
                removed: (0..self.items.len()).collect(),
                ..FeedDiff::default()
            }
        };
        self.commit(Vec::new(), diff)
    }

    /// Copies the current items into an immutable shared slice
    #[must_use]
    pub fn to_shared(&self) -> Arc<[Item]> {
        Arc::from(self.items.clone())
    }

    fn commit(&mut self, items: Vec<Item>, diff: FeedDiff) -> FeedDiff {
        self.items = items;
        self.last_diff = diff.clone();
        diff
    }
}
