//! Reconciliation engine
//!
//! The engine owns the authoritative [`FeedList`] and is the only writer of
//! it. It runs as an actor task: every mutation is a [`Command`] on an
//! unbounded channel, applied in receipt order, and every visible change is
//! published as a new [`FeedSnapshot`] on a `watch` channel.
//!
//! Network and cache I/O happen in the caller's task through the
//! [`EngineHandle`], never inside the actor, so realtime events keep flowing
//! while a page is loading. Results are tagged with the user generation they
//! were requested under; results for a previous user are dropped.
//!
//! ## Load flow (offset 0)
//!
//! ```text
//! BeginLoad ──→ status Loading (cold list only)
//!     │
//!     ├──→ CachedPage ──→ cached items shown (cold list only)
//!     │
//!     └──→ PageLoaded ──→ replace confirmed items, diffed by key set
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use snapsync_core::domain::{
    Email, FeedDiff, FeedList, FeedSnapshot, FeedStatus, Item, ItemKey, UserInfo,
};
use snapsync_core::ports::{IFeedListener, IPageCache, IPicsBackend};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::scheduler::UploadHandle;
use crate::SyncError;

// ============================================================================
// Commands
// ============================================================================

/// What the caller learns when starting a load
struct LoadTicket {
    generation: u64,
    user: Option<Email>,
}

/// Messages processed by the engine actor
enum Command {
    BeginLoad {
        offset: usize,
        reply: oneshot::Sender<LoadTicket>,
    },
    CachedPage {
        generation: u64,
        items: Vec<Item>,
    },
    PageLoaded {
        generation: u64,
        offset: usize,
        result: Result<Vec<Item>, String>,
        reply: oneshot::Sender<FeedDiff>,
    },
    ItemsAdded(Vec<Item>),
    ItemsRemoved {
        keys: Vec<ItemKey>,
        reply: Option<oneshot::Sender<FeedDiff>>,
    },
    CaptureCreated(PathBuf),
    ResetUser(Option<UserInfo>),
    Settled(oneshot::Sender<()>),
    Shutdown,
}

// ============================================================================
// Actor state
// ============================================================================

/// Collaborators of the engine
pub struct EngineDeps {
    pub backend: Arc<dyn IPicsBackend>,
    /// Cache for cache-then-network refreshes; `None` disables caching
    pub page_cache: Option<Arc<dyn IPageCache>>,
    /// Upload scheduler to trigger after captures and user changes
    pub uploads: Option<UploadHandle>,
}

/// The feed actor
pub struct ReconciliationEngine {
    list: FeedList,
    status: FeedStatus,
    user: Option<UserInfo>,
    generation: u64,
    /// Cached items are on display and no fresh page has replaced them yet
    showing_cached: bool,
    revision: u64,
    backend: Arc<dyn IPicsBackend>,
    uploads: Option<UploadHandle>,
    snapshots: watch::Sender<FeedSnapshot>,
}

impl ReconciliationEngine {
    /// Starts the actor for an initial user and returns its handle
    pub fn spawn(deps: EngineDeps, user: Option<UserInfo>) -> (EngineHandle, JoinHandle<()>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (snapshots, snapshot_rx) = watch::channel(FeedSnapshot::empty());

        deps.backend
            .set_token(user.as_ref().map(|u| u.id_token.clone()));

        let engine = Self {
            list: FeedList::new(),
            status: FeedStatus::Success,
            user,
            generation: 0,
            showing_cached: false,
            revision: 0,
            backend: Arc::clone(&deps.backend),
            uploads: deps.uploads,
            snapshots,
        };
        let task = tokio::spawn(engine.run(command_rx));

        let handle = EngineHandle {
            commands,
            snapshots: snapshot_rx,
            backend: deps.backend,
            page_cache: deps.page_cache,
        };
        (handle, task)
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        debug!("Reconciliation engine started");
        while let Some(command) = commands.recv().await {
            if matches!(command, Command::Shutdown) {
                break;
            }
            self.apply(command);
        }
        debug!("Reconciliation engine stopped");
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::BeginLoad { offset, reply } => {
                if offset == 0 && self.list.confirmed_len() == 0 {
                    self.set_status(FeedStatus::Loading);
                }
                let _ = reply.send(LoadTicket {
                    generation: self.generation,
                    user: self.user.as_ref().map(|u| u.email.clone()),
                });
            }
            Command::CachedPage { generation, items } => {
                if generation != self.generation || self.list.confirmed_len() > 0 {
                    return;
                }
                let diff = self.list.replace(&items);
                self.showing_cached = true;
                debug!(count = items.len(), "Showing cached page");
                self.status = FeedStatus::Success;
                self.publish(diff);
            }
            Command::PageLoaded {
                generation,
                offset,
                result,
                reply,
            } => {
                if generation != self.generation {
                    debug!(offset, "Dropping page for a previous user");
                    let _ = reply.send(FeedDiff::unchanged());
                    return;
                }
                let diff = self.page_loaded(offset, result);
                let _ = reply.send(diff);
            }
            Command::ItemsAdded(items) => {
                let diff = self.list.add(&items);
                debug!(
                    incoming = items.len(),
                    background = diff.background,
                    "Merged realtime additions"
                );
                self.publish(diff);
            }
            Command::ItemsRemoved { keys, reply } => {
                let diff = self.list.remove(&keys);
                if !diff.is_unchanged() {
                    self.publish(diff.clone());
                }
                if let Some(reply) = reply {
                    let _ = reply.send(diff);
                }
            }
            Command::CaptureCreated(path) => self.capture_created(path),
            Command::ResetUser(user) => self.reset_user(user),
            Command::Settled(reply) => {
                let _ = reply.send(());
            }
            Command::Shutdown => {}
        }
    }

    fn page_loaded(&mut self, offset: usize, result: Result<Vec<Item>, String>) -> FeedDiff {
        match result {
            Ok(page) => {
                let diff = if offset == 0 {
                    self.list.replace(&page)
                } else {
                    self.list.append(&page)
                };
                if offset == 0 {
                    self.showing_cached = false;
                }
                info!(
                    offset,
                    count = page.len(),
                    inserted = diff.inserted.len(),
                    removed = diff.removed.len(),
                    "Page loaded"
                );
                self.status = FeedStatus::Success;
                self.publish(diff.clone());
                diff
            }
            Err(message) => {
                if self.list.confirmed_len() > 0 || self.showing_cached {
                    warn!(offset, error = %message, "Page load failed; keeping current items");
                    self.set_status(FeedStatus::Success);
                } else {
                    warn!(offset, error = %message, "Page load failed with nothing to show");
                    self.set_status(FeedStatus::Error(message));
                }
                FeedDiff::unchanged()
            }
        }
    }

    fn capture_created(&mut self, path: PathBuf) {
        match Item::local_placeholder(&path, Utc::now()) {
            Ok(item) => {
                info!(key = %item.key, "Showing local capture");
                let diff = self.list.prepend_local(item);
                self.publish(diff);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Cannot show capture"),
        }
        if let Some(uploads) = &self.uploads {
            uploads.trigger(self.user.clone());
        }
    }

    fn reset_user(&mut self, user: Option<UserInfo>) {
        let same_user = self.user.as_ref().map(|u| &u.email) == user.as_ref().map(|u| &u.email);
        self.backend
            .set_token(user.as_ref().map(|u| u.id_token.clone()));
        self.user = user;

        if !same_user {
            info!(
                user = self.user.as_ref().map(|u| u.email.as_str()),
                "User changed; clearing feed"
            );
            self.generation += 1;
            self.showing_cached = false;
            self.status = FeedStatus::Success;
            let diff = self.list.clear();
            self.publish(diff);
        }
        if let Some(uploads) = &self.uploads {
            uploads.trigger(self.user.clone());
        }
    }

    fn set_status(&mut self, status: FeedStatus) {
        if self.status != status {
            self.status = status;
            self.publish(FeedDiff::unchanged());
        }
    }

    fn publish(&mut self, diff: FeedDiff) {
        // An error only stands while there is nothing confirmed to show
        if matches!(self.status, FeedStatus::Error(_)) && self.list.confirmed_len() > 0 {
            debug!("Confirmed items arrived; clearing error status");
            self.status = FeedStatus::Success;
        }
        self.revision += 1;
        let snapshot = FeedSnapshot {
            items: self.list.to_shared(),
            diff,
            status: self.status.clone(),
            revision: self.revision,
        };
        // No subscribers is fine; the handle keeps one receiver alive anyway
        let _ = self.snapshots.send(snapshot);
    }
}

// ============================================================================
// EngineHandle
// ============================================================================

/// Cloneable handle to the engine actor
///
/// Also serves as the realtime feed's listener: socket callbacks are turned
/// into commands. Commands sent after the actor stopped are dropped.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<FeedSnapshot>,
    backend: Arc<dyn IPicsBackend>,
    page_cache: Option<Arc<dyn IPageCache>>,
}

impl EngineHandle {
    /// Subscribes to feed snapshots
    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.snapshots.clone()
    }

    /// The latest published snapshot
    pub fn snapshot(&self) -> FeedSnapshot {
        self.snapshots.borrow().clone()
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Engine stopped; dropping command");
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SyncError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| SyncError::EngineStopped)?;
        response.await.map_err(|_| SyncError::EngineStopped)
    }

    /// Loads one page; offset 0 refreshes the feed
    ///
    /// A refresh first shows the cached copy of the page (when the list is
    /// cold), then replaces it with the fresh page and writes that back to the
    /// cache. Returns the diff applied by the fresh page; a failed load is
    /// reported through the snapshot status and yields an unchanged diff.
    pub async fn load_page(&self, limit: usize, offset: usize) -> Result<FeedDiff, SyncError> {
        let ticket = self
            .request(|reply| Command::BeginLoad { offset, reply })
            .await?;
        let url = self.backend.page_url(limit, offset);

        if offset == 0 {
            if let Some(cache) = &self.page_cache {
                match cache.load_page(ticket.user.as_ref(), &url).await {
                    Ok(Some(items)) => self.send(Command::CachedPage {
                        generation: ticket.generation,
                        items,
                    }),
                    Ok(None) => {}
                    Err(e) => warn!(url = %url, error = %format!("{e:#}"), "Failed to read page cache"),
                }
            }
        }

        let result = self.backend.list_items(limit, offset).await;
        if let (Ok(items), Some(cache), 0) = (&result, &self.page_cache, offset) {
            if let Err(e) = cache.save_page(ticket.user.as_ref(), &url, items).await {
                warn!(url = %url, error = %format!("{e:#}"), "Failed to write page cache");
            }
        }

        let result = result.map_err(|e| format!("{e:#}"));
        self.request(|reply| Command::PageLoaded {
            generation: ticket.generation,
            offset,
            result,
            reply,
        })
        .await
    }

    /// Merges realtime additions
    pub fn items_added(&self, items: Vec<Item>) {
        self.send(Command::ItemsAdded(items));
    }

    /// Applies realtime removals
    pub fn items_removed(&self, keys: Vec<ItemKey>) {
        self.send(Command::ItemsRemoved { keys, reply: None });
    }

    /// Shows a freshly captured file and triggers an upload
    pub fn capture_created(&self, path: PathBuf) {
        self.send(Command::CaptureCreated(path));
    }

    /// Deletes an item on the server, then locally
    pub async fn delete(&self, key: &ItemKey) -> Result<FeedDiff, SyncError> {
        self.backend
            .delete_item(key)
            .await
            .map_err(SyncError::backend)?;
        self.request(|reply| Command::ItemsRemoved {
            keys: vec![key.clone()],
            reply: Some(reply),
        })
        .await
    }

    /// Switches the signed-in user
    ///
    /// A different user clears the feed and invalidates in-flight loads; the
    /// same user only refreshes the backend token.
    pub fn reset_user(&self, user: Option<UserInfo>) {
        self.send(Command::ResetUser(user));
    }

    /// Waits until every command sent before this call has been applied
    pub async fn settled(&self) -> Result<(), SyncError> {
        self.request(Command::Settled).await
    }

    /// Stops the actor; later commands are dropped
    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }
}

impl IFeedListener for EngineHandle {
    fn on_opened(&self, url: &Url) {
        info!(url = %url, "Realtime feed opened");
    }

    fn on_items_added(&self, items: Vec<Item>) {
        self.items_added(items);
    }

    fn on_items_removed(&self, keys: Vec<ItemKey>) {
        self.items_removed(keys);
    }

    fn on_closed(&self, url: &Url) {
        info!(url = %url, "Realtime feed closed");
    }

    fn on_failure(&self, error: &str, url: &Url) {
        warn!(url = %url, error, "Realtime feed failed");
    }
}
