//! Feed listener port (driving side of the realtime channel)
//!
//! The realtime channel decodes server frames and reports them through this
//! trait. Callbacks are synchronous and must not block: implementations are
//! expected to forward the event (e.g. onto a channel) and return.

use url::Url;

use crate::domain::{item::Item, newtypes::ItemKey};

pub trait IFeedListener: Send + Sync {
    fn on_opened(&self, url: &Url);

    /// Items were added on the server, newest first
    fn on_items_added(&self, items: Vec<Item>);

    fn on_items_removed(&self, keys: Vec<ItemKey>);

    fn on_closed(&self, url: &Url);

    /// The transport failed; the channel is already dropped
    fn on_failure(&self, error: &str, url: &Url);
}
