//! Realtime feed over WebSocket
//!
//! [`RealtimeFeed`] keeps at most one connection to the backend's socket
//! endpoint and reports decoded server events to an [`IFeedListener`].
//! There is no reconnection: when the transport fails or the server closes
//! the connection, the listener is told once and the connection is dropped.
//! Reopening is up to the owner.
//!
//! ## Events
//!
//! ```text
//! {"event": "added",   "items": [...]}
//! {"event": "removed", "keys":  [...]}
//! {"event": "ping"}
//! {"event": "welcome"}
//! ```
//!
//! Unknown events are logged and ignored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use snapsync_core::domain::{IdToken, Item, ItemKey};
use snapsync_core::ports::IFeedListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use crate::RemoteError;

/// A decoded server event
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ServerEvent {
    Added { items: Vec<Item> },
    Removed { keys: Vec<ItemKey> },
    Ping,
    Welcome,
    #[serde(other)]
    Unknown,
}

/// Parses one text frame
pub fn parse_event(text: &str) -> Result<ServerEvent, serde_json::Error> {
    serde_json::from_str(text)
}

/// Orders listener callbacks against `close`
///
/// Callbacks run while `delivering` is held and only while the gate is open.
/// `shut` closes the gate and then waits for a callback in flight, unless it
/// is called from inside that callback.
#[derive(Default)]
struct Gate {
    open: AtomicBool,
    delivering: Mutex<()>,
    delivering_on: Mutex<Option<ThreadId>>,
}

impl Gate {
    fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
            ..Self::default()
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Runs `callback` if the gate is open
    fn deliver(&self, callback: impl FnOnce()) {
        let _delivering = relock(&self.delivering);
        if self.is_open() {
            self.with_owner(callback);
        }
    }

    /// Closes the gate and runs the terminal `callback` if it was open
    fn finish(&self, callback: impl FnOnce()) {
        let _delivering = relock(&self.delivering);
        if self.open.swap(false, Ordering::SeqCst) {
            self.with_owner(callback);
        }
    }

    fn shut(&self) {
        self.open.store(false, Ordering::SeqCst);
        if *relock(&self.delivering_on) == Some(thread::current().id()) {
            return;
        }
        drop(relock(&self.delivering));
    }

    fn with_owner(&self, callback: impl FnOnce()) {
        *relock(&self.delivering_on) = Some(thread::current().id());
        callback();
        *relock(&self.delivering_on) = None;
    }
}

fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The live connection
struct Connection {
    gate: Arc<Gate>,
    outgoing: mpsc::UnboundedSender<Message>,
    task: JoinHandle<()>,
}

/// WebSocket client delivering realtime add/remove events
pub struct RealtimeFeed {
    url: Url,
    listener: Arc<dyn IFeedListener>,
    connection: Mutex<Option<Connection>>,
}

impl RealtimeFeed {
    pub fn new(url: Url, listener: Arc<dyn IFeedListener>) -> Self {
        Self {
            url,
            listener,
            connection: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Connects, closing any previous connection first
    ///
    /// Returns once the connection attempt has been started; the outcome is
    /// reported through the listener. Must be called within a tokio runtime.
    pub fn open(&self, token: Option<&IdToken>) -> Result<(), RemoteError> {
        self.close();
        let request = self.request(token)?;

        let gate = Arc::new(Gate::new());
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        info!(url = %self.url, "Connecting");
        let task = tokio::spawn(run(
            self.url.clone(),
            request,
            Arc::clone(&self.listener),
            Arc::clone(&gate),
            outgoing_rx,
        ));

        *self.lock() = Some(Connection {
            gate,
            outgoing,
            task,
        });
        Ok(())
    }

    /// Sends a text frame
    pub fn send(&self, text: &str) -> Result<(), RemoteError> {
        let guard = self.lock();
        let connection = guard
            .as_ref()
            .filter(|c| c.gate.is_open())
            .ok_or_else(|| RemoteError::Socket("not connected".to_string()))?;
        connection
            .outgoing
            .send(Message::Text(text.to_string()))
            .map_err(|_| RemoteError::Socket("connection is gone".to_string()))
    }

    /// Whether a connection is open or being opened
    pub fn is_open(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|c| c.gate.is_open() && !c.task.is_finished())
    }

    /// Closes the connection, if any
    ///
    /// Idempotent. Waits for a listener callback already in progress on
    /// another thread, so no callback for this connection runs once `close`
    /// returns. Calling it from inside a callback does not wait.
    pub fn close(&self) {
        let connection = self.lock().take();
        if let Some(connection) = connection {
            connection.gate.shut();
            if connection.outgoing.send(Message::Close(None)).is_err() {
                connection.task.abort();
            }
            debug!(url = %self.url, "Closed");
        }
    }

    fn request(&self, token: Option<&IdToken>) -> Result<Request, RemoteError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| RemoteError::Socket(e.to_string()))?;
        let headers = request.headers_mut();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = token {
            let value = HeaderValue::from_str(&token.bearer())
                .map_err(|_| RemoteError::InvalidHeader("authorization token".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(request)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        relock(&self.connection)
    }
}

impl Drop for RealtimeFeed {
    fn drop(&mut self) {
        self.close();
    }
}

/// Connection task: connects, then pumps frames both ways until closed
async fn run(
    url: Url,
    request: Request,
    listener: Arc<dyn IFeedListener>,
    gate: Arc<Gate>,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
) {
    let stream = match tokio_tungstenite::connect_async(request).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            gate.finish(|| {
                warn!(url = %url, error = %e, "Connection failed");
                listener.on_failure(&e.to_string(), &url);
            });
            return;
        }
    };
    let (mut sink, mut frames) = stream.split();

    if !gate.is_open() {
        let _ = sink.send(Message::Close(None)).await;
        return;
    }
    gate.deliver(|| {
        info!(url = %url, "Connected");
        listener.on_opened(&url);
    });

    loop {
        tokio::select! {
            message = outgoing.recv() => {
                let message = message.unwrap_or(Message::Close(None));
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = sink.send(message).await {
                    gate.finish(|| listener.on_failure(&e.to_string(), &url));
                    return;
                }
                if closing {
                    return;
                }
            }
            frame = frames.next() => match frame {
                Some(Ok(Message::Text(text))) => dispatch(&text, listener.as_ref(), &gate),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => dispatch(&text, listener.as_ref(), &gate),
                    Err(_) => debug!(url = %url, "Ignoring non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    gate.finish(|| {
                        info!(url = %url, "Closed by server");
                        listener.on_closed(&url);
                    });
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    gate.finish(|| {
                        warn!(url = %url, error = %e, "Connection failed");
                        listener.on_failure(&e.to_string(), &url);
                    });
                    return;
                }
            },
        }
    }
}

fn dispatch(text: &str, listener: &dyn IFeedListener, gate: &Gate) {
    let event = match parse_event(text) {
        Ok(event) => event,
        Err(e) => {
            debug!(error = %e, "Ignoring undecodable frame");
            return;
        }
    };
    match event {
        ServerEvent::Added { items } => gate.deliver(|| listener.on_items_added(items)),
        ServerEvent::Removed { keys } => gate.deliver(|| listener.on_items_removed(keys)),
        ServerEvent::Ping | ServerEvent::Welcome => {}
        ServerEvent::Unknown => debug!(frame = text, "Unknown event"),
    }
}
