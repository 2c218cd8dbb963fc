//! Progress and error reporting.
//!
//! [`EventSink`] carries the human-readable log of what the session is
//! doing ("Client accounts in the cache: 1.", ">>> line of readme", ...).
//! Messages fan out over a bounded `tokio::sync::broadcast` channel to any
//! number of [`EventStream`] subscribers, go to an optional single callback,
//! and are mirrored into `tracing`.
//!
//! ```rust
//! use driveline_core::events::EventSink;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sink = EventSink::new(64);
//! let mut stream = sink.subscribe();
//!
//! sink.info("Requesting folder info");
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.message, "Requesting folder info");
//! # }
//! ```

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::RecvError;

/// Default channel capacity.
pub const DEFAULT_CAPACITY: usize = 256;

/// How notable an event is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One message in the progress log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Strictly increasing per sink, starting at 1.
    pub sequence: u64,
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

/// Ordered, append-only message log with broadcast delivery.
///
/// Cloning a sink yields another handle to the same channel.
#[derive(Clone)]
pub struct EventSink {
    inner: Arc<SinkInner>,
}

struct SinkInner {
    sender: broadcast::Sender<Event>,
    sequence: Mutex<u64>,
    callback: Mutex<Option<Callback>>,
}

impl EventSink {
    /// Create a sink whose subscribers may lag by up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(SinkInner {
                sender,
                sequence: Mutex::new(0),
                callback: Mutex::new(None),
            }),
        }
    }

    /// Subscribe to every event emitted from now on.
    pub fn subscribe(&self) -> EventStream {
        EventStream {
            receiver: self.inner.sender.subscribe(),
        }
    }

    /// Install the single callback subscriber, replacing any previous one.
    ///
    /// The callback runs synchronously on the emitting task.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        *self.inner.callback.lock() = Some(Arc::new(callback));
    }

    /// Remove the callback subscriber.
    pub fn clear_callback(&self) {
        *self.inner.callback.lock() = None;
    }

    /// Number of live stream subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.sender.receiver_count()
    }

    /// Append a message to the log.
    pub fn emit(&self, severity: Severity, message: impl Into<String>) -> Event {
        let message = message.into();
        match severity {
            Severity::Info => tracing::info!(target: "driveline::events", "{}", message),
            Severity::Warning => tracing::warn!(target: "driveline::events", "{}", message),
            Severity::Error => tracing::error!(target: "driveline::events", "{}", message),
        }

        let event = {
            let mut sequence = self.inner.sequence.lock();
            *sequence += 1;
            let event = Event {
                sequence: *sequence,
                severity,
                message,
            };
            // No subscribers is fine; the log is best-effort.
            let _ = self.inner.sender.send(event.clone());
            event
        };

        let callback = self.inner.callback.lock().clone();
        if let Some(callback) = callback {
            callback(&event);
        }
        event
    }

    pub fn info(&self, message: impl Into<String>) -> Event {
        self.emit(Severity::Info, message)
    }

    pub fn warn(&self, message: impl Into<String>) -> Event {
        self.emit(Severity::Warning, message)
    }

    pub fn error(&self, message: impl Into<String>) -> Event {
        self.emit(Severity::Error, message)
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("subscribers", &self.subscriber_count())
            .field("sequence", &*self.inner.sequence.lock())
            .finish()
    }
}

/// Receiving end of an [`EventSink`].
pub struct EventStream {
    receiver: broadcast::Receiver<Event>,
}

impl EventStream {
    /// Wait for the next event.
    ///
    /// A subscriber that falls more than the channel capacity behind gets
    /// `RecvError::Lagged` and may keep receiving afterwards.
    pub async fn recv(&mut self) -> Result<Event, RecvError> {
        self.receiver.recv().await
    }

    /// Take the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!("event subscriber lagged, {} events dropped", n);
                }
                Err(_) => return None,
            }
        }
    }

    /// Drain everything currently buffered.
    pub fn drain(&mut self) -> Vec<Event> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("pending", &self.receiver.len())
            .finish()
    }
}
