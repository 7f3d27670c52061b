//! Push-to-pull bridge between the backend and stream consumers.
//!
//! The backend pushes messages for a stream id as they arrive; the consumer
//! pulls them through a [`MessageStream`]. Each stream is an unbounded mpsc
//! channel: buffering is unbounded, delivery is in push order, and there is
//! exactly one receiver, handed out by the first [`StreamRegistry::consume`].

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::message::BridgeMessage;
use super::response::MessageStream;
use crate::{Error, Result};

/// Opaque id of one logical request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Generate a fresh id.
    pub fn generate() -> Self {
        StreamId(uuid::Uuid::new_v4().to_string())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for StreamId {
    fn from(s: String) -> Self {
        StreamId(s)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        StreamId(s.to_string())
    }
}

impl AsRef<str> for StreamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub(crate) type StreamItem = Result<BridgeMessage>;

/// Registry state for one stream.
///
/// `tx` is dropped on the terminal event; `rx` is moved out on consume. The
/// entry is discarded once both are gone.
struct Entry {
    tx: Option<mpsc::UnboundedSender<StreamItem>>,
    rx: Option<mpsc::UnboundedReceiver<StreamItem>>,
}

impl Entry {
    fn is_spent(&self) -> bool {
        self.tx.is_none() && self.rx.is_none()
    }
}

/// Table of open streams.
#[derive(Default)]
pub struct StreamRegistry {
    streams: Mutex<HashMap<StreamId, Entry>>,
}

impl StreamRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<StreamId, Entry>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an empty, active stream.
    pub fn open(&self, id: &StreamId) -> Result<()> {
        let mut streams = self.lock();
        if streams.contains_key(id) {
            return Err(Error::StreamExists(id.to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        streams.insert(
            id.clone(),
            Entry {
                tx: Some(tx),
                rx: Some(rx),
            },
        );
        tracing::debug!(stream_id = %id, "stream opened");
        Ok(())
    }

    /// Append a message, or complete the stream on `None`.
    ///
    /// Pushing to an unknown, terminated or abandoned stream is a no-op.
    /// Returns whether the stream can still be delivered to.
    pub fn push(&self, id: &StreamId, message: Option<BridgeMessage>) -> bool {
        match message {
            Some(message) => self.send(id, Ok(message), false),
            None => self.send_terminal(id, None),
        }
    }

    /// Terminate the stream with an error, delivered after buffered messages.
    pub fn fail(&self, id: &StreamId, error: Error) -> bool {
        self.send_terminal(id, Some(error))
    }

    fn send_terminal(&self, id: &StreamId, error: Option<Error>) -> bool {
        match error {
            Some(error) => self.send(id, Err(error), true),
            None => {
                let mut streams = self.lock();
                let Some(entry) = streams.get_mut(id) else {
                    tracing::trace!(stream_id = %id, "completion for unknown stream dropped");
                    return false;
                };
                let live = entry.tx.take().is_some();
                if entry.is_spent() {
                    streams.remove(id);
                }
                if live {
                    tracing::debug!(stream_id = %id, "stream completed");
                }
                live
            }
        }
    }

    fn send(&self, id: &StreamId, item: StreamItem, terminal: bool) -> bool {
        let mut streams = self.lock();
        let Some(entry) = streams.get_mut(id) else {
            tracing::trace!(stream_id = %id, "push to unknown stream dropped");
            return false;
        };
        let Some(tx) = entry.tx.as_ref() else {
            tracing::trace!(stream_id = %id, "push to terminated stream dropped");
            return false;
        };

        let delivered = tx.send(item).is_ok();
        if !delivered {
            tracing::debug!(stream_id = %id, "consumer went away; discarding stream");
            streams.remove(id);
            return false;
        }

        if terminal {
            entry.tx = None;
            if entry.is_spent() {
                streams.remove(id);
            }
            tracing::debug!(stream_id = %id, "stream failed");
        }
        true
    }

    /// Hand out the single consumer for a stream.
    ///
    /// Fails with [`Error::StreamAlreadyConsumed`] while a consumed stream is
    /// still running. A consumed stream is forgotten as soon as its terminal
    /// event is pushed, so from then on a second call fails with
    /// [`Error::StreamNotFound`], like any unknown id.
    pub fn consume(&self, id: &StreamId) -> Result<MessageStream> {
        let mut streams = self.lock();
        let entry = streams
            .get_mut(id)
            .ok_or_else(|| Error::StreamNotFound(id.to_string()))?;
        let rx = entry
            .rx
            .take()
            .ok_or_else(|| Error::StreamAlreadyConsumed(id.to_string()))?;
        if entry.is_spent() {
            streams.remove(id);
        }
        Ok(MessageStream::new(id.clone(), rx))
    }

    /// Resolves once the stream's consumer is gone.
    ///
    /// Resolves at once if the stream is unknown or already terminated. The
    /// returned future holds a sender, so drop it before the terminal push.
    pub fn closed(&self, id: &StreamId) -> impl Future<Output = ()> + Send + 'static {
        let tx = self.lock().get(id).and_then(|entry| entry.tx.clone());
        async move {
            if let Some(tx) = tx {
                tx.closed().await;
            }
        }
    }

    /// Forget a stream without a terminal event.
    ///
    /// Only for streams whose consumer is gone; nobody is left to notice.
    pub fn discard(&self, id: &StreamId) -> bool {
        let removed = self.lock().remove(id).is_some();
        if removed {
            tracing::debug!(stream_id = %id, "stream discarded");
        }
        removed
    }

    /// Check whether the registry still tracks this id.
    pub fn contains(&self, id: &StreamId) -> bool {
        self.lock().contains_key(id)
    }

    /// Check whether the stream still accepts pushes.
    pub fn is_active(&self, id: &StreamId) -> bool {
        self.lock()
            .get(id)
            .is_some_and(|entry| entry.tx.as_ref().is_some_and(|tx| !tx.is_closed()))
    }

    /// Number of tracked streams.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check whether no streams are tracked.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRegistry")
            .field("streams", &self.len())
            .finish()
    }
}
