//! Broker seam
//!
//! Every operation acquires its own [`Session`] (one connection plus one
//! channel) through a [`Connector`] and must hand it back with
//! [`Session::close`] on every exit path.

use async_trait::async_trait;
use bytes::Bytes;
use mqtrigger_core::QueueError;
use tracing::warn;

/// A named queue on the broker. Built once from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRef {
    pub name: String,
    pub durable: bool,
}

impl QueueRef {
    pub fn durable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
        }
    }
}

/// A message pulled from a queue, together with the handle needed to ack it
#[derive(Debug, Clone)]
pub struct Delivery {
    pub tag: u64,
    pub payload: Bytes,
    pub redelivered: bool,
}

impl Delivery {
    pub fn payload_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection and a channel on it
    async fn connect(&self) -> Result<Box<dyn Session>, QueueError>;
}

#[async_trait]
pub trait Session: Send + Sync {
    async fn declare(&self, queue: &QueueRef) -> Result<(), QueueError>;

    async fn publish(&self, queue: &QueueRef, payload: &[u8]) -> Result<(), QueueError>;

    /// Pull the next message without auto-ack; `None` when the queue is empty
    async fn get(&self, queue: &QueueRef) -> Result<Option<Delivery>, QueueError>;

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    async fn reject(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError>;

    /// Release the channel and the connection
    async fn close(self: Box<Self>) -> Result<(), QueueError>;
}

/// Close `session`, logging rather than propagating a close failure.
pub(crate) async fn release(session: Box<dyn Session>, queue: &QueueRef) {
    if let Err(e) = session.close().await {
        warn!(queue = %queue.name, error = %e, "Failed to close broker session");
    }
}
