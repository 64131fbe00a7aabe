//! In-memory broker
//!
//! Implements the [`Connector`] seam inside the process so the service and its
//! tests can run without RabbitMQ. Semantics follow AMQP where they matter to
//! the consumer loop: pulled messages stay unacked until acked, rejected with
//! requeue, or their session closes.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
#[cfg(test)]
use dashmap::DashSet;
use mqtrigger_core::QueueError;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::client::{Connector, Delivery, QueueRef, Session};

#[derive(Debug, Clone)]
struct StoredMessage {
    payload: Bytes,
    redelivered: bool,
}

#[derive(Debug, Default)]
struct MemoryQueue {
    durable: bool,
    ready: VecDeque<StoredMessage>,
    unacked: HashMap<u64, StoredMessage>,
}

#[derive(Debug)]
struct BrokerInner {
    queues: DashMap<String, MemoryQueue>,
    next_tag: AtomicU64,
    published: AtomicU64,
    acked: AtomicU64,
    #[cfg(test)]
    acked_tags: DashSet<u64>,
    open_sessions: AtomicUsize,
    available: AtomicBool,
}

impl Default for BrokerInner {
    fn default() -> Self {
        Self {
            queues: DashMap::new(),
            next_tag: AtomicU64::new(0),
            published: AtomicU64::new(0),
            acked: AtomicU64::new(0),
            #[cfg(test)]
            acked_tags: DashSet::new(),
            open_sessions: AtomicUsize::new(0),
            available: AtomicBool::new(true),
        }
    }
}

/// Cheaply cloneable handle to a shared in-memory broker
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `connect` calls fail (or succeed again)
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Declare `queue` if needed and append a message to it
    pub fn push(&self, queue: &str, payload: impl Into<Bytes>) {
        let mut entry = self
            .inner
            .queues
            .entry(queue.to_string())
            .or_insert_with(|| MemoryQueue {
                durable: true,
                ..MemoryQueue::default()
            });
        entry.ready.push_back(StoredMessage {
            payload: payload.into(),
            redelivered: false,
        });
        self.inner.published.fetch_add(1, Ordering::SeqCst);
    }

    pub fn ready_count(&self, queue: &str) -> usize {
        self.inner.queues.get(queue).map_or(0, |q| q.ready.len())
    }

    pub fn unacked_count(&self, queue: &str) -> usize {
        self.inner.queues.get(queue).map_or(0, |q| q.unacked.len())
    }

    /// Payloads waiting in `queue`, head first
    pub fn ready_payloads(&self, queue: &str) -> Vec<String> {
        self.inner.queues.get(queue).map_or_else(Vec::new, |q| {
            q.ready
                .iter()
                .map(|m| String::from_utf8_lossy(&m.payload).into_owned())
                .collect()
        })
    }

    pub fn is_durable(&self, queue: &str) -> bool {
        self.inner.queues.get(queue).is_some_and(|q| q.durable)
    }

    pub fn published_count(&self) -> u64 {
        self.inner.published.load(Ordering::SeqCst)
    }

    pub fn acked_count(&self) -> u64 {
        self.inner.acked.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn is_acked(&self, tag: u64) -> bool {
        self.inner.acked_tags.contains(&tag)
    }

    pub fn open_sessions(&self) -> usize {
        self.inner.open_sessions.load(Ordering::SeqCst)
    }

    fn queue_not_found(queue: &QueueRef) -> QueueError {
        QueueError::QueueNotFound(queue.name.clone())
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    async fn connect(&self) -> Result<Box<dyn Session>, QueueError> {
        if !self.inner.available.load(Ordering::SeqCst) {
            return Err(QueueError::Connection(
                "in-memory broker is unavailable".to_string(),
            ));
        }

        self.inner.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            broker: self.clone(),
            held: Mutex::new(HashMap::new()),
        }))
    }
}

/// Session on a [`MemoryBroker`]; tracks the deliveries it has not settled yet
struct MemorySession {
    broker: MemoryBroker,
    held: Mutex<HashMap<u64, String>>,
}

impl MemorySession {
    fn settle(&self, delivery: &Delivery) -> Result<(String, StoredMessage), QueueError> {
        let queue_name = self
            .held
            .lock()
            .remove(&delivery.tag)
            .ok_or_else(|| QueueError::Ack(format!("unknown delivery tag {}", delivery.tag)))?;

        let message = self
            .broker
            .inner
            .queues
            .get_mut(&queue_name)
            .and_then(|mut q| q.unacked.remove(&delivery.tag))
            .ok_or_else(|| QueueError::Ack(format!("unknown delivery tag {}", delivery.tag)))?;

        Ok((queue_name, message))
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn declare(&self, queue: &QueueRef) -> Result<(), QueueError> {
        let inner = &self.broker.inner;
        if !inner.queues.contains_key(&queue.name) {
            info!(queue = %queue.name, durable = queue.durable, "Declaring queue");
        }
        inner
            .queues
            .entry(queue.name.clone())
            .or_insert_with(|| MemoryQueue {
                durable: queue.durable,
                ..MemoryQueue::default()
            });
        Ok(())
    }

    async fn publish(&self, queue: &QueueRef, payload: &[u8]) -> Result<(), QueueError> {
        let inner = &self.broker.inner;
        let mut q = inner
            .queues
            .get_mut(&queue.name)
            .ok_or_else(|| MemoryBroker::queue_not_found(queue))?;

        q.ready.push_back(StoredMessage {
            payload: Bytes::copy_from_slice(payload),
            redelivered: false,
        });
        inner.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, queue: &QueueRef) -> Result<Option<Delivery>, QueueError> {
        let inner = &self.broker.inner;
        let mut q = inner
            .queues
            .get_mut(&queue.name)
            .ok_or_else(|| MemoryBroker::queue_not_found(queue))?;

        let Some(message) = q.ready.pop_front() else {
            return Ok(None);
        };

        let tag = inner.next_tag.fetch_add(1, Ordering::SeqCst) + 1;
        let delivery = Delivery {
            tag,
            payload: message.payload.clone(),
            redelivered: message.redelivered,
        };
        q.unacked.insert(tag, message);
        drop(q);
        self.held.lock().insert(tag, queue.name.clone());

        debug!(queue = %queue.name, tag, "Delivered message");
        Ok(Some(delivery))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.settle(delivery)?;
        let inner = &self.broker.inner;
        inner.acked.fetch_add(1, Ordering::SeqCst);
        #[cfg(test)]
        inner.acked_tags.insert(delivery.tag);
        Ok(())
    }

    async fn reject(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError> {
        let (queue_name, mut message) = self.settle(delivery)?;
        if requeue {
            message.redelivered = true;
            if let Some(mut q) = self.broker.inner.queues.get_mut(&queue_name) {
                q.ready.push_front(message);
            }
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), QueueError> {
        let mut held: Vec<(u64, String)> = self.held.lock().drain().collect();
        // Highest tag first so the oldest delivery ends up at the head.
        held.sort_unstable_by(|a, b| b.0.cmp(&a.0));

        for (tag, queue_name) in held {
            if let Some(mut q) = self.broker.inner.queues.get_mut(&queue_name) {
                if let Some(mut message) = q.unacked.remove(&tag) {
                    message.redelivered = true;
                    q.ready.push_front(message);
                }
            }
        }

        self.broker.inner.open_sessions.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
