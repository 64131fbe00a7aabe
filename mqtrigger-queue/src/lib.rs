//! Queue plumbing for mqtrigger
//!
//! Provides the broker seam and everything built on top of it:
//! - `Connector` / `Session` traits with AMQP and in-memory backends
//! - the producer operation (single message or a burst of 100)
//! - the single-consumer polling loop
//! - axum handlers for `/send-data`, `/consume` and `/stop-consumer`

pub mod amqp;
pub mod client;
pub mod consumer;
pub mod handlers;
pub mod memory;
pub mod producer;

pub use amqp::{AmqpConnector, AmqpSettings};
pub use client::{Connector, Delivery, QueueRef, Session};
pub use consumer::{
    ConsumeMode, Consumer, ConsumerExit, ConsumerReport, ConsumerStatus, DeliveryHandler,
    LoggingHandler, DEFAULT_POLL_INTERVAL,
};
pub use handlers::{routes, QueueState};
pub use memory::MemoryBroker;
pub use producer::{
    ModeError, ProduceMode, ProduceReport, Producer, BURST_SIZE, DEFAULT_PAYLOAD,
};
