//! RabbitMQ backend
//!
//! Each [`AmqpConnector::connect`] opens a fresh connection and channel; there
//! is no pooling. Every broker round-trip is bounded by the configured timeout.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lapin::{
    options::{
        BasicAckOptions, BasicGetOptions, BasicPublishOptions, BasicRejectOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use mqtrigger_core::QueueError;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tracing::{debug, info};

use crate::client::{Connector, Delivery, QueueRef, Session};

/// Broker address and credentials
#[derive(Debug, Clone)]
pub struct AmqpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
    pub timeout: Duration,
}

impl AmqpSettings {
    pub fn uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            encode(&self.username),
            encode(&self.password),
            self.host,
            self.port,
            encode(&self.vhost)
        )
    }
}

fn encode(component: &str) -> String {
    utf8_percent_encode(component, NON_ALPHANUMERIC).to_string()
}

async fn bounded<T, F>(operation: &'static str, timeout: Duration, fut: F) -> Result<T, QueueError>
where
    F: Future<Output = Result<T, QueueError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| QueueError::Timeout { operation, timeout })?
}

#[derive(Debug, Clone)]
pub struct AmqpConnector {
    settings: AmqpSettings,
}

impl AmqpConnector {
    pub fn new(settings: AmqpSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Connector for AmqpConnector {
    async fn connect(&self) -> Result<Box<dyn Session>, QueueError> {
        let timeout = self.settings.timeout;
        let uri = self.settings.uri();

        let connection = bounded("connect", timeout, async {
            Connection::connect(&uri, ConnectionProperties::default())
                .await
                .map_err(|e| QueueError::Connection(e.to_string()))
        })
        .await?;

        let channel = match bounded("create_channel", timeout, async {
            connection
                .create_channel()
                .await
                .map_err(|e| QueueError::Channel(e.to_string()))
        })
        .await
        {
            Ok(channel) => channel,
            Err(e) => {
                let _ = connection.close(200, "channel setup failed").await;
                return Err(e);
            }
        };

        debug!(
            host = %self.settings.host,
            port = self.settings.port,
            channel = channel.id(),
            "Opened broker channel"
        );
        Ok(Box::new(AmqpSession {
            connection,
            channel,
            timeout,
        }))
    }
}

struct AmqpSession {
    connection: Connection,
    channel: Channel,
    timeout: Duration,
}

#[async_trait]
impl Session for AmqpSession {
    async fn declare(&self, queue: &QueueRef) -> Result<(), QueueError> {
        let options = QueueDeclareOptions {
            durable: queue.durable,
            ..QueueDeclareOptions::default()
        };
        let declared = bounded("queue_declare", self.timeout, async {
            self.channel
                .queue_declare(&queue.name, options, FieldTable::default())
                .await
                .map_err(|e| QueueError::Channel(e.to_string()))
        })
        .await?;

        info!(
            queue = %queue.name,
            messages = declared.message_count(),
            consumers = declared.consumer_count(),
            "Declared queue"
        );
        Ok(())
    }

    async fn publish(&self, queue: &QueueRef, payload: &[u8]) -> Result<(), QueueError> {
        bounded("basic_publish", self.timeout, async {
            self.channel
                .basic_publish(
                    "",
                    &queue.name,
                    BasicPublishOptions::default(),
                    payload,
                    BasicProperties::default(),
                )
                .await
                .map_err(|e| QueueError::Publish(e.to_string()))?
                .await
                .map_err(|e| QueueError::Publish(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn get(&self, queue: &QueueRef) -> Result<Option<Delivery>, QueueError> {
        let message = bounded("basic_get", self.timeout, async {
            self.channel
                .basic_get(&queue.name, BasicGetOptions { no_ack: false })
                .await
                .map_err(|e| QueueError::Poll(e.to_string()))
        })
        .await?;

        Ok(message.map(|message| {
            let delivery = message.delivery;
            Delivery {
                tag: delivery.delivery_tag,
                payload: Bytes::from(delivery.data),
                redelivered: delivery.redelivered,
            }
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        bounded("basic_ack", self.timeout, async {
            self.channel
                .basic_ack(delivery.tag, BasicAckOptions { multiple: false })
                .await
                .map_err(|e| QueueError::Ack(e.to_string()))
        })
        .await
    }

    async fn reject(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError> {
        bounded("basic_reject", self.timeout, async {
            self.channel
                .basic_reject(delivery.tag, BasicRejectOptions { requeue })
                .await
                .map_err(|e| QueueError::Ack(e.to_string()))
        })
        .await
    }

    async fn close(self: Box<Self>) -> Result<(), QueueError> {
        let channel_closed = bounded("channel_close", self.timeout, async {
            self.channel
                .close(200, "OK")
                .await
                .map_err(|e| QueueError::Channel(e.to_string()))
        })
        .await;

        // The connection goes even when the channel close failed.
        bounded("connection_close", self.timeout, async {
            self.connection
                .close(200, "OK")
                .await
                .map_err(|e| QueueError::Connection(e.to_string()))
        })
        .await?;

        channel_closed
    }
}
