//! Producer operation: one message or a fixed burst

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use mqtrigger_core::QueueError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use crate::client::{release, Connector, QueueRef, Session};

/// Number of messages published by [`ProduceMode::Burst`]
pub const BURST_SIZE: usize = 100;

/// Payload used when the caller supplies none
pub const DEFAULT_PAYLOAD: &str = "default message from producer";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid type '{0}'. Please provide type as 'SINGLE' or 'BURST'.")]
pub struct ModeError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProduceMode {
    Single,
    Burst,
}

impl FromStr for ProduceMode {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SINGLE" | "MESSAGE" => Ok(Self::Single),
            "BURST" | "HTTP" => Ok(Self::Burst),
            _ => Err(ModeError(s.to_string())),
        }
    }
}

impl fmt::Display for ProduceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => f.write_str("SINGLE"),
            Self::Burst => f.write_str("BURST"),
        }
    }
}

impl ProduceMode {
    /// Payloads to publish for `base`. Burst messages are numbered `#1..=#100`.
    pub fn payloads(self, base: &str) -> Vec<String> {
        match self {
            Self::Single => vec![base.to_string()],
            Self::Burst => (1..=BURST_SIZE).map(|n| format!("{base} #{n}")).collect(),
        }
    }
}

/// Outcome of a successful produce call
#[derive(Debug, Clone, Serialize)]
pub struct ProduceReport {
    pub mode: ProduceMode,
    pub published: usize,
    pub queue: String,
}

impl ProduceReport {
    pub fn summary(&self) -> String {
        match self.mode {
            ProduceMode::Single => "Produced a single message.".to_string(),
            ProduceMode::Burst => format!("Produced {} messages.", self.published),
        }
    }
}

pub struct Producer {
    connector: Arc<dyn Connector>,
    queue: QueueRef,
}

impl Producer {
    pub fn new(connector: Arc<dyn Connector>, queue: QueueRef) -> Self {
        Self { connector, queue }
    }

    pub fn queue(&self) -> &QueueRef {
        &self.queue
    }

    /// Publish according to `mode` on a session opened for this call only.
    pub async fn produce(
        &self,
        mode: ProduceMode,
        payload: Option<&str>,
    ) -> Result<ProduceReport, QueueError> {
        let base = match payload.map(str::trim) {
            Some(p) if !p.is_empty() => p,
            _ => DEFAULT_PAYLOAD,
        };

        let session = self.connector.connect().await.map_err(|e| {
            error!(queue = %self.queue.name, error = %e, "Failed to connect for produce");
            e
        })?;

        let result = self.publish_all(session.as_ref(), mode, base).await;
        release(session, &self.queue).await;

        match result {
            Ok(published) => {
                info!(queue = %self.queue.name, mode = %mode, published, payload = %base, "Produced messages");
                Ok(ProduceReport {
                    mode,
                    published,
                    queue: self.queue.name.clone(),
                })
            }
            Err(e) => {
                error!(queue = %self.queue.name, mode = %mode, error = %e, "Produce failed");
                Err(e)
            }
        }
    }

    async fn publish_all(
        &self,
        session: &dyn Session,
        mode: ProduceMode,
        base: &str,
    ) -> Result<usize, QueueError> {
        session.declare(&self.queue).await?;

        let payloads = mode.payloads(base);
        for payload in &payloads {
            session.publish(&self.queue, payload.as_bytes()).await?;
        }
        Ok(payloads.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBroker;

    fn producer(broker: &MemoryBroker) -> Producer {
        Producer::new(Arc::new(broker.clone()), QueueRef::durable("events"))
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("SINGLE".parse::<ProduceMode>(), Ok(ProduceMode::Single));
        assert_eq!("single".parse::<ProduceMode>(), Ok(ProduceMode::Single));
        assert_eq!("Message".parse::<ProduceMode>(), Ok(ProduceMode::Single));
        assert_eq!("BURST".parse::<ProduceMode>(), Ok(ProduceMode::Burst));
        assert_eq!("http".parse::<ProduceMode>(), Ok(ProduceMode::Burst));
        assert_eq!(
            "BOGUS".parse::<ProduceMode>(),
            Err(ModeError("BOGUS".to_string()))
        );
        assert!("".parse::<ProduceMode>().is_err());
    }

    #[tokio::test]
    async fn test_single_publishes_one_message() {
        let broker = MemoryBroker::new();
        let report = producer(&broker)
            .produce(ProduceMode::Single, Some("hello"))
            .await
            .unwrap();

        assert_eq!(report.published, 1);
        assert_eq!(report.summary(), "Produced a single message.");
        assert_eq!(broker.ready_payloads("events"), vec!["hello"]);
        assert!(broker.is_durable("events"));
        assert_eq!(broker.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_burst_publishes_hundred_numbered_messages() {
        let broker = MemoryBroker::new();
        let report = producer(&broker)
            .produce(ProduceMode::Burst, Some("tick"))
            .await
            .unwrap();

        assert_eq!(report.published, BURST_SIZE);
        assert_eq!(report.summary(), "Produced 100 messages.");

        let payloads = broker.ready_payloads("events");
        assert_eq!(payloads.len(), 100);
        assert_eq!(payloads[0], "tick #1");
        assert_eq!(payloads[99], "tick #100");
        assert_eq!(broker.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_blank_payload_uses_default() {
        let broker = MemoryBroker::new();
        let producer = producer(&broker);
        producer.produce(ProduceMode::Single, None).await.unwrap();
        producer.produce(ProduceMode::Single, Some("   ")).await.unwrap();

        assert_eq!(
            broker.ready_payloads("events"),
            vec![DEFAULT_PAYLOAD, DEFAULT_PAYLOAD]
        );
    }

    #[tokio::test]
    async fn test_connection_failure_is_returned() {
        let broker = MemoryBroker::new();
        broker.set_available(false);

        let err = producer(&broker)
            .produce(ProduceMode::Burst, Some("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Connection(_)));
        assert_eq!(broker.published_count(), 0);
    }
}
