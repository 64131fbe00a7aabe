//! Single-consumer polling loop
//!
//! The loop pulls one message at a time, hands it to a [`DeliveryHandler`] and
//! acks it only after the handler returns `Ok`. It talks to the rest of the
//! process exclusively through the [`RunController`]: it checks
//! `is_running()` before every pull and calls `finish()` on exit.
//!
//! ```text
//! IDLE --try_start--> RUNNING --+--> DRAINED  (bounded mode, queue empty)
//!                               +--> STOPPED  (stop() observed)
//!                               +--> FAILED   (broker or handler error)
//! every exit --finish--> IDLE
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mqtrigger_core::{FinishGuard, QueueError, RunController, RunState};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::client::{release, Connector, Delivery, QueueRef, Session};
use crate::producer::ModeError;

/// Backoff between polls of an empty queue in follow mode
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumeMode {
    /// Consume until the queue reports empty, then exit
    Drain,
    /// Keep polling until stopped
    Follow,
}

impl ConsumeMode {
    /// Mode for an optional `type` parameter; absent means follow.
    pub fn from_type(kind: Option<&str>) -> Result<Self, ModeError> {
        match kind {
            None => Ok(Self::Follow),
            Some(kind) => kind.parse(),
        }
    }
}

impl FromStr for ConsumeMode {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SINGLE" | "MESSAGE" | "DRAIN" => Ok(Self::Drain),
            "BURST" | "HTTP" | "FOLLOW" => Ok(Self::Follow),
            _ => Err(ModeError(s.to_string())),
        }
    }
}

impl fmt::Display for ConsumeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drain => f.write_str("drain"),
            Self::Follow => f.write_str("follow"),
        }
    }
}

/// Processing step applied to every delivery before it is acked
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(&self, delivery: &Delivery) -> Result<(), QueueError>;
}

/// Logs each payload
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

#[async_trait]
impl DeliveryHandler for LoggingHandler {
    async fn handle(&self, delivery: &Delivery) -> Result<(), QueueError> {
        info!(
            tag = delivery.tag,
            redelivered = delivery.redelivered,
            message = %delivery.payload_text(),
            "Received message"
        );
        Ok(())
    }
}

#[derive(Debug)]
pub enum ConsumerExit {
    Drained,
    Stopped,
    Failed(QueueError),
}

#[derive(Debug)]
pub struct ConsumerReport {
    pub mode: ConsumeMode,
    pub processed: u64,
    pub exit: ConsumerExit,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsumerStatus {
    pub state: RunState,
    pub queue: String,
    pub processed_total: u64,
    pub runs: u64,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Default)]
struct ConsumerStats {
    processed_total: AtomicU64,
    runs: AtomicU64,
}

pub struct Consumer {
    connector: Arc<dyn Connector>,
    queue: QueueRef,
    controller: Arc<RunController>,
    handler: Arc<dyn DeliveryHandler>,
    poll_interval: Duration,
    stats: ConsumerStats,
}

impl Consumer {
    pub fn new(
        connector: Arc<dyn Connector>,
        queue: QueueRef,
        controller: Arc<RunController>,
    ) -> Self {
        Self {
            connector,
            queue,
            controller,
            handler: Arc::new(LoggingHandler),
            poll_interval: DEFAULT_POLL_INTERVAL,
            stats: ConsumerStats::default(),
        }
    }

    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn DeliveryHandler>) -> Self {
        self.handler = handler;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn controller(&self) -> &Arc<RunController> {
        &self.controller
    }

    pub fn queue(&self) -> &QueueRef {
        &self.queue
    }

    pub fn status(&self) -> ConsumerStatus {
        ConsumerStatus {
            state: self.controller.state(),
            queue: self.queue.name.clone(),
            processed_total: self.stats.processed_total.load(Ordering::Relaxed),
            runs: self.stats.runs.load(Ordering::Relaxed),
            poll_interval_ms: u64::try_from(self.poll_interval.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Claim the controller and run the loop on a background task.
    ///
    /// Returns `None` without spawning anything when a loop is already active.
    pub fn launch(self: &Arc<Self>, mode: ConsumeMode) -> Option<JoinHandle<ConsumerReport>> {
        if !self.controller.try_start() {
            return None;
        }

        let consumer = Arc::clone(self);
        Some(tokio::spawn(async move {
            let report = consumer.run(mode).await;
            match &report.exit {
                ConsumerExit::Drained => info!(
                    queue = %consumer.queue.name,
                    processed = report.processed,
                    "Queue drained, consumer finished"
                ),
                ConsumerExit::Stopped => info!(
                    queue = %consumer.queue.name,
                    processed = report.processed,
                    "Consumer stopped"
                ),
                ConsumerExit::Failed(e) => error!(
                    queue = %consumer.queue.name,
                    processed = report.processed,
                    error = %e,
                    "Consumer failed"
                ),
            }
            report
        }))
    }

    /// Run the loop to completion on the current task.
    ///
    /// The caller must already have won [`RunController::try_start`]. The
    /// controller is reset to idle on every exit path.
    pub async fn run(&self, mode: ConsumeMode) -> ConsumerReport {
        let _finish = FinishGuard::new(&self.controller);
        self.stats.runs.fetch_add(1, Ordering::Relaxed);
        info!(queue = %self.queue.name, mode = %mode, "Consumer started");

        let mut processed = 0;
        let exit = match self.connector.connect().await {
            Ok(session) => {
                let outcome = self.poll(session.as_ref(), mode, &mut processed).await;
                release(session, &self.queue).await;
                outcome.unwrap_or_else(ConsumerExit::Failed)
            }
            Err(e) => ConsumerExit::Failed(e),
        };

        ConsumerReport {
            mode,
            processed,
            exit,
        }
    }

    async fn poll(
        &self,
        session: &dyn Session,
        mode: ConsumeMode,
        processed: &mut u64,
    ) -> Result<ConsumerExit, QueueError> {
        session.declare(&self.queue).await?;

        loop {
            if !self.controller.is_running() {
                return Ok(ConsumerExit::Stopped);
            }

            match session.get(&self.queue).await? {
                Some(delivery) => {
                    if let Err(e) = self.handler.handle(&delivery).await {
                        warn!(tag = delivery.tag, error = %e, "Handler failed, requeueing message");
                        if let Err(reject_err) = session.reject(&delivery, true).await {
                            error!(
                                tag = delivery.tag,
                                error = %reject_err,
                                "Failed to requeue message after handler failure"
                            );
                        }
                        return Err(e);
                    }
                    session.ack(&delivery).await?;
                    *processed += 1;
                    self.stats.processed_total.fetch_add(1, Ordering::Relaxed);
                }
                None if mode == ConsumeMode::Drain => return Ok(ConsumerExit::Drained),
                None => {
                    debug!(queue = %self.queue.name, "No message to consume, waiting for next message");
                    self.controller.pause(self.poll_interval).await;
                }
            }
        }
    }
}
