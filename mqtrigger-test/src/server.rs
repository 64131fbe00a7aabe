//! Test server management

use std::sync::Arc;
use std::time::Duration;

use mqtrigger::{create_router, with_connector, BrokerKind, Config};
use mqtrigger_queue::MemoryBroker;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

use crate::{MqTriggerClient, STARTUP_TIMEOUT_SECS, TEST_POLL_INTERVAL_MS};

/// A running mqtrigger instance serving on localhost
pub struct TestServer {
    handle: JoinHandle<()>,
    broker: MemoryBroker,
    queue_name: String,
    port: u16,
    base_url: String,
}

impl TestServer {
    /// Start a new server on a random available port
    pub async fn start() -> Result<Self, TestError> {
        Self::start_with_queue("test-queue").await
    }

    pub async fn start_with_queue(queue_name: &str) -> Result<Self, TestError> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| TestError::StartFailed(e.to_string()))?;
        let port = listener
            .local_addr()
            .map_err(|e| TestError::StartFailed(e.to_string()))?
            .port();

        let mut config = Config::default();
        config.broker.kind = BrokerKind::Memory;
        config.queue.name = queue_name.to_string();
        config.consumer.poll_interval_ms = TEST_POLL_INTERVAL_MS;

        let broker = MemoryBroker::new();
        let app = create_router(with_connector(Arc::new(broker.clone()), &config));

        info!(port = port, "Starting mqtrigger test server");
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Test server exited");
            }
        });

        let server = Self {
            handle,
            broker,
            queue_name: queue_name.to_string(),
            port,
            base_url: format!("http://127.0.0.1:{port}"),
        };
        server.wait_ready().await?;
        Ok(server)
    }

    async fn wait_ready(&self) -> Result<(), TestError> {
        let start = std::time::Instant::now();
        let health = format!("{}/health", self.base_url);

        while start.elapsed() < Duration::from_secs(STARTUP_TIMEOUT_SECS) {
            if let Ok(response) = reqwest::get(&health).await {
                if response.status().is_success() {
                    info!(port = self.port, "mqtrigger ready");
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Err(TestError::StartupTimeout)
    }

    /// Get the base URL
    pub fn url(&self) -> &str {
        &self.base_url
    }

    /// Get the port
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// The broker behind the server, for inspection and fault injection
    pub fn broker(&self) -> &MemoryBroker {
        &self.broker
    }

    /// Get a client for the service endpoints
    pub fn client(&self) -> MqTriggerClient {
        MqTriggerClient::new(self.base_url.clone())
    }

    /// Stop the server
    pub fn stop(&self) {
        info!("Stopping mqtrigger test server");
        self.handle.abort();
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Errors that can occur with the test server
#[derive(Debug, Error)]
pub enum TestError {
    #[error("Failed to start server: {0}")]
    StartFailed(String),
    #[error("Server startup timed out")]
    StartupTimeout,
}
