//! Client for the mqtrigger HTTP endpoints

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

/// Client for interacting with mqtrigger
pub struct MqTriggerClient {
    base_url: String,
    client: Client,
}

/// Body of a successful `/send-data` call
#[derive(Debug, Clone, Deserialize)]
pub struct SendDataResult {
    pub status: String,
    pub message: String,
    pub mode: String,
    pub published: usize,
    pub queue: String,
}

/// Body of `/consume` and `/stop-consumer`
#[derive(Debug, Clone, Deserialize)]
pub struct ControlResult {
    pub status: String,
    pub message: String,
    pub queue: String,
    pub mode: Option<String>,
}

/// Body of `/consumer`
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerStatus {
    pub state: String,
    pub queue: String,
    pub processed_total: u64,
    pub runs: u64,
    pub poll_interval_ms: u64,
}

/// Error body returned by the service
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub request_id: String,
}

impl MqTriggerClient {
    /// Create a new client
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: Client::new(),
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Publish via `POST /send-data`
    pub async fn send_data(
        &self,
        kind: &str,
        message: Option<&str>,
    ) -> Result<SendDataResult, ClientError> {
        let mut query = vec![("type", kind)];
        if let Some(message) = message {
            query.push(("message", message));
        }
        let response = self
            .client
            .post(format!("{}/send-data", self.base_url))
            .query(&query)
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Start the consumer via `POST /consume`
    pub async fn consume(&self, kind: Option<&str>) -> Result<ControlResult, ClientError> {
        let mut request = self.client.post(format!("{}/consume", self.base_url));
        if let Some(kind) = kind {
            request = request.query(&[("type", kind)]);
        }
        Self::parse(request.send().await?).await
    }

    /// Stop the consumer via `POST /stop-consumer`
    pub async fn stop_consumer(&self) -> Result<ControlResult, ClientError> {
        let response = self
            .client
            .post(format!("{}/stop-consumer", self.base_url))
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Read `GET /consumer`
    pub async fn consumer_status(&self) -> Result<ConsumerStatus, ClientError> {
        let response = self
            .client
            .get(format!("{}/consumer", self.base_url))
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let body: ErrorBody = response.json().await?;
        Err(ClientError::Service { status, body })
    }
}

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Service error {status}: {}", .body.message)]
    Service { status: StatusCode, body: ErrorBody },
}
