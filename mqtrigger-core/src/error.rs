//! Error types and formatting

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::request_id::RequestId;

/// Stable error codes surfaced by the HTTP boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidMode,
    BrokerUnavailable,
    BrokerTimeout,
    PublishFailed,
    ConsumeFailed,
    HandlerFailed,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidMode => "InvalidMode",
            Self::BrokerUnavailable => "BrokerUnavailable",
            Self::BrokerTimeout => "BrokerTimeout",
            Self::PublishFailed => "PublishFailed",
            Self::ConsumeFailed => "ConsumeFailed",
            Self::HandlerFailed => "HandlerFailed",
            Self::Internal => "InternalError",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidMode => 400,
            Self::BrokerUnavailable => 503,
            Self::BrokerTimeout => 504,
            Self::PublishFailed | Self::ConsumeFailed | Self::HandlerFailed | Self::Internal => 500,
        }
    }
}

/// Failures raised while talking to the broker or processing a delivery
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("channel error: {0}")]
    Channel(String),
    #[error("queue does not exist: {0}")]
    QueueNotFound(String),
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("poll failed: {0}")]
    Poll(String),
    #[error("acknowledgement failed: {0}")]
    Ack(String),
    #[error("{operation} timed out after {}ms", .timeout.as_millis())]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
    #[error("message handler failed: {0}")]
    Handler(String),
}

impl QueueError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Connection(_) => ErrorCode::BrokerUnavailable,
            Self::Timeout { .. } => ErrorCode::BrokerTimeout,
            Self::Publish(_) => ErrorCode::PublishFailed,
            Self::Handler(_) => ErrorCode::HandlerFailed,
            Self::Channel(_) | Self::QueueNotFound(_) | Self::Poll(_) | Self::Ack(_) => {
                ErrorCode::ConsumeFailed
            }
        }
    }
}

/// Error returned to HTTP callers
#[derive(Debug, Error)]
#[error("{}: {}", .code.as_str(), .message)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub request_id: RequestId,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            request_id: RequestId::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn status(&self) -> u16 {
        self.code.http_status()
    }

    /// Format as a JSON error body
    pub fn to_json(&self) -> String {
        #[derive(Serialize)]
        struct JsonError<'a> {
            code: &'a str,
            message: &'a str,
            request_id: &'a str,
        }

        let error = JsonError {
            code: self.code.as_str(),
            message: &self.message,
            request_id: self.request_id.as_str(),
        };

        serde_json::to_string(&error).unwrap_or_else(|_| {
            format!(
                r#"{{"code":"{}","message":"{}","request_id":"{}"}}"#,
                self.code.as_str(),
                self.message,
                self.request_id
            )
        })
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_json_format() {
        let error = ApiError::new(ErrorCode::InvalidMode, "Invalid type")
            .with_request_id(RequestId::with_id("test-request-id"));

        let json: serde_json::Value = serde_json::from_str(&error.to_json()).unwrap();
        assert_eq!(json["code"], "InvalidMode");
        assert_eq!(json["message"], "Invalid type");
        assert_eq!(json["request_id"], "test-request-id");
    }

    #[test]
    fn test_queue_error_maps_to_code() {
        let err: ApiError = QueueError::Connection("refused".into()).into();
        assert_eq!(err.code, ErrorCode::BrokerUnavailable);
        assert_eq!(err.status(), 503);
        assert!(err.message.contains("refused"));

        let timeout = QueueError::Timeout {
            operation: "connect",
            timeout: Duration::from_millis(250),
        };
        assert_eq!(timeout.to_string(), "connect timed out after 250ms");
        assert_eq!(timeout.code().http_status(), 504);

        assert_eq!(QueueError::Publish("nack".into()).code().http_status(), 500);
    }
}
