//! HTTP handlers for the producer and the consumer controls

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Router,
};
use mqtrigger_core::{ApiError, ErrorCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::consumer::{ConsumeMode, Consumer};
use crate::producer::{ProduceMode, Producer};

/// State shared by the queue handlers
pub struct QueueState {
    pub producer: Producer,
    pub consumer: Arc<Consumer>,
}

impl QueueState {
    pub fn new(producer: Producer, consumer: Consumer) -> Self {
        Self {
            producer,
            consumer: Arc::new(consumer),
        }
    }
}

/// Routes for `/send-data`, `/consume`, `/stop-consumer` and `/consumer`
pub fn routes() -> Router<Arc<QueueState>> {
    Router::new()
        .route("/send-data", post(send_data))
        .route("/consume", post(consume))
        .route("/stop-consumer", post(stop_consumer))
        .route("/consumer", get(consumer_status))
}

#[derive(Debug, Deserialize)]
pub struct SendDataQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConsumeQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendDataResponse<'a> {
    status: &'static str,
    message: String,
    mode: ProduceMode,
    published: usize,
    queue: &'a str,
}

#[derive(Debug, Serialize)]
struct ControlResponse<'a> {
    status: &'static str,
    message: &'static str,
    queue: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mode: Option<ConsumeMode>,
}

pub async fn send_data(
    State(state): State<Arc<QueueState>>,
    Query(query): Query<SendDataQuery>,
) -> Response {
    let mode: ProduceMode = match query.kind.as_deref().unwrap_or_default().parse() {
        Ok(mode) => mode,
        Err(e) => {
            warn!(error = %e, "Rejected /send-data request");
            return error_response(&ApiError::new(ErrorCode::InvalidMode, e.to_string()));
        }
    };

    match state.producer.produce(mode, query.message.as_deref()).await {
        Ok(report) => json_response(
            StatusCode::OK,
            &SendDataResponse {
                status: "ok",
                message: report.summary(),
                mode: report.mode,
                published: report.published,
                queue: &report.queue,
            },
        ),
        Err(e) => error_response(&ApiError::from(e)),
    }
}

pub async fn consume(
    State(state): State<Arc<QueueState>>,
    Query(query): Query<ConsumeQuery>,
) -> Response {
    let mode = match ConsumeMode::from_type(query.kind.as_deref()) {
        Ok(mode) => mode,
        Err(e) => {
            warn!(error = %e, "Rejected /consume request");
            return error_response(&ApiError::new(ErrorCode::InvalidMode, e.to_string()));
        }
    };

    let queue = &state.consumer.queue().name;
    if state.consumer.launch(mode).is_some() {
        json_response(
            StatusCode::ACCEPTED,
            &ControlResponse {
                status: "started",
                message: "Consumer started and ready to consume messages.",
                queue,
                mode: Some(mode),
            },
        )
    } else {
        info!(queue = %queue, "Consumer already running, start ignored");
        json_response(
            StatusCode::OK,
            &ControlResponse {
                status: "already_running",
                message: "Consumer is already running.",
                queue,
                mode: None,
            },
        )
    }
}

pub async fn stop_consumer(State(state): State<Arc<QueueState>>) -> Response {
    let queue = &state.consumer.queue().name;
    let response = if state.consumer.controller().stop() {
        info!(queue = %queue, "Stopping consumer...");
        ControlResponse {
            status: "stopped",
            message: "Consumer stopped.",
            queue,
            mode: None,
        }
    } else {
        ControlResponse {
            status: "not_running",
            message: "No consumer is running.",
            queue,
            mode: None,
        }
    };
    json_response(StatusCode::OK, &response)
}

pub async fn consumer_status(State(state): State<Arc<QueueState>>) -> Response {
    json_response(StatusCode::OK, &state.consumer.status())
}

// === Response helpers ===

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = status;
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static("application/json"),
            );
            response
        }
        Err(e) => error_response(&ApiError::new(ErrorCode::Internal, e.to_string())),
    }
}

pub fn error_response(error: &ApiError) -> Response {
    let status =
        StatusCode::from_u16(error.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = Response::new(Body::from(error.to_json()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}
