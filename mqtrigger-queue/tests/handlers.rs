//! Integration tests for the queue HTTP handlers
//!
//! These drive the router in-process against the in-memory broker.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use mqtrigger_core::RunController;
use mqtrigger_queue::{
    routes, Consumer, ConsumerStatus, MemoryBroker, Producer, QueueRef, QueueState, BURST_SIZE,
    DEFAULT_POLL_INTERVAL,
};
use serde_json::Value;
use tower::ServiceExt;

const QUEUE: &str = "default-queue";

fn app(broker: &MemoryBroker) -> (Router, Arc<QueueState>) {
    let connector = Arc::new(broker.clone());
    let queue = QueueRef::durable(QUEUE);
    let producer = Producer::new(connector.clone(), queue.clone());
    let consumer = Consumer::new(connector, queue, Arc::new(RunController::new()))
        .with_poll_interval(Duration::from_millis(50));
    let state = Arc::new(QueueState::new(producer, consumer));

    (routes().with_state(state.clone()), state)
}

async fn call(app: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn wait_until_idle(state: &QueueState) {
    for _ in 0..200 {
        if state.consumer.controller().state() == mqtrigger_core::RunState::Idle {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("consumer did not return to idle");
}

#[tokio::test]
async fn test_send_single_message() {
    let broker = MemoryBroker::new();
    let (app, _) = app(&broker);

    let (status, body) = call(&app, "POST", "/send-data?type=SINGLE&message=hello").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["published"], 1);
    assert_eq!(body["message"], "Produced a single message.");
    assert_eq!(body["queue"], QUEUE);
    assert_eq!(broker.ready_payloads(QUEUE), vec!["hello"]);
}

#[tokio::test]
async fn test_send_burst() {
    let broker = MemoryBroker::new();
    let (app, _) = app(&broker);

    let (status, body) = call(&app, "POST", "/send-data?type=burst").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["published"], BURST_SIZE);
    assert_eq!(body["mode"], "BURST");
    assert_eq!(broker.ready_count(QUEUE), BURST_SIZE);
    assert_eq!(
        broker.ready_payloads(QUEUE)[0],
        "default message from producer #1"
    );
}

#[tokio::test]
async fn test_send_invalid_mode_publishes_nothing() {
    let broker = MemoryBroker::new();
    let (app, _) = app(&broker);

    let (status, body) = call(&app, "POST", "/send-data?type=BOGUS&message=x").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "InvalidMode");
    assert!(body["message"].as_str().unwrap().contains("BOGUS"));
    assert!(body["request_id"].is_string());
    assert_eq!(broker.published_count(), 0);

    let (status, _) = call(&app, "POST", "/send-data").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(broker.published_count(), 0);
}

#[tokio::test]
async fn test_send_with_broker_down_returns_error() {
    let broker = MemoryBroker::new();
    broker.set_available(false);
    let (app, _) = app(&broker);

    let (status, body) = call(&app, "POST", "/send-data?type=SINGLE").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "BrokerUnavailable");
}

#[tokio::test]
async fn test_bounded_consume_drains_queue() {
    let broker = MemoryBroker::new();
    let (app, state) = app(&broker);
    call(&app, "POST", "/send-data?type=BURST&message=job").await;

    let (status, body) = call(&app, "POST", "/consume?type=SINGLE").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "started");
    assert_eq!(body["mode"], "drain");

    wait_until_idle(&state).await;
    assert_eq!(broker.acked_count(), 100);
    assert_eq!(broker.ready_count(QUEUE), 0);

    let (_, status_body) = call(&app, "GET", "/consumer").await;
    assert_eq!(status_body["state"], "idle");
    assert_eq!(status_body["processed_total"], 100);
    assert_eq!(status_body["runs"], 1);
}

#[tokio::test]
async fn test_double_start_is_a_no_op() {
    let broker = MemoryBroker::new();
    let (app, state) = app(&broker);

    let (status, _) = call(&app, "POST", "/consume?type=BURST").await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = call(&app, "POST", "/consume?type=BURST").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "already_running");

    let (status, body) = call(&app, "POST", "/stop-consumer").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "stopped");

    wait_until_idle(&state).await;
    assert_eq!(state.consumer.status().runs, 1);
}

#[tokio::test]
async fn test_stop_without_consumer() {
    let broker = MemoryBroker::new();
    let (app, _) = app(&broker);

    let (status, body) = call(&app, "POST", "/stop-consumer").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "not_running");
    assert_eq!(body["message"], "No consumer is running.");
}

#[tokio::test]
async fn test_consume_invalid_mode_does_not_start() {
    let broker = MemoryBroker::new();
    let (app, state) = app(&broker);

    let (status, body) = call(&app, "POST", "/consume?type=SIDEWAYS").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "InvalidMode");
    assert!(!state.consumer.controller().is_running());
    assert_eq!(state.consumer.status().runs, 0);
}

#[tokio::test]
async fn test_unbounded_consume_then_stop() {
    let broker = MemoryBroker::new();
    let (app, state) = app(&broker);
    call(&app, "POST", "/send-data?type=SINGLE&message=one").await;

    call(&app, "POST", "/consume").await;
    for _ in 0..100 {
        if broker.acked_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(broker.acked_count(), 1);

    let (_, body) = call(&app, "POST", "/stop-consumer").await;
    assert_eq!(body["status"], "stopped");
    assert!(!state.consumer.controller().is_running());

    wait_until_idle(&state).await;
    assert_eq!(broker.open_sessions(), 0);
}

#[test]
fn test_default_consumer_status() {
    let consumer = Consumer::new(
        Arc::new(MemoryBroker::new()),
        QueueRef::durable(QUEUE),
        Arc::new(RunController::new()),
    );

    let status: ConsumerStatus = consumer.status();

    assert_eq!(status.state, mqtrigger_core::RunState::Idle);
    assert_eq!(status.queue, QUEUE);
    assert_eq!(status.runs, 0);
    assert_eq!(status.processed_total, 0);
    assert_eq!(
        status.poll_interval_ms,
        DEFAULT_POLL_INTERVAL.as_millis() as u64
    );
}
