//! HTTP router for mqtrigger

use axum::{extract::State, http::StatusCode, response::Response, routing::get, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use mqtrigger_core::RunController;
use mqtrigger_queue::{
    handlers::{self, json_response, QueueState},
    AmqpConnector, Connector, Consumer, MemoryBroker, Producer, QueueRef,
};

use crate::config::{BrokerKind, Config};

/// Service state for the main router
pub struct AppState {
    pub queue: Arc<QueueState>,
    pub broker: BrokerKind,
    pub started_at: DateTime<Utc>,
}

/// Wire the producer and consumer to the configured broker backend
pub fn build_state(config: &Config) -> AppState {
    let connector: Arc<dyn Connector> = match config.broker.kind {
        BrokerKind::Amqp => {
            let settings = config.broker.amqp_settings();
            info!(
                host = %settings.host,
                port = settings.port,
                vhost = %settings.vhost,
                "Using RabbitMQ broker"
            );
            Arc::new(AmqpConnector::new(settings))
        }
        BrokerKind::Memory => {
            info!("Using in-memory broker");
            Arc::new(MemoryBroker::new())
        }
    };

    with_connector(connector, config)
}

/// Build state around an existing connector (used by the test harness)
pub fn with_connector(connector: Arc<dyn Connector>, config: &Config) -> AppState {
    let queue = QueueRef::durable(config.queue.name.clone());
    let producer = Producer::new(connector.clone(), queue.clone());
    let consumer = Consumer::new(connector, queue, Arc::new(RunController::new()))
        .with_poll_interval(config.consumer.poll_interval());

    AppState {
        queue: Arc::new(QueueState::new(producer, consumer)),
        broker: config.broker.kind,
        started_at: Utc::now(),
    }
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    let health = Router::new()
        .route("/health", get(health_check))
        .with_state(shared_state.clone());

    handlers::routes()
        .with_state(shared_state.queue.clone())
        .merge(health)
        .layer(TraceLayer::new_for_http())
}

#[derive(Serialize)]
struct Health<'a> {
    status: &'static str,
    broker: &'static str,
    queue: &'a str,
    consumer: mqtrigger_core::RunState,
    started_at: String,
}

async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let consumer = &state.queue.consumer;
    json_response(
        StatusCode::OK,
        &Health {
            status: "running",
            broker: match state.broker {
                BrokerKind::Amqp => "amqp",
                BrokerKind::Memory => "memory",
            },
            queue: &consumer.queue().name,
            consumer: consumer.controller().state(),
            started_at: state.started_at.to_rfc3339(),
        },
    )
}
