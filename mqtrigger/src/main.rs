//! mqtrigger - HTTP-triggered producer/consumer for a RabbitMQ queue
//!
//! `POST /send-data` publishes one message or a burst of 100, `POST /consume`
//! starts the single background consumer and `POST /stop-consumer` stops it.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mqtrigger::{build_state, create_router, BrokerKind, Config};
use mqtrigger_core::RunController;

#[derive(Parser, Debug)]
#[command(name = "mqtrigger")]
#[command(about = "HTTP-triggered producer and consumer for a RabbitMQ queue", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "MQTRIGGER_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "MQTRIGGER_PORT")]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "MQTRIGGER_HOST")]
    host: Option<String>,

    /// Broker backend
    #[arg(long, value_enum)]
    broker: Option<BrokerKind>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MQTRIGGER_LOG_LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "mqtrigger={level},mqtrigger_queue={level},tower_http=debug",
                    level = args.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(broker) = args.broker {
        config.broker.kind = broker;
    }

    info!("Starting mqtrigger...");
    info!("  Queue: {}", config.queue.name);
    info!(
        "  Consumer poll interval: {}ms",
        config.consumer.poll_interval_ms
    );

    let state = build_state(&config);
    let controller = state.queue.consumer.controller().clone();
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("API is running on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(controller.clone()))
        .await?;

    // Let an active consumer observe the stop and close its session.
    controller.stop();
    let grace = config.shutdown_grace();
    if !controller.wait_idle(grace).await {
        warn!(grace = ?grace, "Consumer did not exit before shutdown");
    }

    info!("mqtrigger stopped");
    Ok(())
}

async fn shutdown_signal(controller: Arc<RunController>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
    if controller.stop() {
        info!("Asked running consumer to stop");
    }
}
