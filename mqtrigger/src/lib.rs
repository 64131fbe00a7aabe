//! mqtrigger - HTTP-triggered message queue producer/consumer
//!
//! Exposes configuration loading and router assembly so the binary and the
//! test harness build the service the same way.

pub mod config;
pub mod router;

pub use config::{BrokerKind, Config};
pub use router::{build_state, create_router, with_connector, AppState};
