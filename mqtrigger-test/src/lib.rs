//! Test utilities for mqtrigger
//!
//! Provides utilities for end-to-end testing of the HTTP service:
//! - Start the full router on an ephemeral port, backed by the in-memory broker
//! - Inspect and fault the broker from the test
//! - A client for the service endpoints
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mqtrigger_test::TestServer;
//!
//! #[tokio::test]
//! async fn test_produce() {
//!     let server = TestServer::start().await.unwrap();
//!     let client = server.client();
//!
//!     let sent = client.send_data("SINGLE", Some("hello")).await.unwrap();
//!     assert_eq!(sent.published, 1);
//!     assert_eq!(server.broker().ready_count(server.queue_name()), 1);
//! }
//! ```

pub mod client;
pub mod server;

pub use client::{ClientError, MqTriggerClient};
pub use server::{TestError, TestServer};

/// Poll interval the test server's consumer uses
pub const TEST_POLL_INTERVAL_MS: u64 = 50;

/// Timeout for waiting on the server
pub const STARTUP_TIMEOUT_SECS: u64 = 10;
