//! Core types for mqtrigger
//!
//! This crate provides the pieces shared by the queue crate and the server:
//! the consumer run controller, the error taxonomy and request IDs.

pub mod error;
pub mod request_id;
pub mod run_controller;

pub use error::{ApiError, ErrorCode, QueueError};
pub use request_id::RequestId;
pub use run_controller::{FinishGuard, RunController, RunState};
