//! Queue module for RabbitMQ operations.
//!
//! This module provides:
//! - Connection lifecycle management for the publisher-side host process
//! - The wire codec for status payloads
//! - The publisher used by the notification pipeline
//!
//! ## Architecture
//!
//! ```text
//! Reservation update → QueuePublisher → confirmentque → Consumer worker
//! ```

pub mod connection;
pub mod payload;
pub mod publisher;

pub use connection::ConnectionManager;
pub use payload::{PayloadError, StatusLabel, StatusPayload};
pub use publisher::QueuePublisher;
