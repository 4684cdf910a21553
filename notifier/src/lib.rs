//! Tavola - reservation status notification pipeline.
//!
//! This library provides the shared modules for the two processes involved:
//! - the API host embeds the publisher side: one notification record and one
//!   queue message per committed reservation status change
//! - `tavola-consumer` is the standalone worker that turns queue messages
//!   into confirmation/decline emails
//!
//! ## Architecture
//!
//! ```text
//! Reservation update → ReservationNotifier → confirmentque → Consumer → SMTP
//! ```
//!
//! The two processes share nothing but the broker queue; neither is aware of
//! the other's liveness.

pub mod config;
pub mod mail;
pub mod notify;
pub mod queue;

// Re-export commonly used types
pub use config::{ConfigError, QueueConfig, SmtpConfig};
pub use mail::{EmailDispatcher, MailError, Mailer};
pub use notify::{
    NewNotification, NotificationStore, NotifyOutcome, ReservationNotifier, ReservationStatus,
    StatusChange, StatusPublish, UserDirectory, UserRecord,
};
pub use queue::{ConnectionManager, PayloadError, QueuePublisher, StatusLabel, StatusPayload};
