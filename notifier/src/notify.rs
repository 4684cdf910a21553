//! Reservation status notification pipeline (publisher side).
//!
//! When the reservation service commits a status change it hands the change
//! to [`ReservationNotifier`], which writes the durable notification record
//! and then publishes the queue message the consumer worker turns into an
//! email. Both effects happen only for a known user with a non-empty email
//! address; everything else is a silent skip.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::Date;
use tracing::{debug, info};

use crate::queue::{StatusLabel, StatusPayload};

/// Reservation lifecycle status as stored by the reservation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationStatus {
    Rejected,
    Confirmed,
    Pending,
    /// Any status code outside the enumerated range.
    Unknown,
}

impl ReservationStatus {
    /// Total mapping from the stored status code.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ReservationStatus::Rejected,
            1 => ReservationStatus::Confirmed,
            2 => ReservationStatus::Pending,
            _ => ReservationStatus::Unknown,
        }
    }

    /// Label carried on the wire for this status. Only rejected and
    /// confirmed reservations have a named label; everything else is
    /// reported as unknown.
    pub fn label(self) -> StatusLabel {
        match self {
            ReservationStatus::Rejected => StatusLabel::Declined,
            ReservationStatus::Confirmed => StatusLabel::Confirmed,
            ReservationStatus::Pending | ReservationStatus::Unknown => StatusLabel::Unknown,
        }
    }
}

/// Status change handed over by the reservation service after it committed
/// the update.
#[derive(Debug, Clone)]
pub struct StatusChange {
    /// Updated reservation
    pub reservation_id: i64,

    /// Owning user of the reservation
    pub user_id: i64,

    /// New status code as stored
    pub new_status: i32,

    /// Date the reservation is for
    pub reservation_date: Date,
}

/// User as seen by this pipeline; only the email address matters here.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user_id: i64,

    /// May be empty for accounts registered without an address.
    pub email: String,
}

/// Durable notification record handed to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNotification {
    pub user_id: i64,
    pub reservation_id: i64,
    pub message: String,
}

/// Looks up the owning user of a reservation.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: i64) -> Result<Option<UserRecord>>;
}

/// Persists notification records.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn add(&self, notification: NewNotification) -> Result<()>;
}

/// Outbound port for the queue message, implemented by
/// [`crate::queue::QueuePublisher`].
#[async_trait]
pub trait StatusPublish: Send + Sync {
    async fn publish_status(&self, payload: &StatusPayload) -> Result<()>;
}

/// What a status change resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// Record written and message published.
    Published,
    /// No user with that id; nothing written, nothing published.
    SkippedMissingUser,
    /// User has no email address; nothing written, nothing published.
    SkippedMissingEmail,
}

/// Produces the notification record and queue message for a status change.
pub struct ReservationNotifier {
    users: Arc<dyn UserDirectory>,
    notifications: Arc<dyn NotificationStore>,
    publisher: Arc<dyn StatusPublish>,
}

impl ReservationNotifier {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        notifications: Arc<dyn NotificationStore>,
        publisher: Arc<dyn StatusPublish>,
    ) -> Self {
        Self {
            users,
            notifications,
            publisher,
        }
    }

    /// React to a committed reservation status change.
    ///
    /// The notification record is written before the queue publish, so a
    /// store failure blocks the publish. A publish failure is returned to
    /// the caller, which should log it without rolling back the status
    /// change; the record already persisted stays in place.
    pub async fn status_changed(&self, change: &StatusChange) -> Result<NotifyOutcome> {
        let user = self
            .users
            .find_user(change.user_id)
            .await
            .context("Failed to look up reservation owner")?;

        let Some(user) = user else {
            debug!(
                user_id = change.user_id,
                reservation_id = change.reservation_id,
                "notification_skipped_missing_user"
            );
            return Ok(NotifyOutcome::SkippedMissingUser);
        };

        if user.email.is_empty() {
            debug!(
                user_id = user.user_id,
                reservation_id = change.reservation_id,
                "notification_skipped_missing_email"
            );
            return Ok(NotifyOutcome::SkippedMissingEmail);
        }

        let label = ReservationStatus::from_code(change.new_status).label();
        let message = format!(
            "Reservation for {} on {} has been {}.",
            user.email, change.reservation_date, label
        );

        self.notifications
            .add(NewNotification {
                user_id: user.user_id,
                reservation_id: change.reservation_id,
                message,
            })
            .await
            .context("Failed to persist notification")?;

        let payload = StatusPayload::new(user.email, label);
        self.publisher
            .publish_status(&payload)
            .await
            .context("Failed to publish status message")?;

        info!(
            reservation_id = change.reservation_id,
            user_id = user.user_id,
            status = %payload.status,
            "reservation_status_notified"
        );

        Ok(NotifyOutcome::Published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use time::Month;

    struct StaticDirectory(Option<UserRecord>);

    #[async_trait]
    impl UserDirectory for StaticDirectory {
        async fn find_user(&self, _user_id: i64) -> Result<Option<UserRecord>> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        added: Mutex<Vec<NewNotification>>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationStore for RecordingStore {
        async fn add(&self, notification: NewNotification) -> Result<()> {
            if self.fail {
                anyhow::bail!("store unavailable");
            }
            self.added.lock().unwrap().push(notification);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<StatusPayload>>,
        fail: bool,
    }

    #[async_trait]
    impl StatusPublish for RecordingPublisher {
        async fn publish_status(&self, payload: &StatusPayload) -> Result<()> {
            if self.fail {
                anyhow::bail!("broker unavailable");
            }
            self.published.lock().unwrap().push(payload.clone());
            Ok(())
        }
    }

    fn user(email: &str) -> UserRecord {
        UserRecord {
            user_id: 7,
            email: email.to_string(),
        }
    }

    fn change(new_status: i32) -> StatusChange {
        StatusChange {
            reservation_id: 42,
            user_id: 7,
            new_status,
            reservation_date: Date::from_calendar_date(2025, Month::September, 12).unwrap(),
        }
    }

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(ReservationStatus::from_code(0), ReservationStatus::Rejected);
        assert_eq!(ReservationStatus::from_code(1), ReservationStatus::Confirmed);
        assert_eq!(ReservationStatus::from_code(2), ReservationStatus::Pending);
        assert_eq!(ReservationStatus::from_code(-1), ReservationStatus::Unknown);
        assert_eq!(ReservationStatus::from_code(99), ReservationStatus::Unknown);
    }

    #[test]
    fn test_label_mapping() {
        assert_eq!(ReservationStatus::from_code(0).label().as_str(), "Declined");
        assert_eq!(ReservationStatus::from_code(1).label().as_str(), "Confirmed");
        assert_eq!(ReservationStatus::from_code(2).label().as_str(), "Unknown");
        assert_eq!(ReservationStatus::from_code(-1).label().as_str(), "Unknown");
        assert_eq!(ReservationStatus::from_code(99).label().as_str(), "Unknown");
    }

    #[tokio::test]
    async fn test_confirmed_update_writes_record_and_publishes() {
        let store = Arc::new(RecordingStore::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let notifier = ReservationNotifier::new(
            Arc::new(StaticDirectory(Some(user("a@b.com")))),
            Arc::clone(&store) as Arc<dyn NotificationStore>,
            Arc::clone(&publisher) as Arc<dyn StatusPublish>,
        );

        let outcome = notifier.status_changed(&change(1)).await.unwrap();
        assert_eq!(outcome, NotifyOutcome::Published);

        let added = store.added.lock().unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].user_id, 7);
        assert_eq!(added[0].reservation_id, 42);
        assert!(added[0].message.contains("a@b.com"));
        assert!(added[0].message.contains("2025-09-12"));
        assert!(added[0].message.contains("Confirmed"));

        let published = publisher.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].encode(), b"a@b.com|Confirmed");
    }

    #[tokio::test]
    async fn test_rejected_update_publishes_declined() {
        let store = Arc::new(RecordingStore::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let notifier = ReservationNotifier::new(
            Arc::new(StaticDirectory(Some(user("x@y.com")))),
            Arc::clone(&store) as Arc<dyn NotificationStore>,
            Arc::clone(&publisher) as Arc<dyn StatusPublish>,
        );

        notifier.status_changed(&change(0)).await.unwrap();

        let published = publisher.published.lock().unwrap();
        assert_eq!(published[0].encode(), b"x@y.com|Declined");
    }

    #[tokio::test]
    async fn test_out_of_range_status_publishes_unknown() {
        let store = Arc::new(RecordingStore::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let notifier = ReservationNotifier::new(
            Arc::new(StaticDirectory(Some(user("z@w.com")))),
            Arc::clone(&store) as Arc<dyn NotificationStore>,
            Arc::clone(&publisher) as Arc<dyn StatusPublish>,
        );

        notifier.status_changed(&change(99)).await.unwrap();

        let published = publisher.published.lock().unwrap();
        assert_eq!(published[0].encode(), b"z@w.com|Unknown");
    }

    #[tokio::test]
    async fn test_missing_user_skips_everything() {
        let store = Arc::new(RecordingStore::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let notifier = ReservationNotifier::new(
            Arc::new(StaticDirectory(None)),
            Arc::clone(&store) as Arc<dyn NotificationStore>,
            Arc::clone(&publisher) as Arc<dyn StatusPublish>,
        );

        let outcome = notifier.status_changed(&change(1)).await.unwrap();
        assert_eq!(outcome, NotifyOutcome::SkippedMissingUser);
        assert!(store.added.lock().unwrap().is_empty());
        assert!(publisher.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_email_skips_everything() {
        let store = Arc::new(RecordingStore::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let notifier = ReservationNotifier::new(
            Arc::new(StaticDirectory(Some(user("")))),
            Arc::clone(&store) as Arc<dyn NotificationStore>,
            Arc::clone(&publisher) as Arc<dyn StatusPublish>,
        );

        let outcome = notifier.status_changed(&change(1)).await.unwrap();
        assert_eq!(outcome, NotifyOutcome::SkippedMissingEmail);
        assert!(store.added.lock().unwrap().is_empty());
        assert!(publisher.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_blocks_publish() {
        let store = Arc::new(RecordingStore {
            fail: true,
            ..Default::default()
        });
        let publisher = Arc::new(RecordingPublisher::default());
        let notifier = ReservationNotifier::new(
            Arc::new(StaticDirectory(Some(user("a@b.com")))),
            Arc::clone(&store) as Arc<dyn NotificationStore>,
            Arc::clone(&publisher) as Arc<dyn StatusPublish>,
        );

        let result = notifier.status_changed(&change(1)).await;
        assert!(result.is_err());
        assert!(publisher.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_persisted_record() {
        let store = Arc::new(RecordingStore::default());
        let publisher = Arc::new(RecordingPublisher {
            fail: true,
            ..Default::default()
        });
        let notifier = ReservationNotifier::new(
            Arc::new(StaticDirectory(Some(user("a@b.com")))),
            Arc::clone(&store) as Arc<dyn NotificationStore>,
            Arc::clone(&publisher) as Arc<dyn StatusPublish>,
        );

        let result = notifier.status_changed(&change(1)).await;
        assert!(result.is_err());
        // The record was written before the publish attempt and stays.
        assert_eq!(store.added.lock().unwrap().len(), 1);
    }
}
