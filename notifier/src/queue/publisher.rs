//! Queue publisher for reservation status messages.
//!
//! Used by the notification pipeline inside the API host. Channel access is
//! funneled through the shared [`ConnectionManager`], so the publisher can be
//! cloned into concurrent request handlers without interleaving publishes.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lapin::{options::BasicPublishOptions, BasicProperties};
use tracing::info;

use super::connection::ConnectionManager;
use super::payload::StatusPayload;
use crate::notify::StatusPublish;

/// Publishes encoded status payloads through the shared connection manager.
#[derive(Clone)]
pub struct QueuePublisher {
    manager: Arc<ConnectionManager>,
}

impl QueuePublisher {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl StatusPublish for QueuePublisher {
    async fn publish_status(&self, payload: &StatusPayload) -> Result<()> {
        let channel = self.manager.channel().await?;
        let body = payload.encode();

        // Default exchange routes by queue name; default properties leave
        // the message non-persistent, matching the non-durable queue.
        channel
            .basic_publish(
                "",
                self.manager.queue(),
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default(),
            )
            .await
            .context("Failed to publish status message")?
            .await
            .context("Failed to confirm publish")?;

        info!(
            queue = %self.manager.queue(),
            recipient = %payload.email,
            status = %payload.status,
            body_length = body.len(),
            "rabbitmq_status_published"
        );

        Ok(())
    }
}
