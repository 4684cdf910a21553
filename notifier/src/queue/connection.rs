//! RabbitMQ connection management for the publisher side.
//!
//! The API host owns a single connection and channel for its whole lifetime.
//! The broker usually races the host during container startup, so the initial
//! connect retries on a fixed budget before giving up. After that, a dropped
//! connection is re-opened transparently on the next channel access.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use lapin::{
    options::QueueDeclareOptions, types::FieldTable, Channel, Connection, ConnectionProperties,
};
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::QueueConfig;

/// Maximum initial connection attempts before startup fails.
const MAX_CONNECT_ATTEMPTS: u32 = 20;

/// Fixed delay between initial connection attempts.
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Owns the process-wide broker connection and channel.
pub struct ConnectionManager {
    config: QueueConfig,
    state: RwLock<Option<ConnState>>,
}

struct ConnState {
    connection: Connection,
    channel: Channel,
}

impl ConnectionManager {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            state: RwLock::new(None),
        }
    }

    /// Queue this manager declares and publishes to.
    pub fn queue(&self) -> &str {
        &self.config.queue
    }

    /// Establish the initial connection, retrying on the fixed budget.
    ///
    /// Exhausting the budget is fatal; the host must not start serving
    /// without a reachable broker.
    pub async fn connect(&self) -> Result<()> {
        let state = retry(MAX_CONNECT_ATTEMPTS, CONNECT_RETRY_DELAY, || self.open()).await?;

        info!(queue = %self.config.queue, "rabbitmq_connected");

        *self.state.write().await = Some(state);
        Ok(())
    }

    /// Hand out the live channel, re-opening the connection once if the
    /// broker dropped it since the last call.
    pub async fn channel(&self) -> Result<Channel> {
        {
            let state = self.state.read().await;
            if let Some(s) = state.as_ref() {
                if s.channel.status().connected() {
                    return Ok(s.channel.clone());
                }
            }
        }

        let mut state = self.state.write().await;

        // Double-check after acquiring the write lock
        if let Some(s) = state.as_ref() {
            if s.channel.status().connected() {
                return Ok(s.channel.clone());
            }
        }

        warn!("rabbitmq_channel_lost");

        let fresh = self.open().await?;
        let channel = fresh.channel.clone();
        *state = Some(fresh);

        info!(queue = %self.config.queue, "rabbitmq_reconnected");

        Ok(channel)
    }

    /// Single connection attempt: connect, open a channel, declare the queue.
    async fn open(&self) -> Result<ConnState> {
        let connection =
            Connection::connect(&self.config.amqp_url(), ConnectionProperties::default())
                .await
                .context("Failed to connect to RabbitMQ")?;

        let channel = connection
            .create_channel()
            .await
            .context("Failed to create channel")?;

        // Non-durable, non-exclusive, no auto-delete. Idempotent unless an
        // existing queue was declared with different properties, in which
        // case the broker error propagates as a startup failure.
        channel
            .queue_declare(
                &self.config.queue,
                QueueDeclareOptions::default(),
                FieldTable::default(),
            )
            .await
            .context("Failed to declare queue")?;

        Ok(ConnState {
            connection,
            channel,
        })
    }

    /// Close channel and connection. Safe to call repeatedly; later calls
    /// are no-ops.
    pub async fn close(&self) {
        let mut state = self.state.write().await;

        if let Some(s) = state.take() {
            if let Err(e) = s.channel.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_channel_close_error");
            }
            if let Err(e) = s.connection.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_connection_close_error");
            }
            info!("rabbitmq_connection_closed");
        }
    }
}

/// Run `attempt` up to `max_attempts` times with a fixed delay in between,
/// returning the first success or the last error.
async fn retry<T, F, Fut>(max_attempts: u32, delay: Duration, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt_no = 0;
    loop {
        attempt_no += 1;
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(
                    attempt = attempt_no,
                    max_attempts = max_attempts,
                    error = %e,
                    "rabbitmq_connect_retry"
                );
                if attempt_no >= max_attempts {
                    return Err(e.context(format!(
                        "RabbitMQ unreachable after {max_attempts} attempts"
                    )));
                }
                sleep(delay).await;
            }
        }
    }
}
