//! Tavola Consumer - standalone worker turning reservation status messages
//! into confirmation/decline emails.
//!
//! Counterpart to the publisher embedded in the API host; the two processes
//! share nothing but the broker queue. The worker consumes from the shared
//! queue and sends one plain-text email per delivered status message.

mod consumer;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tavola::config::{QueueConfig, SmtpConfig};
use tavola::mail::EmailDispatcher;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    tracing::info!("consumer_starting");

    let queue_config = QueueConfig::from_env();

    // Missing SMTP settings abort startup; a worker that cannot send must
    // not consume anything.
    let smtp_config = SmtpConfig::from_env().context("SMTP configuration incomplete")?;

    tracing::info!(
        broker_host = %queue_config.host,
        queue = %queue_config.queue,
        manual_ack = queue_config.manual_ack,
        smtp_host = %smtp_config.host,
        "config_loaded"
    );

    let mailer = Arc::new(EmailDispatcher::new(smtp_config));

    // Start the consumer
    consumer::run(queue_config, mailer).await?;

    Ok(())
}
