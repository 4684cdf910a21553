//! RabbitMQ consumer loop using lapin.
//!
//! Connects to the broker, declares the shared queue and turns each delivered
//! status payload into one email. Deliveries are handled inline on the
//! subscription stream, so sends are serialized; a malformed payload is
//! logged and dropped without touching the dispatcher.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use lapin::{
    message::Delivery,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    Channel, Connection, ConnectionProperties,
};
use tokio::signal;
use tracing::{error, info, warn};

use tavola::config::QueueConfig;
use tavola::mail::Mailer;
use tavola::queue::StatusPayload;

/// What a single delivery amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Sent,
    SendFailed,
    Malformed,
    EmptyRecipient,
}

/// Decode one delivered payload and dispatch the email for it.
async fn handle_delivery(mailer: &dyn Mailer, data: &[u8]) -> Disposition {
    let payload = match StatusPayload::decode(data) {
        Ok(payload) => payload,
        Err(e) => {
            error!(error = %e, body_length = data.len(), "payload_decode_failed");
            return Disposition::Malformed;
        }
    };

    if payload.email.is_empty() {
        warn!(status = %payload.status, "payload_missing_recipient");
        return Disposition::EmptyRecipient;
    }

    let body = format!("Your reservation has been {}.", payload.status.to_lowercase());

    match mailer.send(&payload.email, &body).await {
        Ok(()) => Disposition::Sent,
        // Already logged at the dispatcher boundary
        Err(_) => Disposition::SendFailed,
    }
}

/// Manual-ack bookkeeping: ack a handled delivery, give a failed send one
/// broker redelivery, drop everything else.
async fn acknowledge(channel: &Channel, delivery: &Delivery, disposition: Disposition) {
    let result = match disposition {
        Disposition::SendFailed if !delivery.redelivered => {
            channel
                .basic_nack(
                    delivery.delivery_tag,
                    BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    },
                )
                .await
        }
        Disposition::SendFailed => {
            warn!(delivery_tag = delivery.delivery_tag, "email_retry_exhausted");
            channel
                .basic_nack(delivery.delivery_tag, BasicNackOptions::default())
                .await
        }
        _ => {
            channel
                .basic_ack(delivery.delivery_tag, BasicAckOptions::default())
                .await
        }
    };

    if let Err(e) = result {
        error!(
            delivery_tag = delivery.delivery_tag,
            error = %e,
            "rabbitmq_ack_failed"
        );
    }
}

/// Run the consumer until the process is signalled to stop.
///
/// This function:
/// 1. Connects to the broker with a single attempt (no retry; the worker
///    exits and its supervisor restarts it)
/// 2. Declares the queue so it exists even when the consumer starts first
/// 3. Subscribes and handles each delivery inline
/// 4. Handles graceful shutdown on SIGINT/SIGTERM
pub async fn run(config: QueueConfig, mailer: Arc<dyn Mailer>) -> Result<()> {
    let conn = Connection::connect(&config.amqp_url(), ConnectionProperties::default())
        .await
        .context("Failed to connect to RabbitMQ")?;

    info!("rabbitmq_connected");

    let channel = conn
        .create_channel()
        .await
        .context("Failed to create channel")?;

    // Same non-durable, non-exclusive, no-auto-delete properties as the
    // publisher side.
    channel
        .queue_declare(
            &config.queue,
            QueueDeclareOptions::default(),
            FieldTable::default(),
        )
        .await
        .context("Failed to declare queue")?;

    info!(queue = %config.queue, "rabbitmq_queue_declared");

    if config.manual_ack {
        // One unacked delivery at a time; sends are serialized anyway.
        channel
            .basic_qos(1, BasicQosOptions::default())
            .await
            .context("Failed to set QoS")?;
    }

    let mut consumer = channel
        .basic_consume(
            &config.queue,
            "tavola-consumer",
            BasicConsumeOptions {
                no_ack: !config.manual_ack,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .context("Failed to start consumer")?;

    info!(
        queue = %config.queue,
        manual_ack = config.manual_ack,
        "rabbitmq_consumer_started"
    );
    info!("consumer_ready");

    // Create shutdown signal future
    let shutdown = async {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received SIGINT"),
            _ = terminate => info!("Received SIGTERM"),
        }
    };

    // Pin the shutdown future
    tokio::pin!(shutdown);

    // Process messages until shutdown
    loop {
        tokio::select! {
            // Check for shutdown signal
            _ = &mut shutdown => {
                info!("consumer_stopping");
                break;
            }
            // Process next message
            delivery = consumer.next() => {
                match delivery {
                    Some(Ok(delivery)) => {
                        info!(
                            queue = %config.queue,
                            delivery_tag = delivery.delivery_tag,
                            body_length = delivery.data.len(),
                            "rabbitmq_message_received"
                        );

                        let disposition = handle_delivery(mailer.as_ref(), &delivery.data).await;

                        if config.manual_ack {
                            acknowledge(&channel, &delivery, disposition).await;
                        }
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "rabbitmq_delivery_error");
                    }
                    None => {
                        warn!("rabbitmq_consumer_closed");
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = channel.close(200, "Normal shutdown").await {
        warn!(error = %e, "rabbitmq_channel_close_error");
    }
    if let Err(e) = conn.close(200, "Normal shutdown").await {
        warn!(error = %e, "rabbitmq_connection_close_error");
    }

    info!("consumer_shutdown_complete");
    Ok(())
}
