//! SMTP email dispatcher for the consumer worker.
//!
//! Sends one plain-text message per queue delivery over a fresh SMTP
//! connection. Failures are logged at this boundary and reported as plain
//! values; they must never take down the consume loop.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::{error, info};

use crate::config::SmtpConfig;

/// Display name on outgoing mail.
const SENDER_NAME: &str = "Tavola Restaurant Reservation Service";

/// Subject line on outgoing mail.
const SUBJECT: &str = "Reservation Status Notification";

/// Failure while building or sending a message.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid mailbox address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("smtp send failed: {0}")]
    Send(#[from] lettre::transport::smtp::Error),
}

/// Outbound mail port; lets the consume loop be exercised without a mail
/// server.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send a plain-text message. The error is already logged when this
    /// returns; callers use it only for their acknowledgment decision.
    async fn send(&self, recipient: &str, body: &str) -> Result<(), MailError>;
}

/// SMTP client wrapper sending one message per connection.
pub struct EmailDispatcher {
    config: SmtpConfig,
}

impl EmailDispatcher {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, recipient: &str, body: &str) -> Result<Message, MailError> {
        let from: Mailbox = format!("{} <{}>", SENDER_NAME, self.config.username).parse()?;
        let to: Mailbox = format!("Customer <{}>", recipient).parse()?;

        Ok(Message::builder()
            .from(from)
            .to(to)
            .subject(SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?)
    }

    async fn try_send(&self, recipient: &str, body: &str) -> Result<(), MailError> {
        let message = self.build_message(recipient, body)?;

        // Fresh connection per send; dropping the transport disconnects on
        // every exit path.
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(self.config.host.as_str())
            .port(self.config.port)
            .credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ))
            .build();

        mailer.send(message).await?;
        Ok(())
    }
}

#[async_trait]
impl Mailer for EmailDispatcher {
    async fn send(&self, recipient: &str, body: &str) -> Result<(), MailError> {
        match self.try_send(recipient, body).await {
            Ok(()) => {
                info!(recipient = %recipient, "email_sent");
                Ok(())
            }
            Err(e) => {
                error!(recipient = %recipient, error = %e, "email_send_failed");
                Err(e)
            }
        }
    }
}
