//! Wire format for reservation status messages.
//!
//! A queue message is the UTF-8 byte string `{email}|{status}` with a single
//! `|` separator. There is no versioning and no structured encoding; anything
//! that does not split into exactly two fields is rejected.

use std::fmt;

use thiserror::Error;

/// Human-readable status label carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLabel {
    Declined,
    Confirmed,
    Unknown,
}

impl StatusLabel {
    /// Wire spelling of the label.
    pub fn as_str(self) -> &'static str {
        match self {
            StatusLabel::Declined => "Declined",
            StatusLabel::Confirmed => "Confirmed",
            StatusLabel::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decode failure for a delivered payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("expected 2 '|'-separated fields, found {0}")]
    FieldCount(usize),
}

/// Decoded queue message: recipient address and status label text.
///
/// The status field stays opaque text on decode; the consumer folds it into
/// the email body without checking it against [`StatusLabel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPayload {
    /// Recipient email address
    pub email: String,

    /// Status label text
    pub status: String,
}

impl StatusPayload {
    /// Create a payload for a recipient and status label.
    pub fn new(email: impl Into<String>, label: StatusLabel) -> Self {
        Self {
            email: email.into(),
            status: label.as_str().to_string(),
        }
    }

    /// Encode as `{email}|{status}` UTF-8 bytes.
    pub fn encode(&self) -> Vec<u8> {
        format!("{}|{}", self.email, self.status).into_bytes()
    }

    /// Decode a delivered payload, requiring exactly two fields.
    pub fn decode(data: &[u8]) -> Result<Self, PayloadError> {
        let text = std::str::from_utf8(data)?;
        let fields: Vec<&str> = text.split('|').collect();
        match fields.as_slice() {
            [email, status] => Ok(Self {
                email: (*email).to_string(),
                status: (*status).to_string(),
            }),
            _ => Err(PayloadError::FieldCount(fields.len())),
        }
    }
}
