//! Outbound mail capabilities.
//!
//! The relay submits finished raw messages with an explicit envelope, and
//! sends plain-text notifications to the relay owner when something needs a
//! human.

mod outbox;
mod recording;

use std::future::Future;
use std::time::Duration;

pub use outbox::OutboxMailer;
pub use recording::RecordingMailer;

/// Errors that can occur while submitting mail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MailerError {
    /// The message was refused.
    #[error("Message rejected: {0}")]
    Rejected(String),

    /// The transport failed.
    #[error("Mail backend error: {0}")]
    Backend(String),

    /// The call did not complete before its deadline.
    #[error("Mail call timed out after {0:?}")]
    Timeout(Duration),
}

/// A raw message submitted through [`Mailer::send_raw`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Envelope sender.
    pub envelope_from: String,
    /// Envelope recipients.
    pub envelope_to: Vec<String>,
    /// Complete message bytes.
    pub raw: Vec<u8>,
}

/// A plain-text admin notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Subject line.
    pub subject: String,
    /// Message text.
    pub body: String,
}

/// Outbound mail submission.
pub trait Mailer: Send + Sync {
    /// Submits a complete raw message for delivery.
    fn send_raw(
        &self,
        envelope_from: &str,
        envelope_to: &[String],
        raw: &[u8],
    ) -> impl Future<Output = Result<(), MailerError>> + Send;

    /// Sends a plain-text notification to the relay owner.
    fn send_notification(
        &self,
        subject: &str,
        body: &str,
    ) -> impl Future<Output = Result<(), MailerError>> + Send;
}
