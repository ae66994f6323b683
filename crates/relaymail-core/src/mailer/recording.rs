//! Mailer that keeps everything it is given.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::{Mailer, MailerError, Notification, SentMessage};

#[derive(Debug, Default)]
struct Outbox {
    sent: Vec<SentMessage>,
    notifications: Vec<Notification>,
    fail_sends: bool,
    fail_notifications: bool,
}

/// Mailer that records submissions in memory instead of delivering them.
///
/// Clones share the same outbox. Used for dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingMailer {
    outbox: Arc<Mutex<Outbox>>,
}

impl RecordingMailer {
    /// Creates an empty mailer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Outbox> {
        self.outbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns every raw message submitted so far.
    #[must_use]
    pub fn sent(&self) -> Vec<SentMessage> {
        self.lock().sent.clone()
    }

    /// Returns every notification submitted so far.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().notifications.clone()
    }

    /// Makes every `send_raw` fail.
    pub fn fail_sends(&self, fail: bool) {
        self.lock().fail_sends = fail;
    }

    /// Makes every `send_notification` fail.
    pub fn fail_notifications(&self, fail: bool) {
        self.lock().fail_notifications = fail;
    }
}

impl Mailer for RecordingMailer {
    async fn send_raw(
        &self,
        envelope_from: &str,
        envelope_to: &[String],
        raw: &[u8],
    ) -> Result<(), MailerError> {
        let mut outbox = self.lock();
        if outbox.fail_sends {
            return Err(MailerError::Rejected("sending disabled".to_string()));
        }
        debug!(from = %envelope_from, size = raw.len(), "Recorded raw message");
        outbox.sent.push(SentMessage {
            envelope_from: envelope_from.to_string(),
            envelope_to: envelope_to.to_vec(),
            raw: raw.to_vec(),
        });
        Ok(())
    }

    async fn send_notification(&self, subject: &str, body: &str) -> Result<(), MailerError> {
        let mut outbox = self.lock();
        if outbox.fail_notifications {
            return Err(MailerError::Backend("notifications disabled".to_string()));
        }
        outbox.notifications.push(Notification {
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_messages_and_notifications() {
        let mailer = RecordingMailer::new();
        let view = mailer.clone();

        mailer
            .send_raw("relay@example.com", &["owner@example.net".to_string()], b"raw")
            .await
            .unwrap();
        mailer.send_notification("admin", "hello").await.unwrap();

        let sent = view.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].envelope_to, vec!["owner@example.net".to_string()]);
        assert_eq!(sent[0].raw, b"raw");
        assert_eq!(view.notifications()[0].body, "hello");
    }

    #[tokio::test]
    async fn test_failures() {
        let mailer = RecordingMailer::new();
        mailer.fail_sends(true);
        mailer.fail_notifications(true);

        assert!(mailer.send_raw("a@b.c", &[], b"").await.is_err());
        assert!(mailer.send_notification("s", "b").await.is_err());
        assert!(mailer.sent().is_empty());
    }
}
