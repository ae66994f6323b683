//! Mailer that writes outbound mail to a directory.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{Mailer, MailerError};

/// File names tried before giving up on a spool write.
const MAX_NAME_ATTEMPTS: usize = 16;

/// Envelope written next to each outbound `.eml` file.
#[derive(Debug, Serialize)]
struct Envelope<'a> {
    from: &'a str,
    to: &'a [String],
}

/// Mailer that spools messages into an outbox directory.
///
/// Each raw message becomes `<stem>.eml` with its envelope in
/// `<stem>.envelope.json`; each notification becomes `<stem>.txt`.
/// The envelope is written last, so a delivery agent should only pick up
/// stems whose envelope exists. Files are never overwritten, which keeps
/// several mailers sharing one outbox from losing each other's messages.
#[derive(Debug)]
pub struct OutboxMailer {
    dir: PathBuf,
    sequence: AtomicU64,
}

impl OutboxMailer {
    /// Creates a mailer spooling into `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Returns the outbox directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn next_stem(&self) -> String {
        let n = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}-{}-{n:04}",
            Utc::now().format("%Y%m%dT%H%M%S%.3f"),
            std::process::id()
        )
    }

    async fn ensure_dir(&self) -> Result<(), MailerError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| backend(&self.dir, &e))
    }

    /// Writes `<stem>.eml`, then `<stem>.envelope.json`.
    ///
    /// Fails with [`io::ErrorKind::AlreadyExists`] if either name is taken;
    /// nothing is left behind on failure.
    async fn spool_message(&self, stem: &str, envelope: &[u8], raw: &[u8]) -> io::Result<()> {
        let eml = self.dir.join(format!("{stem}.eml"));
        write_new(&eml, raw).await?;

        let envelope_path = self.dir.join(format!("{stem}.envelope.json"));
        if let Err(e) = write_new(&envelope_path, envelope).await {
            let _ = tokio::fs::remove_file(&eml).await;
            return Err(e);
        }
        Ok(())
    }
}

/// Creates `path`, which must not exist yet, holding `contents`.
async fn write_new(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;

    let written = async {
        file.write_all(contents).await?;
        file.flush().await
    }
    .await;

    if written.is_err() {
        drop(file);
        let _ = tokio::fs::remove_file(path).await;
    }
    written
}

fn backend(path: &Path, e: &io::Error) -> MailerError {
    MailerError::Backend(format!("{}: {e}", path.display()))
}

impl Mailer for OutboxMailer {
    async fn send_raw(
        &self,
        envelope_from: &str,
        envelope_to: &[String],
        raw: &[u8],
    ) -> Result<(), MailerError> {
        if envelope_to.is_empty() {
            return Err(MailerError::Rejected("no envelope recipients".to_string()));
        }

        let envelope = serde_json::to_vec_pretty(&Envelope {
            from: envelope_from,
            to: envelope_to,
        })
        .map_err(|e| MailerError::Backend(e.to_string()))?;

        self.ensure_dir().await?;

        for _ in 0..MAX_NAME_ATTEMPTS {
            let stem = self.next_stem();
            match self.spool_message(&stem, &envelope, raw).await {
                Ok(()) => {
                    info!(
                        from = %envelope_from,
                        to = %envelope_to.join(", "),
                        size = raw.len(),
                        file = %stem,
                        "Spooled raw message"
                    );
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(file = %stem, "Spool name taken, retrying");
                }
                Err(e) => return Err(backend(&self.dir.join(&stem), &e)),
            }
        }

        Err(MailerError::Backend(format!(
            "{}: no free spool name",
            self.dir.display()
        )))
    }

    async fn send_notification(&self, subject: &str, body: &str) -> Result<(), MailerError> {
        let text = format!("Subject: {subject}\n\n{body}\n");
        self.ensure_dir().await?;

        for _ in 0..MAX_NAME_ATTEMPTS {
            let stem = self.next_stem();
            let path = self.dir.join(format!("{stem}.txt"));
            match write_new(&path, text.as_bytes()).await {
                Ok(()) => {
                    info!(subject = %subject, file = %stem, "Spooled notification");
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(backend(&path, &e)),
            }
        }

        Err(MailerError::Backend(format!(
            "{}: no free spool name",
            self.dir.display()
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn files_with_suffix(dir: &Path, suffix: &str) -> Vec<PathBuf> {
        let mut files: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.to_string_lossy().ends_with(suffix))
            .collect();
        files.sort();
        files
    }

    #[tokio::test]
    async fn test_spools_message_with_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let mailer = OutboxMailer::new(dir.path().join("outbox"));

        mailer
            .send_raw("relay@example.com", &["owner@example.net".to_string()], b"raw\r\n")
            .await
            .unwrap();

        let eml = files_with_suffix(mailer.dir(), ".eml");
        assert_eq!(eml.len(), 1);
        assert_eq!(std::fs::read(&eml[0]).unwrap(), b"raw\r\n");

        let envelope = files_with_suffix(mailer.dir(), ".envelope.json");
        let envelope: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&envelope[0]).unwrap()).unwrap();
        assert_eq!(envelope["from"], "relay@example.com");
        assert_eq!(envelope["to"][0], "owner@example.net");
    }

    #[tokio::test]
    async fn test_rejects_empty_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let mailer = OutboxMailer::new(dir.path());

        let err = mailer.send_raw("a@b.c", &[], b"x").await.unwrap_err();

        assert!(matches!(err, MailerError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_spools_notifications_separately() {
        let dir = tempfile::tempdir().unwrap();
        let mailer = OutboxMailer::new(dir.path());

        mailer.send_notification("relay admin", "one").await.unwrap();
        mailer.send_notification("relay admin", "two").await.unwrap();

        let notes = files_with_suffix(dir.path(), ".txt");
        assert_eq!(notes.len(), 2);
        let first = std::fs::read_to_string(&notes[0]).unwrap();
        assert_eq!(first, "Subject: relay admin\n\none\n");
    }

    #[tokio::test]
    async fn test_concurrent_mailers_on_one_outbox_keep_every_message() {
        let dir = tempfile::tempdir().unwrap();
        let to = vec!["owner@example.net".to_string()];

        for i in 0..50 {
            let first = OutboxMailer::new(dir.path());
            let second = OutboxMailer::new(dir.path());
            let a = format!("first-{i}");
            let b = format!("second-{i}");

            let (ra, rb) = tokio::join!(
                first.send_raw("relay@example.com", &to, a.as_bytes()),
                second.send_raw("relay@example.com", &to, b.as_bytes()),
            );
            ra.unwrap();
            rb.unwrap();
        }

        let eml = files_with_suffix(dir.path(), ".eml");
        let bodies: HashSet<String> = eml
            .iter()
            .map(|p| std::fs::read_to_string(p).unwrap())
            .collect();
        assert_eq!(eml.len(), 100);
        assert_eq!(bodies.len(), 100);

        for path in files_with_suffix(dir.path(), ".envelope.json") {
            let name = path.to_string_lossy().replace(".envelope.json", ".eml");
            assert!(Path::new(&name).exists(), "envelope without message: {name}");
        }
    }

    #[tokio::test]
    async fn test_taken_envelope_name_leaves_no_message() {
        let dir = tempfile::tempdir().unwrap();
        let mailer = OutboxMailer::new(dir.path());
        std::fs::create_dir(dir.path().join("fixed.envelope.json")).unwrap();

        let err = mailer
            .spool_message("fixed", b"{}", b"raw")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert!(!dir.path().join("fixed.eml").exists());
    }

    #[tokio::test]
    async fn test_taken_message_name_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mailer = OutboxMailer::new(dir.path());
        std::fs::write(dir.path().join("fixed.eml"), b"earlier").unwrap();

        let err = mailer
            .spool_message("fixed", b"{}", b"later")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read(dir.path().join("fixed.eml")).unwrap(), b"earlier");
        assert!(!dir.path().join("fixed.envelope.json").exists());
    }
}
