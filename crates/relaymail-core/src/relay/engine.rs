//! Relay decision engine.

use std::fmt::Write;
use std::slice;

use relaymail_mime::{CanonicalAddress, HeaderRewriter, canonicalize};
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::record::InboundRecord;
use crate::blocklist::{BlockList, BlockListStore};
use crate::config::RelayConfig;
use crate::deadline::with_deadline;
use crate::mailer::{Mailer, MailerError};
use crate::store::{ObjectStore, Presigner, StoreError};

/// What the engine did with one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A recipient is on the block list; the message was discarded.
    Blocked {
        /// The blocked recipient.
        recipient: CanonicalAddress,
    },
    /// An admin command added addresses to the block list.
    BlockListUpdated {
        /// Addresses added, canonicalized.
        added: Vec<CanonicalAddress>,
    },
    /// An admin command named no address to block; nothing was done.
    CommandIgnored,
    /// The message was rewritten and forwarded.
    Forwarded,
    /// The stored message could not be retrieved.
    RetrievalFailed {
        /// Retrieval error.
        error: String,
    },
    /// Forwarding failed; the owner was sent a link to the stored message.
    SendFailed {
        /// Presigned link to the stored message.
        link: String,
        /// Send error.
        error: String,
    },
    /// Forwarding failed and no link to the stored message could be made.
    PresignFailed {
        /// Presign error.
        error: String,
    },
}

impl RecordOutcome {
    /// Short name used in logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Blocked { .. } => "blocked",
            Self::BlockListUpdated { .. } => "block_list_updated",
            Self::CommandIgnored => "command_ignored",
            Self::Forwarded => "forwarded",
            Self::RetrievalFailed { .. } => "retrieval_failed",
            Self::SendFailed { .. } => "send_failed",
            Self::PresignFailed { .. } => "presign_failed",
        }
    }

    /// Returns true if the record left its stored message for a human.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::RetrievalFailed { .. } | Self::SendFailed { .. } | Self::PresignFailed { .. }
        )
    }
}

/// Result of processing one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordReport {
    /// Storage key of the record's message.
    pub message_id: String,
    /// Decision taken.
    pub outcome: RecordOutcome,
    /// Whether the stored message was deleted.
    pub deleted: bool,
}

/// Result of processing a batch, one report per record in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Per-record reports.
    pub records: Vec<RecordReport>,
}

impl BatchReport {
    /// Number of records whose outcome matches `predicate`.
    pub fn count(&self, predicate: impl Fn(&RecordOutcome) -> bool) -> usize {
        self.records.iter().filter(|r| predicate(&r.outcome)).count()
    }

    /// Number of records that ended in a failure path.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.count(RecordOutcome::is_failure)
    }
}

/// Decides and carries out what happens to each inbound record.
///
/// Records are handled one at a time in order. The block list is loaded once
/// per batch; admin commands update it in place so later records of the same
/// batch see their additions. No error crosses a record boundary.
#[derive(Debug)]
pub struct RelayEngine<S, M> {
    config: RelayConfig,
    rewriter: HeaderRewriter,
    owner: CanonicalAddress,
    store: S,
    mailer: M,
}

impl<S, M> RelayEngine<S, M>
where
    S: ObjectStore + Presigner,
    M: Mailer,
{
    /// Creates an engine for `config` using the given capabilities.
    #[must_use]
    pub fn new(config: RelayConfig, store: S, mailer: M) -> Self {
        let rewriter = config.rewriter();
        let owner = canonicalize(&config.relay_to);
        Self {
            config,
            rewriter,
            owner,
            store,
            mailer,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Returns the object store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Returns the mailer.
    #[must_use]
    pub const fn mailer(&self) -> &M {
        &self.mailer
    }

    fn block_list(&self) -> BlockListStore<'_, S> {
        BlockListStore::new(&self.store, &self.config.block_list_key)
            .with_call_timeout(self.config.call_timeout())
    }

    /// Processes a batch of records.
    pub async fn process_batch(&self, records: &[InboundRecord]) -> BatchReport {
        let mut report = BatchReport::default();
        if records.is_empty() {
            debug!("Empty batch, nothing to do");
            return report;
        }

        let mut blocks = self.block_list().load().await;

        for record in records {
            let span = info_span!("record", message_id = %record.message_id);
            let record_report = self.process_record(record, &mut blocks).instrument(span).await;
            report.records.push(record_report);
        }

        info!(
            records = report.records.len(),
            forwarded = report.count(|o| matches!(o, RecordOutcome::Forwarded)),
            blocked = report.count(|o| matches!(o, RecordOutcome::Blocked { .. })),
            failures = report.failures(),
            "Batch processed"
        );
        report
    }

    /// Processes one record against an already loaded block list.
    ///
    /// Admin commands add to `blocks` and persist it.
    pub async fn process_record(
        &self,
        record: &InboundRecord,
        blocks: &mut BlockList,
    ) -> RecordReport {
        let (outcome, deleted) = if let Some(recipient) = blocks.first_blocked(&record.destinations)
        {
            info!(recipient = %recipient, "Recipient is blocked, discarding message");
            let deleted = self.delete_source(record).await;
            (RecordOutcome::Blocked { recipient }, deleted)
        } else if self.is_admin_command(record) {
            self.apply_command(record, blocks).await
        } else {
            self.forward(record).await
        };

        debug!(outcome = outcome.label(), deleted, "Record handled");
        RecordReport {
            message_id: record.message_id.clone(),
            outcome,
            deleted,
        }
    }

    fn is_admin_command(&self, record: &InboundRecord) -> bool {
        record
            .subject
            .eq_ignore_ascii_case(&self.config.command_keyword)
            && canonicalize(&record.source) == self.owner
    }

    /// Addresses an admin command asks to block: every destination except
    /// the owner, canonicalized, without duplicates.
    fn command_additions(&self, record: &InboundRecord) -> Vec<CanonicalAddress> {
        let mut added: Vec<CanonicalAddress> = Vec::new();
        for destination in &record.destinations {
            let address = canonicalize(destination);
            if address.is_empty() || address == self.owner || added.contains(&address) {
                continue;
            }
            added.push(address);
        }
        added
    }

    async fn apply_command(
        &self,
        record: &InboundRecord,
        blocks: &mut BlockList,
    ) -> (RecordOutcome, bool) {
        let added = self.command_additions(record);
        if added.is_empty() {
            warn!("Admin command names no address to block, ignoring");
            return (RecordOutcome::CommandIgnored, false);
        }

        let store = self.block_list();
        let current = std::mem::take(blocks);
        *blocks = store
            .merge_and_persist(current, added.iter().map(CanonicalAddress::as_str))
            .await;

        info!(
            key = store.key(),
            added = added.len(),
            entries = blocks.len(),
            "Block list updated"
        );

        let mut summary = String::from("added to block list:");
        for address in &added {
            let _ = write!(summary, "\n{address}");
        }
        self.notify(&summary).await;

        let deleted = self.delete_source(record).await;
        (RecordOutcome::BlockListUpdated { added }, deleted)
    }

    async fn forward(&self, record: &InboundRecord) -> (RecordOutcome, bool) {
        let key = &record.message_id;
        let timeout = self.config.call_timeout();

        let raw = match with_deadline(timeout, self.store.get(key), StoreError::Timeout).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(error = %e, "Failed to retrieve stored message");
                self.notify(&format!("get object {key} failed: {e}")).await;
                return (RecordOutcome::RetrievalFailed { error: e.to_string() }, false);
            }
        };

        let message = self.rewriter.rewrite_bytes(&raw);
        let envelope_from = self.rewriter.relay_from();
        let envelope_to = [self.rewriter.relay_to().to_string()];

        let sent = with_deadline(
            timeout,
            self.mailer
                .send_raw(envelope_from, &envelope_to, &message),
            MailerError::Timeout,
        )
        .await;

        match sent {
            Ok(()) => {
                info!(
                    source = %record.source,
                    to = %envelope_to[0],
                    size = message.len(),
                    "Forwarded message"
                );
                let deleted = self.delete_source(record).await;
                (RecordOutcome::Forwarded, deleted)
            }
            Err(e) => (self.report_send_failure(key, &e).await, false),
        }
    }

    /// Sends the owner a link to the stored message after a failed send.
    async fn report_send_failure(&self, key: &str, send_error: &MailerError) -> RecordOutcome {
        error!(error = %send_error, "Failed to forward message");

        let link = with_deadline(
            self.config.call_timeout(),
            self.store.presign_get(key, self.config.presign_ttl()),
            StoreError::Timeout,
        )
        .await;

        match link {
            Ok(link) => {
                self.notify(&format!(
                    "raw message {link}\r\nsend raw {key} failed: {send_error}"
                ))
                .await;
                RecordOutcome::SendFailed {
                    link,
                    error: send_error.to_string(),
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to presign stored message");
                self.notify(&format!(
                    "presign {key} failed: {e}\r\nsend raw {key} failed: {send_error}"
                ))
                .await;
                RecordOutcome::PresignFailed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn delete_source(&self, record: &InboundRecord) -> bool {
        let key = &record.message_id;
        let deleted = with_deadline(
            self.config.call_timeout(),
            self.store.delete(slice::from_ref(key)),
            StoreError::Timeout,
        )
        .await;

        match deleted {
            Ok(()) => {
                debug!("Deleted stored message");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to delete stored message");
                self.notify(&format!("delete {key} failed: {e}")).await;
                false
            }
        }
    }

    /// Sends an admin notification. Failures are logged and otherwise ignored.
    async fn notify(&self, body: &str) {
        let sent = with_deadline(
            self.config.call_timeout(),
            self.mailer
                .send_notification(&self.config.notification_subject, body),
            MailerError::Timeout,
        )
        .await;

        if let Err(e) = sent {
            warn!(error = %e, "Failed to send admin notification");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mailer::RecordingMailer;
    use crate::store::MemoryObjectStore;

    fn engine() -> RelayEngine<MemoryObjectStore, RecordingMailer> {
        RelayEngine::new(
            RelayConfig::new("mailman@mlctrez.com", "Owner <owner@gmail.com>"),
            MemoryObjectStore::new(),
            RecordingMailer::new(),
        )
    }

    #[test]
    fn test_admin_command_detection() {
        let engine = engine();

        assert!(engine.is_admin_command(&InboundRecord::new(
            "1",
            "OWNER@gmail.com",
            ["x@y.com"],
            "BLOCK"
        )));
        assert!(!engine.is_admin_command(&InboundRecord::new(
            "1",
            "owner@gmail.com",
            ["x@y.com"],
            " block "
        )));
        assert!(!engine.is_admin_command(&InboundRecord::new(
            "2",
            "stranger@example.com",
            ["x@y.com"],
            "block"
        )));
        assert!(!engine.is_admin_command(&InboundRecord::new(
            "3",
            "owner@gmail.com",
            ["x@y.com"],
            "block this"
        )));
    }

    #[test]
    fn test_command_additions_exclude_owner_and_duplicates() {
        let engine = engine();
        let record = InboundRecord::new(
            "1",
            "owner@gmail.com",
            ["owner@gmail.com", "X@y.com", "Someone <x@y.com>", "z@y.com", " "],
            "block",
        );

        assert_eq!(
            engine.command_additions(&record),
            vec![canonicalize("x@y.com"), canonicalize("z@y.com")]
        );
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(RecordOutcome::Forwarded.label(), "forwarded");
        assert!(!RecordOutcome::CommandIgnored.is_failure());
        assert!(RecordOutcome::PresignFailed { error: String::new() }.is_failure());
    }

    #[tokio::test]
    async fn test_blocked_record_is_deleted_only() {
        let engine = engine();
        engine.store().insert("msg", "Subject: s\n\nbody\n");
        let mut blocks = BlockList::parse("spam@example.com\n");

        let report = engine
            .process_record(
                &InboundRecord::new("msg", "a@b.c", ["SPAM@example.com"], "hello"),
                &mut blocks,
            )
            .await;

        assert_eq!(
            report.outcome,
            RecordOutcome::Blocked {
                recipient: canonicalize("spam@example.com")
            }
        );
        assert!(report.deleted);
        assert!(!engine.store().contains("msg"));
        assert!(engine.mailer().sent().is_empty());
        assert!(engine.mailer().notifications().is_empty());
    }

    #[tokio::test]
    async fn test_command_updates_callers_block_list() {
        let engine = engine();
        engine.store().insert("cmd", "Subject: block\n\n");
        let mut blocks = BlockList::new();

        let report = engine
            .process_record(
                &InboundRecord::new("cmd", "owner@gmail.com", ["owner@gmail.com", "x@y.com"], "block"),
                &mut blocks,
            )
            .await;

        assert_eq!(
            report.outcome,
            RecordOutcome::BlockListUpdated {
                added: vec![canonicalize("x@y.com")]
            }
        );
        assert!(blocks.contains(&canonicalize("x@y.com")));
        assert!(!blocks.contains(&canonicalize("owner@gmail.com")));
        assert!(engine.mailer().sent().is_empty());
        assert_eq!(
            engine.mailer().notifications()[0].body,
            "added to block list:\nx@y.com"
        );
    }
}
