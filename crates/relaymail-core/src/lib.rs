//! # relaymail-core
//!
//! Decision pipeline for the relaymail inbound relay.
//!
//! This crate provides:
//! - **Capabilities** - object storage, presigned links and outbound mail as
//!   traits, with in-memory and directory-backed implementations
//! - **Block list** - a persisted set of canonical addresses that are never
//!   forwarded to, loaded once per batch
//! - **Relay engine** - per-record block / admin-command / forward decisions,
//!   with a presigned-link fallback when forwarding fails
//! - **Configuration** - relay identity, storage keys and deadlines

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod blocklist;
pub mod config;
mod deadline;
mod error;
pub mod mailer;
pub mod relay;
pub mod store;

pub use blocklist::{BlockList, BlockListStore};
pub use config::{RelayConfig, ValidationError, ValidationResult, validate_config};
pub use error::{Error, Result};
pub use mailer::{Mailer, MailerError, Notification, OutboxMailer, RecordingMailer, SentMessage};
pub use relay::{BatchReport, InboundRecord, RecordOutcome, RecordReport, RelayEngine, SesEvent};
pub use store::{DirectoryObjectStore, MemoryObjectStore, ObjectStore, Presigner, StoreError};

pub use relaymail_mime::{CanonicalAddress, HeaderRewriter, canonicalize};
