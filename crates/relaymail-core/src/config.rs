//! Relay configuration.
//!
//! The relay identity and storage layout are passed into the engine
//! explicitly; nothing here is process-wide state.

use std::path::Path;
use std::time::Duration;

use relaymail_mime::{DEFAULT_DROP_PREFIXES, HeaderRewriter, Mailbox};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Default lifetime of presigned links (7 days).
pub const DEFAULT_PRESIGN_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Longest accepted lifetime of presigned links, the SigV4 limit of 7 days.
pub const MAX_PRESIGN_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Relay configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Envelope sender and `From:` value of forwarded messages.
    pub relay_from: String,
    /// Envelope recipient and `To:` value of forwarded messages.
    ///
    /// This is also the owner of the block list: only admin commands sent
    /// from this address are honoured.
    pub relay_to: String,
    /// Storage namespace holding inbound messages and the block list.
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Key of the block-list object.
    #[serde(default = "default_block_list_key")]
    pub block_list_key: String,
    /// Subject keyword that marks an admin command.
    #[serde(default = "default_command_keyword")]
    pub command_keyword: String,
    /// Subject used for admin notifications.
    #[serde(default = "default_notification_subject")]
    pub notification_subject: String,
    /// Lifetime of presigned links, in seconds.
    #[serde(default = "default_presign_ttl_secs")]
    pub presign_ttl_secs: u64,
    /// Deadline for each storage or mail call, in seconds.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// Header prefixes removed from forwarded messages.
    #[serde(default = "default_drop_header_prefixes")]
    pub drop_header_prefixes: Vec<String>,
}

impl RelayConfig {
    /// Creates a configuration for the given relay identity with defaults
    /// for everything else.
    #[must_use]
    pub fn new(relay_from: impl Into<String>, relay_to: impl Into<String>) -> Self {
        Self {
            relay_from: relay_from.into(),
            relay_to: relay_to.into(),
            bucket: default_bucket(),
            block_list_key: default_block_list_key(),
            command_keyword: default_command_keyword(),
            notification_subject: default_notification_subject(),
            presign_ttl_secs: default_presign_ttl_secs(),
            call_timeout_secs: default_call_timeout_secs(),
            drop_header_prefixes: default_drop_header_prefixes(),
        }
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parses a configuration from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid configuration.
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Lifetime of presigned links.
    #[must_use]
    pub const fn presign_ttl(&self) -> Duration {
        Duration::from_secs(self.presign_ttl_secs)
    }

    /// Deadline for each external call.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Builds the header rewriter for this relay identity.
    #[must_use]
    pub fn rewriter(&self) -> HeaderRewriter {
        HeaderRewriter::new(&self.relay_from, &self.relay_to)
            .with_drop_prefixes(&self.drop_header_prefixes)
    }
}

fn default_bucket() -> String {
    "inbound-email".to_string()
}

fn default_block_list_key() -> String {
    "blocks.txt".to_string()
}

fn default_command_keyword() -> String {
    "block".to_string()
}

fn default_notification_subject() -> String {
    "relay admin".to_string()
}

const fn default_presign_ttl_secs() -> u64 {
    DEFAULT_PRESIGN_TTL_SECS
}

const fn default_call_timeout_secs() -> u64 {
    30
}

fn default_drop_header_prefixes() -> Vec<String> {
    DEFAULT_DROP_PREFIXES.iter().map(|p| (*p).to_string()).collect()
}

/// Validation error for relay configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Relay sender address is empty.
    EmptyRelayFrom,
    /// Relay sender address format is invalid.
    InvalidRelayFrom,
    /// Relay recipient address is empty.
    EmptyRelayTo,
    /// Relay recipient address format is invalid.
    InvalidRelayTo,
    /// Bucket is empty.
    EmptyBucket,
    /// Block-list key is empty.
    EmptyBlockListKey,
    /// Command keyword is empty.
    EmptyCommandKeyword,
    /// Presigned-link lifetime is zero.
    ZeroPresignTtl,
    /// Presigned-link lifetime exceeds [`MAX_PRESIGN_TTL_SECS`].
    PresignTtlTooLong,
    /// Call timeout is zero.
    ZeroCallTimeout,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyRelayFrom => "Relay sender address is required",
            Self::InvalidRelayFrom => "Invalid relay sender address",
            Self::EmptyRelayTo => "Relay recipient address is required",
            Self::InvalidRelayTo => "Invalid relay recipient address",
            Self::EmptyBucket => "Bucket is required",
            Self::EmptyBlockListKey => "Block-list key is required",
            Self::EmptyCommandKeyword => "Command keyword is required",
            Self::ZeroPresignTtl => "Presigned-link lifetime must be positive",
            Self::PresignTtlTooLong => "Presigned-link lifetime cannot exceed 7 days",
            Self::ZeroCallTimeout => "Call timeout must be positive",
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyRelayFrom | Self::InvalidRelayFrom => "relay_from",
            Self::EmptyRelayTo | Self::InvalidRelayTo => "relay_to",
            Self::EmptyBucket => "bucket",
            Self::EmptyBlockListKey => "block_list_key",
            Self::EmptyCommandKeyword => "command_keyword",
            Self::ZeroPresignTtl | Self::PresignTtlTooLong => "presign_ttl_secs",
            Self::ZeroCallTimeout => "call_timeout_secs",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ValidationError {}

/// Result of validating a configuration.
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate a relay configuration.
///
/// Returns every problem found, not just the first.
///
/// # Errors
///
/// Returns the list of validation errors if any field is invalid.
pub fn validate_config(config: &RelayConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if config.relay_from.trim().is_empty() {
        errors.push(ValidationError::EmptyRelayFrom);
    } else if Mailbox::parse(&config.relay_from).is_err() {
        errors.push(ValidationError::InvalidRelayFrom);
    }

    if config.relay_to.trim().is_empty() {
        errors.push(ValidationError::EmptyRelayTo);
    } else if Mailbox::parse(&config.relay_to).is_err() {
        errors.push(ValidationError::InvalidRelayTo);
    }

    if config.bucket.trim().is_empty() {
        errors.push(ValidationError::EmptyBucket);
    }

    if config.block_list_key.trim().is_empty() {
        errors.push(ValidationError::EmptyBlockListKey);
    }

    if config.command_keyword.trim().is_empty() {
        errors.push(ValidationError::EmptyCommandKeyword);
    }

    if config.presign_ttl_secs == 0 {
        errors.push(ValidationError::ZeroPresignTtl);
    } else if config.presign_ttl_secs > MAX_PRESIGN_TTL_SECS {
        errors.push(ValidationError::PresignTtlTooLong);
    }

    if config.call_timeout_secs == 0 {
        errors.push(ValidationError::ZeroCallTimeout);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config = RelayConfig::from_json(
            r#"{"relay_from": "mailman@example.com", "relay_to": "owner@example.net"}"#,
        )
        .unwrap();

        assert_eq!(config, RelayConfig::new("mailman@example.com", "owner@example.net"));
        assert_eq!(config.block_list_key, "blocks.txt");
        assert_eq!(config.command_keyword, "block");
        assert_eq!(config.presign_ttl(), Duration::from_secs(604_800));
        assert_eq!(config.call_timeout(), Duration::from_secs(30));
        assert_eq!(
            config.drop_header_prefixes,
            vec!["dkim-", "return-path:", "sender:", "list-owner:"]
        );
    }

    #[test]
    fn test_parse_full_config() {
        let config = RelayConfig::from_json(
            r#"{
                "relay_from": "Mail Man <mailman@example.com>",
                "relay_to": "owner@example.net",
                "bucket": "my-inbound",
                "block_list_key": "config/blocks",
                "command_keyword": "deny",
                "notification_subject": "ops",
                "presign_ttl_secs": 3600,
                "call_timeout_secs": 5,
                "drop_header_prefixes": ["dkim-", "x-spam-"]
            }"#,
        )
        .unwrap();

        assert_eq!(config.bucket, "my-inbound");
        assert_eq!(config.block_list_key, "config/blocks");
        assert_eq!(config.command_keyword, "deny");
        assert_eq!(config.notification_subject, "ops");
        assert_eq!(config.presign_ttl(), Duration::from_secs(3600));
        assert_eq!(config.call_timeout(), Duration::from_secs(5));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_parse_missing_identity_fails() {
        assert!(RelayConfig::from_json(r#"{"relay_from": "a@example.com"}"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"relay_from": "a@example.com", "relay_to": "b@example.com"}"#)
            .unwrap();

        let config = RelayConfig::load(&path).unwrap();

        assert_eq!(config.relay_to, "b@example.com");
        assert!(RelayConfig::load(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = RelayConfig::new("", "not an address");
        config.bucket = " ".to_string();
        config.presign_ttl_secs = 0;
        config.call_timeout_secs = 0;

        let errors = validate_config(&config).unwrap_err();

        assert_eq!(
            errors,
            vec![
                ValidationError::EmptyRelayFrom,
                ValidationError::InvalidRelayTo,
                ValidationError::EmptyBucket,
                ValidationError::ZeroPresignTtl,
                ValidationError::ZeroCallTimeout,
            ]
        );
        assert_eq!(errors[1].field(), "relay_to");
        assert_eq!(errors[1].to_string(), "Invalid relay recipient address");
    }

    #[test]
    fn test_validate_bounds_presign_lifetime() {
        let mut config = RelayConfig::new("a@example.com", "b@example.com");

        config.presign_ttl_secs = MAX_PRESIGN_TTL_SECS;
        assert!(validate_config(&config).is_ok());

        config.presign_ttl_secs = 10_000_000_000_000;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::PresignTtlTooLong]);
        assert_eq!(errors[0].field(), "presign_ttl_secs");
    }

    #[test]
    fn test_rewriter_uses_config() {
        let mut config = RelayConfig::new("relay@example.com", "owner@example.net");
        config.drop_header_prefixes = vec!["X-Trace:".to_string()];

        let out = config
            .rewriter()
            .rewrite_bytes(b"X-Trace: 1\nReturn-Path: <a@b.c>\nTo: x@y.z\n\nbody\n");
        let out = String::from_utf8(out).unwrap();

        assert!(!out.contains("X-Trace"));
        assert!(out.contains("Return-Path: <a@b.c>\r\n"));
        assert!(out.contains("To: owner@example.net\r\n"));
    }
}
