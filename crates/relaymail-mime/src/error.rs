//! Error types for message operations.

/// Result type alias for message operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Message error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Invalid display name in an address header.
    #[error("Invalid display name: {0}")]
    InvalidDisplayName(String),

    /// Reading the raw message failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
