//! Error types for the core library.

use thiserror::Error;

/// Errors raised while loading configuration or decoding inbound events.
#[derive(Debug, Error)]
pub enum Error {
    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_their_source() {
        let io = Error::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(io.to_string(), "I/O error: gone");

        let serde = Error::from(serde_json::from_str::<u32>("x").unwrap_err());
        assert!(serde.to_string().starts_with("Serialization error: "));
    }
}
