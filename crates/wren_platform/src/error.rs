//! Platform Error Types

use thiserror::Error;

/// Errors from audio-server operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlatformError {
    #[error("Failed to connect to audio server: {0}")]
    ConnectionFailed(String),

    #[error("Failed to create link: {0}")]
    LinkCreationFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlatformError::LinkCreationFailed("42 -> 7".into());
        assert_eq!(err.to_string(), "Failed to create link: 42 -> 7");

        let err = PlatformError::ConnectionFailed("daemon not running".into());
        assert!(err.to_string().contains("daemon not running"));
    }
}
