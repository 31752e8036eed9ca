//! Error types for BucketIO
//!
//! This module defines the common error types used throughout the system.

use thiserror::Error;

/// Common result type for BucketIO operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for BucketIO
#[derive(Debug, Error)]
pub enum Error {
    // Configuration / permission errors
    #[error("{operation} operation not allowed as per configuration")]
    OperationNotAllowed { operation: &'static str },

    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    // Positional errors
    #[error("supplied position is out of range: {position}")]
    OutOfRange { position: u64 },

    #[error("read operation canceled")]
    Canceled,

    #[error("reader is closed")]
    Closed,

    // Object errors
    #[error("object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    #[error("file too large: maximum allowed size is {max_size} bytes")]
    EntityTooLarge { max_size: u64 },

    #[error("upload already in progress: {0}")]
    UploadInProgress(String),

    // Store / transport errors
    #[error("{operation} failed for {bucket}/{key}: {message}")]
    Store {
        operation: &'static str,
        bucket: String,
        key: String,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Create an operation-not-allowed error
    #[must_use]
    pub const fn not_allowed(operation: &'static str) -> Self {
        Self::OperationNotAllowed { operation }
    }

    /// Create a store error for a failed call against `bucket/key`
    pub fn store(
        operation: &'static str,
        bucket: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Store {
            operation,
            bucket: bucket.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ObjectNotFound { .. })
    }

    /// Check if the governing context ended during the call
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Check if the operation was refused by configured capability flags
    #[must_use]
    pub const fn is_permission_denied(&self) -> bool {
        matches!(self, Self::OperationNotAllowed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_not_found() {
        assert!(
            Error::ObjectNotFound {
                bucket: "b".into(),
                key: "k".into()
            }
            .is_not_found()
        );
        assert!(!Error::Canceled.is_not_found());
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::Canceled.is_canceled());
        assert!(Error::not_allowed("read").is_permission_denied());
        assert!(!Error::EntityTooLarge { max_size: 10 }.is_permission_denied());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            Error::not_allowed("read").to_string(),
            "read operation not allowed as per configuration"
        );
        assert_eq!(
            Error::EntityTooLarge { max_size: 10 }.to_string(),
            "file too large: maximum allowed size is 10 bytes"
        );
    }
}
