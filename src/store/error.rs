//! Error types for the S3-backed index store.
//!
//! Every error is terminal for the read, list or open call that produced it.
//! Nothing in this crate retries; transient remote failures are expected to be
//! retried by the storage client underneath.

use thiserror::Error;

/// Result type for index store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while listing, opening or reading index files.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A byte range is malformed relative to the file or view it targets.
    #[error("Invalid range offset={offset} length={length} for '{key}' with size {size}")]
    InvalidRange {
        /// Object key or reader description.
        key: String,
        /// Requested start offset.
        offset: u64,
        /// Requested length.
        length: u64,
        /// Size of the file or view.
        size: u64,
    },

    /// The file name is unknown, or the directory has not been listed yet.
    #[error("File not found: {name}")]
    NotFound {
        /// Logical file name.
        name: String,
    },

    /// A seek or read went past the end of the reader's view.
    #[error("Read past EOF on '{key}': pos={position}, length={length}")]
    EndOfFile {
        /// Reader description.
        key: String,
        /// Position the caller asked for.
        position: u64,
        /// Length of the view.
        length: u64,
    },

    /// The remote store or buffer assembly produced fewer bytes than required.
    #[error("Incomplete read on '{key}': expected {expected} bytes, got {actual}")]
    IncompleteRead {
        /// Object key.
        key: String,
        /// Bytes required.
        expected: u64,
        /// Bytes actually available.
        actual: u64,
    },

    /// Write-path operation on a read-only directory.
    #[error("Unsupported operation: {operation}")]
    Unsupported {
        /// Name of the rejected operation.
        operation: &'static str,
    },

    /// Storage client operation failed.
    #[error("Remote {operation} failed for '{key}': {message}")]
    Remote {
        /// Description of the operation that failed.
        operation: String,
        /// The object key or prefix involved.
        key: String,
        /// The underlying error message.
        message: String,
    },

    /// Invalid configuration value.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },

    /// Local filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Config {
            message: e.to_string(),
        }
    }
}

impl StoreError {
    /// Create a remote operation error.
    pub fn remote(
        operation: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        StoreError::Remote {
            operation: operation.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(name: impl Into<String>) -> Self {
        StoreError::NotFound { name: name.into() }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        StoreError::Config {
            message: message.into(),
        }
    }

    /// Create an invalid range error.
    pub fn invalid_range(key: impl Into<String>, offset: u64, length: u64, size: u64) -> Self {
        StoreError::InvalidRange {
            key: key.into(),
            offset,
            length,
            size,
        }
    }

    /// Create an incomplete read error.
    pub fn incomplete_read(key: impl Into<String>, expected: u64, actual: u64) -> Self {
        StoreError::IncompleteRead {
            key: key.into(),
            expected,
            actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = StoreError::invalid_range("idx/_0.cfs", 50, 60, 100);
        assert_eq!(
            err.to_string(),
            "Invalid range offset=50 length=60 for 'idx/_0.cfs' with size 100"
        );

        let err = StoreError::Unsupported {
            operation: "rename",
        };
        assert_eq!(err.to_string(), "Unsupported operation: rename");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StoreError = io.into();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
