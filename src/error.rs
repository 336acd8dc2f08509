//! Error types for the diary engine.

use std::fmt;

/// Result type for diary operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the diary engine.
///
/// Nothing in this crate is fatal: the worst outcome of any failure is a
/// no-op (nothing saved, nothing deleted) or an empty list. The variants
/// below tell the caller which of those happened and why.
#[derive(Debug, Clone)]
pub enum Error {
    /// A draft or entity failed validation.
    ///
    /// Raised when:
    /// - A form is submitted with a required field missing
    ///   (customer name, ticket service name, ticket customer)
    /// - `DiaryEntity::validate()` rejects an entity on insert, e.g. a ticket
    ///   whose closed date disagrees with its status
    ///
    /// **Recovery:** Fix the draft and submit again. Nothing was written.
    ValidationError(String),

    /// The referenced entity does not exist in the store.
    NotFound(String),

    /// The object store rejected or failed an operation.
    StoreError(String),

    /// Serialization failed when writing a store snapshot.
    SerializationError(String),

    /// Deserialization failed when reading a store snapshot.
    ///
    /// Common causes:
    /// - Truncated or corrupted snapshot bytes
    /// - Snapshot written by a different program
    DeserializationError(String),

    /// Snapshot envelope is not a diary snapshot (bad magic).
    InvalidSnapshot(String),

    /// Snapshot schema version differs from the compiled one.
    VersionMismatch {
        /// Expected schema version (from compiled code)
        expected: u32,
        /// Found schema version (from the snapshot)
        found: u32,
    },

    /// Location search service failed.
    ///
    /// Callers in this crate turn this into an empty result list; it is only
    /// surfaced by `LocationSearch` implementations themselves.
    SearchError(String),

    /// Attachment could not be loaded or previewed.
    AttachmentError(String),

    /// Invalid configuration.
    ConfigError(String),

    /// Generic error with custom message.
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::StoreError(msg) => write!(f, "Store error: {}", msg),
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::InvalidSnapshot(msg) => write!(f, "Invalid snapshot: {}", msg),
            Error::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Snapshot version mismatch: expected {}, found {}",
                    expected, found
                )
            }
            Error::SearchError(msg) => write!(f, "Search error: {}", msg),
            Error::AttachmentError(msg) => write!(f, "Attachment error: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_syntax() || e.is_data() || e.is_eof() {
            Error::ConfigError(e.to_string())
        } else {
            Error::Other(e.to_string())
        }
    }
}

impl From<postcard::Error> for Error {
    fn from(e: postcard::Error) -> Self {
        Error::DeserializationError(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::AttachmentError(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ValidationError("service name is required".to_string());
        assert_eq!(
            err.to_string(),
            "Validation error: service name is required"
        );
    }

    #[test]
    fn test_version_mismatch_display() {
        let err = Error::VersionMismatch {
            expected: 1,
            found: 7,
        };
        assert_eq!(
            err.to_string(),
            "Snapshot version mismatch: expected 1, found 7"
        );
    }

    #[test]
    fn test_error_from_string() {
        let err: Error = "test error".into();
        assert!(matches!(err, Error::Other(_)));
    }

    #[test]
    fn test_error_from_json_syntax() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::AttachmentError(_)));
    }
}
