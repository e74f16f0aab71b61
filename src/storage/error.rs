//! Storage engine error types
//!
//! Defines all errors that can occur in the storage layer. Upstream fetch
//! failures have their own type ([`crate::upstream::FetchError`]) because the
//! engine absorbs them into the gaps report instead of propagating them.

use thiserror::Error;

/// Errors that can occur in the storage engine
#[derive(Error, Debug)]
pub enum StorageError {
    /// Period bounds violate `start < end` or the validity window
    #[error("Invalid time period: {0}")]
    InvalidPeriod(String),

    /// Union requested for two periods that neither overlap nor touch
    #[error("Periods are disjoint and cannot be joined: {0} and {1}")]
    DisjointPeriods(String, String),

    /// Location lies outside the area of use of its reference system
    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    /// Request could not be interpreted (no locations, no factors, ...)
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    /// A single segment is larger than the whole cache budget
    #[error("Segment of {size} bytes exceeds the cache limit of {limit} bytes")]
    SegmentTooLarge { size: u64, limit: u64 },

    /// Cache clear request larger than the cache limit
    #[error("Cannot clear {requested} bytes from a cache limited to {limit} bytes")]
    ClearExceedsLimit { requested: u64, limit: u64 },

    /// Archive put or clear outside the configured retention window
    #[error("Period {period} lies outside the archive retention window {retention}")]
    OutOfRetentionWindow { period: String, retention: String },

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Data corruption detected (checksum mismatch, invalid magic, etc.)
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::SegmentTooLarge {
            size: 200,
            limit: 100,
        };
        assert_eq!(
            err.to_string(),
            "Segment of 200 bytes exceeds the cache limit of 100 bytes"
        );

        let err = StorageError::InvalidSelection("no factors".to_string());
        assert_eq!(err.to_string(), "Invalid selection: no factors");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let storage_err: StorageError = io_err.into();
        assert!(matches!(storage_err, StorageError::Io(_)));
    }
}
