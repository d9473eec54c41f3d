//! Error types for the project ledger engine
//!
//! This module defines all error types that can occur while reading, writing
//! and aggregating grouped records.
//!
//! # Error Categories
//!
//! - **Lock Errors**: a mutation or identifier mint could not take its lock in time (retryable)
//! - **Lookup Errors**: no run carries the requested identifier
//! - **Input Errors**: a payload is structurally incomplete and is rejected before any write
//! - **Upstream Errors**: an external collaborator (inference, file storage) failed
//! - **Storage Errors**: the grid collaborator rejected a call, or a workbook file is unreadable
//!
//! Cache failures have a variant for completeness, but they never escape the
//! read cache; it logs them and recomputes.

use thiserror::Error;

/// Main error type for the project ledger engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// A lock could not be acquired within its bounded wait
    ///
    /// Surfaced to callers as a retryable "busy" result.
    #[error("Timed out waiting for lock '{lock}'")]
    LockTimeout {
        /// Name of the lock that was contended
        lock: String,
    },

    /// No record with the requested identifier exists
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// Kind of record that was looked up
        entity: String,
        /// Identifier that was looked up
        id: String,
    },

    /// Payload is missing required structural fields
    #[error("Malformed input: {message}")]
    MalformedInput {
        /// What was missing or invalid
        message: String,
    },

    /// An external collaborator failed after exhausting its retries
    #[error("{service} failed: {message}")]
    UpstreamFailure {
        /// Collaborator that failed
        service: String,
        /// Upstream message
        message: String,
    },

    /// The backing key/value cache is unavailable
    #[error("Cache unavailable: {message}")]
    CacheUnavailable {
        /// Description of the cache failure
        message: String,
    },

    /// The grid collaborator rejected a call
    #[error("Grid storage error: {message}")]
    Storage {
        /// Description of the storage failure
        message: String,
    },

    /// I/O error while reading or writing workbook files
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O error
        message: String,
    },

    /// Workbook or payload parsing error
    #[error("Parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    Parse {
        /// Line number where the error occurred (if available)
        line: Option<u64>,
        /// Description of the parsing error
        message: String,
    },
}

impl From<std::io::Error> for LedgerError {
    fn from(error: std::io::Error) -> Self {
        LedgerError::Io {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for LedgerError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        LedgerError::Parse {
            line,
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(error: serde_json::Error) -> Self {
        LedgerError::Parse {
            line: Some(error.line() as u64).filter(|l| *l > 0),
            message: error.to_string(),
        }
    }
}

// Helper functions for creating common errors

impl LedgerError {
    /// Create a LockTimeout error
    pub fn lock_timeout(lock: &str) -> Self {
        LedgerError::LockTimeout {
            lock: lock.to_string(),
        }
    }

    /// Create a NotFound error
    pub fn not_found(entity: &str, id: &str) -> Self {
        LedgerError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// Create a MalformedInput error
    pub fn malformed(message: impl Into<String>) -> Self {
        LedgerError::MalformedInput {
            message: message.into(),
        }
    }

    /// Create an UpstreamFailure error
    pub fn upstream(service: &str, message: impl Into<String>) -> Self {
        LedgerError::UpstreamFailure {
            service: service.to_string(),
            message: message.into(),
        }
    }

    /// Create a CacheUnavailable error
    pub fn cache_unavailable(message: impl Into<String>) -> Self {
        LedgerError::CacheUnavailable {
            message: message.into(),
        }
    }

    /// Create a Storage error
    pub fn storage(message: impl Into<String>) -> Self {
        LedgerError::Storage {
            message: message.into(),
        }
    }

    /// Whether a caller may simply try the same call again
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::LockTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::lock_timeout(
        LedgerError::LockTimeout { lock: "ledger".to_string() },
        "Timed out waiting for lock 'ledger'"
    )]
    #[case::not_found(
        LedgerError::NotFound { entity: "estimate".to_string(), id: "0000001-00".to_string() },
        "estimate '0000001-00' not found"
    )]
    #[case::malformed(
        LedgerError::MalformedInput { message: "missing header".to_string() },
        "Malformed input: missing header"
    )]
    #[case::upstream(
        LedgerError::UpstreamFailure { service: "inference".to_string(), message: "503".to_string() },
        "inference failed: 503"
    )]
    #[case::storage(
        LedgerError::Storage { message: "row 0 out of range".to_string() },
        "Grid storage error: row 0 out of range"
    )]
    #[case::parse_error_with_line(
        LedgerError::Parse { line: Some(7), message: "unequal lengths".to_string() },
        "Parse error at line 7: unequal lengths"
    )]
    #[case::parse_error_without_line(
        LedgerError::Parse { line: None, message: "unequal lengths".to_string() },
        "Parse error: unequal lengths"
    )]
    fn test_error_display(#[case] error: LedgerError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    #[case::lock_timeout(
        LedgerError::lock_timeout("seq:SEQ_ORDER"),
        LedgerError::LockTimeout { lock: "seq:SEQ_ORDER".to_string() }
    )]
    #[case::not_found(
        LedgerError::not_found("order", "0000002-00"),
        LedgerError::NotFound { entity: "order".to_string(), id: "0000002-00".to_string() }
    )]
    #[case::malformed(
        LedgerError::malformed("no header"),
        LedgerError::MalformedInput { message: "no header".to_string() }
    )]
    fn test_helper_functions(#[case] result: LedgerError, #[case] expected: LedgerError) {
        assert_eq!(result, expected);
    }

    #[test]
    fn test_only_lock_timeouts_are_retryable() {
        assert!(LedgerError::lock_timeout("ledger").is_retryable());
        assert!(!LedgerError::not_found("estimate", "x").is_retryable());
        assert!(!LedgerError::upstream("inference", "boom").is_retryable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Permission denied");
        let error: LedgerError = io_error.into();
        assert!(matches!(error, LedgerError::Io { .. }));
        assert_eq!(error.to_string(), "I/O error: Permission denied");
    }
}
