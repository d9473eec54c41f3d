//! Uniform result envelope returned by every write operation
//!
//! Document-publishing writes also report the published file's URL.

use crate::types::error::LedgerError;
use serde::{Deserialize, Serialize};

/// Message reported when a store lock could not be taken in time
pub const BUSY_MESSAGE: &str = "Busy";

/// Message reported when a delete found nothing to remove
pub const NOT_FOUND_MESSAGE: &str = "Not found";

/// `{success, message?, id?}` envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl WriteResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
            id: None,
            url: None,
        }
    }

    pub fn ok_with_id(id: impl Into<String>) -> Self {
        Self {
            success: true,
            message: None,
            id: Some(id.into()),
            url: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            id: None,
            url: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

impl From<LedgerError> for WriteResult {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::LockTimeout { .. } => WriteResult::failure(BUSY_MESSAGE),
            LedgerError::NotFound { .. } => WriteResult::failure(NOT_FOUND_MESSAGE),
            LedgerError::UpstreamFailure { message, .. } => WriteResult::failure(message),
            other => WriteResult::failure(other.to_string()),
        }
    }
}

impl From<Result<String, LedgerError>> for WriteResult {
    fn from(result: Result<String, LedgerError>) -> Self {
        match result {
            Ok(id) => WriteResult::ok_with_id(id),
            Err(e) => e.into(),
        }
    }
}

impl From<Result<(), LedgerError>> for WriteResult {
    fn from(result: Result<(), LedgerError>) -> Self {
        match result {
            Ok(()) => WriteResult::ok(),
            Err(e) => e.into(),
        }
    }
}
