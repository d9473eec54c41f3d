//! External collaborator contracts
//!
//! The engine never touches a concrete storage medium. Everything it reads or
//! writes goes through the traits below, which let the same business logic
//! run against an in-memory workbook (see [`memory`]) or any other grid-like
//! backend.
//!
//! Row and column numbers are 1-based and absolute: row 1 is the first row of
//! the sheet, whatever it holds.

pub mod memory;

use crate::types::{Cell, LedgerError};
use chrono::NaiveDateTime;
use std::time::Duration;

pub use memory::{
    FixedClock, MemoryBlobStore, MemoryCache, MemoryGrid, MemoryProperties, PreviewRenderer,
    ProcessLocks, SystemClock,
};

/// Two-dimensional cell storage
pub trait GridStore: Send + Sync {
    /// Typed values of a rectangular range; cells past the data read as `Empty`
    fn get_range(
        &self,
        sheet: &str,
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    ) -> Result<Vec<Vec<Cell>>, LedgerError>;

    /// Display strings of a rectangular range
    fn get_display_range(
        &self,
        sheet: &str,
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    ) -> Result<Vec<Vec<String>>, LedgerError> {
        Ok(self
            .get_range(sheet, row, col, rows, cols)?
            .into_iter()
            .map(|r| r.iter().map(Cell::display).collect())
            .collect())
    }

    /// Overwrite a rectangular range starting at `row`/`col`
    fn set_range(
        &self,
        sheet: &str,
        row: usize,
        col: usize,
        values: &[Vec<Cell>],
    ) -> Result<(), LedgerError>;

    /// Append one row after the last non-blank row, creating the sheet if needed
    fn append_row(&self, sheet: &str, values: &[Cell]) -> Result<(), LedgerError>;

    /// Delete `count` rows starting at `start_row`, shifting later rows up
    fn delete_rows(&self, sheet: &str, start_row: usize, count: usize) -> Result<(), LedgerError>;

    /// Number of the last non-blank row, 0 for an empty or missing sheet
    fn last_row(&self, sheet: &str) -> Result<usize, LedgerError>;

    /// Number of the last column holding data, 0 for an empty or missing sheet
    fn last_column(&self, sheet: &str) -> Result<usize, LedgerError>;

    /// Every row of a sheet up to its last non-blank row
    fn read_all(&self, sheet: &str) -> Result<Vec<Vec<Cell>>, LedgerError> {
        let rows = self.last_row(sheet)?;
        let cols = self.last_column(sheet)?;
        if rows == 0 || cols == 0 {
            return Ok(Vec::new());
        }
        self.get_range(sheet, 1, 1, rows, cols)
    }
}

/// Durable scalar storage used for sequence counters
pub trait PropertyStore: Send + Sync {
    fn get_property(&self, key: &str) -> Result<Option<String>, LedgerError>;

    fn set_property(&self, key: &str, value: &str) -> Result<(), LedgerError>;
}

/// Named mutual-exclusion locks with bounded waits
pub trait LockService: Send + Sync {
    /// Try to take `name`, waiting at most `timeout`; `true` when acquired
    fn try_acquire(&self, name: &str, timeout: Duration) -> bool;

    fn release(&self, name: &str);
}

/// A held lock, released when dropped
///
/// Every exit path of a critical section releases the lock, including early
/// returns through `?`.
pub struct ScopedLock<'a> {
    locks: &'a dyn LockService,
    name: String,
}

impl<'a> ScopedLock<'a> {
    /// Acquire `name` or fail with [`LedgerError::LockTimeout`]
    pub fn acquire(
        locks: &'a dyn LockService,
        name: &str,
        timeout: Duration,
    ) -> Result<Self, LedgerError> {
        if locks.try_acquire(name, timeout) {
            Ok(Self {
                locks,
                name: name.to_string(),
            })
        } else {
            log::warn!("lock '{}' not acquired within {:?}", name, timeout);
            Err(LedgerError::lock_timeout(name))
        }
    }
}

impl Drop for ScopedLock<'_> {
    fn drop(&mut self) {
        self.locks.release(&self.name);
    }
}

/// Key/value cache with per-entry time-to-live
pub trait KeyValueCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, LedgerError>;

    fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), LedgerError>;

    fn remove(&self, key: &str) -> Result<(), LedgerError>;
}

/// A stored file
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FileRef {
    pub id: String,
    pub name: String,
    pub url: String,
    pub mime_type: String,
}

/// File storage for generated documents
pub trait BlobStore: Send + Sync {
    fn create_file(
        &self,
        folder: &str,
        name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<FileRef, LedgerError>;

    fn set_public_readable(&self, file: &FileRef) -> Result<(), LedgerError>;

    fn list_files(&self, folder: &str) -> Result<Vec<FileRef>, LedgerError>;

    fn read_file(&self, file_id: &str) -> Result<Vec<u8>, LedgerError>;
}

/// Template rendering and HTML to PDF conversion
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, context: &serde_json::Value) -> Result<String, LedgerError>;

    fn html_to_pdf(&self, html: &str) -> Result<Vec<u8>, LedgerError>;
}

/// Source of the current local time
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}
