//! In-memory collaborators
//!
//! Thread-safe implementations of every collaborator trait, used by the
//! command-line front end (backed by workbook files) and by tests.
//!
//! # Thread Safety
//!
//! Sheets, properties and cache entries live in `DashMap`s, so concurrent
//! callers working on different keys never block each other. Named locks use
//! a `parking_lot` mutex and condition variable so waiters wake as soon as a
//! holder releases.

use crate::grid::{
    BlobStore, Clock, FileRef, GridStore, KeyValueCache, LockService, PropertyStore,
    TemplateRenderer,
};
use crate::types::{Cell, LedgerError};
use chrono::NaiveDateTime;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

fn row_is_blank(row: &[Cell]) -> bool {
    row.iter().all(Cell::is_empty)
}

/// Grid storage held in memory, one row vector per sheet
#[derive(Debug, Default)]
pub struct MemoryGrid {
    sheets: DashMap<String, Vec<Vec<Cell>>>,
    /// Number of `delete_rows` calls served
    delete_calls: AtomicUsize,
}

impl MemoryGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a sheet's contents
    pub fn load_sheet(&self, sheet: &str, rows: Vec<Vec<Cell>>) {
        self.sheets.insert(sheet.to_string(), rows);
    }

    /// Snapshot of a sheet up to its last non-blank row
    pub fn sheet_rows(&self, sheet: &str) -> Vec<Vec<Cell>> {
        self.sheets
            .get(sheet)
            .map(|rows| {
                let rows = rows.value();
                let last = rows.iter().rposition(|r| !row_is_blank(r)).map_or(0, |i| i + 1);
                rows[..last].to_vec()
            })
            .unwrap_or_default()
    }

    /// Names of every sheet, sorted
    pub fn sheet_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sheets.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of mutating delete calls made so far
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

impl GridStore for MemoryGrid {
    fn get_range(
        &self,
        sheet: &str,
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    ) -> Result<Vec<Vec<Cell>>, LedgerError> {
        if row == 0 || col == 0 {
            return Err(LedgerError::storage(format!(
                "range must start at row/column 1 or later, got {}:{}",
                row, col
            )));
        }
        let data = self.sheets.get(sheet);
        let mut out = Vec::with_capacity(rows);
        for r in (row - 1)..(row - 1 + rows) {
            let source = data.as_ref().and_then(|d| d.value().get(r));
            let values = (col - 1..col - 1 + cols)
                .map(|c| source.and_then(|s| s.get(c)).cloned().unwrap_or_default())
                .collect();
            out.push(values);
        }
        Ok(out)
    }

    fn set_range(
        &self,
        sheet: &str,
        row: usize,
        col: usize,
        values: &[Vec<Cell>],
    ) -> Result<(), LedgerError> {
        if row == 0 || col == 0 {
            return Err(LedgerError::storage(format!(
                "range must start at row/column 1 or later, got {}:{}",
                row, col
            )));
        }
        let mut data = self.sheets.entry(sheet.to_string()).or_default();
        for (offset, source) in values.iter().enumerate() {
            let r = row - 1 + offset;
            if data.len() <= r {
                data.resize_with(r + 1, Vec::new);
            }
            let target = &mut data[r];
            let needed = col - 1 + source.len();
            if target.len() < needed {
                target.resize_with(needed, Cell::default);
            }
            for (c, value) in source.iter().enumerate() {
                target[col - 1 + c] = value.clone();
            }
        }
        Ok(())
    }

    fn append_row(&self, sheet: &str, values: &[Cell]) -> Result<(), LedgerError> {
        let mut data = self.sheets.entry(sheet.to_string()).or_default();
        while data.last().is_some_and(|r| row_is_blank(r)) {
            data.pop();
        }
        data.push(values.to_vec());
        Ok(())
    }

    fn delete_rows(&self, sheet: &str, start_row: usize, count: usize) -> Result<(), LedgerError> {
        let mut data = self
            .sheets
            .get_mut(sheet)
            .ok_or_else(|| LedgerError::storage(format!("sheet '{}' does not exist", sheet)))?;
        if start_row == 0 || start_row > data.len() {
            return Err(LedgerError::storage(format!(
                "row {} is out of range for sheet '{}' ({} rows)",
                start_row,
                sheet,
                data.len()
            )));
        }
        let end = (start_row - 1 + count).min(data.len());
        data.drain(start_row - 1..end);
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn last_row(&self, sheet: &str) -> Result<usize, LedgerError> {
        Ok(self
            .sheets
            .get(sheet)
            .and_then(|rows| rows.iter().rposition(|r| !row_is_blank(r)))
            .map_or(0, |i| i + 1))
    }

    fn last_column(&self, sheet: &str) -> Result<usize, LedgerError> {
        Ok(self
            .sheets
            .get(sheet)
            .map(|rows| {
                rows.iter()
                    .filter_map(|r| r.iter().rposition(|c| !c.is_empty()))
                    .map(|i| i + 1)
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0))
    }
}

/// Scalar property storage held in memory
#[derive(Debug, Default)]
pub struct MemoryProperties {
    values: DashMap<String, String>,
}

impl MemoryProperties {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PropertyStore for MemoryProperties {
    fn get_property(&self, key: &str) -> Result<Option<String>, LedgerError> {
        Ok(self.values.get(key).map(|v| v.value().clone()))
    }

    fn set_property(&self, key: &str, value: &str) -> Result<(), LedgerError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Named locks shared by every thread of the process
#[derive(Debug, Default)]
pub struct ProcessLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl ProcessLocks {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockService for ProcessLocks {
    fn try_acquire(&self, name: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut held = self.held.lock();
        loop {
            if !held.contains(name) {
                held.insert(name.to_string());
                return true;
            }
            if self.released.wait_until(&mut held, deadline).timed_out() {
                if held.contains(name) {
                    return false;
                }
                held.insert(name.to_string());
                return true;
            }
        }
    }

    fn release(&self, name: &str) {
        let mut held = self.held.lock();
        held.remove(name);
        self.released.notify_all();
    }
}

/// Key/value cache held in memory with per-entry expiry
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, (String, Instant)>,
    unavailable: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `CacheUnavailable` (or recover)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|e| e.value().1 > Instant::now())
    }

    fn check(&self) -> Result<(), LedgerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(LedgerError::cache_unavailable("memory cache switched off"))
        } else {
            Ok(())
        }
    }
}

impl KeyValueCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, LedgerError> {
        self.check()?;
        let hit = self.entries.get(key).map(|e| e.value().clone());
        match hit {
            Some((value, expires)) if expires > Instant::now() => Ok(Some(value)),
            Some(_) => {
                self.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), LedgerError> {
        self.check()?;
        self.entries
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), LedgerError> {
        self.check()?;
        self.entries.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct StoredBlob {
    file: FileRef,
    folder: String,
    mime_type: String,
    bytes: Vec<u8>,
    public: bool,
}

/// File storage held in memory
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    files: Mutex<Vec<StoredBlob>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_public(&self, file_id: &str) -> bool {
        self.files
            .lock()
            .iter()
            .any(|b| b.file.id == file_id && b.public)
    }

    pub fn mime_type(&self, file_id: &str) -> Option<String> {
        self.files
            .lock()
            .iter()
            .find(|b| b.file.id == file_id)
            .map(|b| b.mime_type.clone())
    }
}

impl BlobStore for MemoryBlobStore {
    fn create_file(
        &self,
        folder: &str,
        name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<FileRef, LedgerError> {
        let mut files = self.files.lock();
        let id = format!("file-{:05}", files.len() + 1);
        let file = FileRef {
            url: format!("memory://{}/{}", folder, id),
            id,
            name: name.to_string(),
            mime_type: mime_type.to_string(),
        };
        files.push(StoredBlob {
            file: file.clone(),
            folder: folder.to_string(),
            mime_type: mime_type.to_string(),
            bytes: bytes.to_vec(),
            public: false,
        });
        Ok(file)
    }

    fn set_public_readable(&self, file: &FileRef) -> Result<(), LedgerError> {
        let mut files = self.files.lock();
        let blob = files
            .iter_mut()
            .find(|b| b.file.id == file.id)
            .ok_or_else(|| LedgerError::not_found("file", &file.id))?;
        blob.public = true;
        Ok(())
    }

    fn list_files(&self, folder: &str) -> Result<Vec<FileRef>, LedgerError> {
        Ok(self
            .files
            .lock()
            .iter()
            .filter(|b| b.folder == folder)
            .map(|b| b.file.clone())
            .collect())
    }

    fn read_file(&self, file_id: &str) -> Result<Vec<u8>, LedgerError> {
        self.files
            .lock()
            .iter()
            .find(|b| b.file.id == file_id)
            .map(|b| b.bytes.clone())
            .ok_or_else(|| LedgerError::not_found("file", file_id))
    }
}

/// Renders a template as an HTML page embedding its JSON context
///
/// The "PDF" it produces is the HTML itself; it stands in for a real
/// converter when documents only need to be inspected.
#[derive(Debug, Default, Clone, Copy)]
pub struct PreviewRenderer;

impl TemplateRenderer for PreviewRenderer {
    fn render(&self, template: &str, context: &serde_json::Value) -> Result<String, LedgerError> {
        let body = serde_json::to_string_pretty(context)?;
        Ok(format!(
            "<html><head><title>{}</title></head><body><pre>{}</pre></body></html>",
            template, body
        ))
    }

    fn html_to_pdf(&self, html: &str) -> Result<Vec<u8>, LedgerError> {
        Ok(html.as_bytes().to_vec())
    }
}

/// Wall-clock local time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use std::thread;

    fn text_rows(rows: &[&[&str]]) -> Vec<Vec<Cell>> {
        rows.iter()
            .map(|r| r.iter().map(|v| Cell::text(*v)).collect())
            .collect()
    }

    #[test]
    fn test_get_range_pads_with_empty() {
        let grid = MemoryGrid::new();
        grid.load_sheet("S", text_rows(&[&["a", "b"], &["c"]]));
        let range = grid.get_range("S", 1, 1, 3, 3).unwrap();
        assert_eq!(range.len(), 3);
        assert_eq!(range[1], vec![Cell::text("c"), Cell::Empty, Cell::Empty]);
        assert!(range[2].iter().all(Cell::is_empty));
    }

    #[test]
    fn test_display_range() {
        let grid = MemoryGrid::new();
        grid.load_sheet("S", vec![vec![Cell::Number(Decimal::new(1500, 0)), Cell::text("x")]]);
        let display = grid.get_display_range("S", 1, 1, 1, 2).unwrap();
        assert_eq!(display, vec![vec!["1500".to_string(), "x".to_string()]]);
    }

    #[test]
    fn test_append_skips_trailing_blank_rows() {
        let grid = MemoryGrid::new();
        grid.load_sheet("S", text_rows(&[&["a"], &[""], &[""]]));
        grid.append_row("S", &[Cell::text("b")]).unwrap();
        assert_eq!(grid.last_row("S").unwrap(), 2);
        assert_eq!(grid.sheet_rows("S"), text_rows(&[&["a"], &["b"]]));
    }

    #[test]
    fn test_delete_rows_shifts_up() {
        let grid = MemoryGrid::new();
        grid.load_sheet("S", text_rows(&[&["1"], &["2"], &["3"], &["4"]]));
        grid.delete_rows("S", 2, 2).unwrap();
        assert_eq!(grid.sheet_rows("S"), text_rows(&[&["1"], &["4"]]));
        assert_eq!(grid.delete_calls(), 1);
    }

    #[test]
    fn test_delete_rows_out_of_range() {
        let grid = MemoryGrid::new();
        grid.load_sheet("S", text_rows(&[&["1"]]));
        assert!(matches!(
            grid.delete_rows("S", 5, 1),
            Err(LedgerError::Storage { .. })
        ));
        assert!(grid.delete_rows("Missing", 1, 1).is_err());
    }

    #[test]
    fn test_set_range_grows_sheet() {
        let grid = MemoryGrid::new();
        grid.set_range("S", 2, 2, &[vec![Cell::text("x")]]).unwrap();
        assert_eq!(grid.last_row("S").unwrap(), 2);
        assert_eq!(grid.last_column("S").unwrap(), 2);
    }

    #[test]
    fn test_locks_serialize_threads() {
        let locks = Arc::new(ProcessLocks::new());
        let counter = Arc::new(Mutex::new(Vec::new()));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let locks = Arc::clone(&locks);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    assert!(locks.try_acquire("L", Duration::from_secs(5)));
                    counter.lock().push(i);
                    locks.release("L");
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.lock().len(), 8);
    }

    #[test]
    fn test_locks_are_independent_by_name() {
        let locks = ProcessLocks::new();
        assert!(locks.try_acquire("a", Duration::ZERO));
        assert!(locks.try_acquire("b", Duration::ZERO));
        assert!(!locks.try_acquire("a", Duration::from_millis(5)));
    }

    #[test]
    fn test_cache_expiry_and_outage() {
        let cache = MemoryCache::new();
        cache.put("k", "v", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("v"));
        cache.put("gone", "v", Duration::ZERO).unwrap();
        assert_eq!(cache.get("gone").unwrap(), None);

        cache.set_unavailable(true);
        assert!(matches!(
            cache.get("k"),
            Err(LedgerError::CacheUnavailable { .. })
        ));
    }

    #[test]
    fn test_blob_store_public_flag() {
        let store = MemoryBlobStore::new();
        let file = store
            .create_file("docs", "quote.pdf", "application/pdf", b"%PDF")
            .unwrap();
        assert!(!store.is_public(&file.id));
        store.set_public_readable(&file).unwrap();
        assert!(store.is_public(&file.id));
        assert_eq!(store.list_files("docs").unwrap(), vec![file.clone()]);
        assert_eq!(store.read_file(&file.id).unwrap(), b"%PDF".to_vec());
    }

    #[test]
    fn test_fixed_clock_advances() {
        let start = chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let clock = FixedClock::new(start);
        clock.advance(chrono::Duration::minutes(5));
        assert_eq!(clock.now(), start + chrono::Duration::minutes(5));
    }
}
