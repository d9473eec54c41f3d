//! Contiguous-range row deletion
//!
//! Deleting one row shifts every later row up by one, so deleting an
//! arbitrary set of rows one at a time is both slow and error prone. Rows are
//! instead coalesced into maximal contiguous ranges and the ranges are
//! deleted from the bottom of the sheet upwards, so earlier deletions never
//! move rows that are still waiting to be deleted.

use crate::grid::GridStore;
use crate::types::LedgerError;

/// A block of consecutive rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    /// 1-based first row
    pub start: usize,
    pub count: usize,
}

/// Merge row numbers into ascending contiguous ranges
///
/// Input may be in any order and may contain duplicates.
pub fn coalesce_ranges(rows: &[usize]) -> Vec<RowRange> {
    let mut sorted = rows.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges: Vec<RowRange> = Vec::new();
    for row in sorted {
        match ranges.last_mut() {
            Some(range) if row == range.start + range.count => range.count += 1,
            _ => ranges.push(RowRange {
                start: row,
                count: 1,
            }),
        }
    }
    ranges
}

/// Delete a set of rows with as few grid calls as possible
///
/// # Arguments
///
/// * `grid` - The grid collaborator
/// * `sheet` - Sheet to delete from
/// * `rows` - 1-based row numbers, any order
///
/// # Returns
///
/// * `Ok(n)` with the number of delete calls made; rows past the sheet's
///   last row are skipped, so a repeated call is a no-op
/// * `Err(LedgerError)` if the grid rejects a call
pub fn delete_rows(grid: &dyn GridStore, sheet: &str, rows: &[usize]) -> Result<usize, LedgerError> {
    if rows.is_empty() {
        return Ok(0);
    }
    let last = grid.last_row(sheet)?;
    let present: Vec<usize> = rows.iter().copied().filter(|r| *r >= 1 && *r <= last).collect();
    let ranges = coalesce_ranges(&present);

    for range in ranges.iter().rev() {
        grid.delete_rows(sheet, range.start, range.count)?;
    }
    log::debug!(
        "deleted {} rows from '{}' in {} calls",
        present.len(),
        sheet,
        ranges.len()
    );
    Ok(ranges.len())
}
