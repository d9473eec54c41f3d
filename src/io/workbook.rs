//! Workbook directories
//!
//! A workbook on disk is a directory holding one CSV file per sheet, named
//! `<sheet>.csv`, with no header convention of its own: every CSV line is a
//! grid row, starting at row 1. Fields are typed on load the way a
//! spreadsheet would show them: plain numbers become numeric cells, bare
//! `yyyy/MM/dd` dates become date cells, anything else stays text.

use crate::grid::MemoryGrid;
use crate::types::{Cell, LedgerError};
use chrono::NaiveDate;
use csv::{ReaderBuilder, WriterBuilder};
use rust_decimal::Decimal;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;

const EXTENSION: &str = "csv";

/// Type a raw CSV field
///
/// A number is only typed when it prints back unchanged, so zero-padded
/// codes such as `0012` stay text.
pub fn cell_from_field(field: &str) -> Cell {
    if field.trim().is_empty() {
        return Cell::Empty;
    }
    if let Ok(number) = Decimal::from_str(field) {
        if number.to_string() == field {
            return Cell::Number(number);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(field, "%Y/%m/%d") {
        return Cell::Date(date);
    }
    Cell::Text(field.to_string())
}

/// Read every row of one sheet's CSV
pub fn read_sheet<R: Read>(input: R) -> Result<Vec<Vec<Cell>>, LedgerError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input);
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(cell_from_field).collect());
    }
    Ok(rows)
}

/// Write rows as display strings
pub fn write_sheet<W: Write>(rows: &[Vec<Cell>], output: W) -> Result<(), LedgerError> {
    let mut writer = WriterBuilder::new().flexible(true).from_writer(output);
    for row in rows {
        writer.write_record(row.iter().map(Cell::display))?;
    }
    writer.flush()?;
    Ok(())
}

/// Load every `*.csv` file of `dir` into `grid`
///
/// # Returns
///
/// The number of sheets loaded. A missing directory loads nothing.
pub fn load_workbook(dir: &Path, grid: &MemoryGrid) -> Result<usize, LedgerError> {
    if !dir.exists() {
        log::info!("workbook {} does not exist yet", dir.display());
        return Ok(0);
    }
    let mut loaded = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
            continue;
        }
        let Some(sheet) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let rows = read_sheet(fs::File::open(&path)?)?;
        log::debug!("loaded {} rows into '{}'", rows.len(), sheet);
        grid.load_sheet(sheet, rows);
        loaded += 1;
    }
    Ok(loaded)
}

/// Write every sheet of `grid` to `dir`, creating it if needed
///
/// # Returns
///
/// The number of sheets written.
pub fn save_workbook(dir: &Path, grid: &MemoryGrid) -> Result<usize, LedgerError> {
    fs::create_dir_all(dir)?;
    let names = grid.sheet_names();
    for sheet in &names {
        let path = dir.join(format!("{}.{}", sheet, EXTENSION));
        write_sheet(&grid.sheet_rows(sheet), fs::File::create(&path)?)?;
    }
    Ok(names.len())
}
