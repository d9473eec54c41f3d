//! Grouped-record stores
//!
//! A [`RecordStore`] binds one entity type to one sheet. Each call opens the
//! store afresh: it reads the sheet, resolves the [`Layout`] from the leading
//! rows, and then decodes, locates or encodes runs through the codec.
//!
//! Stores do no locking of their own. Mutations are expected to run inside
//! the store-wide lock held by the service.

use crate::core::codec::{decode_runs, encode_record, locate_runs, RunSpan};
use crate::core::deleter;
use crate::core::layout::{Layout, HEADER_SCAN_ROWS};
use crate::grid::GridStore;
use crate::types::{Cell, Entity, LedgerError, Record};
use std::marker::PhantomData;

/// A sheet as read at open time
struct Opened {
    layout: Layout,
    /// Data rows after the header row
    rows: Vec<Vec<Cell>>,
}

/// Typed access to the runs of one sheet
pub struct RecordStore<'a, E: Entity> {
    grid: &'a dyn GridStore,
    sheet: &'a str,
    _entity: PhantomData<E>,
}

impl<'a, E: Entity> RecordStore<'a, E> {
    pub fn new(grid: &'a dyn GridStore, sheet: &'a str) -> Self {
        Self {
            grid,
            sheet,
            _entity: PhantomData,
        }
    }

    pub fn sheet(&self) -> &str {
        self.sheet
    }

    fn open(&self) -> Result<Opened, LedgerError> {
        let all = self.grid.read_all(self.sheet)?;
        let scan = all.len().min(HEADER_SCAN_ROWS);
        let layout = Layout::resolve(E::SCHEMA, &all[..scan]);
        let rows = all.into_iter().skip(layout.header_row()).collect();
        Ok(Opened { layout, rows })
    }

    /// Every record in sheet order
    pub fn records(&self) -> Result<Vec<Record>, LedgerError> {
        let opened = self.open()?;
        Ok(decode_runs(&opened.layout, &opened.rows))
    }

    /// Every entity in sheet order
    pub fn list(&self) -> Result<Vec<E>, LedgerError> {
        Ok(self.records()?.iter().map(E::from_record).collect())
    }

    /// The first record whose id equals `id`
    pub fn get(&self, id: &str) -> Result<Option<E>, LedgerError> {
        let id = id.trim();
        Ok(self
            .records()?
            .iter()
            .find(|r| r.id == id)
            .map(E::from_record))
    }

    /// Runs whose id equals `id`
    pub fn locate(&self, id: &str) -> Result<Vec<RunSpan>, LedgerError> {
        let opened = self.open()?;
        let id = id.trim();
        Ok(locate_runs(&opened.layout, &opened.rows, opened.layout.first_data_row())
            .into_iter()
            .filter(|span| span.id == id)
            .collect())
    }

    /// Write the header row into an empty sheet
    ///
    /// # Returns
    ///
    /// The layout to encode new rows with.
    pub fn ensure_header(&self) -> Result<Layout, LedgerError> {
        let opened = self.open()?;
        if opened.layout.header_row() == 0 {
            self.grid
                .append_row(self.sheet, &opened.layout.header_cells())?;
            log::info!("wrote {} header row to '{}'", E::SCHEMA.entity, self.sheet);
        }
        Ok(opened.layout)
    }

    /// Append an entity's run after the last row
    pub fn append(&self, entity: &E) -> Result<(), LedgerError> {
        let layout = self.ensure_header()?;
        for row in encode_record(&layout, &entity.to_record()) {
            self.grid.append_row(self.sheet, &row)?;
        }
        Ok(())
    }

    /// Delete every run whose id equals `id`
    ///
    /// # Returns
    ///
    /// `Ok(true)` if anything was deleted, `Ok(false)` when no run carries
    /// the id (a repeated delete is therefore a no-op).
    pub fn delete(&self, id: &str) -> Result<bool, LedgerError> {
        let spans = self.locate(id)?;
        self.delete_spans(&spans)
    }

    /// Delete every run whose entity matches `predicate`
    ///
    /// # Returns
    ///
    /// The number of runs removed.
    pub fn delete_where<P>(&self, predicate: P) -> Result<usize, LedgerError>
    where
        P: Fn(&E) -> bool,
    {
        let opened = self.open()?;
        let records = decode_runs(&opened.layout, &opened.rows);
        let spans = locate_runs(&opened.layout, &opened.rows, opened.layout.first_data_row());
        // decode_runs and locate_runs both emit one entry per non-empty id, in order
        let doomed: Vec<RunSpan> = records
            .iter()
            .zip(spans)
            .filter(|(record, _)| predicate(&E::from_record(record)))
            .map(|(_, span)| span)
            .collect();
        self.delete_spans(&doomed)?;
        Ok(doomed.len())
    }

    fn delete_spans(&self, spans: &[RunSpan]) -> Result<bool, LedgerError> {
        if spans.is_empty() {
            return Ok(false);
        }
        let rows: Vec<usize> = spans.iter().flat_map(RunSpan::rows).collect();
        deleter::delete_rows(self.grid, self.sheet, &rows)?;
        Ok(true)
    }

    /// Replace an existing run with the entity's current state
    ///
    /// Single-row records are overwritten where they stand; multi-row records
    /// are deleted and re-appended. An entity whose id is not present is
    /// appended.
    pub fn upsert(&self, entity: &E) -> Result<(), LedgerError> {
        let spans = self.locate(entity.id())?;
        match spans.as_slice() {
            [span] if !E::SCHEMA.has_items() => {
                let layout = self.ensure_header()?;
                let mut rows = encode_record(&layout, &entity.to_record());
                // blank out any stray rows that belonged to the old run
                rows.resize_with(span.len, || vec![Cell::Empty; layout.width()]);
                self.grid.set_range(self.sheet, span.start_row, 1, &rows)
            }
            _ => {
                self.delete_spans(&spans)?;
                self.append(entity)
            }
        }
    }

    /// Overwrite one header field of the run with `id`
    ///
    /// # Returns
    ///
    /// `Ok(false)` when no run carries the id.
    pub fn set_field(&self, id: &str, key: &str, value: Cell) -> Result<bool, LedgerError> {
        let opened = self.open()?;
        let Some(position) = opened.layout.position(key) else {
            return Err(LedgerError::malformed(format!(
                "{} has no column '{}'",
                E::SCHEMA.entity,
                key
            )));
        };
        let id = id.trim();
        let spans = locate_runs(&opened.layout, &opened.rows, opened.layout.first_data_row());
        let Some(span) = spans.iter().find(|s| s.id == id) else {
            return Ok(false);
        };
        self.grid
            .set_range(self.sheet, span.start_row, position + 1, &[vec![value]])?;
        Ok(true)
    }
}
