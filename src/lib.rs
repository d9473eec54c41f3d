//! Project Ledger Engine Library
//! # Overview
//!
//! This library stores estimates, vendor orders, received invoices, deposits
//! and payments as grouped records in grid storage, and aggregates them
//! across stores into project summaries, balances, ledgers and journals.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (cells, records, entities, errors, config)
//! - [`grid`] - Collaborator traits (grid, counters, locks, cache, files,
//!   templates, clock) and their in-memory implementations
//! - [`core`] - Business logic components:
//!   - [`core::codec`] - Grouped-run encoding and decoding
//!   - [`core::store`] - Typed stores, one per sheet
//!   - [`core::aggregator`] - Cross-store joins and rollups
//!   - [`core::journal`] - Monthly journal export
//!   - [`core::service`] - The operation facade
//! - [`io`] - Workbook directories of per-sheet CSV files
//! - [`cli`] - CLI arguments parsing and dispatch
//!
//! # Grouped Records
//!
//! A record is a contiguous run of rows. Its id and header fields sit on the
//! first row only; every row of the run carries one line item. Only the codec
//! knows this; everything above it works with [`types::Record`] values.
//!
//! # Foreign Keys
//!
//! Orders, invoices and deposits point at an estimate by id. A key matches
//! its parent exactly or as a `<id>-` prefix, and dangling keys simply
//! contribute nothing.

// Module declarations
pub mod cli;
pub mod core;
pub mod grid;
pub mod io;
pub mod types;

pub use core::{Backends, LedgerService, RecordStore, Snapshot};
pub use io::{load_workbook, save_workbook};
pub use types::{
    Cell, Deposit, Estimate, Invoice, LedgerConfig, LedgerError, Money, Order, Payment, Record,
    WriteResult,
};
