//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `value`: Cell values and tolerant money/date/name normalization
//! - `schema`: Static column descriptors per store
//! - `record`: The generic grouped-record aggregate
//! - `entity`: Typed estimates, orders, invoices, deposits and payments
//! - `envelope`: The uniform write result
//! - `config`: Engine configuration
//! - `error`: Error types for the ledger engine

pub mod config;
pub mod entity;
pub mod envelope;
pub mod error;
pub mod record;
pub mod schema;
pub mod value;

pub use config::{CacheTtls, LedgerConfig, PageSize, RetrySettings, SheetNames};
pub use entity::{
    status, Deposit, Entity, Estimate, EstimateHeader, EstimateItem, Invoice, Order,
    OrderHeader, OrderItem, Payment, PaymentMethod,
};
pub use envelope::{WriteResult, BUSY_MESSAGE, NOT_FOUND_MESSAGE};
pub use error::LedgerError;
pub use record::{Fields, Record};
pub use schema::{ColumnKind, ColumnSpec, Schema, Scope};
pub use value::{Cell, Money};
