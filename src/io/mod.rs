//! I/O module
//!
//! Handles workbook files on disk.
//!
//! # Components
//!
//! - `workbook` - Loading and saving a directory of per-sheet CSV files

pub mod workbook;

pub use workbook::{load_workbook, save_workbook};
