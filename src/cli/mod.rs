// CLI module
// Command-line interface, argument parsing and command dispatch

mod args;

pub use args::{CliArgs, Command};

use crate::core::journal::JournalExport;
use crate::core::{Backends, LedgerService};
use crate::grid::{MemoryGrid, SystemClock};
use crate::io::{load_workbook, save_workbook};
use crate::types::{LedgerConfig, LedgerError};
use clap::Parser;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Parse command-line arguments using clap
///
/// If parsing fails (e.g., invalid arguments, missing required arguments, or
/// --help flag), clap displays an error message or help text and exits the
/// process.
pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, LedgerError> {
    Ok(serde_json::to_value(value)?)
}

/// Run one command against the workbook named by `args`
///
/// Commands that change the workbook (`delete`, and `journal` when it seeds
/// the configuration sheet) write it back to the same directory.
///
/// # Returns
///
/// * `Ok(Value)` - The JSON document to print
/// * `Err(LedgerError)` - Unreadable workbook or configuration, or an
///   unknown project for `ledger`
pub fn execute(args: &CliArgs) -> Result<Value, LedgerError> {
    let config = match &args.config {
        Some(path) => LedgerConfig::from_json_file(path)?,
        None => LedgerConfig::default(),
    };
    let grid = Arc::new(MemoryGrid::new());
    let sheets = load_workbook(&args.data_dir, &grid)?;
    log::info!("loaded {} sheets from {}", sheets, args.data_dir.display());
    let service = LedgerService::new(config, Backends::with_grid(grid.clone(), Arc::new(SystemClock)));

    match &args.command {
        Command::Summaries => to_json(&service.project_summaries()?),
        Command::Balance {
            construction_id,
            vendor,
        } => to_json(&service.vendor_balance(construction_id, vendor)?),
        Command::Analysis { year } => to_json(&service.analysis(*year)?),
        Command::Ledger { id } => {
            let ledger = service
                .project_ledger(id)?
                .ok_or_else(|| LedgerError::not_found("estimate", id))?;
            to_json(&ledger)
        }
        Command::Journal { out, .. } => {
            let Some(request) = args.command.journal_request() else {
                return Err(LedgerError::malformed("not a journal command"));
            };
            let export = service.journal_export(&request)?;
            save_workbook(&args.data_dir, &grid)?;
            match export {
                JournalExport::File(file) => {
                    let dir = out.as_deref().unwrap_or(args.data_dir.as_path());
                    std::fs::create_dir_all(dir)?;
                    let path = dir.join(&file.file_name);
                    std::fs::write(&path, &file.bytes)?;
                    log::info!("wrote {} journal rows to {}", file.count, path.display());
                    Ok(json!({ "success": true, "file": path.display().to_string(), "count": file.count }))
                }
                JournalExport::NoData => Ok(json!({ "success": false, "message": "No data", "count": 0 })),
            }
        }
        Command::Delete { id } => {
            let result = service.delete(id);
            if result.success {
                save_workbook(&args.data_dir, &grid)?;
            }
            to_json(&result)
        }
    }
}
