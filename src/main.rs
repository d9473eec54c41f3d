//! Project Ledger CLI
//!
//! Command-line interface over a workbook directory holding one CSV file per
//! sheet (estimates, orders, invoices, deposits, payments, journal config).
//!
//! # Usage
//!
//! ```bash
//! project-ledger --data-dir book summaries
//! project-ledger --data-dir book balance --construction-id 0000001-00 --vendor "North Steel"
//! project-ledger --data-dir book analysis --year 2024
//! project-ledger --data-dir book ledger 0000001-00
//! project-ledger --data-dir book journal --year 2024 --month 3 --out exports
//! project-ledger --data-dir book --config ledger.json delete DEP-20240310-00001
//! ```
//!
//! Results are printed to stdout as JSON. Set `RUST_LOG` (e.g. `info`) to see
//! what the engine does on stderr.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (unreadable workbook or configuration, unknown project, etc.)

use project_ledger_engine::cli;
use std::process;

fn main() {
    env_logger::init();

    let args = cli::parse_args();

    let output = match cli::execute(&args) {
        Ok(output) => output,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    match serde_json::to_string_pretty(&output) {
        Ok(text) => println!("{}", text),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
