use crate::core::journal::JournalRequest;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Query and maintain a project ledger workbook
#[derive(Parser, Debug)]
#[command(name = "project-ledger")]
#[command(about = "Query and maintain a project ledger workbook", long_about = None)]
pub struct CliArgs {
    /// Directory holding one CSV file per sheet
    #[arg(
        long = "data-dir",
        value_name = "DIR",
        help = "Workbook directory (one <sheet>.csv per store)"
    )]
    pub data_dir: PathBuf,

    /// Optional JSON configuration file
    #[arg(
        long = "config",
        value_name = "FILE",
        help = "JSON configuration; missing keys keep their defaults"
    )]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Per-project sales, cost, invoiced and deposited totals
    Summaries,

    /// Outstanding balance of one vendor on one project
    Balance {
        #[arg(long = "construction-id", value_name = "ID")]
        construction_id: String,
        #[arg(long = "vendor", value_name = "NAME")]
        vendor: String,
    },

    /// Monthly sales, cost and profit with the top clients
    Analysis {
        #[arg(long = "year", value_name = "YEAR")]
        year: i32,
    },

    /// Full ledger of one project
    Ledger {
        #[arg(value_name = "ESTIMATE_ID")]
        id: String,
    },

    /// Monthly journal CSV
    Journal {
        #[arg(long = "year", value_name = "YEAR")]
        year: i32,
        #[arg(
            long = "month",
            value_name = "MONTH",
            value_parser = clap::value_parser!(u32).range(1..=12)
        )]
        month: u32,
        /// Leave out the sales side
        #[arg(long = "no-sales")]
        no_sales: bool,
        /// Leave out the purchase side
        #[arg(long = "no-purchases")]
        no_purchases: bool,
        /// Where to write the file (defaults to the workbook directory)
        #[arg(long = "out", value_name = "DIR")]
        out: Option<PathBuf>,
    },

    /// Delete a record by id from every store
    Delete {
        #[arg(value_name = "ID")]
        id: String,
    },
}

impl Command {
    /// Journal request for a `journal` command
    pub fn journal_request(&self) -> Option<JournalRequest> {
        match self {
            Command::Journal {
                year,
                month,
                no_sales,
                no_purchases,
                ..
            } => Some(JournalRequest {
                year: *year,
                month: *month,
                include_sales: !no_sales,
                include_purchases: !no_purchases,
            }),
            _ => None,
        }
    }
}
