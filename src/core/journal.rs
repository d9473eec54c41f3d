//! Monthly journal builder
//!
//! Turns one month of invoices, payments, billed estimates and deposits into
//! per-counterparty rows whose columns are described by a user-editable
//! configuration sheet, and renders them as a spreadsheet-friendly CSV.
//!
//! Configuration sheet layout (row 1 is a title row):
//!
//! | A name | B source | C fixed/format | D ordinal | E type | F | G sales clients | H purchase suppliers |
//!
//! Columns A..E describe one output column per row. Columns G and H are
//! independent lists: when non-empty they restrict (and order) the
//! counterparties that get a row on that side.

use crate::core::aggregator::{invoice_date, Snapshot};
use crate::types::value::{parse_currency, Cell, Money};
use crate::types::{status, LedgerError, PaymentMethod};
use chrono::{Datelike, NaiveDate};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Byte-order mark prepended to exported files
pub const BOM: &str = "\u{FEFF}";

/// Ordinal given to configuration rows without a usable one
pub const MISSING_ORDINAL: u32 = 999;

/// Which side of the books a configured column belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalSide {
    Sales,
    Purchase,
    /// Appears on both sides
    Common,
}

impl JournalSide {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "sales" => Some(JournalSide::Sales),
            "purchase" => Some(JournalSide::Purchase),
            "common" => Some(JournalSide::Common),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JournalSide::Sales => "sales",
            JournalSide::Purchase => "purchase",
            JournalSide::Common => "common",
        }
    }

    fn includes(&self, side: JournalSide) -> bool {
        *self == side || *self == JournalSide::Common
    }
}

/// Where a configured column takes its value from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    /// The configured literal
    Fixed,
    /// `yyyy/MM` of the target month
    Date,
    Amount,
    /// Purchase-side offsets; always empty on the sales side
    Offset,
    Cash,
    Check,
    Bill,
    Transfer,
    Other,
    /// Cash plus check
    CashCheck,
    /// Counterparty name (`supplier` or `client`)
    Counterparty,
    /// Unrecognised tag, resolves to an empty value
    Unknown(String),
}

impl SourceTag {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "fixed" => SourceTag::Fixed,
            "date" => SourceTag::Date,
            "amount" => SourceTag::Amount,
            "offset" => SourceTag::Offset,
            "cash" => SourceTag::Cash,
            "check" => SourceTag::Check,
            "bill" => SourceTag::Bill,
            "transfer" => SourceTag::Transfer,
            "other" => SourceTag::Other,
            "cash_check" => SourceTag::CashCheck,
            "supplier" | "client" => SourceTag::Counterparty,
            other => SourceTag::Unknown(other.to_string()),
        }
    }
}

/// One configured output column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalColumn {
    pub name: String,
    pub source: SourceTag,
    pub fixed: String,
    pub ordinal: u32,
    pub side: JournalSide,
}

/// Parsed configuration sheet
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JournalConfig {
    pub columns: Vec<JournalColumn>,
    pub sales_clients: Vec<String>,
    pub purchase_suppliers: Vec<String>,
}

const CONFIG_TITLES: [&str; 8] = [
    "Output Column",
    "Source",
    "Fixed/Format",
    "Ordinal",
    "Type (sales/purchase/common)",
    "",
    "Sales Clients",
    "Purchase Suppliers",
];

const DEFAULT_COLUMNS: [(&str, &str, &str); 10] = [
    ("Counterparty", "", ""),
    ("Carried Over", "fixed", "0"),
    ("Period Amount", "amount", ""),
    ("Discounts", "fixed", "0"),
    ("Cash/Check", "cash_check", ""),
    ("Bills", "bill", ""),
    ("Offset", "", ""),
    ("Transfer Fees", "fixed", "0"),
    ("Other", "other", ""),
    ("Carry Forward", "fixed", "0"),
];

/// Rows of a freshly seeded configuration sheet, title row included
pub fn default_config_rows() -> Vec<Vec<Cell>> {
    let mut rows = vec![CONFIG_TITLES.iter().map(|t| Cell::text(*t)).collect()];
    for side in [JournalSide::Sales, JournalSide::Purchase] {
        for (i, (name, source, fixed)) in DEFAULT_COLUMNS.iter().enumerate() {
            let source = match (i, side) {
                (0, JournalSide::Sales) => "client",
                (0, _) => "supplier",
                (6, JournalSide::Sales) => "fixed",
                (6, _) => "offset",
                _ => source,
            };
            let fixed = if i == 6 && side == JournalSide::Sales { "0" } else { fixed };
            rows.push(vec![
                Cell::text(*name),
                Cell::text(source),
                Cell::text(fixed),
                Cell::Number(Decimal::from(i as u32 + 1)),
                Cell::text(side.as_str()),
            ]);
        }
    }
    rows
}

fn ordinal(cell: &Cell) -> u32 {
    parse_currency(cell)
        .trunc()
        .to_u32()
        .filter(|n| *n > 0)
        .unwrap_or(MISSING_ORDINAL)
}

/// Parse the configuration sheet's rows, title row included
///
/// Rows without a name are skipped; rows whose type is not recognised still
/// contribute to the counterparty lists but yield no column.
pub fn parse_config(rows: &[Vec<Cell>]) -> JournalConfig {
    let cell = |row: &Vec<Cell>, i: usize| row.get(i).cloned().unwrap_or_default();
    let mut config = JournalConfig::default();
    for row in rows.iter().skip(1) {
        let name = cell(row, 0).display().trim().to_string();
        if !name.is_empty() {
            match JournalSide::from_label(&cell(row, 4).display()) {
                Some(side) => config.columns.push(JournalColumn {
                    name,
                    source: SourceTag::parse(&cell(row, 1).display()),
                    fixed: cell(row, 2).display(),
                    ordinal: ordinal(&cell(row, 3)),
                    side,
                }),
                None => log::warn!("journal column '{}' has no usable type, skipped", name),
            }
        }
        let client = cell(row, 6).display().trim().to_string();
        if !client.is_empty() {
            config.sales_clients.push(client);
        }
        let supplier = cell(row, 7).display().trim().to_string();
        if !supplier.is_empty() {
            config.purchase_suppliers.push(supplier);
        }
    }
    config
}

impl JournalConfig {
    /// Columns of one side, ordered by ordinal (ties keep sheet order)
    pub fn side_columns(&self, side: JournalSide) -> Vec<&JournalColumn> {
        let mut columns: Vec<&JournalColumn> =
            self.columns.iter().filter(|c| c.side.includes(side)).collect();
        columns.sort_by_key(|c| c.ordinal);
        columns
    }

    /// Output header when both sides are exported: sales columns, then any
    /// purchase column whose name and ordinal are not already present
    fn combined_columns(&self) -> Vec<&JournalColumn> {
        let sales = self.side_columns(JournalSide::Sales);
        let extra: Vec<&JournalColumn> = self
            .side_columns(JournalSide::Purchase)
            .into_iter()
            .filter(|p| !sales.iter().any(|s| s.name == p.name && s.ordinal == p.ordinal))
            .collect();
        sales.into_iter().chain(extra).collect()
    }
}

/// Target month and sides of a journal run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRequest {
    pub year: i32,
    pub month: u32,
    pub include_sales: bool,
    pub include_purchases: bool,
}

impl JournalRequest {
    fn covers(&self, date: Option<NaiveDate>) -> bool {
        date.is_some_and(|d| d.year() == self.year && d.month() == self.month)
    }

    fn period_label(&self) -> String {
        format!("{}/{:02}", self.year, self.month)
    }

    pub fn file_name(&self) -> String {
        format!("集計表_{}年{}月.csv", self.year, self.month)
    }
}

/// Per-counterparty totals for one month
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Totals {
    amount: Money,
    offset: Money,
    cash: Money,
    check: Money,
    bill: Money,
    transfer: Money,
    other: Money,
}

impl Totals {
    fn add_settlement(&mut self, method: PaymentMethod, amount: Money) {
        match method {
            PaymentMethod::Cash => self.cash += amount,
            PaymentMethod::Check => self.check += amount,
            PaymentMethod::Bill => self.bill += amount,
            PaymentMethod::Transfer => self.transfer += amount,
            PaymentMethod::Offset | PaymentMethod::Other => self.other += amount,
        }
    }
}

/// Totals keyed by counterparty, remembering first-seen order
struct Ledger {
    configured: bool,
    order: Vec<String>,
    totals: HashMap<String, Totals>,
}

impl Ledger {
    fn new(configured: &[String]) -> Self {
        Self {
            configured: !configured.is_empty(),
            order: configured.to_vec(),
            totals: configured.iter().map(|c| (c.clone(), Totals::default())).collect(),
        }
    }

    /// Totals for `name`, or `None` when a configured list excludes it
    fn entry(&mut self, name: &str) -> Option<&mut Totals> {
        let name = name.trim();
        if !self.totals.contains_key(name) {
            if self.configured {
                return None;
            }
            self.order.push(name.to_string());
            self.totals.insert(name.to_string(), Totals::default());
        }
        self.totals.get_mut(name)
    }

    fn rows(&self) -> impl Iterator<Item = (&str, Totals)> {
        self.order.iter().map(|name| {
            (
                name.as_str(),
                self.totals.get(name).copied().unwrap_or_default(),
            )
        })
    }
}

fn purchase_totals(snapshot: &Snapshot, request: &JournalRequest, suppliers: &[String]) -> Ledger {
    let mut ledger = Ledger::new(suppliers);
    for invoice in &snapshot.invoices {
        if invoice.status != status::CONFIRMED && invoice.status != status::PAID {
            continue;
        }
        if !request.covers(invoice_date(invoice)) {
            continue;
        }
        if let Some(totals) = ledger.entry(&invoice.supplier) {
            totals.amount += invoice.amount;
            totals.offset += invoice.offset;
        }
    }
    for payment in &snapshot.payments {
        if payment.status == status::CANCELLED || !request.covers(payment.date) {
            continue;
        }
        if let Some(totals) = ledger.entry(&payment.supplier) {
            match payment.payment_method() {
                PaymentMethod::Offset => totals.offset += payment.offset,
                method => totals.add_settlement(method, payment.amount),
            }
        }
    }
    ledger
}

fn sales_totals(snapshot: &Snapshot, request: &JournalRequest, clients: &[String]) -> Ledger {
    let mut ledger = Ledger::new(clients);
    for estimate in &snapshot.estimates {
        let h = &estimate.header;
        if h.status != status::BILLED && h.status != status::COMPLETED {
            continue;
        }
        if !request.covers(h.date) {
            continue;
        }
        if let Some(totals) = ledger.entry(&h.client) {
            totals.amount += estimate.total();
        }
    }
    for deposit in &snapshot.deposits {
        if deposit.status == status::CANCELLED || !request.covers(deposit.date) {
            continue;
        }
        if let Some(totals) = ledger.entry(&deposit.client) {
            totals.add_settlement(deposit.payment_method(), deposit.amount);
        }
    }
    ledger
}

fn money_text(value: Money) -> String {
    value.normalize().to_string()
}

fn resolve(
    column: &JournalColumn,
    side: JournalSide,
    counterparty: &str,
    totals: &Totals,
    request: &JournalRequest,
) -> String {
    match &column.source {
        SourceTag::Fixed => column.fixed.clone(),
        SourceTag::Date => request.period_label(),
        SourceTag::Amount => money_text(totals.amount),
        SourceTag::Offset if side == JournalSide::Purchase => money_text(totals.offset),
        SourceTag::Offset => String::new(),
        SourceTag::Cash => money_text(totals.cash),
        SourceTag::Check => money_text(totals.check),
        SourceTag::Bill => money_text(totals.bill),
        SourceTag::Transfer => money_text(totals.transfer),
        SourceTag::Other => money_text(totals.other),
        SourceTag::CashCheck => money_text(totals.cash + totals.check),
        SourceTag::Counterparty => counterparty.to_string(),
        SourceTag::Unknown(_) => String::new(),
    }
}

/// Header and rows of a journal run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JournalTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Build the journal table: purchase rows first, then sales rows
///
/// Each side's rows follow that side's own column order; the header follows
/// the combined order when both sides are requested.
pub fn build_journal(snapshot: &Snapshot, config: &JournalConfig, request: &JournalRequest) -> JournalTable {
    let headers: Vec<String> = match (request.include_sales, request.include_purchases) {
        (true, true) => config.combined_columns(),
        (false, true) => config.side_columns(JournalSide::Purchase),
        _ => config.side_columns(JournalSide::Sales),
    }
    .into_iter()
    .map(|c| c.name.clone())
    .collect();

    let mut rows = Vec::new();
    let mut emit = |side: JournalSide, ledger: Ledger| {
        let columns = config.side_columns(side);
        for (counterparty, totals) in ledger.rows() {
            rows.push(
                columns
                    .iter()
                    .map(|c| resolve(c, side, counterparty, &totals, request))
                    .collect(),
            );
        }
    };
    if request.include_purchases {
        emit(
            JournalSide::Purchase,
            purchase_totals(snapshot, request, &config.purchase_suppliers),
        );
    }
    if request.include_sales {
        emit(
            JournalSide::Sales,
            sales_totals(snapshot, request, &config.sales_clients),
        );
    }
    JournalTable { headers, rows }
}

/// A rendered journal file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JournalFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Number of data rows
    pub count: usize,
}

/// Result of an export request
#[derive(Debug, Clone, PartialEq)]
pub enum JournalExport {
    File(JournalFile),
    /// The month had no rows; nothing was rendered
    NoData,
}

/// Render a table as CSV: every field quoted, CRLF line ends, BOM first
pub fn render_csv(table: &JournalTable) -> Result<Vec<u8>, LedgerError> {
    let mut output = BOM.as_bytes().to_vec();
    {
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .terminator(Terminator::CRLF)
            .flexible(true)
            .from_writer(&mut output);
        writer.write_record(&table.headers)?;
        for row in &table.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
    }
    Ok(output)
}

/// Build and render one month's journal
pub fn export_journal(
    snapshot: &Snapshot,
    config: &JournalConfig,
    request: &JournalRequest,
) -> Result<JournalExport, LedgerError> {
    let table = build_journal(snapshot, config, request);
    if table.rows.is_empty() {
        log::info!("journal {} has no rows", request.period_label());
        return Ok(JournalExport::NoData);
    }
    Ok(JournalExport::File(JournalFile {
        file_name: request.file_name(),
        bytes: render_csv(&table)?,
        count: table.rows.len(),
    }))
}
