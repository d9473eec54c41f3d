//! Cross-store aggregation
//!
//! Pure functions over a [`Snapshot`] of every store. Nothing here performs
//! I/O or fails: dangling foreign keys, missing dates and unparseable money
//! all degrade to zero or empty contributions.
//!
//! # Foreign keys
//!
//! A child record belongs to parent `id` when its foreign key equals `id` or
//! starts with `id-` (sub-identifiers such as `0000001-00-2`). An empty
//! foreign key never matches. [`fk_candidates`] turns this rule into a hash
//! lookup: a key can only belong to itself and to its own prefixes that end
//! just before a `-`.

use crate::core::documents::sanitize_file_name;
use crate::types::value::{names_overlap, parse_currency, round_money, to_half_width, Money};
use crate::types::{
    status, Cell, Deposit, Estimate, EstimateHeader, EstimateItem, Invoice, Order, OrderHeader,
    OrderItem, Payment,
};
use chrono::{Datelike, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Label used for estimates without a client in rankings
pub const UNKNOWN_CLIENT: &str = "(unknown)";

/// Every store, decoded
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub estimates: Vec<Estimate>,
    pub orders: Vec<Order>,
    pub invoices: Vec<Invoice>,
    pub deposits: Vec<Deposit>,
    pub payments: Vec<Payment>,
}

/// Whether foreign key `fk` refers to parent `id`
pub fn fk_matches(fk: &str, id: &str) -> bool {
    let fk = fk.trim();
    let id = id.trim();
    if fk.is_empty() || id.is_empty() {
        return false;
    }
    fk == id
        || fk
            .strip_prefix(id)
            .is_some_and(|rest| rest.starts_with('-'))
}

/// Every parent id that foreign key `fk` can match
///
/// `"0000001-00-2"` yields `"0000001-00-2"`, `"0000001-00"` and `"0000001"`.
pub fn fk_candidates(fk: &str) -> impl Iterator<Item = &str> {
    let fk = fk.trim();
    let prefixes = fk
        .char_indices()
        .filter(|(_, c)| *c == '-')
        .map(move |(i, _)| &fk[..i])
        .filter(|p| !p.is_empty());
    std::iter::once(fk).filter(|f| !f.is_empty()).chain(prefixes)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Rollup {
    total: Money,
    count: usize,
}

fn rollup_by_parent<'a, T: 'a>(
    children: impl IntoIterator<Item = &'a T>,
    key: impl Fn(&T) -> &str,
    amount: impl Fn(&T) -> Money,
) -> HashMap<String, Rollup> {
    let mut rollups: HashMap<String, Rollup> = HashMap::new();
    for child in children {
        let value = amount(child);
        for parent in fk_candidates(key(child)) {
            let entry = rollups.entry(parent.to_string()).or_default();
            entry.total += value;
            entry.count += 1;
        }
    }
    rollups
}

fn is_cancelled(status_label: &str) -> bool {
    status_label.trim() == status::CANCELLED
}

/// Newest first; records without a date sort last, ties keep their order
fn sort_newest_first<T>(items: &mut [T], date: impl Fn(&T) -> Option<NaiveDate>) {
    items.sort_by(|a, b| date(b).cmp(&date(a)));
}

// ---------------------------------------------------------------------------
// Project summaries
// ---------------------------------------------------------------------------

/// Per-estimate financial rollup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: String,
    pub date: Option<NaiveDate>,
    pub client: String,
    pub project: String,
    pub location: String,
    pub status: String,
    pub visibility: String,
    /// Sum of the estimate's item amounts
    pub sales: Money,
    /// Sum of matching order totals
    pub cost: Money,
    /// Sum of matching invoice payment amounts
    pub invoiced: Money,
    /// Sum of matching deposits that are not cancelled
    pub deposited: Money,
    pub profit: Money,
    pub order_count: usize,
    pub invoice_count: usize,
    pub deposit_count: usize,
}

/// Project summaries in store order
pub fn project_summaries_in_store_order(snapshot: &Snapshot) -> Vec<ProjectSummary> {
    let orders = rollup_by_parent(&snapshot.orders, |o| &o.header.estimate_id, Order::total);
    let invoices = rollup_by_parent(&snapshot.invoices, |i| &i.construction_id, |i| i.payment);
    let deposits = rollup_by_parent(
        snapshot.deposits.iter().filter(|d| !is_cancelled(&d.status)),
        |d| &d.estimate_id,
        |d| d.amount,
    );

    snapshot
        .estimates
        .iter()
        .map(|estimate| {
            let h = &estimate.header;
            let ordered = orders.get(&h.id).copied().unwrap_or_default();
            let invoiced = invoices.get(&h.id).copied().unwrap_or_default();
            let deposited = deposits.get(&h.id).copied().unwrap_or_default();
            let sales = estimate.total();
            ProjectSummary {
                id: h.id.clone(),
                date: h.date,
                client: h.client.clone(),
                project: h.project.clone(),
                location: h.location.clone(),
                status: if h.status.is_empty() {
                    status::DRAFT.to_string()
                } else {
                    h.status.clone()
                },
                visibility: if h.visibility.is_empty() {
                    "public".to_string()
                } else {
                    h.visibility.clone()
                },
                sales,
                cost: ordered.total,
                invoiced: invoiced.total,
                deposited: deposited.total,
                profit: sales - ordered.total,
                order_count: ordered.count,
                invoice_count: invoiced.count,
                deposit_count: deposited.count,
            }
        })
        .collect()
}

/// Project summaries, newest estimate first
pub fn project_summaries(snapshot: &Snapshot) -> Vec<ProjectSummary> {
    let mut summaries = project_summaries_in_store_order(snapshot);
    sort_newest_first(&mut summaries, |s| s.date);
    summaries
}

// ---------------------------------------------------------------------------
// Vendor balance
// ---------------------------------------------------------------------------

/// Outstanding amount owed to one vendor on one construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorBalance {
    pub construction_id: String,
    pub vendor: String,
    pub ordered: Money,
    pub invoiced: Money,
    pub balance: Money,
}

/// Ordered minus invoiced for a construction id and vendor name
///
/// Vendor names match by whitespace-free substring containment in either
/// direction, so "Acme" and "Acme Builders Ltd" are the same vendor. Two
/// distinct vendors whose names contain one another are merged by this rule.
pub fn vendor_balance(snapshot: &Snapshot, construction_id: &str, vendor: &str) -> VendorBalance {
    let ordered: Money = snapshot
        .orders
        .iter()
        .filter(|o| fk_matches(&o.header.estimate_id, construction_id))
        .filter(|o| names_overlap(&o.header.vendor, vendor))
        .map(Order::total)
        .sum();
    let invoiced: Money = snapshot
        .invoices
        .iter()
        .filter(|i| fk_matches(&i.construction_id, construction_id))
        .filter(|i| names_overlap(&i.supplier, vendor))
        .map(|i| i.payment)
        .sum();
    VendorBalance {
        construction_id: construction_id.trim().to_string(),
        vendor: vendor.trim().to_string(),
        ordered,
        invoiced,
        balance: ordered - invoiced,
    }
}

// ---------------------------------------------------------------------------
// Monthly analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthBucket {
    /// 1..=12
    pub month: u32,
    pub sales: Money,
    pub cost: Money,
    pub profit: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRank {
    pub client: String,
    pub sales: Money,
    pub profit: Money,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyAnalysis {
    pub year: i32,
    pub months: Vec<MonthBucket>,
    /// Top ten clients by sales; equal sales keep first-seen order
    pub ranking: Vec<ClientRank>,
}

pub const RANKING_SIZE: usize = 10;

/// Bucket project summaries by estimate month within `year`
pub fn monthly_analysis(summaries: &[ProjectSummary], year: i32) -> MonthlyAnalysis {
    let mut months: Vec<MonthBucket> = (1..=12)
        .map(|month| MonthBucket {
            month,
            sales: Decimal::ZERO,
            cost: Decimal::ZERO,
            profit: Decimal::ZERO,
        })
        .collect();
    let mut ranking: Vec<ClientRank> = Vec::new();
    let mut slot: HashMap<String, usize> = HashMap::new();

    for summary in summaries {
        let Some(date) = summary.date.filter(|d| d.year() == year) else {
            continue;
        };
        let bucket = &mut months[date.month0() as usize];
        bucket.sales += summary.sales;
        bucket.cost += summary.cost;
        bucket.profit += summary.profit;

        let client = if summary.client.is_empty() {
            UNKNOWN_CLIENT.to_string()
        } else {
            summary.client.clone()
        };
        let index = *slot.entry(client.clone()).or_insert_with(|| {
            ranking.push(ClientRank {
                client,
                sales: Decimal::ZERO,
                profit: Decimal::ZERO,
                count: 0,
            });
            ranking.len() - 1
        });
        let rank = &mut ranking[index];
        rank.sales += summary.sales;
        rank.profit += summary.profit;
        rank.count += 1;
    }

    // stable sort keeps first-seen order among equal sales
    ranking.sort_by(|a, b| b.sales.cmp(&a.sales));
    ranking.truncate(RANKING_SIZE);
    MonthlyAnalysis {
        year,
        months,
        ranking,
    }
}

// ---------------------------------------------------------------------------
// Project ledger
// ---------------------------------------------------------------------------

/// Full join of one estimate with everything recorded against it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectLedger {
    pub estimate: Estimate,
    pub orders: Vec<Order>,
    pub invoices: Vec<Invoice>,
    /// Matching deposits, cancelled ones excluded
    pub deposits: Vec<Deposit>,
    /// Matching payments, cancelled ones excluded
    pub payments: Vec<Payment>,
    pub sales: Money,
    pub cost: Money,
    pub invoiced: Money,
    pub deposited: Money,
    pub paid: Money,
    pub profit: Money,
    /// Profit as a percentage of sales, one decimal place; 0 without sales
    pub profit_rate: Decimal,
}

/// `profit / sales` as a percentage rounded to one decimal place
pub fn profit_rate(profit: Money, sales: Money) -> Decimal {
    if sales.is_zero() {
        return Decimal::ZERO;
    }
    (profit * Decimal::ONE_HUNDRED / sales)
        .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
}

/// Assemble the ledger of estimate `id`, `None` when no such estimate exists
pub fn project_ledger(snapshot: &Snapshot, id: &str) -> Option<ProjectLedger> {
    let id = id.trim();
    let estimate = snapshot.estimates.iter().find(|e| e.header.id == id)?.clone();

    let orders: Vec<Order> = snapshot
        .orders
        .iter()
        .filter(|o| fk_matches(&o.header.estimate_id, id))
        .cloned()
        .collect();
    let invoices: Vec<Invoice> = snapshot
        .invoices
        .iter()
        .filter(|i| fk_matches(&i.construction_id, id))
        .cloned()
        .collect();
    let deposits: Vec<Deposit> = snapshot
        .deposits
        .iter()
        .filter(|d| fk_matches(&d.estimate_id, id) && !is_cancelled(&d.status))
        .cloned()
        .collect();

    let order_ids: HashSet<&str> = orders.iter().map(|o| o.header.id.as_str()).collect();
    let project = estimate.header.project.as_str();
    let client = estimate.header.client.as_str();
    let payments: Vec<Payment> = snapshot
        .payments
        .iter()
        .filter(|p| !is_cancelled(&p.status))
        .filter(|p| {
            let by_order = !p.order_id.is_empty() && order_ids.contains(p.order_id.as_str());
            let by_name = !p.project.is_empty()
                && ((!project.is_empty() && p.project == project)
                    || (!client.is_empty() && p.project == client));
            by_order || by_name
        })
        .cloned()
        .collect();

    let sales = estimate.total();
    let cost: Money = orders.iter().map(Order::total).sum();
    let profit = sales - cost;
    Some(ProjectLedger {
        invoiced: invoices.iter().map(|i| i.payment).sum(),
        deposited: deposits.iter().map(|d| d.amount).sum(),
        paid: payments.iter().map(|p| p.amount).sum(),
        profit_rate: profit_rate(profit, sales),
        estimate,
        orders,
        invoices,
        deposits,
        payments,
        sales,
        cost,
        profit,
    })
}

// ---------------------------------------------------------------------------
// Estimate detail
// ---------------------------------------------------------------------------

/// An estimate line with what has been ordered against it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemProgress {
    #[serde(flatten)]
    pub item: EstimateItem,
    pub ordered_qty: Decimal,
    pub ordered_amount: Money,
    pub ordered_vendors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateDetail {
    pub header: EstimateHeader,
    pub items: Vec<ItemProgress>,
    pub total: Money,
}

const LEGAL_ENTITY_WORDS: [&str; 8] = [
    "株式会社",
    "有限会社",
    "合同会社",
    "Co., Ltd.",
    "Co.,Ltd.",
    "Ltd.",
    "Inc.",
    "LLC",
];

/// Vendor name without legal-entity designations
pub fn strip_legal_entity(name: &str) -> String {
    let mut stripped = name.to_string();
    for word in LEGAL_ENTITY_WORDS {
        stripped = stripped.replace(word, "");
    }
    stripped.trim().to_string()
}

fn product_key(product: &str, spec: &str) -> String {
    format!("{}_{}", product.trim(), spec.trim())
}

#[derive(Default)]
struct Ordered {
    qty: Decimal,
    amount: Money,
    vendors: Vec<String>,
}

/// Estimate `id` with per-line ordering progress
pub fn estimate_detail(snapshot: &Snapshot, id: &str) -> Option<EstimateDetail> {
    let id = id.trim();
    let estimate = snapshot.estimates.iter().find(|e| e.header.id == id)?;

    let mut ordered: HashMap<String, Ordered> = HashMap::new();
    for order in snapshot
        .orders
        .iter()
        .filter(|o| fk_matches(&o.header.estimate_id, id))
    {
        let vendor = strip_legal_entity(&order.header.vendor);
        for line in &order.items {
            let entry = ordered
                .entry(product_key(&line.product, &line.spec))
                .or_default();
            entry.qty += line.qty;
            entry.amount += line.amount;
            if !vendor.is_empty() && !entry.vendors.contains(&vendor) {
                entry.vendors.push(vendor.clone());
            }
        }
    }

    let items = estimate
        .items
        .iter()
        .map(|item| {
            let progress = ordered
                .get(&product_key(&item.product, &item.spec))
                .map(|o| (o.qty, o.amount, o.vendors.clone()))
                .unwrap_or_default();
            ItemProgress {
                item: item.clone(),
                ordered_qty: progress.0,
                ordered_amount: progress.1,
                ordered_vendors: progress.2,
            }
        })
        .collect();

    Some(EstimateDetail {
        header: estimate.header.clone(),
        items,
        total: estimate.total(),
    })
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// One row of the order list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderListing {
    #[serde(flatten)]
    pub header: OrderHeader,
    pub total: Money,
    /// Sum of non-cancelled payments recorded against the order
    pub paid: Money,
    pub payment_count: usize,
    /// Project name of the related estimate
    pub project: String,
    /// Whether an order document for the vendor exists
    pub has_document: bool,
}

/// File-name prefix of order documents for `vendor`
pub fn order_document_prefix(vendor: &str) -> String {
    format!("order_{}", sanitize_file_name(vendor.trim()))
}

/// Every order with payment totals, newest first
///
/// # Arguments
///
/// * `snapshot` - All stores
/// * `document_names` - File names in the document folder
pub fn order_listings(snapshot: &Snapshot, document_names: &[String]) -> Vec<OrderListing> {
    let mut paid: HashMap<&str, Rollup> = HashMap::new();
    for payment in snapshot.payments.iter().filter(|p| !is_cancelled(&p.status)) {
        let order_id = payment.order_id.trim();
        if order_id.is_empty() {
            continue;
        }
        let entry = paid.entry(order_id).or_default();
        entry.total += payment.amount;
        entry.count += 1;
    }
    let projects: HashMap<&str, &str> = snapshot
        .estimates
        .iter()
        .map(|e| (e.header.id.as_str(), e.header.project.as_str()))
        .collect();

    let mut listings: Vec<OrderListing> = snapshot
        .orders
        .iter()
        .map(|order| {
            let h = &order.header;
            let payments = paid.get(h.id.as_str()).copied().unwrap_or_default();
            let project = fk_candidates(&h.estimate_id)
                .find_map(|parent| projects.get(parent).copied())
                .unwrap_or_default()
                .to_string();
            let prefix = order_document_prefix(&h.vendor);
            OrderListing {
                header: h.clone(),
                total: order.total(),
                paid: payments.total,
                payment_count: payments.count,
                project,
                has_document: document_names.iter().any(|n| n.contains(&prefix)),
            }
        })
        .collect();
    sort_newest_first(&mut listings, |l| l.header.date);
    listings
}

/// An order with the related estimate's terms filled in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetail {
    pub header: OrderHeader,
    pub items: Vec<OrderItem>,
    pub project: String,
    pub period: String,
    pub payment_terms: String,
    pub expiry: String,
}

pub fn order_detail(snapshot: &Snapshot, id: &str) -> Option<OrderDetail> {
    let id = id.trim();
    let order = snapshot.orders.iter().find(|o| o.header.id == id)?;
    let mut detail = OrderDetail {
        header: order.header.clone(),
        items: order.items.clone(),
        project: String::new(),
        period: String::new(),
        payment_terms: String::new(),
        expiry: String::new(),
    };
    let related = fk_candidates(&order.header.estimate_id)
        .find_map(|parent| snapshot.estimates.iter().find(|e| e.header.id == parent));
    if let Some(estimate) = related {
        let e = &estimate.header;
        detail.project = e.project.clone();
        detail.period = e.period.clone();
        detail.payment_terms = e.payment_terms.clone();
        detail.expiry = e.expiry.clone();
        if detail.header.location.is_empty() {
            detail.header.location = e.location.clone();
        }
    }
    Some(detail)
}

/// First order whose estimate id and vendor both equal the inputs
pub fn find_order_id(snapshot: &Snapshot, estimate_id: &str, vendor: &str) -> Option<String> {
    let estimate_id = estimate_id.trim();
    let vendor = vendor.trim();
    if estimate_id.is_empty() || vendor.is_empty() {
        return None;
    }
    snapshot
        .orders
        .iter()
        .find(|o| o.header.estimate_id == estimate_id && o.header.vendor == vendor)
        .map(|o| o.header.id.clone())
}

// ---------------------------------------------------------------------------
// Lists and lookups
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveProject {
    pub id: String,
    /// "client project", for pickers
    pub name: String,
    pub client: String,
    pub project: String,
}

/// Estimates that are neither completed nor lost, most recently added first
pub fn active_projects(snapshot: &Snapshot) -> Vec<ActiveProject> {
    snapshot
        .estimates
        .iter()
        .rev()
        .filter(|e| e.header.status != status::COMPLETED && e.header.status != status::LOST)
        .map(|e| ActiveProject {
            id: e.header.id.clone(),
            name: format!("{} {}", e.header.client, e.header.project)
                .trim()
                .to_string(),
            client: e.header.client.clone(),
            project: e.header.project.clone(),
        })
        .collect()
}

/// Every estimate for exactly `client`, most recently added first
pub fn client_history(snapshot: &Snapshot, client: &str) -> Vec<Estimate> {
    let client = client.trim();
    if client.is_empty() {
        return Vec::new();
    }
    snapshot
        .estimates
        .iter()
        .rev()
        .filter(|e| e.header.client == client)
        .cloned()
        .collect()
}

pub fn deposits_by_estimate(snapshot: &Snapshot, estimate_id: &str) -> Vec<Deposit> {
    let estimate_id = estimate_id.trim();
    snapshot
        .deposits
        .iter()
        .filter(|d| !estimate_id.is_empty() && d.estimate_id == estimate_id)
        .cloned()
        .collect()
}

pub fn payments_by_order(snapshot: &Snapshot, order_id: &str) -> Vec<Payment> {
    let order_id = order_id.trim();
    snapshot
        .payments
        .iter()
        .filter(|p| !order_id.is_empty() && p.order_id == order_id)
        .cloned()
        .collect()
}

/// Effective accounting date of an invoice: its date, else its registration time
pub fn invoice_date(invoice: &Invoice) -> Option<NaiveDate> {
    invoice
        .date
        .or_else(|| crate::types::value::parse_date_str(&invoice.registered_at))
}

/// Years with invoice, deposit or payment activity, newest first
pub fn journal_years(snapshot: &Snapshot, current_year: i32) -> Vec<i32> {
    let years: BTreeSet<i32> = snapshot
        .invoices
        .iter()
        .filter_map(invoice_date)
        .chain(snapshot.deposits.iter().filter_map(|d| d.date))
        .chain(snapshot.payments.iter().filter_map(|p| p.date))
        .map(|d| d.year())
        .collect();
    if years.is_empty() {
        return vec![current_year];
    }
    years.into_iter().rev().collect()
}

/// Known client and vendor names
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counterparties {
    pub clients: Vec<String>,
    pub vendors: Vec<String>,
}

/// Distinct counterparty names seen in any store, sorted
pub fn counterparties(snapshot: &Snapshot) -> Counterparties {
    let clients: BTreeSet<String> = snapshot
        .estimates
        .iter()
        .map(|e| e.header.client.clone())
        .chain(snapshot.deposits.iter().map(|d| d.client.clone()))
        .filter(|n| !n.is_empty())
        .collect();
    let vendors: BTreeSet<String> = snapshot
        .orders
        .iter()
        .map(|o| o.header.vendor.clone())
        .chain(
            snapshot
                .estimates
                .iter()
                .flat_map(|e| e.items.iter().map(|i| i.vendor.clone())),
        )
        .chain(snapshot.invoices.iter().map(|i| i.supplier.clone()))
        .chain(snapshot.payments.iter().map(|p| p.supplier.clone()))
        .filter(|n| !n.is_empty())
        .collect();
    Counterparties {
        clients: clients.into_iter().collect(),
        vendors: vendors.into_iter().collect(),
    }
}

/// A product as most recently priced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub category: String,
    pub product: String,
    pub spec: String,
    pub unit: String,
    pub cost: Money,
    pub price: Money,
}

/// Distinct priced products from estimate history, most recent first
pub fn product_catalog(snapshot: &Snapshot) -> Vec<CatalogEntry> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut catalog = Vec::new();
    for item in snapshot
        .estimates
        .iter()
        .rev()
        .flat_map(|e| e.items.iter().rev())
    {
        if item.product.is_empty() || item.price.is_zero() {
            continue;
        }
        if !seen.insert(product_key(&item.product, &item.spec)) {
            continue;
        }
        catalog.push(CatalogEntry {
            category: item.category.clone(),
            product: item.product.clone(),
            spec: item.spec.clone(),
            unit: item.unit.clone(),
            cost: item.cost,
            price: item.price,
        });
    }
    catalog
}

// ---------------------------------------------------------------------------
// Set master
// ---------------------------------------------------------------------------

// set sheet columns: name, category, product, spec, qty, unit, price, amount, remarks
const SET_NAME: usize = 0;
const SET_CATEGORY: usize = 1;
const SET_PRODUCT: usize = 2;
const SET_SPEC: usize = 3;
const SET_QTY: usize = 4;
const SET_UNIT: usize = 5;
const SET_PRICE: usize = 6;
const SET_AMOUNT: usize = 7;
const SET_REMARKS: usize = 8;

fn set_text(row: &[Cell], column: usize) -> String {
    row.get(column).map(Cell::display).unwrap_or_default()
}

fn set_money(row: &[Cell], column: usize) -> Money {
    row.get(column).map(parse_currency).unwrap_or_default()
}

/// One set of the set master, with its lines summed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetSummary {
    pub name: String,
    pub first_item: String,
    pub total_price: Money,
    pub count: usize,
}

/// A set line, ready to be copied into an estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetItem {
    pub category: String,
    pub product: String,
    pub spec: String,
    pub qty: Money,
    pub unit: String,
    pub price: Money,
    pub amount: Money,
    pub remarks: String,
}

/// Sets whose name contains every whitespace-separated keyword
///
/// Keywords and names are compared half-width and case-insensitively; an
/// empty keyword lists every set. A line counts its amount, or price times
/// quantity when the amount is not positive. Sets totalling zero or less are
/// left out. `rows` is the whole sheet, header row included.
pub fn search_sets(rows: &[Vec<Cell>], keyword: &str) -> Vec<SetSummary> {
    let keyword = to_half_width(keyword).to_lowercase();
    let keywords: Vec<&str> = keyword.split_whitespace().collect();

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut sets: Vec<SetSummary> = Vec::new();
    for row in rows.iter().skip(1) {
        let name = set_text(row, SET_NAME);
        if name.is_empty() {
            continue;
        }
        let folded = to_half_width(&name).to_lowercase();
        if !keywords.iter().all(|k| folded.contains(k)) {
            continue;
        }
        let slot = *index.entry(name.clone()).or_insert_with(|| {
            sets.push(SetSummary {
                first_item: set_text(row, SET_PRODUCT),
                name,
                total_price: Money::ZERO,
                count: 0,
            });
            sets.len() - 1
        });
        let amount = set_money(row, SET_AMOUNT);
        let line = if amount > Money::ZERO {
            amount
        } else {
            set_money(row, SET_PRICE) * set_money(row, SET_QTY)
        };
        let set = &mut sets[slot];
        set.count += 1;
        set.total_price += line;
    }
    sets.retain(|s| s.total_price > Money::ZERO);
    sets
}

/// The lines of one set, in sheet order
///
/// A blank price is derived as amount / quantity (rounded) when both are
/// positive. A blank amount is derived as quantity × price; a non-zero amount,
/// discounts included, is kept as written.
pub fn set_items(rows: &[Vec<Cell>], name: &str) -> Vec<SetItem> {
    rows.iter()
        .skip(1)
        .filter(|row| set_text(row, SET_NAME) == name)
        .map(|row| {
            let qty = set_money(row, SET_QTY);
            let raw_price = set_money(row, SET_PRICE);
            let raw_amount = set_money(row, SET_AMOUNT);
            let price = if !raw_price.is_zero() {
                raw_price
            } else if qty > Money::ZERO && raw_amount > Money::ZERO {
                round_money(raw_amount / qty)
            } else {
                Money::ZERO
            };
            let amount = if raw_amount.is_zero() {
                round_money(qty * price)
            } else {
                raw_amount
            };
            SetItem {
                category: set_text(row, SET_CATEGORY),
                product: set_text(row, SET_PRODUCT),
                spec: set_text(row, SET_SPEC),
                qty,
                unit: set_text(row, SET_UNIT),
                price,
                amount,
                remarks: set_text(row, SET_REMARKS),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    fn money(v: i64) -> Money {
        Decimal::new(v, 0)
    }

    fn estimate(id: &str, client: &str, when: Option<NaiveDate>, amounts: &[i64]) -> Estimate {
        Estimate {
            header: EstimateHeader {
                id: id.to_string(),
                date: when,
                client: client.to_string(),
                project: format!("{} project", client),
                ..Default::default()
            },
            items: amounts
                .iter()
                .enumerate()
                .map(|(i, a)| EstimateItem {
                    product: format!("P{}", i),
                    qty: Decimal::ONE,
                    amount: money(*a),
                    ..Default::default()
                })
                .collect(),
        }
    }

    fn order(id: &str, estimate_id: &str, vendor: &str, amount: i64) -> Order {
        Order {
            header: OrderHeader {
                id: id.to_string(),
                estimate_id: estimate_id.to_string(),
                vendor: vendor.to_string(),
                ..Default::default()
            },
            items: vec![OrderItem {
                product: "P0".to_string(),
                qty: Decimal::new(2, 0),
                amount: money(amount),
                ..Default::default()
            }],
        }
    }

    fn invoice(construction_id: &str, supplier: &str, payment: i64) -> Invoice {
        Invoice {
            id: format!("INV-{}", supplier),
            construction_id: construction_id.to_string(),
            supplier: supplier.to_string(),
            payment: money(payment),
            ..Default::default()
        }
    }

    fn deposit(estimate_id: &str, amount: i64, status_label: &str) -> Deposit {
        Deposit {
            id: format!("DEP-{}", amount),
            estimate_id: estimate_id.to_string(),
            amount: money(amount),
            status: status_label.to_string(),
            ..Default::default()
        }
    }

    fn scenario() -> Snapshot {
        Snapshot {
            estimates: vec![estimate("0000001-00", "Acme", date(2024, 3, 1), &[60000, 40000])],
            orders: vec![order("0000001-00", "0000001-00", "North Steel", 40000)],
            invoices: vec![invoice("0000001-00", "North Steel", 35000)],
            deposits: vec![
                deposit("0000001-00", 50000, status::CONFIRMED),
                deposit("0000001-00", 9999, status::CANCELLED),
            ],
            payments: vec![],
        }
    }

    #[rstest]
    #[case::exact("0000001-00", "0000001-00", true)]
    #[case::sub_identifier("0000001-00-2", "0000001-00", true)]
    #[case::no_dash("0000001-001", "0000001-00", false)]
    #[case::other("0000002-00", "0000001-00", false)]
    #[case::empty_fk("", "0000001-00", false)]
    #[case::padded(" 0000001-00 ", "0000001-00", true)]
    fn test_fk_matches(#[case] fk: &str, #[case] id: &str, #[case] expected: bool) {
        assert_eq!(fk_matches(fk, id), expected);
        // the indexed form agrees with the direct rule
        assert_eq!(fk_candidates(fk).any(|c| c == id.trim()), expected);
    }

    #[test]
    fn test_project_summary_scenario() {
        let summaries = project_summaries(&scenario());
        assert_eq!(summaries.len(), 1);
        let s = &summaries[0];
        assert_eq!(s.sales, money(100000));
        assert_eq!(s.cost, money(40000));
        assert_eq!(s.invoiced, money(35000));
        assert_eq!(s.deposited, money(50000));
        assert_eq!(s.profit, money(60000));
        assert_eq!((s.order_count, s.invoice_count, s.deposit_count), (1, 1, 1));
        assert_eq!(s.status, status::DRAFT);
    }

    #[test]
    fn test_dangling_and_empty_keys_contribute_nothing() {
        let mut snapshot = scenario();
        snapshot.orders.push(order("0000009-00", "9999999-00", "Ghost", 1));
        snapshot.orders.push(order("0000010-00", "", "Ghost", 1));
        let s = &project_summaries(&snapshot)[0];
        assert_eq!(s.cost, money(40000));
    }

    #[test]
    fn test_summaries_sorted_newest_first() {
        let snapshot = Snapshot {
            estimates: vec![
                estimate("A", "x", date(2024, 1, 1), &[1]),
                estimate("B", "x", None, &[1]),
                estimate("C", "x", date(2024, 6, 1), &[1]),
            ],
            ..Default::default()
        };
        let ids: Vec<String> = project_summaries(&snapshot).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_vendor_balance_uses_fuzzy_names() {
        let mut snapshot = scenario();
        snapshot.orders.push(order("0000002-00", "0000001-00-1", "North　Steel Co", 10000));
        snapshot.orders.push(order("0000003-00", "0000001-00", "Borealis", 5000));
        // a blank vendor belongs to nobody
        snapshot.orders.push(order("0000004-00", "0000001-00", " ", 7000));
        let balance = vendor_balance(&snapshot, "0000001-00", "NorthSteel");
        assert_eq!(balance.ordered, money(50000));
        assert_eq!(balance.invoiced, money(35000));
        assert_eq!(balance.balance, money(15000));

        let none = vendor_balance(&snapshot, "0000001-00", "");
        assert_eq!(none.balance, Decimal::ZERO);
    }

    #[test]
    fn test_monthly_analysis_buckets_and_ranking() {
        let snapshot = Snapshot {
            estimates: vec![
                estimate("A", "Beta", date(2024, 3, 1), &[100]),
                estimate("B", "Alpha", date(2024, 3, 20), &[300]),
                estimate("C", "Gamma", date(2024, 7, 1), &[100]),
                estimate("D", "", date(2024, 7, 2), &[50]),
                estimate("E", "Alpha", date(2023, 7, 2), &[9999]),
            ],
            orders: vec![order("O1", "B", "V", 120)],
            ..Default::default()
        };
        let summaries = project_summaries_in_store_order(&snapshot);
        let analysis = monthly_analysis(&summaries, 2024);

        assert_eq!(analysis.months.len(), 12);
        assert_eq!(analysis.months[2].sales, money(400));
        assert_eq!(analysis.months[2].cost, money(120));
        assert_eq!(analysis.months[2].profit, money(280));
        assert_eq!(analysis.months[6].sales, money(150));

        let names: Vec<&str> = analysis.ranking.iter().map(|r| r.client.as_str()).collect();
        // Beta and Gamma tie on 100 and keep first-seen order
        assert_eq!(names, vec!["Alpha", "Beta", "Gamma", UNKNOWN_CLIENT]);
    }

    #[test]
    fn test_ranking_is_capped() {
        let estimates = (0..15)
            .map(|i| estimate(&format!("E{}", i), &format!("C{}", i), date(2024, 1, 1), &[i]))
            .collect();
        let snapshot = Snapshot {
            estimates,
            ..Default::default()
        };
        let analysis = monthly_analysis(&project_summaries_in_store_order(&snapshot), 2024);
        assert_eq!(analysis.ranking.len(), RANKING_SIZE);
        assert_eq!(analysis.ranking[0].client, "C14");
    }

    #[rstest]
    #[case::zero_sales(0, 0, "0")]
    #[case::even(40000, 100000, "40.0")]
    #[case::rounded(1, 3, "33.3")]
    #[case::half_up(1, 8, "12.5")]
    #[case::loss(-50, 200, "-25.0")]
    fn test_profit_rate(#[case] profit: i64, #[case] sales: i64, #[case] expected: &str) {
        let rate = profit_rate(money(profit), money(sales));
        assert_eq!(rate, expected.parse::<Decimal>().unwrap());
    }

    #[test]
    fn test_project_ledger_joins() {
        let mut snapshot = scenario();
        snapshot.payments = vec![
            Payment {
                id: "PAY-1".to_string(),
                order_id: "0000001-00".to_string(),
                amount: money(20000),
                ..Default::default()
            },
            Payment {
                id: "PAY-2".to_string(),
                project: "Acme project".to_string(),
                amount: money(5000),
                ..Default::default()
            },
            Payment {
                id: "PAY-3".to_string(),
                order_id: "0000001-00".to_string(),
                amount: money(777),
                status: status::CANCELLED.to_string(),
                ..Default::default()
            },
            Payment {
                id: "PAY-4".to_string(),
                order_id: "0000042-00".to_string(),
                amount: money(1),
                ..Default::default()
            },
        ];
        let ledger = project_ledger(&snapshot, "0000001-00").unwrap();
        assert_eq!(ledger.sales, money(100000));
        assert_eq!(ledger.cost, money(40000));
        assert_eq!(ledger.profit, money(60000));
        assert_eq!(ledger.profit_rate, "60.0".parse::<Decimal>().unwrap());
        assert_eq!(ledger.deposits.len(), 1);
        assert_eq!(ledger.deposited, money(50000));
        let paid: Vec<&str> = ledger.payments.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(paid, vec!["PAY-1", "PAY-2"]);
        assert_eq!(ledger.paid, money(25000));

        assert!(project_ledger(&snapshot, "missing").is_none());
    }

    #[test]
    fn test_ledger_without_sales_has_zero_rate() {
        let snapshot = Snapshot {
            estimates: vec![estimate("E", "x", None, &[])],
            orders: vec![order("O", "E", "V", 500)],
            ..Default::default()
        };
        let ledger = project_ledger(&snapshot, "E").unwrap();
        assert_eq!(ledger.profit, money(-500));
        assert_eq!(ledger.profit_rate, Decimal::ZERO);
    }

    #[test]
    fn test_estimate_detail_progress() {
        let mut snapshot = scenario();
        snapshot.orders.push(order("0000002-00", "0000001-00", "株式会社North Steel", 500));
        snapshot.orders.push(order("0000003-00", "0000001-00", "Borealis Ltd.", 700));
        let detail = estimate_detail(&snapshot, "0000001-00").unwrap();
        let first = &detail.items[0];
        assert_eq!(first.ordered_qty, Decimal::new(6, 0));
        assert_eq!(first.ordered_amount, money(41200));
        assert_eq!(first.ordered_vendors, vec!["North Steel", "Borealis"]);
        assert_eq!(detail.items[1].ordered_qty, Decimal::ZERO);
        assert_eq!(detail.total, money(100000));
    }

    #[test]
    fn test_order_listings() {
        let mut snapshot = scenario();
        snapshot.payments = vec![
            Payment {
                order_id: "0000001-00".to_string(),
                amount: money(15000),
                ..Default::default()
            },
            Payment {
                order_id: "0000001-00".to_string(),
                amount: money(1),
                status: status::CANCELLED.to_string(),
                ..Default::default()
            },
        ];
        let docs = vec!["order_North Steel_0000001-00.pdf".to_string()];
        let listings = order_listings(&snapshot, &docs);
        assert_eq!(listings[0].total, money(40000));
        assert_eq!(listings[0].paid, money(15000));
        assert_eq!(listings[0].payment_count, 1);
        assert_eq!(listings[0].project, "Acme project");
        assert!(listings[0].has_document);
    }

    #[test]
    fn test_order_detail_fills_from_estimate() {
        let mut snapshot = scenario();
        snapshot.estimates[0].header.period = "April".to_string();
        snapshot.estimates[0].header.location = "Dock 4".to_string();
        let detail = order_detail(&snapshot, "0000001-00").unwrap();
        assert_eq!(detail.project, "Acme project");
        assert_eq!(detail.period, "April");
        assert_eq!(detail.header.location, "Dock 4");
        assert!(order_detail(&snapshot, "nope").is_none());
    }

    #[test]
    fn test_find_order_id_is_exact() {
        let snapshot = scenario();
        assert_eq!(
            find_order_id(&snapshot, " 0000001-00 ", "North Steel"),
            Some("0000001-00".to_string())
        );
        assert_eq!(find_order_id(&snapshot, "0000001-00", "North"), None);
        assert_eq!(find_order_id(&snapshot, "", "North Steel"), None);
    }

    #[test]
    fn test_active_projects_and_history() {
        let mut snapshot = Snapshot {
            estimates: vec![
                estimate("A", "Acme", None, &[1]),
                estimate("B", "Acme", None, &[1]),
                estimate("C", "Other", None, &[1]),
            ],
            ..Default::default()
        };
        snapshot.estimates[1].header.status = status::COMPLETED.to_string();
        let active: Vec<String> = active_projects(&snapshot).into_iter().map(|p| p.id).collect();
        assert_eq!(active, vec!["C", "A"]);
        let history: Vec<String> = client_history(&snapshot, "Acme")
            .into_iter()
            .map(|e| e.header.id)
            .collect();
        assert_eq!(history, vec!["B", "A"]);
    }

    #[test]
    fn test_journal_years() {
        let snapshot = Snapshot {
            invoices: vec![Invoice {
                registered_at: "2022/05/01 10:00".to_string(),
                ..Default::default()
            }],
            deposits: vec![Deposit {
                date: date(2024, 1, 1),
                ..Default::default()
            }],
            payments: vec![Payment {
                date: date(2024, 2, 1),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(journal_years(&snapshot, 2030), vec![2024, 2022]);
        assert_eq!(journal_years(&Snapshot::default(), 2030), vec![2030]);
    }

    #[test]
    fn test_counterparties_and_catalog() {
        let mut snapshot = scenario();
        snapshot.estimates[0].items[0].price = money(30000);
        snapshot.estimates[0].items[0].vendor = "Item Vendor".to_string();
        let names = counterparties(&snapshot);
        assert_eq!(names.clients, vec!["Acme"]);
        assert_eq!(names.vendors, vec!["Item Vendor", "North Steel"]);

        let catalog = product_catalog(&snapshot);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].product, "P0");
        assert_eq!(catalog[0].price, money(30000));
    }

    fn set_sheet(lines: &[(&str, &str, i64, i64, i64)]) -> Vec<Vec<Cell>> {
        let mut rows = vec![["Set", "Category", "Product", "Spec", "Qty", "Unit", "Price", "Amount", "Remarks"]
            .iter()
            .map(|t| Cell::text(*t))
            .collect::<Vec<_>>()];
        for (set, product, qty, price, amount) in lines {
            let number = |v: i64| if v == 0 { Cell::Empty } else { Cell::number(money(v)) };
            rows.push(vec![
                Cell::text(*set),
                Cell::text("Interior"),
                Cell::text(*product),
                Cell::Empty,
                number(*qty),
                Cell::text("pcs"),
                number(*price),
                number(*amount),
                Cell::Empty,
            ]);
        }
        rows
    }

    #[rstest]
    #[case::amount_wins(&[("Bath A", "Tub", 2, 1000, 5000)], 5000)]
    #[case::price_times_qty(&[("Bath A", "Tub", 3, 1200, 0)], 3600)]
    #[case::mixed_lines(&[("Bath A", "Tub", 1, 0, 8000), ("Bath A", "Tap", 2, 500, 0)], 9000)]
    fn test_set_totals(#[case] lines: &[(&str, &str, i64, i64, i64)], #[case] total: i64) {
        let sets = search_sets(&set_sheet(lines), "");
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].first_item, "Tub");
        assert_eq!(sets[0].count, lines.len());
        assert_eq!(sets[0].total_price, money(total));
    }

    #[rstest]
    #[case::every_keyword("bath kit", vec!["Bath Kit"])]
    #[case::full_width_keyword("ＢＡＴＨ", vec!["Bath Kit", "Bath Basic"])]
    #[case::empty_keyword("  ", vec!["Bath Kit", "Bath Basic", "Kitchen"])]
    #[case::no_match("garage", vec![])]
    fn test_search_sets_by_keywords(#[case] keyword: &str, #[case] expected: Vec<&str>) {
        let rows = set_sheet(&[
            ("Bath Kit", "Tub", 1, 0, 9000),
            ("Bath Basic", "Tub", 1, 7000, 0),
            ("Kitchen", "Sink", 1, 4000, 0),
            ("Free Gift", "Towel", 1, 0, 0),
            ("", "Orphan", 1, 100, 0),
        ]);
        let names: Vec<String> = search_sets(&rows, keyword).into_iter().map(|s| s.name).collect();
        assert_eq!(names, expected);
    }

    #[rstest]
    #[case::price_kept(2, 1500, 0, 1500, 3000)]
    #[case::price_from_amount(3, 0, 1000, 333, 1000)]
    #[case::no_price_without_qty(0, 0, 1000, 0, 1000)]
    #[case::discount_amount_kept(1, 0, -500, 0, -500)]
    fn test_set_item_fallbacks(
        #[case] qty: i64,
        #[case] price: i64,
        #[case] amount: i64,
        #[case] expected_price: i64,
        #[case] expected_amount: i64,
    ) {
        let rows = set_sheet(&[("Bath Kit", "Tub", qty, price, amount), ("Other", "Sink", 1, 1, 1)]);
        let items = set_items(&rows, "Bath Kit");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product, "Tub");
        assert_eq!(items[0].unit, "pcs");
        assert_eq!(items[0].price, money(expected_price));
        assert_eq!(items[0].amount, money(expected_amount));
    }
}
