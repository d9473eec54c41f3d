//! Operation facade over the stores, aggregator and collaborators
//!
//! [`LedgerService`] is the single entry point the command line and any other
//! front end use. Reads decode a fresh [`Snapshot`] (through the read cache
//! where the aggregate is cacheable). Every mutation runs inside the
//! store-wide `ledger` lock, invalidates the whole cache key set when it
//! succeeds, and reports its outcome as a [`WriteResult`].

use crate::core::aggregator::{
    self, ActiveProject, CatalogEntry, Counterparties, EstimateDetail, MonthlyAnalysis,
    OrderDetail, OrderListing, ProjectLedger, ProjectSummary, SetItem, SetSummary, Snapshot,
    VendorBalance,
};
use crate::core::cache::{CacheKey, ReadCache};
use crate::core::documents::{
    estimate_context, ledger_context, order_context, DocumentKind, Publisher,
};
use crate::core::extraction::{
    self, mime_from_name, parse_text_invoice, ExtractedInvoice, InferenceClient, InlineData,
};
use crate::core::journal::{
    self, default_config_rows, parse_config, JournalConfig, JournalExport, JournalRequest,
    JournalTable,
};
use crate::core::retry::RetryPolicy;
use crate::core::sequence::{invoice_id, CounterKey, SequenceGenerator};
use crate::core::store::RecordStore;
use crate::grid::{
    BlobStore, Clock, FileRef, GridStore, KeyValueCache, LockService, MemoryBlobStore,
    MemoryCache, MemoryProperties, PreviewRenderer, ProcessLocks, PropertyStore, ScopedLock,
    TemplateRenderer,
};
use crate::types::value::{format_timestamp, round_money, Money};
use crate::types::{
    status, Cell, Deposit, Estimate, Invoice, LedgerConfig, LedgerError, Order, OrderHeader,
    OrderItem, Payment, WriteResult,
};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use log::{info, warn};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Name of the store-wide mutation lock
pub const STORE_LOCK: &str = "ledger";

/// Recorded as creator/registrant when no operator is set
pub const DEFAULT_OPERATOR: &str = "system";

const PUBLIC: &str = "public";
const DEFAULT_METHOD: &str = "transfer";

/// The external collaborators one service instance works against
#[derive(Clone)]
pub struct Backends {
    pub grid: Arc<dyn GridStore>,
    pub properties: Arc<dyn PropertyStore>,
    pub locks: Arc<dyn LockService>,
    pub cache: Arc<dyn KeyValueCache>,
    pub blobs: Arc<dyn BlobStore>,
    pub renderer: Arc<dyn TemplateRenderer>,
    pub clock: Arc<dyn Clock>,
}

impl Backends {
    /// `grid` and `clock` with in-memory versions of everything else
    pub fn with_grid(grid: Arc<dyn GridStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            grid,
            properties: Arc::new(MemoryProperties::new()),
            locks: Arc::new(ProcessLocks::new()),
            cache: Arc::new(MemoryCache::new()),
            blobs: Arc::new(MemoryBlobStore::new()),
            renderer: Arc::new(PreviewRenderer),
            clock,
        }
    }
}

/// Project ledger operations
pub struct LedgerService {
    config: LedgerConfig,
    backends: Backends,
    sequences: SequenceGenerator,
    cache: ReadCache,
    retry: RetryPolicy,
    operator: String,
}

impl LedgerService {
    pub fn new(config: LedgerConfig, backends: Backends) -> Self {
        let sequences = SequenceGenerator::new(
            backends.properties.clone(),
            backends.locks.clone(),
            config.sequence_lock_timeout(),
        );
        let cache = ReadCache::new(
            backends.cache.clone(),
            config.cache_ttl.clone(),
            config.analysis_years_back,
            config.analysis_years_ahead,
        );
        let retry = RetryPolicy::from_settings(&config.retry);
        Self {
            config,
            backends,
            sequences,
            cache,
            retry,
            operator: DEFAULT_OPERATOR.to_string(),
        }
    }

    /// Record `operator` as the creator of new orders, deposits and payments
    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = operator.into();
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    fn estimates(&self) -> RecordStore<'_, Estimate> {
        RecordStore::new(self.backends.grid.as_ref(), &self.config.sheets.estimates)
    }

    fn orders(&self) -> RecordStore<'_, Order> {
        RecordStore::new(self.backends.grid.as_ref(), &self.config.sheets.orders)
    }

    fn invoices(&self) -> RecordStore<'_, Invoice> {
        RecordStore::new(self.backends.grid.as_ref(), &self.config.sheets.invoices)
    }

    fn deposits(&self) -> RecordStore<'_, Deposit> {
        RecordStore::new(self.backends.grid.as_ref(), &self.config.sheets.deposits)
    }

    fn payments(&self) -> RecordStore<'_, Payment> {
        RecordStore::new(self.backends.grid.as_ref(), &self.config.sheets.payments)
    }

    fn publisher(&self) -> Publisher<'_> {
        Publisher::new(
            self.backends.blobs.as_ref(),
            self.backends.renderer.as_ref(),
            &self.config.document_folder,
        )
    }

    fn now(&self) -> NaiveDateTime {
        self.backends.clock.now()
    }

    fn today(&self) -> NaiveDate {
        self.now().date()
    }

    /// Decode every store
    pub fn snapshot(&self) -> Result<Snapshot, LedgerError> {
        Ok(Snapshot {
            estimates: self.estimates().list()?,
            orders: self.orders().list()?,
            invoices: self.invoices().list()?,
            deposits: self.deposits().list()?,
            payments: self.payments().list()?,
        })
    }

    /// Run `write` under the store lock, then drop every cached aggregate
    ///
    /// The cache is dropped whatever `write` returns: a write that fails
    /// midway may already have changed a store.
    fn mutate<T, F>(&self, write: F) -> Result<T, LedgerError>
    where
        F: FnOnce() -> Result<T, LedgerError>,
    {
        let _guard = ScopedLock::acquire(
            self.backends.locks.as_ref(),
            STORE_LOCK,
            self.config.store_lock_timeout(),
        )?;
        let result = write();
        self.cache.invalidate_all(self.today().year());
        result
    }

    fn report(action: &str, result: Result<String, LedgerError>) -> WriteResult {
        match &result {
            Ok(id) => info!("{} {}", action, id),
            Err(e) => warn!("{} failed: {}", action, e),
        }
        result.into()
    }

    // -----------------------------------------------------------------------
    // Cached reads
    // -----------------------------------------------------------------------

    /// One summary per estimate, newest first
    pub fn project_summaries(&self) -> Result<Vec<ProjectSummary>, LedgerError> {
        self.cache.get_or_compute(CacheKey::Projects, || {
            Ok(aggregator::project_summaries(&self.snapshot()?))
        })
    }

    pub fn active_projects(&self) -> Result<Vec<ActiveProject>, LedgerError> {
        self.cache.get_or_compute(CacheKey::ActiveProjects, || {
            Ok(aggregator::active_projects(&self.snapshot()?))
        })
    }

    /// Order list with paid totals and document flags, newest first
    pub fn order_list(&self) -> Result<Vec<OrderListing>, LedgerError> {
        self.cache.get_or_compute(CacheKey::Orders, || {
            let documents = self.publisher().file_names()?;
            Ok(aggregator::order_listings(&self.snapshot()?, &documents))
        })
    }

    /// Every deposit, latest entry first
    pub fn deposit_list(&self) -> Result<Vec<Deposit>, LedgerError> {
        self.cache.get_or_compute(CacheKey::Deposits, || {
            let mut deposits = self.deposits().list()?;
            deposits.reverse();
            Ok(deposits)
        })
    }

    /// Every payment, latest entry first
    pub fn payment_list(&self) -> Result<Vec<Payment>, LedgerError> {
        self.cache.get_or_compute(CacheKey::Payments, || {
            let mut payments = self.payments().list()?;
            payments.reverse();
            Ok(payments)
        })
    }

    pub fn analysis(&self, year: i32) -> Result<MonthlyAnalysis, LedgerError> {
        self.cache.get_or_compute(CacheKey::Analysis(year), || {
            Ok(aggregator::monthly_analysis(&self.project_summaries()?, year))
        })
    }

    /// Known client and vendor names
    pub fn masters(&self) -> Result<Counterparties, LedgerError> {
        self.cache.get_or_compute(CacheKey::Masters, || {
            Ok(aggregator::counterparties(&self.snapshot()?))
        })
    }

    pub fn products(&self) -> Result<Vec<CatalogEntry>, LedgerError> {
        self.cache.get_or_compute(CacheKey::Products, || {
            Ok(aggregator::product_catalog(&self.snapshot()?))
        })
    }

    // -----------------------------------------------------------------------
    // Uncached reads
    // -----------------------------------------------------------------------

    pub fn estimate_detail(&self, id: &str) -> Result<Option<EstimateDetail>, LedgerError> {
        Ok(aggregator::estimate_detail(&self.snapshot()?, id))
    }

    pub fn order_detail(&self, id: &str) -> Result<Option<OrderDetail>, LedgerError> {
        Ok(aggregator::order_detail(&self.snapshot()?, id))
    }

    pub fn find_order(&self, estimate_id: &str, vendor: &str) -> Result<Option<String>, LedgerError> {
        Ok(aggregator::find_order_id(&self.snapshot()?, estimate_id, vendor))
    }

    /// Every received invoice, latest entry first
    pub fn invoice_list(&self) -> Result<Vec<Invoice>, LedgerError> {
        let mut invoices = self.invoices().list()?;
        invoices.reverse();
        Ok(invoices)
    }

    pub fn vendor_balance(
        &self,
        construction_id: &str,
        vendor: &str,
    ) -> Result<VendorBalance, LedgerError> {
        Ok(aggregator::vendor_balance(&self.snapshot()?, construction_id, vendor))
    }

    pub fn client_history(&self, client: &str) -> Result<Vec<Estimate>, LedgerError> {
        Ok(aggregator::client_history(&self.snapshot()?, client))
    }

    /// Sets of the set master matching every keyword
    pub fn search_sets(&self, keyword: &str) -> Result<Vec<SetSummary>, LedgerError> {
        let rows = self.backends.grid.read_all(&self.config.sheets.sets)?;
        Ok(aggregator::search_sets(&rows, keyword))
    }

    pub fn set_items(&self, name: &str) -> Result<Vec<SetItem>, LedgerError> {
        let rows = self.backends.grid.read_all(&self.config.sheets.sets)?;
        Ok(aggregator::set_items(&rows, name))
    }

    pub fn deposits_by_estimate(&self, estimate_id: &str) -> Result<Vec<Deposit>, LedgerError> {
        Ok(aggregator::deposits_by_estimate(&self.snapshot()?, estimate_id))
    }

    pub fn payments_by_order(&self, order_id: &str) -> Result<Vec<Payment>, LedgerError> {
        Ok(aggregator::payments_by_order(&self.snapshot()?, order_id))
    }

    pub fn project_ledger(&self, id: &str) -> Result<Option<ProjectLedger>, LedgerError> {
        Ok(aggregator::project_ledger(&self.snapshot()?, id))
    }

    pub fn journal_years(&self) -> Result<Vec<i32>, LedgerError> {
        Ok(aggregator::journal_years(&self.snapshot()?, self.today().year()))
    }

    // -----------------------------------------------------------------------
    // Journal
    // -----------------------------------------------------------------------

    /// Column mapping from the configuration sheet, seeding it when empty
    pub fn journal_config(&self) -> Result<JournalConfig, LedgerError> {
        let sheet = &self.config.sheets.journal_config;
        let rows = self.backends.grid.read_all(sheet)?;
        if !rows.is_empty() {
            return Ok(parse_config(&rows));
        }
        let rows = self.mutate(|| {
            // another writer may have seeded it while we waited
            let rows = self.backends.grid.read_all(sheet)?;
            if !rows.is_empty() {
                return Ok(rows);
            }
            let rows = default_config_rows();
            for row in &rows {
                self.backends.grid.append_row(sheet, row)?;
            }
            info!("seeded journal configuration in '{}'", sheet);
            Ok(rows)
        })?;
        Ok(parse_config(&rows))
    }

    pub fn journal_preview(&self, request: &JournalRequest) -> Result<JournalTable, LedgerError> {
        let config = self.journal_config()?;
        Ok(journal::build_journal(&self.snapshot()?, &config, request))
    }

    pub fn journal_export(&self, request: &JournalRequest) -> Result<JournalExport, LedgerError> {
        let config = self.journal_config()?;
        journal::export_journal(&self.snapshot()?, &config, request)
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Save an estimate and regenerate its vendor orders
    ///
    /// An empty id mints a new estimate id. The header date becomes today.
    /// Every order previously generated for the estimate is replaced by one
    /// order per distinct vendor among items that carry a cost or quantity.
    pub fn save_estimate(&self, estimate: Estimate) -> WriteResult {
        Self::report("saved estimate", self.mutate(|| self.write_estimate(estimate)))
    }

    /// [`save_estimate`](Self::save_estimate) for a raw JSON payload
    pub fn save_estimate_payload(&self, payload: &Value) -> WriteResult {
        let parsed = match payload.get("header") {
            Some(header) if header.is_object() => serde_json::from_value::<Estimate>(payload.clone())
                .map_err(|e| LedgerError::malformed(e.to_string())),
            _ => Err(LedgerError::malformed("Invalid data structure")),
        };
        match parsed {
            Ok(estimate) => self.save_estimate(estimate),
            Err(e) => Self::report("save estimate", Err(e)),
        }
    }

    fn write_estimate(&self, mut estimate: Estimate) -> Result<String, LedgerError> {
        if estimate.header.id.trim().is_empty() {
            estimate.header.id = self.sequences.next(CounterKey::Estimate)?;
        }
        let header = &mut estimate.header;
        header.id = header.id.trim().to_string();
        header.date = Some(self.today());
        if header.status.is_empty() {
            header.status = status::SUBMITTED.to_string();
        }
        if header.visibility.is_empty() {
            header.visibility = PUBLIC.to_string();
        }
        // order ids are minted before any store changes
        let orders = self.vendor_orders(&estimate)?;
        self.estimates().upsert(&estimate)?;

        let id = estimate.header.id.clone();
        let removed = self
            .orders()
            .delete_where(|o: &Order| o.header.estimate_id.trim() == id)?;
        if removed > 0 {
            info!("replacing {} generated orders of {}", removed, id);
        }
        for order in &orders {
            self.orders().append(order)?;
        }
        Ok(id)
    }

    /// One new order per distinct vendor, in first-seen order
    fn vendor_orders(&self, estimate: &Estimate) -> Result<Vec<Order>, LedgerError> {
        let orderable: Vec<_> = estimate
            .items
            .iter()
            .filter(|i| !i.vendor.trim().is_empty())
            .filter(|i| i.cost > Money::ZERO || i.qty > Money::ZERO)
            .collect();
        let mut seen = HashSet::new();
        let vendors: Vec<&str> = orderable
            .iter()
            .map(|i| i.vendor.trim())
            .filter(|v| seen.insert(*v))
            .collect();

        let mut orders = Vec::with_capacity(vendors.len());
        for vendor in vendors {
            let items = orderable
                .iter()
                .filter(|i| i.vendor.trim() == vendor)
                .map(|i| OrderItem {
                    category: i.category.clone(),
                    product: i.product.clone(),
                    spec: i.spec.clone(),
                    qty: i.qty,
                    unit: i.unit.clone(),
                    cost: i.cost,
                    amount: round_money(i.qty * i.cost),
                })
                .collect();
            orders.push(Order {
                header: OrderHeader {
                    id: self.sequences.next(CounterKey::Order)?,
                    date: Some(self.today()),
                    vendor: vendor.to_string(),
                    estimate_id: estimate.header.id.clone(),
                    location: estimate.header.location.clone(),
                    status: status::ORDERED.to_string(),
                    remarks: String::new(),
                    creator: self.operator.clone(),
                    visibility: PUBLIC.to_string(),
                },
                items,
            });
        }
        Ok(orders)
    }

    /// Save a standalone order, replacing the run with the same id
    pub fn save_order(&self, order: Order) -> WriteResult {
        Self::report("saved order", self.mutate(|| self.write_order(order)))
    }

    fn write_order(&self, mut order: Order) -> Result<String, LedgerError> {
        let id = order.header.id.trim().to_string();
        let id = if id.is_empty() {
            self.sequences.next(CounterKey::Order)?
        } else {
            self.orders().delete(&id)?;
            id
        };
        let header = &mut order.header;
        header.id = id.clone();
        header.date = Some(self.today());
        header.status = status::ORDERED.to_string();
        if header.creator.is_empty() {
            header.creator = self.operator.clone();
        }
        if header.visibility.is_empty() {
            header.visibility = PUBLIC.to_string();
        }
        for item in &mut order.items {
            item.amount = round_money(item.qty * item.cost);
        }
        self.orders().append(&order)?;
        Ok(id)
    }

    /// Save a received invoice
    ///
    /// An id already in the store is updated in place and keeps its stored
    /// status; anything else is appended, with a timestamp id when none is
    /// given.
    pub fn save_invoice(&self, invoice: Invoice) -> WriteResult {
        Self::report("saved invoice", self.mutate(|| self.write_invoice(invoice)))
    }

    fn write_invoice(&self, mut invoice: Invoice) -> Result<String, LedgerError> {
        let now = self.now();
        invoice.id = invoice.id.trim().to_string();
        invoice.registered_at = format_timestamp(now);
        invoice.payment = invoice.amount - invoice.offset;

        let store = self.invoices();
        let existing = if invoice.id.is_empty() {
            None
        } else {
            store.get(&invoice.id)?
        };
        match existing {
            Some(stored) => {
                invoice.status = stored.status;
                store.upsert(&invoice)?;
            }
            None => {
                if invoice.id.is_empty() {
                    invoice.id = invoice_id(now);
                }
                if invoice.status.is_empty() {
                    invoice.status = status::UNCONFIRMED.to_string();
                }
                store.append(&invoice)?;
            }
        }
        Ok(invoice.id)
    }

    pub fn update_invoice_status(&self, id: &str, new_status: &str) -> WriteResult {
        Self::report(
            "updated invoice status",
            self.mutate(|| {
                if self.invoices().set_field(id, "status", Cell::text(new_status))? {
                    Ok(id.trim().to_string())
                } else {
                    Err(LedgerError::not_found("invoice", id))
                }
            }),
        )
    }

    /// Set an estimate's status to billed
    pub fn mark_billed(&self, id: &str) -> WriteResult {
        Self::report("marked billed", self.mutate(|| self.write_billed(id)))
    }

    fn write_billed(&self, id: &str) -> Result<String, LedgerError> {
        if self
            .estimates()
            .set_field(id, "status", Cell::text(status::BILLED))?
        {
            Ok(id.trim().to_string())
        } else {
            Err(LedgerError::not_found("estimate", id))
        }
    }

    pub fn save_deposit(&self, deposit: Deposit) -> WriteResult {
        Self::report("saved deposit", self.mutate(|| self.write_deposit(deposit)))
    }

    fn write_deposit(&self, mut deposit: Deposit) -> Result<String, LedgerError> {
        let now = self.now();
        deposit.registered_at = format_timestamp(now);
        deposit.date = deposit.date.or(Some(now.date()));
        fill_default(&mut deposit.method, DEFAULT_METHOD);
        fill_default(&mut deposit.status, status::CONFIRMED);
        fill_default(&mut deposit.visibility, PUBLIC);
        deposit.registrant = self.operator.clone();
        deposit.id = deposit.id.trim().to_string();
        if deposit.id.is_empty() {
            deposit.id = self.sequences.next(CounterKey::Deposit(now.date()))?;
        }
        self.deposits().upsert(&deposit)?;
        Ok(deposit.id)
    }

    pub fn save_payment(&self, payment: Payment) -> WriteResult {
        Self::report("saved payment", self.mutate(|| self.write_payment(payment)))
    }

    fn write_payment(&self, mut payment: Payment) -> Result<String, LedgerError> {
        let now = self.now();
        payment.registered_at = format_timestamp(now);
        payment.date = payment.date.or(Some(now.date()));
        fill_default(&mut payment.method, DEFAULT_METHOD);
        fill_default(&mut payment.status, status::CONFIRMED);
        fill_default(&mut payment.visibility, PUBLIC);
        payment.registrant = self.operator.clone();
        payment.id = payment.id.trim().to_string();
        if payment.id.is_empty() {
            payment.id = self.sequences.next(CounterKey::Payment(now.date()))?;
        }
        self.payments().upsert(&payment)?;
        Ok(payment.id)
    }

    /// Remove the run with `id` from whichever stores hold it
    pub fn delete(&self, id: &str) -> WriteResult {
        Self::report(
            "deleted",
            self.mutate(|| {
                // estimate and order counters share a format, so one id may
                // remove a run from each store
                let removed = [
                    self.estimates().delete(id)?,
                    self.orders().delete(id)?,
                    self.invoices().delete(id)?,
                    self.deposits().delete(id)?,
                    self.payments().delete(id)?,
                ];
                if removed.contains(&true) {
                    Ok(id.trim().to_string())
                } else {
                    Err(LedgerError::not_found("record", id))
                }
            }),
        )
    }

    // -----------------------------------------------------------------------
    // Documents
    // -----------------------------------------------------------------------

    fn publish_report(action: &str, result: Result<(String, FileRef), LedgerError>) -> WriteResult {
        match result {
            Ok((id, file)) => {
                info!("{} {} as {}", action, id, file.name);
                WriteResult::ok_with_id(id).with_url(file.url)
            }
            Err(e) => Self::report(action, Err(e)),
        }
    }

    fn stored_estimate(&self, id: &str) -> Result<Estimate, LedgerError> {
        self.estimates()
            .get(id)?
            .ok_or_else(|| LedgerError::not_found("estimate", id))
    }

    /// Save an estimate and publish it as a quote
    pub fn publish_quote(&self, estimate: Estimate) -> WriteResult {
        let result = self.mutate(|| self.write_estimate(estimate)).and_then(|id| {
            let saved = self.stored_estimate(&id)?;
            let h = &saved.header;
            let title = if h.project.is_empty() { &h.id } else { &h.project };
            let name = DocumentKind::Quote.file_name(&[h.client.as_str(), title.as_str()]);
            let context = estimate_context(&saved, self.today(), self.config.estimate_page)?;
            let file = self.publisher().publish(DocumentKind::Quote, &name, &context)?;
            Ok((id, file))
        });
        Self::publish_report("published quote", result)
    }

    /// Mark an estimate billed and publish its bill
    pub fn publish_bill(&self, id: &str) -> WriteResult {
        let result = self.mutate(|| self.write_billed(id)).and_then(|id| {
            let estimate = self.stored_estimate(&id)?;
            let h = &estimate.header;
            let name = DocumentKind::Bill.file_name(&[h.client.as_str(), h.project.as_str()]);
            let context = estimate_context(&estimate, self.today(), self.config.estimate_page)?;
            let file = self.publisher().publish(DocumentKind::Bill, &name, &context)?;
            Ok((id, file))
        });
        Self::publish_report("published bill", result)
    }

    /// Publish an order sheet for one vendor's lines of an estimate
    ///
    /// When no line names a vendor at all, every line is ordered.
    pub fn publish_vendor_order(&self, estimate_id: &str, vendor: &str) -> WriteResult {
        let result = self.stored_estimate(estimate_id).and_then(|estimate| {
            let vendor = vendor.trim();
            let any_vendor = estimate.items.iter().any(|i| !i.vendor.trim().is_empty());
            let items: Vec<OrderItem> = estimate
                .items
                .iter()
                .filter(|i| !any_vendor || i.vendor.trim() == vendor)
                .map(|i| OrderItem {
                    category: i.category.clone(),
                    product: i.product.clone(),
                    spec: i.spec.clone(),
                    qty: i.qty,
                    unit: i.unit.clone(),
                    cost: i.cost,
                    amount: round_money(i.qty * i.cost),
                })
                .collect();
            if items.is_empty() {
                return Err(LedgerError::malformed(format!(
                    "no items ordered from '{}'",
                    vendor
                )));
            }
            let h = &estimate.header;
            let detail = OrderDetail {
                header: OrderHeader {
                    id: aggregator::find_order_id(&self.snapshot()?, &h.id, vendor)
                        .unwrap_or_default(),
                    date: Some(self.today()),
                    vendor: vendor.to_string(),
                    estimate_id: h.id.clone(),
                    location: h.location.clone(),
                    status: status::ORDERED.to_string(),
                    remarks: String::new(),
                    creator: self.operator.clone(),
                    visibility: PUBLIC.to_string(),
                },
                items: items.clone(),
                project: h.project.clone(),
                period: h.period.clone(),
                payment_terms: h.payment_terms.clone(),
                expiry: h.expiry.clone(),
            };
            let file = self.publish_order_sheet(&detail, &items)?;
            Ok((h.id.clone(), file))
        });
        Self::publish_report("published order sheet", result)
    }

    /// Reprint the order sheet of a stored order
    pub fn publish_order(&self, order_id: &str) -> WriteResult {
        let result = self.order_detail(order_id).and_then(|detail| {
            let detail = detail.ok_or_else(|| LedgerError::not_found("order", order_id))?;
            let file = self.publish_order_sheet(&detail, &detail.items)?;
            Ok((detail.header.id.clone(), file))
        });
        Self::publish_report("published order sheet", result)
    }

    fn publish_order_sheet(
        &self,
        detail: &OrderDetail,
        items: &[OrderItem],
    ) -> Result<FileRef, LedgerError> {
        let project = if detail.project.is_empty() {
            "project"
        } else {
            detail.project.as_str()
        };
        let name = DocumentKind::Order.file_name(&[detail.header.vendor.as_str(), project]);
        let context = order_context(detail, items, self.today(), self.config.order_page)?;
        let file = self.publisher().publish(DocumentKind::Order, &name, &context)?;
        // the order list flags vendors that have a sheet
        self.cache.invalidate(&[CacheKey::Orders]);
        Ok(file)
    }

    /// Publish the full ledger of one project
    pub fn publish_ledger(&self, id: &str) -> WriteResult {
        let result = self.project_ledger(id).and_then(|ledger| {
            let ledger = ledger.ok_or_else(|| LedgerError::not_found("estimate", id))?;
            let name = DocumentKind::Ledger.file_name(&[ledger.estimate.header.project.as_str()]);
            let context = ledger_context(&ledger, self.today())?;
            let file = self.publisher().publish(DocumentKind::Ledger, &name, &context)?;
            Ok((ledger.estimate.header.id.clone(), file))
        });
        Self::publish_report("published ledger", result)
    }

    // -----------------------------------------------------------------------
    // Inference
    // -----------------------------------------------------------------------

    /// Invoice scans and text files waiting in the invoice folder
    pub fn invoice_files(&self) -> Result<Vec<FileRef>, LedgerError> {
        Ok(self
            .backends
            .blobs
            .list_files(&self.config.invoice_folder)?
            .into_iter()
            .filter(|f| mime_from_name(&f.name).is_some())
            .collect())
    }

    /// Read invoice fields out of a stored file
    ///
    /// Text files are parsed locally; images and PDFs go to `client` with
    /// the active project list as context.
    pub async fn parse_invoice_file<C: InferenceClient>(
        &self,
        client: &C,
        file: &FileRef,
    ) -> Result<ExtractedInvoice, LedgerError> {
        let bytes = self.backends.blobs.read_file(&file.id)?;
        let mime_type = mime_from_name(&file.name).unwrap_or(file.mime_type.as_str());
        if mime_type == "text/plain" {
            return Ok(parse_text_invoice(&String::from_utf8_lossy(&bytes)));
        }
        let projects = self.active_projects()?;
        let document = InlineData {
            mime_type: mime_type.to_string(),
            bytes,
        };
        Ok(extraction::extract_invoice(client, &self.retry, document, &projects).await?)
    }

    /// Predict a unit price from the latest priced estimate lines
    pub async fn predict_unit_price<C: InferenceClient>(
        &self,
        client: &C,
        product: &str,
        spec: &str,
    ) -> Result<Money, LedgerError> {
        let history =
            extraction::price_history(&self.snapshot()?, self.config.price_history_limit);
        Ok(extraction::predict_unit_price(client, &self.retry, &history, product, spec).await?)
    }
}

fn fill_default(field: &mut String, default: &str) {
    if field.trim().is_empty() {
        *field = default.to_string();
    }
}
