//! Typed business entities
//!
//! Each entity converts to and from the generic [`Record`] used by the codec.
//! Conversions never fail: a field that is missing or unparseable in the grid
//! reads as empty text, zero, or no date.

use crate::types::record::{Fields, Record};
use crate::types::schema::{
    Schema, DEPOSIT_SCHEMA, ESTIMATE_SCHEMA, INVOICE_SCHEMA, ORDER_SCHEMA, PAYMENT_SCHEMA,
};
use crate::types::value::{Cell, Money};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Status labels stored in the status columns
pub mod status {
    pub const DRAFT: &str = "draft";
    pub const SUBMITTED: &str = "submitted";
    pub const BILLED: &str = "billed";
    pub const COMPLETED: &str = "completed";
    pub const LOST: &str = "lost";
    pub const ORDERED: &str = "ordered";
    pub const UNCONFIRMED: &str = "unconfirmed";
    pub const CONFIRMED: &str = "confirmed";
    pub const PAID: &str = "paid";
    pub const CANCELLED: &str = "cancelled";
}

/// A record type stored as grouped runs in one grid store
pub trait Entity: Sized + Clone {
    /// Column layout of the entity's store
    const SCHEMA: &'static Schema;

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    fn from_record(record: &Record) -> Self;

    fn to_record(&self) -> Record;
}

/// How a deposit or payment was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Check,
    Bill,
    Transfer,
    Offset,
    Other,
}

impl PaymentMethod {
    /// Classify a stored type label; unknown labels are `Other`
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "cash" => PaymentMethod::Cash,
            "check" | "cheque" => PaymentMethod::Check,
            "bill" | "promissory bill" => PaymentMethod::Bill,
            "transfer" | "bank transfer" => PaymentMethod::Transfer,
            "offset" => PaymentMethod::Offset,
            _ => PaymentMethod::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Check => "check",
            PaymentMethod::Bill => "bill",
            PaymentMethod::Transfer => "transfer",
            PaymentMethod::Offset => "offset",
            PaymentMethod::Other => "other",
        }
    }
}

fn opt_date(date: Option<NaiveDate>) -> Cell {
    Cell::date(date)
}

// ---------------------------------------------------------------------------
// Estimate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimateHeader {
    pub id: String,
    pub date: Option<NaiveDate>,
    pub client: String,
    pub location: String,
    pub project: String,
    pub period: String,
    pub payment_terms: String,
    pub expiry: String,
    pub status: String,
    pub visibility: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimateItem {
    pub category: String,
    pub product: String,
    pub spec: String,
    pub qty: Decimal,
    pub unit: String,
    pub cost: Money,
    pub price: Money,
    pub amount: Money,
    pub remarks: String,
    pub vendor: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Estimate {
    pub header: EstimateHeader,
    pub items: Vec<EstimateItem>,
}

impl Estimate {
    /// Sales total: the sum of item amounts
    pub fn total(&self) -> Money {
        self.items.iter().map(|i| i.amount).sum()
    }
}

impl Entity for Estimate {
    const SCHEMA: &'static Schema = &ESTIMATE_SCHEMA;

    fn id(&self) -> &str {
        &self.header.id
    }

    fn set_id(&mut self, id: String) {
        self.header.id = id;
    }

    fn from_record(record: &Record) -> Self {
        let header = EstimateHeader {
            id: record.id.clone(),
            date: record.date("date"),
            client: record.text("client"),
            location: record.text("location"),
            project: record.text("project"),
            period: record.text("period"),
            payment_terms: record.text("payment_terms"),
            expiry: record.text("expiry"),
            status: record.text("status"),
            visibility: record.text("visibility"),
        };
        let items = record
            .items
            .iter()
            .map(|f| EstimateItem {
                category: f.text("category"),
                product: f.text("product"),
                spec: f.text("spec"),
                qty: f.money("qty"),
                unit: f.text("unit"),
                cost: f.money("cost"),
                price: f.money("price"),
                amount: f.money("amount"),
                remarks: f.text("remarks"),
                vendor: f.text("vendor"),
            })
            .collect();
        Estimate { header, items }
    }

    fn to_record(&self) -> Record {
        let h = &self.header;
        let mut record = Record::new(h.id.clone())
            .with_header("date", opt_date(h.date))
            .with_header("client", h.client.as_str())
            .with_header("location", h.location.as_str())
            .with_header("project", h.project.as_str())
            .with_header("period", h.period.as_str())
            .with_header("payment_terms", h.payment_terms.as_str())
            .with_header("expiry", h.expiry.as_str())
            .with_header("status", h.status.as_str())
            .with_header("visibility", h.visibility.as_str());
        record.items = self
            .items
            .iter()
            .map(|i| {
                Fields::new()
                    .with("category", i.category.as_str())
                    .with("product", i.product.as_str())
                    .with("spec", i.spec.as_str())
                    .with("qty", i.qty)
                    .with("unit", i.unit.as_str())
                    .with("cost", i.cost)
                    .with("price", i.price)
                    .with("amount", i.amount)
                    .with("remarks", i.remarks.as_str())
                    .with("vendor", i.vendor.as_str())
            })
            .collect();
        record
    }
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderHeader {
    pub id: String,
    pub date: Option<NaiveDate>,
    pub vendor: String,
    pub estimate_id: String,
    pub location: String,
    pub status: String,
    pub remarks: String,
    pub creator: String,
    pub visibility: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderItem {
    pub category: String,
    pub product: String,
    pub spec: String,
    pub qty: Decimal,
    pub unit: String,
    pub cost: Money,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Order {
    pub header: OrderHeader,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Order total: the sum of item amounts
    pub fn total(&self) -> Money {
        self.items.iter().map(|i| i.amount).sum()
    }
}

impl Entity for Order {
    const SCHEMA: &'static Schema = &ORDER_SCHEMA;

    fn id(&self) -> &str {
        &self.header.id
    }

    fn set_id(&mut self, id: String) {
        self.header.id = id;
    }

    fn from_record(record: &Record) -> Self {
        let header = OrderHeader {
            id: record.id.clone(),
            date: record.date("date"),
            vendor: record.text("vendor"),
            estimate_id: record.text("estimate_id"),
            location: record.text("location"),
            status: record.text("status"),
            remarks: record.text("remarks"),
            creator: record.text("creator"),
            visibility: record.text("visibility"),
        };
        let items = record
            .items
            .iter()
            .map(|f| OrderItem {
                category: f.text("category"),
                product: f.text("product"),
                spec: f.text("spec"),
                qty: f.money("qty"),
                unit: f.text("unit"),
                cost: f.money("cost"),
                amount: f.money("amount"),
            })
            .collect();
        Order { header, items }
    }

    fn to_record(&self) -> Record {
        let h = &self.header;
        let mut record = Record::new(h.id.clone())
            .with_header("date", opt_date(h.date))
            .with_header("vendor", h.vendor.as_str())
            .with_header("estimate_id", h.estimate_id.as_str())
            .with_header("location", h.location.as_str())
            .with_header("status", h.status.as_str())
            .with_header("remarks", h.remarks.as_str())
            .with_header("creator", h.creator.as_str())
            .with_header("visibility", h.visibility.as_str());
        record.items = self
            .items
            .iter()
            .map(|i| {
                Fields::new()
                    .with("category", i.category.as_str())
                    .with("product", i.product.as_str())
                    .with("spec", i.spec.as_str())
                    .with("qty", i.qty)
                    .with("unit", i.unit.as_str())
                    .with("cost", i.cost)
                    .with("amount", i.amount)
            })
            .collect();
        record
    }
}

// ---------------------------------------------------------------------------
// Invoice (received)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Invoice {
    pub id: String,
    pub status: String,
    pub registered_at: String,
    pub file_id: String,
    pub construction_id: String,
    pub project: String,
    pub supplier: String,
    pub date: Option<NaiveDate>,
    pub amount: Money,
    pub offset: Money,
    pub payment: Money,
    pub content: String,
    pub remarks: String,
    pub registration_number: String,
}

impl Entity for Invoice {
    const SCHEMA: &'static Schema = &INVOICE_SCHEMA;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn from_record(record: &Record) -> Self {
        Invoice {
            id: record.id.clone(),
            status: record.text("status"),
            registered_at: record.text("registered_at"),
            file_id: record.text("file_id"),
            construction_id: record.text("construction_id"),
            project: record.text("project"),
            supplier: record.text("supplier"),
            date: record.date("date"),
            amount: record.money("amount"),
            offset: record.money("offset"),
            payment: record.money("payment"),
            content: record.text("content"),
            remarks: record.text("remarks"),
            registration_number: record.text("registration_number"),
        }
    }

    fn to_record(&self) -> Record {
        Record::new(self.id.clone())
            .with_header("status", self.status.as_str())
            .with_header("registered_at", self.registered_at.as_str())
            .with_header("file_id", self.file_id.as_str())
            .with_header("construction_id", self.construction_id.as_str())
            .with_header("project", self.project.as_str())
            .with_header("supplier", self.supplier.as_str())
            .with_header("date", opt_date(self.date))
            .with_header("amount", self.amount)
            .with_header("offset", self.offset)
            .with_header("payment", self.payment)
            .with_header("content", self.content.as_str())
            .with_header("remarks", self.remarks.as_str())
            .with_header("registration_number", self.registration_number.as_str())
    }
}

// ---------------------------------------------------------------------------
// Deposit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Deposit {
    pub id: String,
    pub registered_at: String,
    pub date: Option<NaiveDate>,
    pub estimate_id: String,
    pub client: String,
    pub project: String,
    pub method: String,
    pub amount: Money,
    pub fee: Money,
    pub offset: Money,
    pub remarks: String,
    pub status: String,
    pub registrant: String,
    pub visibility: String,
}

impl Deposit {
    pub fn payment_method(&self) -> PaymentMethod {
        PaymentMethod::from_label(&self.method)
    }
}

impl Entity for Deposit {
    const SCHEMA: &'static Schema = &DEPOSIT_SCHEMA;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn from_record(record: &Record) -> Self {
        Deposit {
            id: record.id.clone(),
            registered_at: record.text("registered_at"),
            date: record.date("date"),
            estimate_id: record.text("estimate_id"),
            client: record.text("client"),
            project: record.text("project"),
            method: record.text("method"),
            amount: record.money("amount"),
            fee: record.money("fee"),
            offset: record.money("offset"),
            remarks: record.text("remarks"),
            status: record.text("status"),
            registrant: record.text("registrant"),
            visibility: record.text("visibility"),
        }
    }

    fn to_record(&self) -> Record {
        Record::new(self.id.clone())
            .with_header("registered_at", self.registered_at.as_str())
            .with_header("date", opt_date(self.date))
            .with_header("estimate_id", self.estimate_id.as_str())
            .with_header("client", self.client.as_str())
            .with_header("project", self.project.as_str())
            .with_header("method", self.method.as_str())
            .with_header("amount", self.amount)
            .with_header("fee", self.fee)
            .with_header("offset", self.offset)
            .with_header("remarks", self.remarks.as_str())
            .with_header("status", self.status.as_str())
            .with_header("registrant", self.registrant.as_str())
            .with_header("visibility", self.visibility.as_str())
    }
}

// ---------------------------------------------------------------------------
// Payment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Payment {
    pub id: String,
    pub registered_at: String,
    pub date: Option<NaiveDate>,
    pub order_id: String,
    pub invoice_id: String,
    pub supplier: String,
    pub project: String,
    pub method: String,
    pub amount: Money,
    pub fee: Money,
    pub offset: Money,
    pub remarks: String,
    pub status: String,
    pub registrant: String,
    pub visibility: String,
}

impl Payment {
    pub fn payment_method(&self) -> PaymentMethod {
        PaymentMethod::from_label(&self.method)
    }
}

impl Entity for Payment {
    const SCHEMA: &'static Schema = &PAYMENT_SCHEMA;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn from_record(record: &Record) -> Self {
        Payment {
            id: record.id.clone(),
            registered_at: record.text("registered_at"),
            date: record.date("date"),
            order_id: record.text("order_id"),
            invoice_id: record.text("invoice_id"),
            supplier: record.text("supplier"),
            project: record.text("project"),
            method: record.text("method"),
            amount: record.money("amount"),
            fee: record.money("fee"),
            offset: record.money("offset"),
            remarks: record.text("remarks"),
            status: record.text("status"),
            registrant: record.text("registrant"),
            visibility: record.text("visibility"),
        }
    }

    fn to_record(&self) -> Record {
        Record::new(self.id.clone())
            .with_header("registered_at", self.registered_at.as_str())
            .with_header("date", opt_date(self.date))
            .with_header("order_id", self.order_id.as_str())
            .with_header("invoice_id", self.invoice_id.as_str())
            .with_header("supplier", self.supplier.as_str())
            .with_header("project", self.project.as_str())
            .with_header("method", self.method.as_str())
            .with_header("amount", self.amount)
            .with_header("fee", self.fee)
            .with_header("offset", self.offset)
            .with_header("remarks", self.remarks.as_str())
            .with_header("status", self.status.as_str())
            .with_header("registrant", self.registrant.as_str())
            .with_header("visibility", self.visibility.as_str())
    }
}
