//! Static column descriptors for every grouped-record store
//!
//! A schema lists a store's columns in their default physical order. Column
//! titles are what the header row carries; `Layout` resolution in
//! [`crate::core::layout`] maps titles to positions once per store open, so
//! call sites only ever use the column keys below.

/// Which part of a grouped record a column belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The run identifier; non-empty only on a run's first row
    Id,
    /// Record-level field; populated only on a run's first row
    Header,
    /// Line-item field; may repeat on every row of the run
    Item,
}

/// How a column's raw cells are normalized when read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Exact display text (identifiers, names, statuses)
    Text,
    /// Money, parsed with `parse_currency`
    Money,
    /// Plain quantity, parsed like money
    Number,
    /// Calendar date
    Date,
}

/// One column of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub key: &'static str,
    pub title: &'static str,
    pub scope: Scope,
    pub kind: ColumnKind,
}

const fn col(key: &'static str, title: &'static str, scope: Scope, kind: ColumnKind) -> ColumnSpec {
    ColumnSpec {
        key,
        title,
        scope,
        kind,
    }
}

/// Column layout of one store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    /// Entity name used in messages and logs
    pub entity: &'static str,
    /// Columns in default physical order; the first is always the id column
    pub columns: &'static [ColumnSpec],
    /// Item field that marks a row as carrying a line item
    ///
    /// `None` for single-row stores, whose records never have items.
    pub required_item: Option<&'static str>,
}

impl Schema {
    /// Title of the id column
    pub fn id_title(&self) -> &'static str {
        self.columns[0].title
    }

    /// Header row titles in default order
    pub fn titles(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.title).collect()
    }

    pub fn column(&self, key: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.key == key)
    }

    pub fn has_items(&self) -> bool {
        self.required_item.is_some()
    }
}

use ColumnKind::{Date, Money, Number, Text};
use Scope::{Header, Id, Item};

pub static ESTIMATE_SCHEMA: Schema = Schema {
    entity: "estimate",
    columns: &[
        col("id", "ID", Id, Text),
        col("date", "Date", Header, Date),
        col("client", "Client", Header, Text),
        col("category", "Category", Item, Text),
        col("product", "Product", Item, Text),
        col("spec", "Spec", Item, Text),
        col("qty", "Qty", Item, Number),
        col("unit", "Unit", Item, Text),
        col("cost", "Cost", Item, Money),
        col("price", "Price", Item, Money),
        col("amount", "Amount", Item, Money),
        col("remarks", "Remarks", Item, Text),
        col("location", "Location", Header, Text),
        col("project", "Project", Header, Text),
        col("period", "Period", Header, Text),
        col("payment_terms", "Payment Terms", Header, Text),
        col("expiry", "Expiry", Header, Text),
        col("status", "Status", Header, Text),
        col("vendor", "Vendor", Item, Text),
        col("visibility", "Visibility", Header, Text),
    ],
    required_item: Some("product"),
};

pub static ORDER_SCHEMA: Schema = Schema {
    entity: "order",
    columns: &[
        col("id", "ID", Id, Text),
        col("date", "Date", Header, Date),
        col("vendor", "Vendor", Header, Text),
        col("estimate_id", "Estimate ID", Header, Text),
        col("category", "Category", Item, Text),
        col("product", "Product", Item, Text),
        col("spec", "Spec", Item, Text),
        col("qty", "Qty", Item, Number),
        col("unit", "Unit", Item, Text),
        col("cost", "Cost", Item, Money),
        col("amount", "Amount", Item, Money),
        col("location", "Location", Header, Text),
        col("status", "Status", Header, Text),
        col("remarks", "Remarks", Header, Text),
        col("creator", "Creator", Header, Text),
        col("visibility", "Visibility", Header, Text),
    ],
    required_item: Some("product"),
};

pub static INVOICE_SCHEMA: Schema = Schema {
    entity: "invoice",
    columns: &[
        col("id", "ID", Id, Text),
        col("status", "Status", Header, Text),
        col("registered_at", "Registered At", Header, Text),
        col("file_id", "File ID", Header, Text),
        col("construction_id", "Construction ID", Header, Text),
        col("project", "Project", Header, Text),
        col("supplier", "Supplier", Header, Text),
        col("date", "Invoice Date", Header, Date),
        col("amount", "Amount", Header, Money),
        col("offset", "Offset", Header, Money),
        col("payment", "Payment", Header, Money),
        col("content", "Content", Header, Text),
        col("remarks", "Remarks", Header, Text),
        col("registration_number", "Registration No", Header, Text),
    ],
    required_item: None,
};

pub static DEPOSIT_SCHEMA: Schema = Schema {
    entity: "deposit",
    columns: &[
        col("id", "ID", Id, Text),
        col("registered_at", "Registered At", Header, Text),
        col("date", "Date", Header, Date),
        col("estimate_id", "Estimate ID", Header, Text),
        col("client", "Client", Header, Text),
        col("project", "Project", Header, Text),
        col("method", "Type", Header, Text),
        col("amount", "Amount", Header, Money),
        col("fee", "Fee", Header, Money),
        col("offset", "Offset", Header, Money),
        col("remarks", "Remarks", Header, Text),
        col("status", "Status", Header, Text),
        col("registrant", "Registrant", Header, Text),
        col("visibility", "Visibility", Header, Text),
    ],
    required_item: None,
};

pub static PAYMENT_SCHEMA: Schema = Schema {
    entity: "payment",
    columns: &[
        col("id", "ID", Id, Text),
        col("registered_at", "Registered At", Header, Text),
        col("date", "Date", Header, Date),
        col("order_id", "Order ID", Header, Text),
        col("invoice_id", "Invoice ID", Header, Text),
        col("supplier", "Supplier", Header, Text),
        col("project", "Project", Header, Text),
        col("method", "Type", Header, Text),
        col("amount", "Amount", Header, Money),
        col("fee", "Fee", Header, Money),
        col("offset", "Offset", Header, Money),
        col("remarks", "Remarks", Header, Text),
        col("status", "Status", Header, Text),
        col("registrant", "Registrant", Header, Text),
        col("visibility", "Visibility", Header, Text),
    ],
    required_item: None,
};
