//! The grouped-record aggregate
//!
//! A [`Record`] is one logical record of a grid store: its identifier, the
//! record-level fields from the first row of its run, and one field map per
//! line item. Only the codec knows how a `Record` is laid out as rows.

use crate::types::value::{Cell, Money};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

static EMPTY: Cell = Cell::Empty;

/// Field values keyed by schema column key
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fields(BTreeMap<&'static str, Cell>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cell for `key`, `Empty` when the field is absent
    pub fn get(&self, key: &str) -> &Cell {
        self.0.get(key).unwrap_or(&EMPTY)
    }

    /// Set a field; an empty value removes it
    pub fn set(&mut self, key: &'static str, value: impl Into<Cell>) {
        let value = value.into();
        if value.is_empty() {
            self.0.remove(key);
        } else {
            self.0.insert(key, value);
        }
    }

    /// Builder form of [`Fields::set`]
    pub fn with(mut self, key: &'static str, value: impl Into<Cell>) -> Self {
        self.set(key, value);
        self
    }

    /// Trimmed display text of a field
    pub fn text(&self, key: &str) -> String {
        self.get(key).display().trim().to_string()
    }

    pub fn money(&self, key: &str) -> Money {
        self.get(key).money()
    }

    pub fn date(&self, key: &str) -> Option<NaiveDate> {
        self.get(key).as_date()
    }

    /// True when every field is empty
    pub fn is_blank(&self) -> bool {
        self.0.values().all(Cell::is_empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Cell)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }
}

impl FromIterator<(&'static str, Cell)> for Fields {
    fn from_iter<I: IntoIterator<Item = (&'static str, Cell)>>(iter: I) -> Self {
        Fields(iter.into_iter().collect())
    }
}

/// One logical record: identifier, header fields and ordered line items
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    pub id: String,
    pub header: Fields,
    pub items: Vec<Fields>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            header: Fields::new(),
            items: Vec::new(),
        }
    }

    pub fn with_header(mut self, key: &'static str, value: impl Into<Cell>) -> Self {
        self.header.set(key, value);
        self
    }

    pub fn with_item(mut self, item: Fields) -> Self {
        self.items.push(item);
        self
    }

    pub fn text(&self, key: &str) -> String {
        self.header.text(key)
    }

    pub fn money(&self, key: &str) -> Money {
        self.header.money(key)
    }

    pub fn date(&self, key: &str) -> Option<NaiveDate> {
        self.header.date(key)
    }

    /// Sum of a money field over every line item
    pub fn item_total(&self, key: &str) -> Money {
        self.items
            .iter()
            .map(|item| item.money(key))
            .fold(Decimal::ZERO, |acc, v| acc + v)
    }
}
