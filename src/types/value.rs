//! Cell values and read-time normalization
//!
//! Grid cells arrive either as typed scalars or as display strings, and the
//! text that people type into a spreadsheet is rarely clean. This module owns
//! the tolerant conversions used at the storage boundary:
//!
//! - [`parse_currency`] - money from any cell, tolerant of full-width digits and stray symbols
//! - [`parse_date`] - calendar dates from typed cells or common textual layouts
//! - [`normalize_name`] - whitespace-free counterparty names for fuzzy matching

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// Money amount
pub type Money = Decimal;

/// A single grid cell
///
/// `Empty` is distinct from `Text("")` only at construction time; every
/// constructor in this crate folds blank text into `Empty`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Number(Decimal),
    Date(NaiveDate),
    Text(String),
}

impl Cell {
    /// Build a text cell, folding blank input into `Empty`
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value)
        }
    }

    /// Build a numeric cell
    pub fn number(value: Decimal) -> Self {
        Cell::Number(value)
    }

    /// Build a date cell, `Empty` when no date is given
    pub fn date(value: Option<NaiveDate>) -> Self {
        value.map(Cell::Date).unwrap_or(Cell::Empty)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Display form of the cell, as a spreadsheet would render it
    pub fn display(&self) -> String {
        self.to_string()
    }

    /// Money value of the cell (0 when absent or unparseable)
    pub fn money(&self) -> Money {
        parse_currency(self)
    }

    /// Date value of the cell, if it holds or spells one
    pub fn as_date(&self) -> Option<NaiveDate> {
        parse_date(self)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Number(n) => write!(f, "{}", n.normalize()),
            Cell::Date(d) => write!(f, "{}", d.format("%Y/%m/%d")),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::text(value)
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::text(value)
    }
}

impl From<Decimal> for Cell {
    fn from(value: Decimal) -> Self {
        Cell::Number(value)
    }
}

impl From<NaiveDate> for Cell {
    fn from(value: NaiveDate) -> Self {
        Cell::Date(value)
    }
}

/// Parse a money amount out of any cell
///
/// Full-width digits, full-width `.` and `-` are folded to ASCII, every other
/// character except digits, `.` and `-` is dropped, and the remainder is
/// parsed. Anything that still fails to parse counts as zero.
pub fn parse_currency(cell: &Cell) -> Money {
    match cell {
        Cell::Number(n) => *n,
        Cell::Text(s) => parse_currency_str(s),
        Cell::Empty | Cell::Date(_) => Decimal::ZERO,
    }
}

/// String form of [`parse_currency`]
pub fn parse_currency_str(raw: &str) -> Money {
    let cleaned: String = raw
        .chars()
        .map(fold_full_width)
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return Decimal::ZERO;
    }
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .unwrap_or(Decimal::ZERO)
}

fn fold_full_width(c: char) -> char {
    match c {
        '０'..='９' | '．' | '－' => {
            char::from_u32(c as u32 - 0xFEE0).unwrap_or(c)
        }
        _ => c,
    }
}

/// Convert full-width ASCII variants (U+FF01..U+FF5E) to their half-width forms
pub fn to_half_width(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '！'..='～' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            _ => c,
        })
        .collect()
}

const DATE_FORMATS: [&str; 2] = ["%Y/%m/%d", "%Y-%m-%d"];
const DATETIME_FORMATS: [&str; 4] = [
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parse a calendar date out of a cell
pub fn parse_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::Date(d) => Some(*d),
        Cell::Text(s) => parse_date_str(s),
        Cell::Empty | Cell::Number(_) => None,
    }
}

/// String form of [`parse_date`]
pub fn parse_date_str(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(datetime.date());
        }
    }
    None
}

/// Format a timestamp the way registration columns store it
pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format("%Y/%m/%d %H:%M").to_string()
}

/// Strip every whitespace character, including the ideographic space
pub fn normalize_name(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Fuzzy counterparty match: normalized substring containment in either direction
///
/// Two distinct counterparties whose names contain one another are merged by
/// this rule. Empty names never match.
pub fn names_overlap(a: &str, b: &str) -> bool {
    let a = normalize_name(a);
    let b = normalize_name(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}

/// Round a money amount to whole currency units, halves away from zero
pub fn round_money(value: Money) -> Money {
    value.round_dp_with_strategy(0, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
}
