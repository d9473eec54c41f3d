//! Grouped-record codec
//!
//! This is the only place that knows how a logical [`Record`] is laid out as
//! grid rows:
//!
//! - A record starts on a row whose id cell is non-empty. That row carries
//!   the id, every header field, and the record's first line item.
//! - Every following row with an empty id cell belongs to the same record and
//!   carries one more line item.
//! - A row contributes a line item only when the schema's required item field
//!   is non-empty, so blank rows inside or after a run are ignored.
//! - A record without items is written as a single row whose item cells are
//!   blank, so its header is never lost.
//!
//! Values are normalized per column kind while decoding: text columns keep
//! their display string, money and number columns go through
//! [`parse_currency`], and date columns through [`parse_date`].

use crate::core::layout::Layout;
use crate::types::value::{parse_currency, parse_date};
use crate::types::{Cell, ColumnKind, Fields, Record, Scope};

/// Where one record's run sits in the sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpan {
    pub id: String,
    /// 1-based row number of the run's first row
    pub start_row: usize,
    /// Rows in the run, including blank rows before the next id
    pub len: usize,
}

impl RunSpan {
    /// Every row number covered by the run
    pub fn rows(&self) -> impl Iterator<Item = usize> {
        self.start_row..self.start_row + self.len
    }
}

fn normalize(cell: &Cell, kind: ColumnKind) -> Cell {
    if cell.is_empty() {
        return Cell::Empty;
    }
    match kind {
        ColumnKind::Text => Cell::text(cell.display().trim()),
        ColumnKind::Money | ColumnKind::Number => Cell::Number(parse_currency(cell)),
        ColumnKind::Date => match parse_date(cell) {
            Some(date) => Cell::Date(date),
            None => Cell::text(cell.display().trim()),
        },
    }
}

fn row_id(layout: &Layout, row: &[Cell]) -> String {
    layout
        .cell(row, "id")
        .map(|c| c.display().trim().to_string())
        .unwrap_or_default()
}

fn read_fields(layout: &Layout, row: &[Cell], scope: Scope) -> Fields {
    layout
        .columns()
        .filter(|(column, _)| column.scope == scope)
        .filter_map(|(column, position)| {
            let value = normalize(row.get(position)?, column.kind);
            (!value.is_empty()).then_some((column.key, value))
        })
        .collect()
}

fn carries_item(layout: &Layout, row: &[Cell]) -> bool {
    match layout.schema().required_item {
        Some(key) => layout.cell(row, key).is_some_and(|c| !c.is_empty()),
        None => false,
    }
}

/// Decode data rows into records
///
/// # Arguments
///
/// * `layout` - Resolved layout of the store
/// * `rows` - Data rows only (everything after the header row)
///
/// # Returns
///
/// Records in the order their runs appear. Rows before the first id are
/// ignored.
pub fn decode_runs(layout: &Layout, rows: &[Vec<Cell>]) -> Vec<Record> {
    let mut records: Vec<Record> = Vec::new();
    for row in rows {
        let id = row_id(layout, row);
        if !id.is_empty() {
            records.push(Record {
                id,
                header: read_fields(layout, row, Scope::Header),
                items: Vec::new(),
            });
        }
        let Some(current) = records.last_mut() else {
            continue;
        };
        if carries_item(layout, row) {
            current.items.push(read_fields(layout, row, Scope::Item));
        }
    }
    records
}

/// Locate every run in the data rows
///
/// # Arguments
///
/// * `layout` - Resolved layout of the store
/// * `rows` - Data rows only
/// * `first_row` - 1-based sheet row number of `rows[0]`
pub fn locate_runs(layout: &Layout, rows: &[Vec<Cell>], first_row: usize) -> Vec<RunSpan> {
    let mut spans: Vec<RunSpan> = Vec::new();
    for (offset, row) in rows.iter().enumerate() {
        let id = row_id(layout, row);
        if !id.is_empty() {
            spans.push(RunSpan {
                id,
                start_row: first_row + offset,
                len: 1,
            });
        } else if let Some(current) = spans.last_mut() {
            current.len += 1;
        }
    }
    spans
}

/// Encode one record as the rows of its run
pub fn encode_record(layout: &Layout, record: &Record) -> Vec<Vec<Cell>> {
    let width = layout.width();
    let row_count = record.items.len().max(1);
    let mut rows = Vec::with_capacity(row_count);
    for index in 0..row_count {
        let mut row = vec![Cell::Empty; width];
        let item = record.items.get(index);
        for (column, position) in layout.columns() {
            row[position] = match column.scope {
                Scope::Id if index == 0 => Cell::text(record.id.as_str()),
                Scope::Header if index == 0 => record.header.get(column.key).clone(),
                Scope::Item => item.map(|f| f.get(column.key).clone()).unwrap_or_default(),
                _ => Cell::Empty,
            };
        }
        rows.push(row);
    }
    rows
}

/// Encode records as consecutive runs
pub fn encode_runs(layout: &Layout, records: &[Record]) -> Vec<Vec<Cell>> {
    records
        .iter()
        .flat_map(|record| encode_record(layout, record))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::schema::{INVOICE_SCHEMA, ORDER_SCHEMA};
    use chrono::NaiveDate;
    use rstest::rstest;
    use rust_decimal::Decimal;

    fn layout() -> Layout {
        Layout::declared(&ORDER_SCHEMA)
    }

    fn item(product: &str, amount: i64) -> Fields {
        Fields::new()
            .with("product", product)
            .with("qty", Decimal::ONE)
            .with("amount", Decimal::new(amount, 0))
    }

    fn order(id: &str, items: Vec<Fields>) -> Record {
        let mut record = Record::new(id)
            .with_header("vendor", "North Steel")
            .with_header("estimate_id", "0000001-00")
            .with_header("date", NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        record.items = items;
        record
    }

    #[rstest]
    #[case::single_item(vec![order("0000001-00", vec![item("Beam", 100)])])]
    #[case::many_items(vec![order("0000001-00", vec![item("Beam", 100), item("Bolt", 5), item("Plate", 40)])])]
    #[case::several_records(vec![
        order("0000001-00", vec![item("Beam", 100), item("Bolt", 5)]),
        order("0000002-00", vec![item("Pipe", 7)]),
        order("0000003-00", vec![item("Valve", 9), item("Seal", 1)]),
    ])]
    #[case::zero_items(vec![order("0000004-00", vec![]), order("0000005-00", vec![item("Pipe", 7)])])]
    fn test_encode_then_decode_preserves_records(#[case] records: Vec<Record>) {
        let rows = encode_runs(&layout(), &records);
        assert_eq!(decode_runs(&layout(), &rows), records);
    }

    #[test]
    fn test_header_fields_only_on_first_row() {
        let record = order("0000001-00", vec![item("Beam", 100), item("Bolt", 5)]);
        let rows = encode_record(&layout(), &record);
        let vendor = layout().position("vendor").unwrap();
        let product = layout().position("product").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], Cell::text("0000001-00"));
        assert_eq!(rows[1][0], Cell::Empty);
        assert_eq!(rows[0][vendor], Cell::text("North Steel"));
        assert_eq!(rows[1][vendor], Cell::Empty);
        assert_eq!(rows[1][product], Cell::text("Bolt"));
    }

    #[test]
    fn test_zero_item_record_writes_placeholder_row() {
        let rows = encode_record(&layout(), &order("0000004-00", vec![]));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], Cell::text("0000004-00"));
    }

    #[test]
    fn test_blank_rows_inside_and_after_runs_are_ignored() {
        let mut rows = encode_runs(
            &layout(),
            &[order("0000001-00", vec![item("Beam", 100), item("Bolt", 5)])],
        );
        rows.insert(1, vec![Cell::Empty; 16]);
        rows.push(vec![Cell::Empty; 16]);
        let records = decode_runs(&layout(), &rows);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].items.len(), 2);
    }

    #[test]
    fn test_rows_before_first_id_are_ignored() {
        let mut stray = vec![Cell::Empty; 16];
        stray[5] = Cell::text("Orphan");
        let mut rows = vec![stray];
        rows.extend(encode_record(&layout(), &order("0000001-00", vec![item("Beam", 1)])));
        let records = decode_runs(&layout(), &rows);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].items[0].text("product"), "Beam");
    }

    #[test]
    fn test_decode_normalizes_by_kind() {
        let mut row = vec![Cell::Empty; 14];
        row[0] = Cell::text(" INV-0301101500 ");
        row[6] = Cell::text(" Acme ");
        row[7] = Cell::text("2024-03-05");
        row[8] = Cell::text("１２,０００円");
        row[9] = Cell::text("pending");
        let layout = Layout::declared(&INVOICE_SCHEMA);
        let records = decode_runs(&layout, &[row]);

        let record = &records[0];
        assert_eq!(record.id, "INV-0301101500");
        assert!(record.items.is_empty());
        assert_eq!(record.header.get("supplier"), &Cell::text("Acme"));
        assert_eq!(
            record.header.get("date"),
            &Cell::Date(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap())
        );
        assert_eq!(record.money("amount"), Decimal::new(12000, 0));
        // unparseable money reads as zero
        assert_eq!(record.header.get("offset"), &Cell::Number(Decimal::ZERO));
    }

    #[test]
    fn test_locate_runs_includes_trailing_blank_rows() {
        let mut rows = encode_runs(
            &layout(),
            &[
                order("0000001-00", vec![item("Beam", 1), item("Bolt", 1)]),
                order("0000002-00", vec![item("Pipe", 1)]),
            ],
        );
        rows.push(vec![Cell::Empty; 16]);
        let spans = locate_runs(&layout(), &rows, 2);
        assert_eq!(
            spans,
            vec![
                RunSpan { id: "0000001-00".to_string(), start_row: 2, len: 2 },
                RunSpan { id: "0000002-00".to_string(), start_row: 4, len: 2 },
            ]
        );
        assert_eq!(spans[0].rows().collect::<Vec<_>>(), vec![2, 3]);
    }
}
