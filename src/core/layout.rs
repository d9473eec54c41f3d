//! Physical column layout of one store
//!
//! A [`Layout`] is resolved once per store open from the first rows of the
//! sheet. It locates the header row (the row with a cell carrying the id
//! column's title) within the first [`HEADER_SCAN_ROWS`] rows, and maps every
//! column title to its position. A missing title falls back to its declared
//! position, or to the next position no resolved title occupies. Rows above the header row are metadata and are
//! never decoded.

use crate::types::{Cell, ColumnSpec, Schema};
use std::collections::HashSet;

/// How many leading rows may precede or contain the header row
pub const HEADER_SCAN_ROWS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    schema: &'static Schema,
    /// 0-based column index per schema column, in schema order
    positions: Vec<usize>,
    /// 1-based row number of the header row, 0 when the sheet is empty
    header_row: usize,
}

impl Layout {
    /// Layout of a sheet that has no header yet: declared positions, header on row 1
    pub fn declared(schema: &'static Schema) -> Self {
        Self {
            schema,
            positions: (0..schema.columns.len()).collect(),
            header_row: 0,
        }
    }

    /// Resolve the layout from the leading rows of a sheet
    ///
    /// # Arguments
    ///
    /// * `schema` - The store's column descriptor
    /// * `leading_rows` - The first rows of the sheet (only the first
    ///   [`HEADER_SCAN_ROWS`] are inspected)
    ///
    /// # Returns
    ///
    /// The resolved layout. A non-empty sheet without a recognizable header
    /// row is treated as having its header on row 1 with declared positions.
    pub fn resolve(schema: &'static Schema, leading_rows: &[Vec<Cell>]) -> Self {
        if leading_rows.is_empty() {
            return Self::declared(schema);
        }
        let id_title = schema.id_title();
        let found = leading_rows
            .iter()
            .take(HEADER_SCAN_ROWS)
            .position(|row| row.iter().any(|c| c.display().trim() == id_title));

        let Some(index) = found else {
            log::debug!(
                "no '{}' header row in {} store, assuming row 1",
                id_title,
                schema.entity
            );
            return Self {
                header_row: 1,
                ..Self::declared(schema)
            };
        };

        let titles: Vec<String> = leading_rows[index]
            .iter()
            .map(|c| c.display().trim().to_string())
            .collect();
        let resolved: Vec<Option<usize>> = schema
            .columns
            .iter()
            .map(|column| titles.iter().position(|t| t == column.title))
            .collect();
        let mut taken: HashSet<usize> = resolved.iter().flatten().copied().collect();
        let positions = resolved
            .iter()
            .enumerate()
            .map(|(declared, found)| {
                found.unwrap_or_else(|| {
                    let mut position = declared;
                    while !taken.insert(position) {
                        position += 1;
                    }
                    position
                })
            })
            .collect();

        Self {
            schema,
            positions,
            header_row: index + 1,
        }
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    /// 1-based row number of the header row (0 when none has been written)
    pub fn header_row(&self) -> usize {
        self.header_row
    }

    /// 1-based row number of the first data row
    pub fn first_data_row(&self) -> usize {
        self.header_row.max(1) + 1
    }

    /// Number of cells an encoded row needs
    pub fn width(&self) -> usize {
        self.positions.iter().max().map_or(0, |m| m + 1)
    }

    /// 0-based position of a column key
    pub fn position(&self, key: &str) -> Option<usize> {
        self.schema
            .columns
            .iter()
            .position(|c| c.key == key)
            .map(|i| self.positions[i])
    }

    /// Columns paired with their resolved 0-based positions
    pub fn columns(&self) -> impl Iterator<Item = (&'static ColumnSpec, usize)> + '_ {
        self.schema.columns.iter().zip(self.positions.iter().copied())
    }

    /// Cell of `row` under column `key`, `Empty` when out of range
    pub fn cell<'r>(&self, row: &'r [Cell], key: &str) -> Option<&'r Cell> {
        self.position(key).and_then(|p| row.get(p))
    }

    /// Header row in declared order, for writing into an empty sheet
    pub fn header_cells(&self) -> Vec<Cell> {
        let mut cells = vec![Cell::Empty; self.width()];
        for (column, position) in self.columns() {
            cells[position] = Cell::text(column.title);
        }
        cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::schema::{INVOICE_SCHEMA, ORDER_SCHEMA};

    fn row(values: &[&str]) -> Vec<Cell> {
        values.iter().map(|v| Cell::text(*v)).collect()
    }

    #[test]
    fn test_declared_layout_on_empty_sheet() {
        let layout = Layout::resolve(&INVOICE_SCHEMA, &[]);
        assert_eq!(layout.header_row(), 0);
        assert_eq!(layout.first_data_row(), 2);
        assert_eq!(layout.position("supplier"), Some(6));
        assert_eq!(layout.width(), 14);
    }

    #[test]
    fn test_header_after_metadata_rows() {
        let rows = vec![
            row(&["Invoices received", "", ""]),
            row(&["exported 2024/03/01"]),
            row(&INVOICE_SCHEMA.titles()),
        ];
        let layout = Layout::resolve(&INVOICE_SCHEMA, &rows);
        assert_eq!(layout.header_row(), 3);
        assert_eq!(layout.first_data_row(), 4);
    }

    #[test]
    fn test_reordered_columns_resolve_by_title() {
        let mut titles = ORDER_SCHEMA.titles();
        titles.swap(2, 3); // Vendor <-> Estimate ID
        let layout = Layout::resolve(&ORDER_SCHEMA, &[row(&titles)]);
        assert_eq!(layout.position("vendor"), Some(3));
        assert_eq!(layout.position("estimate_id"), Some(2));
        assert_eq!(layout.position("product"), Some(5));
    }

    #[test]
    fn test_missing_title_falls_back_to_declared_position() {
        let titles: Vec<&str> = ORDER_SCHEMA.titles().into_iter().take(5).collect();
        let layout = Layout::resolve(&ORDER_SCHEMA, &[row(&titles)]);
        assert_eq!(layout.position("visibility"), Some(15));
    }

    #[test]
    fn test_header_found_when_id_is_not_first() {
        let mut titles = ORDER_SCHEMA.titles();
        titles.swap(0, 1);
        let rows = vec![row(&["Orders"]), row(&titles)];
        let layout = Layout::resolve(&ORDER_SCHEMA, &rows);
        assert_eq!(layout.header_row(), 2);
        assert_eq!(layout.position("id"), Some(1));
    }

    #[test]
    fn test_fallback_skips_position_taken_by_a_title() {
        // "Vendor" moved onto Estimate ID's declared slot, which is then missing
        let mut titles = ORDER_SCHEMA.titles();
        titles[3] = titles[2];
        titles[2] = "Supplier";
        let layout = Layout::resolve(&ORDER_SCHEMA, &[row(&titles)]);
        let vendor = layout.position("vendor");
        let estimate_id = layout.position("estimate_id");
        assert_eq!(vendor, Some(3));
        assert_eq!(estimate_id, Some(16));
        let mut positions: Vec<usize> = layout.columns().map(|(_, p)| p).collect();
        positions.sort_unstable();
        positions.dedup();
        assert_eq!(positions.len(), ORDER_SCHEMA.columns.len());
    }

    #[test]
    fn test_no_header_row_assumes_first_row() {
        let rows = vec![row(&["garbage"]), row(&["0000001-00"])];
        let layout = Layout::resolve(&ORDER_SCHEMA, &rows);
        assert_eq!(layout.header_row(), 1);
        assert_eq!(layout.first_data_row(), 2);
    }

    #[test]
    fn test_header_cells_follow_positions() {
        let layout = Layout::declared(&INVOICE_SCHEMA);
        let cells = layout.header_cells();
        assert_eq!(cells[0], Cell::text("ID"));
        assert_eq!(cells[13], Cell::text("Registration No"));
    }
}
