// 📐 Shape Layer - Schema Check
// Resolves required headers before any RawRow is built

use crate::config::ColumnNames;
use crate::error::DataError;
use crate::loader::SheetTable;
use crate::value::CellValue;
use serde::{Deserialize, Serialize};

// ============================================================================
// RAW RECORDS
// ============================================================================

/// One record of a sheet. Cells are kept as loaded; the aggregator coerces
/// them, so a bad date fails aggregation rather than loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub date: CellValue,
    pub revenue: CellValue,
    pub expense: CellValue,
    /// 1-based spreadsheet row
    pub line_number: usize,
}

impl RawRow {
    pub fn new(
        date: impl Into<CellValue>,
        revenue: impl Into<CellValue>,
        expense: impl Into<CellValue>,
    ) -> Self {
        RawRow {
            date: date.into(),
            revenue: revenue.into(),
            expense: expense.into(),
            line_number: 0,
        }
    }

    pub fn at_line(mut self, line_number: usize) -> Self {
        self.line_number = line_number;
        self
    }
}

/// All records of one sheet, in file order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub sheet: String,
    pub columns: ColumnNames,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    /// Build a table directly. Rows without a line number get their position
    /// (header on line 1).
    pub fn new(sheet: impl Into<String>, rows: Vec<RawRow>) -> Self {
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                if row.line_number == 0 {
                    row.at_line(i + 2)
                } else {
                    row
                }
            })
            .collect();

        RawTable {
            sheet: sheet.into(),
            columns: ColumnNames::default(),
            rows,
        }
    }

    /// Project a loaded sheet onto the three required columns
    pub fn from_sheet(sheet: &SheetTable, columns: &ColumnNames) -> Result<Self, DataError> {
        let map = SheetSchema::new(columns.clone()).resolve(sheet)?;

        let rows = sheet
            .rows
            .iter()
            .enumerate()
            .map(|(i, cells)| RawRow {
                date: cell_at(cells, map.date),
                revenue: cell_at(cells, map.revenue),
                expense: cell_at(cells, map.expense),
                line_number: sheet.line_number(i),
            })
            .collect();

        Ok(RawTable {
            sheet: sheet.name.clone(),
            columns: columns.clone(),
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn cell_at(cells: &[CellValue], index: usize) -> CellValue {
    cells.get(index).cloned().unwrap_or(CellValue::Empty)
}

// ============================================================================
// SCHEMA
// ============================================================================

/// Positions of the required columns inside a sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub date: usize,
    pub revenue: usize,
    pub expense: usize,
}

pub struct SheetSchema {
    columns: ColumnNames,
}

impl SheetSchema {
    pub fn new(columns: ColumnNames) -> Self {
        SheetSchema { columns }
    }

    pub fn required(&self) -> [&str; 3] {
        [
            self.columns.date.as_str(),
            self.columns.revenue.as_str(),
            self.columns.expense.as_str(),
        ]
    }

    /// Fails on the first required header the sheet lacks
    pub fn resolve(&self, sheet: &SheetTable) -> Result<ColumnMap, DataError> {
        let find = |column: &str| {
            sheet
                .column_index(column)
                .ok_or_else(|| DataError::MissingColumn {
                    sheet: sheet.name.clone(),
                    column: column.to_string(),
                })
        };

        Ok(ColumnMap {
            date: find(&self.columns.date)?,
            revenue: find(&self.columns.revenue)?,
            expense: find(&self.columns.expense)?,
        })
    }

    /// Every missing header, for display
    pub fn missing(&self, sheet: &SheetTable) -> Vec<String> {
        self.required()
            .iter()
            .filter(|c| sheet.column_index(c).is_none())
            .map(|c| c.to_string())
            .collect()
    }
}

impl Default for SheetSchema {
    fn default() -> Self {
        Self::new(ColumnNames::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================
