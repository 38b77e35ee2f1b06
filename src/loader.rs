// 📂 Spreadsheet Loader
// Workbook bytes -> ordered sheet names + one table per sheet

use crate::error::FormatError;
use crate::value::CellValue;
use calamine::{Data, Reader, Xlsx};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Cursor;
use tracing::{debug, info};

// ============================================================================
// CORE TYPES
// ============================================================================

/// One sheet as it sits in the file: a header row and untyped data rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetTable {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    /// 1-based spreadsheet row of the header, used for error messages
    pub header_row: usize,
    /// 1-based spreadsheet row of each entry in `rows`; blank rows leave gaps
    #[serde(default)]
    pub line_numbers: Vec<usize>,
}

impl SheetTable {
    /// Header on row 1, data rows contiguous below it
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let line_numbers = (2..rows.len() + 2).collect();
        SheetTable {
            name: name.into(),
            headers,
            rows,
            header_row: 1,
            line_numbers,
        }
    }

    /// Spreadsheet row of `rows[index]`
    pub fn line_number(&self, index: usize) -> usize {
        self.line_numbers
            .get(index)
            .copied()
            .unwrap_or(self.header_row + 1 + index)
    }

    /// Position of a header, compared after trimming
    pub fn column_index(&self, header: &str) -> Option<usize> {
        let wanted = header.trim();
        self.headers.iter().position(|h| h.trim() == wanted)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Parsed workbook. `sheet_names` keeps the container order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workbook {
    pub sheet_names: Vec<String>,
    pub tables: HashMap<String, SheetTable>,
}

impl Workbook {
    pub fn sheet(&self, name: &str) -> Option<&SheetTable> {
        self.tables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn push_sheet(&mut self, table: SheetTable) {
        if !self.tables.contains_key(&table.name) {
            self.sheet_names.push(table.name.clone());
        }
        self.tables.insert(table.name.clone(), table);
    }
}

// ============================================================================
// LOADER TRAIT
// ============================================================================

/// SpreadsheetLoader - turns raw file bytes into a `Workbook`
///
/// Loading is pure: the same bytes always give the same workbook, which is
/// what lets `WorkbookCache` key on content.
pub trait SpreadsheetLoader: Send + Sync {
    fn load(&self, bytes: &[u8]) -> Result<Workbook, FormatError>;

    /// Short format name for logs
    fn format(&self) -> &str;
}

/// Office Open XML workbooks (.xlsx)
#[derive(Debug, Clone, Copy, Default)]
pub struct XlsxLoader;

impl XlsxLoader {
    pub fn new() -> Self {
        XlsxLoader
    }
}

impl SpreadsheetLoader for XlsxLoader {
    fn load(&self, bytes: &[u8]) -> Result<Workbook, FormatError> {
        let mut xlsx: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
            .map_err(|e| FormatError::InvalidContainer(e.to_string()))?;

        let mut workbook = Workbook::default();

        for name in xlsx.sheet_names() {
            let range = xlsx
                .worksheet_range(&name)
                .map_err(|e| FormatError::UnreadableSheet {
                    sheet: name.clone(),
                    reason: e.to_string(),
                })?;

            // Range rows are relative to its first cell
            let first_row = range.start().map(|(row, _)| row as usize + 1).unwrap_or(1);
            let cells: Vec<Vec<CellValue>> = range
                .rows()
                .map(|row| row.iter().map(cell_from_data).collect())
                .collect();

            let table = build_sheet_table(&name, cells, first_row)?;
            debug!(
                sheet = %name,
                rows = table.row_count(),
                columns = table.headers.len(),
                "sheet parsed"
            );
            workbook.push_sheet(table);
        }

        info!(sheets = workbook.sheet_names.len(), "workbook loaded");
        Ok(workbook)
    }

    fn format(&self) -> &str {
        "xlsx"
    }
}

/// Load an .xlsx workbook from memory
pub fn load(bytes: &[u8]) -> Result<Workbook, FormatError> {
    XlsxLoader::new().load(bytes)
}

// ============================================================================
// HELPERS
// ============================================================================

/// Split a grid into header + data rows.
///
/// The first non-blank row is the header. Blank rows after it are skipped.
/// `first_row` is the 1-based spreadsheet row of `cells[0]`.
pub fn build_sheet_table(
    name: &str,
    cells: Vec<Vec<CellValue>>,
    first_row: usize,
) -> Result<SheetTable, FormatError> {
    let mut rows = cells.into_iter().enumerate();

    let (header_offset, header_cells) = rows
        .by_ref()
        .find(|(_, row)| row.iter().any(|c| !c.is_empty()))
        .ok_or_else(|| FormatError::MissingHeader(name.to_string()))?;

    let mut headers: Vec<String> = header_cells
        .iter()
        .map(|c| c.to_string().trim().to_string())
        .collect();
    while headers.last().is_some_and(|h| h.is_empty()) {
        headers.pop();
    }

    let (line_numbers, data_rows): (Vec<usize>, Vec<Vec<CellValue>>) = rows
        .filter(|(_, row)| row.iter().any(|c| !c.is_empty()))
        .map(|(offset, row)| (first_row + offset, row))
        .unzip();

    Ok(SheetTable {
        name: name.to_string(),
        headers,
        rows: data_rows,
        header_row: first_row + header_offset,
        line_numbers,
    })
}

fn cell_from_data(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ndt) => CellValue::DateTime(ndt),
            None => CellValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => CellValue::Text(s.clone()),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(format!("{:?}", e)),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook as XlsxWriter};

    fn sample_workbook_bytes() -> Vec<u8> {
        let mut writer = XlsxWriter::new();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");

        let sheet = writer.add_worksheet();
        sheet.set_name("Janeiro").unwrap();
        sheet.write_string(0, 0, "Data").unwrap();
        sheet.write_string(0, 1, "Receita").unwrap();
        sheet.write_string(0, 2, "Despesa").unwrap();
        sheet.write_string(0, 3, "Obs").unwrap();
        let d1 = ExcelDateTime::from_ymd(2024, 1, 1).unwrap();
        sheet.write_datetime_with_format(1, 0, &d1, &date_format).unwrap();
        sheet.write_number(1, 1, 100.0).unwrap();
        sheet.write_number(1, 2, 40.0).unwrap();
        sheet.write_string(1, 3, "venda").unwrap();
        sheet.write_string(2, 0, "2024-01-08").unwrap();
        sheet.write_number(2, 1, 20.0).unwrap();
        sheet.write_number(2, 2, 5.0).unwrap();

        let sheet = writer.add_worksheet();
        sheet.set_name("Fevereiro").unwrap();
        sheet.write_string(0, 0, "Data").unwrap();
        sheet.write_string(0, 1, "Receita").unwrap();
        sheet.write_string(0, 2, "Despesa").unwrap();

        writer.save_to_buffer().unwrap()
    }

    #[test]
    fn test_load_preserves_sheet_order() {
        let workbook = load(&sample_workbook_bytes()).unwrap();
        assert_eq!(workbook.sheet_names, vec!["Janeiro", "Fevereiro"]);
        assert!(workbook.contains("Fevereiro"));
        assert_eq!(workbook.sheet("Fevereiro").unwrap().row_count(), 0);
    }

    #[test]
    fn test_load_reads_headers_and_cells() {
        let workbook = load(&sample_workbook_bytes()).unwrap();
        let jan = workbook.sheet("Janeiro").unwrap();

        assert_eq!(jan.headers, vec!["Data", "Receita", "Despesa", "Obs"]);
        assert_eq!(jan.row_count(), 2);
        assert_eq!(jan.header_row, 1);

        let expected = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(jan.rows[0][0].to_date(false), Some(expected));
        assert_eq!(jan.rows[0][1], CellValue::Number(100.0));
        assert_eq!(jan.rows[1][0], CellValue::Text("2024-01-08".to_string()));
    }

    #[test]
    fn test_load_rejects_garbage() {
        let result = load(b"definitely not a zip archive");
        assert!(matches!(result, Err(FormatError::InvalidContainer(_))));
    }

    #[test]
    fn test_load_rejects_sheet_without_header() {
        let mut writer = XlsxWriter::new();
        writer.add_worksheet().set_name("Vazio").unwrap();
        let bytes = writer.save_to_buffer().unwrap();

        let result = load(&bytes);
        assert_eq!(result, Err(FormatError::MissingHeader("Vazio".to_string())));
    }

    #[test]
    fn test_build_sheet_table_skips_leading_and_blank_rows() {
        let cells = vec![
            vec![CellValue::Empty, CellValue::Empty],
            vec!["Data".into(), "Receita".into(), CellValue::Empty],
            vec![CellValue::Empty, CellValue::Empty],
            vec!["2024-01-01".into(), 10.0.into()],
        ];

        let table = build_sheet_table("Março", cells, 1).unwrap();

        assert_eq!(table.headers, vec!["Data", "Receita"]);
        assert_eq!(table.header_row, 2);
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.line_number(0), 4);
    }

    #[test]
    fn test_load_records_source_lines_across_blank_rows() {
        let mut writer = XlsxWriter::new();
        let sheet = writer.add_worksheet();
        sheet.set_name("Maio").unwrap();
        sheet.write_string(0, 0, "Data").unwrap();
        sheet.write_string(0, 1, "Receita").unwrap();
        sheet.write_string(0, 2, "Despesa").unwrap();
        sheet.write_string(1, 0, "2024-05-01").unwrap();
        sheet.write_string(3, 0, "not-a-date").unwrap();
        let bytes = writer.save_to_buffer().unwrap();

        let workbook = load(&bytes).unwrap();
        let table = workbook.sheet("Maio").unwrap();

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.line_numbers, vec![2, 4]);
    }

    #[test]
    fn test_build_sheet_table_all_blank() {
        let cells = vec![vec![CellValue::from("  ")], vec![]];
        let result = build_sheet_table("Abril", cells, 1);
        assert_eq!(result, Err(FormatError::MissingHeader("Abril".to_string())));
    }

    #[test]
    fn test_column_index_trims() {
        let table = SheetTable::new("S", vec![" Data ".to_string(), "Receita".to_string()], vec![]);
        assert_eq!(table.column_index("Data"), Some(0));
        assert_eq!(table.column_index("Despesa"), None);
    }
}
