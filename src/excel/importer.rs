//! Excel importer - first worksheet → `Table`

use crate::core::dates;
use crate::error::{SheetError, SheetResult};
use crate::types::{CellValue, Table};
use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::path::{Path, PathBuf};

/// Header keywords that mark a likely date column (lowercased match)
const DATE_COLUMN_KEYWORDS: [&str; 3] = ["date", "时间", "日期"];

/// A worksheet read into memory
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSheet {
    pub name: String,
    pub table: Table,
}

/// Reads the first worksheet of an .xlsx/.xls/.xlsm/.xlsb/.ods file
pub struct ExcelImporter {
    path: PathBuf,
}

impl ExcelImporter {
    /// Create a new Excel importer
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Read the first worksheet; row 1 is the header
    pub fn read_first_sheet(&self) -> SheetResult<LoadedSheet> {
        let mut workbook = open_workbook_auto(&self.path).map_err(|e| {
            SheetError::Read(format!("Failed to open {}: {}", self.path.display(), e))
        })?;

        let name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| SheetError::EmptyHeader(self.path.display().to_string()))?;

        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| SheetError::Read(format!("Failed to read sheet '{}': {}", name, e)))?;

        let table = range_to_table(&range);
        table.require_header(&self.path.display().to_string())?;
        tracing::info!(
            path = %self.path.display(),
            sheet = %name,
            rows = table.row_count(),
            columns = table.width(),
            "worksheet loaded"
        );
        Ok(LoadedSheet { name, table })
    }

    /// Header names of the first worksheet
    pub fn list_columns(&self) -> SheetResult<Vec<String>> {
        Ok(self.read_first_sheet()?.table.header)
    }
}

/// First header that looks like a date column
pub fn detect_date_column(header: &[String]) -> Option<&str> {
    header
        .iter()
        .find(|name| {
            let lower = name.to_lowercase();
            DATE_COLUMN_KEYWORDS.iter().any(|k| lower.contains(k))
        })
        .map(String::as_str)
}

/// Convert a used range into a table. The range's first row is the header.
fn range_to_table(range: &Range<Data>) -> Table {
    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Table::default();
    };

    let header = header_row
        .iter()
        .enumerate()
        .map(|(col, cell)| header_name(cell, col))
        .collect();

    let mut table = Table::new(header);
    for row in rows {
        let mut cells: Vec<CellValue> = row.iter().map(convert_cell).collect();
        // Trailing blanks are implicit nulls
        while matches!(cells.last(), Some(CellValue::Null)) {
            cells.pop();
        }
        table.add_row(cells);
    }

    // Drop fully blank trailing rows left by formatting-only cells
    while table.rows.last().is_some_and(|r| r.is_empty()) {
        table.rows.pop();
    }
    table
}

fn header_name(cell: &Data, col: usize) -> String {
    let name = match convert_cell(cell) {
        CellValue::Null => String::new(),
        value => value.to_string().trim().to_string(),
    };
    if name.is_empty() {
        format!("col_{}", col)
    } else {
        name
    }
}

/// Map a calamine cell onto the table model
fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Null,
        Data::String(s) => CellValue::from(s.as_str()),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::text(if *b { "TRUE" } else { "FALSE" }),
        Data::DateTime(dt) if dt.is_duration() => CellValue::Number(dt.as_f64()),
        Data::DateTime(dt) => match dates::datetime_from_excel_serial(dt.as_f64()) {
            Some(value) => CellValue::DateTime(value),
            None => CellValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => parse_iso_datetime(s)
            .map(CellValue::DateTime)
            .unwrap_or_else(|| CellValue::text(s.clone())),
        Data::DurationIso(s) => CellValue::text(s.clone()),
        Data::Error(_) => CellValue::text(cell.to_string()),
    }
}

fn parse_iso_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(cells: &[&[Data]]) -> Range<Data> {
        let height = cells.len() as u32;
        let width = cells.iter().map(|r| r.len()).max().unwrap_or(1) as u32;
        let mut range = Range::new((0, 0), (height - 1, width - 1));
        for (r, row) in cells.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                range.set_value((r as u32, c as u32), cell.clone());
            }
        }
        range
    }

    #[test]
    fn test_header_and_rows() {
        let r = range(&[
            &[Data::String("Date".into()), Data::String("Name".into())],
            &[Data::String("2023-01-01".into()), Data::String("Alice".into())],
            &[Data::Float(44928.0), Data::Empty],
        ]);
        let table = range_to_table(&r);
        assert_eq!(table.header, vec!["Date", "Name"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows[0][1], CellValue::text("Alice"));
        assert_eq!(table.rows[1], vec![CellValue::Number(44928.0)]);
        assert!(table.cell(1, 1).is_null());
    }

    #[test]
    fn test_blank_and_numeric_headers() {
        let r = range(&[&[Data::Empty, Data::Int(2023), Data::String(" Qty ".into())]]);
        let table = range_to_table(&r);
        assert_eq!(table.header, vec!["col_0", "2023", "Qty"]);
        assert_eq!(table.row_count(), 0);
    }

    #[test]
    fn test_trailing_blank_rows_dropped() {
        let r = range(&[
            &[Data::String("A".into())],
            &[Data::String("x".into())],
            &[Data::Empty],
        ]);
        assert_eq!(range_to_table(&r).row_count(), 1);
    }

    #[test]
    fn test_convert_cell_variants() {
        assert_eq!(convert_cell(&Data::Int(7)), CellValue::Number(7.0));
        assert_eq!(convert_cell(&Data::Bool(true)), CellValue::text("TRUE"));
        assert_eq!(convert_cell(&Data::String(String::new())), CellValue::Null);
        let iso = convert_cell(&Data::DateTimeIso("2023-04-05T10:00:00".into()));
        assert_eq!(iso.to_string(), "2023-04-05 10:00:00");
        let date_only = convert_cell(&Data::DateTimeIso("2023-04-05".into()));
        assert_eq!(date_only.to_string(), "2023-04-05");
    }

    #[test]
    fn test_detect_date_column() {
        let header: Vec<String> = ["Name", "Order Date", "日期"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(detect_date_column(&header), Some("Order Date"));

        let header: Vec<String> = ["名称", "下单时间"].iter().map(|s| s.to_string()).collect();
        assert_eq!(detect_date_column(&header), Some("下单时间"));

        let header: Vec<String> = ["Name", "Qty"].iter().map(|s| s.to_string()).collect();
        assert_eq!(detect_date_column(&header), None);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let importer = ExcelImporter::new("does/not/exist.xlsx");
        assert!(matches!(importer.read_first_sheet(), Err(SheetError::Read(_))));
    }
}
