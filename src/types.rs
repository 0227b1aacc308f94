use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::HashMap;
use std::fmt;

use crate::error::{SheetError, SheetResult};

//==============================================================================
// Cell Values
//==============================================================================

/// A single spreadsheet cell
///
/// Formula cells arrive here as their cached result; the reader never
/// evaluates anything.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Text(String),
    Number(f64),
    /// Native date/time cell (time of day kept for output, ignored for grouping)
    DateTime(NaiveDateTime),
}

static NULL_CELL: CellValue = CellValue::Null;

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Text(s.into())
    }

    pub fn date(date: NaiveDate) -> Self {
        CellValue::DateTime(date.and_time(NaiveTime::MIN))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Null or a string that is empty after trimming
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

/// Stringified form used for dedup keys, lookups and merge comparisons.
/// Null renders as the empty string.
impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{:.0}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            CellValue::DateTime(dt) => {
                if dt.time() == NaiveTime::MIN {
                    write!(f, "{}", dt.format("%Y-%m-%d"))
                } else {
                    write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S"))
                }
            }
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            CellValue::Null
        } else {
            CellValue::Text(s.to_string())
        }
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        if s.is_empty() {
            CellValue::Null
        } else {
            CellValue::Text(s)
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(d: NaiveDate) -> Self {
        CellValue::date(d)
    }
}

//==============================================================================
// Tables
//==============================================================================

/// Header name → column position, first occurrence wins
#[derive(Debug, Clone, Default)]
pub struct HeaderIndex {
    positions: HashMap<String, usize>,
    names: Vec<String>,
}

impl HeaderIndex {
    pub fn new(header: &[String]) -> Self {
        let mut positions = HashMap::with_capacity(header.len());
        for (idx, name) in header.iter().enumerate() {
            positions.entry(name.clone()).or_insert(idx);
        }
        Self {
            positions,
            names: header.to_vec(),
        }
    }

    /// Position of `name`, or `ColumnNotFound`
    pub fn position(&self, name: &str) -> SheetResult<usize> {
        self.positions
            .get(name)
            .copied()
            .ok_or_else(|| SheetError::column_not_found(name, &self.names))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }
}

/// Header row plus data rows, positionally aligned
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Table {
    pub fn new(header: Vec<String>) -> Self {
        Self {
            header,
            rows: Vec::new(),
        }
    }

    /// Build a table from string literals; empty strings become nulls
    pub fn from_strings(header: &[&str], rows: &[&[&str]]) -> Self {
        Self {
            header: header.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|v| CellValue::from(*v)).collect())
                .collect(),
        }
    }

    pub fn add_row(&mut self, row: Vec<CellValue>) {
        self.rows.push(row);
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.header.len()
    }

    pub fn header_index(&self) -> HeaderIndex {
        HeaderIndex::new(&self.header)
    }

    /// Cell at (row, col); missing trailing cells read as null
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&NULL_CELL)
    }

    /// Fail with `EmptyHeader` when there is nothing to key on
    pub fn require_header(&self, source: &str) -> SheetResult<()> {
        if self.header.is_empty() {
            return Err(SheetError::EmptyHeader(source.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_numbers() {
        assert_eq!(CellValue::Number(42.0).to_string(), "42");
        assert_eq!(CellValue::Number(-3.0).to_string(), "-3");
        assert_eq!(CellValue::Number(2.5).to_string(), "2.5");
    }

    #[test]
    fn test_display_null_and_dates() {
        assert_eq!(CellValue::Null.to_string(), "");
        let d = NaiveDate::from_ymd_opt(2023, 1, 5).unwrap();
        assert_eq!(CellValue::date(d).to_string(), "2023-01-05");
        let dt = d.and_hms_opt(9, 30, 0).unwrap();
        assert_eq!(CellValue::DateTime(dt).to_string(), "2023-01-05 09:30:00");
    }

    #[test]
    fn test_empty_string_is_null() {
        assert!(CellValue::from("").is_null());
        assert!(CellValue::text("  ").is_blank());
        assert!(!CellValue::text("x").is_blank());
    }

    #[test]
    fn test_header_index_first_match() {
        let header = vec!["A".to_string(), "B".to_string(), "A".to_string()];
        let index = HeaderIndex::new(&header);
        assert_eq!(index.position("A").unwrap(), 0);
        assert_eq!(index.position("B").unwrap(), 1);
        assert!(matches!(
            index.position("C"),
            Err(SheetError::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn test_missing_trailing_cells_are_null() {
        let table = Table::from_strings(&["A", "B", "C"], &[&["1"]]);
        assert_eq!(table.cell(0, 0), &CellValue::text("1"));
        assert!(table.cell(0, 2).is_null());
        assert!(table.cell(5, 0).is_null());
    }

    #[test]
    fn test_require_header() {
        assert!(Table::default().require_header("x.xlsx").is_err());
        assert!(Table::new(vec!["A".into()]).require_header("x.xlsx").is_ok());
    }
}
