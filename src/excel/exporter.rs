//! Excel exporter - writes result tables into a new workbook
//!
//! The workbook is assembled in memory and only touches disk in
//! [`TableMaterializer::commit`]. Dropping a materializer without committing
//! discards everything, which is how failed and cancelled runs leave no file.

use crate::core::dates::to_excel_serial;
use crate::error::{SheetError, SheetResult};
use crate::excel::naming::SheetNamer;
use crate::excel::style::{apply_best_effort, StyleConfig};
use crate::types::{CellValue, Table};
use chrono::NaiveTime;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use serde::{Deserialize, Serialize};
use std::path::Path;

const EXCEL_MAX_ROWS: usize = 1_048_576;
const EXCEL_MAX_COLS: usize = 16_384;

/// Which materializer a run uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Values only, no styling
    #[default]
    Fast,
    /// Values plus header/data styling, row heights and column widths
    Styled,
}

/// Which cells of a sheet get styled (styled mode only)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleScope {
    None,
    All,
    Columns(Vec<usize>),
}

/// Sink for result tables. Not committing discards the output.
pub trait TableMaterializer {
    /// Add a sheet; returns the sheet name actually used after sanitizing
    fn add_sheet(&mut self, name: &str, table: &Table, scope: &StyleScope) -> SheetResult<String>;

    fn sheet_count(&self) -> usize;

    /// Write the workbook to `path`
    fn commit(self: Box<Self>, path: &Path) -> SheetResult<()>;
}

/// Build the materializer for `mode`
pub fn materializer_for(mode: OutputMode, style: &StyleConfig) -> Box<dyn TableMaterializer> {
    match mode {
        OutputMode::Fast => Box::new(FastMaterializer::new()),
        OutputMode::Styled => Box::new(StyledMaterializer::new(style.clone())),
    }
}

//==============================================================================
// Shared workbook plumbing
//==============================================================================

struct WorkbookBuffer {
    workbook: Workbook,
    namer: SheetNamer,
    sheets: usize,
}

impl WorkbookBuffer {
    fn new() -> Self {
        Self {
            workbook: Workbook::new(),
            namer: SheetNamer::new(),
            sheets: 0,
        }
    }

    fn add_worksheet(&mut self, raw_name: &str) -> SheetResult<(&mut Worksheet, String)> {
        let name = self.namer.claim(raw_name);
        let worksheet = self.workbook.add_worksheet();
        worksheet
            .set_name(&name)
            .map_err(|e| {
                SheetError::Write(format!("Failed to set worksheet name '{}': {}", name, e))
            })?;
        self.sheets += 1;
        Ok((worksheet, name))
    }

    fn save(mut self, path: &Path) -> SheetResult<()> {
        self.workbook
            .save(path)
            .map_err(|e| SheetError::Write(format!("Failed to save {}: {}", path.display(), e)))?;
        tracing::info!(path = %path.display(), sheets = self.sheets, "workbook saved");
        Ok(())
    }
}

/// Formats used when writing cell values
struct CellFormats {
    /// Applied to text and numbers; `None` writes unformatted
    base: Option<Format>,
    date: Format,
    datetime: Format,
}

impl CellFormats {
    fn plain() -> Self {
        Self::with_base(None)
    }

    fn with_base(base: Option<Format>) -> Self {
        let seed = base.clone().unwrap_or_else(Format::new);
        Self {
            date: seed.clone().set_num_format("yyyy-mm-dd"),
            datetime: seed.set_num_format("yyyy-mm-dd hh:mm:ss"),
            base,
        }
    }
}

fn check_bounds(name: &str, table: &Table) -> SheetResult<()> {
    if table.row_count() + 1 > EXCEL_MAX_ROWS || table.width() > EXCEL_MAX_COLS {
        return Err(SheetError::Write(format!(
            "sheet '{}' is too large for Excel ({} rows x {} columns)",
            name,
            table.row_count() + 1,
            table.width()
        )));
    }
    Ok(())
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &CellValue,
    formats: &CellFormats,
) -> Result<(), XlsxError> {
    match (value, &formats.base) {
        (CellValue::Null, None) => {}
        (CellValue::Null, Some(format)) => {
            worksheet.write_blank(row, col, format)?;
        }
        (CellValue::Text(s), None) => {
            worksheet.write_string(row, col, s)?;
        }
        (CellValue::Text(s), Some(format)) => {
            worksheet.write_string_with_format(row, col, s, format)?;
        }
        (CellValue::Number(n), None) => {
            worksheet.write_number(row, col, *n)?;
        }
        (CellValue::Number(n), Some(format)) => {
            worksheet.write_number_with_format(row, col, *n, format)?;
        }
        (CellValue::DateTime(dt), _) => {
            let format = if dt.time() == NaiveTime::MIN {
                &formats.date
            } else {
                &formats.datetime
            };
            worksheet.write_number_with_format(row, col, to_excel_serial(dt), format)?;
        }
    }
    Ok(())
}

/// Header in row 0, data from row 1. Row/column counts were checked by `check_bounds`.
fn write_table(worksheet: &mut Worksheet, sheet: &str, table: &Table) -> SheetResult<()> {
    let formats = CellFormats::plain();
    for (col, name) in table.header.iter().enumerate() {
        worksheet
            .write_string(0, col as u16, name)
            .map_err(|e| {
                SheetError::Write(format!("Failed to write header in '{}': {}", sheet, e))
            })?;
    }
    for (row_idx, row) in table.rows.iter().enumerate() {
        for (col, value) in row.iter().enumerate().take(table.width()) {
            write_cell(worksheet, row_idx as u32 + 1, col as u16, value, &formats).map_err(|e| {
                SheetError::Write(format!(
                    "Failed to write row {} column {} in '{}': {}",
                    row_idx + 2,
                    col + 1,
                    sheet,
                    e
                ))
            })?;
        }
    }
    Ok(())
}

//==============================================================================
// Fast path
//==============================================================================

/// Values only
pub struct FastMaterializer {
    buffer: WorkbookBuffer,
}

impl FastMaterializer {
    pub fn new() -> Self {
        Self {
            buffer: WorkbookBuffer::new(),
        }
    }
}

impl Default for FastMaterializer {
    fn default() -> Self {
        Self::new()
    }
}

impl TableMaterializer for FastMaterializer {
    fn add_sheet(&mut self, name: &str, table: &Table, _scope: &StyleScope) -> SheetResult<String> {
        check_bounds(name, table)?;
        let (worksheet, sheet_name) = self.buffer.add_worksheet(name)?;
        write_table(worksheet, &sheet_name, table)?;
        tracing::debug!(sheet = %sheet_name, rows = table.row_count(), "sheet written");
        Ok(sheet_name)
    }

    fn sheet_count(&self) -> usize {
        self.buffer.sheets
    }

    fn commit(self: Box<Self>, path: &Path) -> SheetResult<()> {
        self.buffer.save(path)
    }
}

//==============================================================================
// Styled path
//==============================================================================

/// Values plus the `StyleConfig` styling contract
pub struct StyledMaterializer {
    buffer: WorkbookBuffer,
    style: StyleConfig,
}

impl StyledMaterializer {
    pub fn new(style: StyleConfig) -> Self {
        Self {
            buffer: WorkbookBuffer::new(),
            style,
        }
    }

    /// Re-write scoped cells with formats and set layout; never fails
    fn style_sheet(
        style: &StyleConfig,
        worksheet: &mut Worksheet,
        sheet: &str,
        table: &Table,
        scope: &StyleScope,
    ) {
        let cols: Vec<u16> = match scope {
            StyleScope::None => return,
            StyleScope::All => (0..table.width() as u16).collect(),
            StyleScope::Columns(cols) => cols
                .iter()
                .filter(|&&c| c < table.width())
                .map(|&c| c as u16)
                .collect(),
        };
        let data_rows = 1..table.row_count() as u32 + 1;

        let header_format = style.header_format();
        apply_best_effort(&mut *worksheet, 0..1, &cols, sheet, |ws: &mut Worksheet, r, c| {
            ws.write_string_with_format(r, c, &table.header[c as usize], &header_format)
                .map(|_| ())
        });

        let formats = CellFormats::with_base(Some(style.data_format()));
        let rows = data_rows.clone();
        apply_best_effort(&mut *worksheet, rows, &cols, sheet, |ws: &mut Worksheet, r, c| {
            write_cell(ws, r, c, table.cell(r as usize - 1, c as usize), &formats)
        });

        let row_height = style.row_height;
        apply_best_effort(&mut *worksheet, data_rows, &[0], sheet, |ws: &mut Worksheet, r, _| {
            ws.set_row_height(r, row_height).map(|_| ())
        });

        let column_width = style.column_width;
        apply_best_effort(&mut *worksheet, 0..1, &cols, sheet, |ws: &mut Worksheet, _, c| {
            ws.set_column_width(c, column_width).map(|_| ())
        });
    }
}

impl TableMaterializer for StyledMaterializer {
    fn add_sheet(&mut self, name: &str, table: &Table, scope: &StyleScope) -> SheetResult<String> {
        check_bounds(name, table)?;
        let (worksheet, sheet_name) = self.buffer.add_worksheet(name)?;
        write_table(worksheet, &sheet_name, table)?;
        Self::style_sheet(&self.style, worksheet, &sheet_name, table, scope);
        tracing::debug!(sheet = %sheet_name, rows = table.row_count(), "styled sheet written");
        Ok(sheet_name)
    }

    fn sheet_count(&self) -> usize {
        self.buffer.sheets
    }

    fn commit(self: Box<Self>, path: &Path) -> SheetResult<()> {
        self.buffer.save(path)
    }
}
