//! Sheetkit - date grouping and multi-value VLOOKUP for spreadsheets
//!
//! Reads the first worksheet of a workbook and either splits its rows into
//! one sheet per calendar date, or looks up newline-separated keys in a
//! reference sheet. Results are written to a new .xlsx file; inputs are
//! never modified.
//!
//! # Features
//!
//! - Date normalization across Excel serials, datetimes and common text formats
//! - Per-date sheets with merging of duplicate rows
//! - VLOOKUP over multi-value cells with a not-found sentinel
//! - Fast (values only) and styled output
//! - Background runs with progress events and cooperative cancellation
//!
//! # Example
//!
//! ```no_run
//! use royalbit_sheetkit::core::{group_by_date, GroupOptions};
//! use royalbit_sheetkit::excel::ExcelImporter;
//! use royalbit_sheetkit::runner::RunContext;
//!
//! let sheet = ExcelImporter::new("orders.xlsx").read_first_sheet()?;
//! let options = GroupOptions::default();
//! let result = group_by_date(&sheet.table, "Date", &options, &RunContext::detached())?;
//!
//! for group in &result.groups {
//!     println!("{}: {} rows", group.sheet_name, group.table.row_count());
//! }
//! println!("Invalid rows: {}", result.invalid_rows);
//! # Ok::<(), royalbit_sheetkit::error::SheetError>(())
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod excel;
pub mod runner;
pub mod types;

// Re-export commonly used types
pub use config::SheetkitConfig;
pub use error::{SheetError, SheetResult};
pub use types::{CellValue, HeaderIndex, Table};
