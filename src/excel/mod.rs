//! Excel import/export
//!
//! - Import: first worksheet of a workbook → `Table`
//! - Export: result tables → new .xlsx through a `TableMaterializer`

mod exporter;
mod importer;
pub mod naming;
pub mod style;

pub use exporter::{
    materializer_for, FastMaterializer, OutputMode, StyleScope, StyledMaterializer,
    TableMaterializer,
};
pub use importer::{detect_date_column, ExcelImporter, LoadedSheet};
pub use style::{Align, StyleConfig};
