//! Styling for the format-preserving output path
//!
//! Styling never fails a run. Each pass walks an ordered list of
//! granularities: the whole region at once, then row by row, then cell by
//! cell. A level that hits an error hands the remaining work to the next
//! one; cells that still fail at cell level are logged and skipped.

use rust_xlsxwriter::{Format, FormatAlign};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::ops::Range;

/// Horizontal alignment for styled cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Left,
    #[default]
    Center,
    Right,
}

impl Align {
    fn to_format_align(self) -> FormatAlign {
        match self {
            Align::Left => FormatAlign::Left,
            Align::Center => FormatAlign::Center,
            Align::Right => FormatAlign::Right,
        }
    }
}

/// Styling applied by the styled materializer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    /// Data row height in points
    pub row_height: f64,
    pub wrap_text: bool,
    pub align: Align,
    pub header_bold: bool,
    /// 0xRRGGBB
    pub header_background: u32,
    /// 0xRRGGBB
    pub header_font_color: u32,
    /// Column width in characters
    pub column_width: f64,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            row_height: 50.0,
            wrap_text: true,
            align: Align::Center,
            header_bold: true,
            header_background: 0x4472C4,
            header_font_color: 0xFFFFFF,
            column_width: 18.0,
        }
    }
}

impl StyleConfig {
    pub fn header_format(&self) -> Format {
        let mut format = Format::new()
            .set_align(self.align.to_format_align())
            .set_align(FormatAlign::VerticalCenter)
            .set_background_color(self.header_background)
            .set_font_color(self.header_font_color);
        if self.header_bold {
            format = format.set_bold();
        }
        format
    }

    pub fn data_format(&self) -> Format {
        let mut format = Format::new()
            .set_align(self.align.to_format_align())
            .set_align(FormatAlign::VerticalCenter);
        if self.wrap_text {
            format = format.set_text_wrap();
        }
        format
    }
}

/// How much work one styling attempt covers, coarsest first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Region,
    Row,
    Cell,
}

/// Result of one best-effort styling pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleReport {
    /// Finest granularity that had to be used; `None` when there was nothing to style
    pub granularity: Option<Granularity>,
    /// Cells left unstyled after the chain was exhausted
    pub failed_cells: usize,
}

/// Apply `op` to every (row, col) in `rows × cols`, dropping from region to
/// row to cell granularity on errors. `op` must be safe to repeat on a cell.
pub fn apply_best_effort<T, E, F>(
    target: &mut T,
    rows: Range<u32>,
    cols: &[u16],
    label: &str,
    mut op: F,
) -> StyleReport
where
    E: Display,
    F: FnMut(&mut T, u32, u16) -> Result<(), E>,
{
    let mut report = StyleReport::default();
    if rows.is_empty() || cols.is_empty() {
        return report;
    }

    // Region: all cells, stop at the first failure
    report.granularity = Some(Granularity::Region);
    let region_result = rows
        .clone()
        .try_for_each(|r| cols.iter().try_for_each(|&c| op(&mut *target, r, c)));
    let Err(e) = region_result else {
        return report;
    };
    tracing::warn!(sheet = label, error = %e, "region styling failed, retrying by row");

    // Row: each row all-or-nothing; failed rows go to cell level
    report.granularity = Some(Granularity::Row);
    let mut failed_rows = Vec::new();
    for r in rows {
        if let Err(e) = cols.iter().try_for_each(|&c| op(&mut *target, r, c)) {
            tracing::debug!(sheet = label, row = r, error = %e, "row styling failed");
            failed_rows.push(r);
        }
    }
    if failed_rows.is_empty() {
        return report;
    }

    // Cell: whatever still fails is skipped
    report.granularity = Some(Granularity::Cell);
    for r in failed_rows {
        for &c in cols {
            if let Err(e) = op(&mut *target, r, c) {
                report.failed_cells += 1;
                tracing::debug!(sheet = label, row = r, col = c, error = %e, "cell styling failed");
            }
        }
    }
    if report.failed_cells > 0 {
        tracing::warn!(
            sheet = label,
            failed = report.failed_cells,
            "styling exhausted all granularities, continuing unstyled"
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records styled cells; fails on listed cells
    #[derive(Default)]
    struct FakeSheet {
        styled: Vec<(u32, u16)>,
        broken: Vec<(u32, u16)>,
        calls: usize,
    }

    fn style(sheet: &mut FakeSheet, r: u32, c: u16) -> Result<(), String> {
        sheet.calls += 1;
        if sheet.broken.contains(&(r, c)) {
            return Err(format!("bad cell {r},{c}"));
        }
        if !sheet.styled.contains(&(r, c)) {
            sheet.styled.push((r, c));
        }
        Ok(())
    }

    #[test]
    fn test_defaults_match_documented_contract() {
        let config = StyleConfig::default();
        assert_eq!(config.row_height, 50.0);
        assert!(config.wrap_text);
        assert_eq!(config.align, Align::Center);
    }

    #[test]
    fn test_config_partial_yaml() {
        let config: StyleConfig = serde_yaml::from_str("row_height: 30\nalign: left\n").unwrap();
        assert_eq!(config.row_height, 30.0);
        assert_eq!(config.align, Align::Left);
        assert!(config.wrap_text);
    }

    #[test]
    fn test_region_success() {
        let mut sheet = FakeSheet::default();
        let report = apply_best_effort(&mut sheet, 1..3, &[0, 1], "s", style);
        assert_eq!(report.granularity, Some(Granularity::Region));
        assert_eq!(report.failed_cells, 0);
        assert_eq!(sheet.styled.len(), 4);
        assert_eq!(sheet.calls, 4);
    }

    #[test]
    fn test_falls_back_to_cells() {
        let mut sheet = FakeSheet {
            broken: vec![(2, 1)],
            ..Default::default()
        };
        let report = apply_best_effort(&mut sheet, 1..4, &[0, 1], "s", style);
        assert_eq!(report.granularity, Some(Granularity::Cell));
        assert_eq!(report.failed_cells, 1);
        // Everything except the broken cell ends up styled
        assert_eq!(sheet.styled.len(), 5);
        assert!(!sheet.styled.contains(&(2, 1)));
    }

    #[test]
    fn test_empty_region_is_noop() {
        let mut sheet = FakeSheet::default();
        let report = apply_best_effort(&mut sheet, 1..1, &[0], "s", style);
        assert_eq!(report, StyleReport::default());
        assert_eq!(sheet.calls, 0);
    }
}
