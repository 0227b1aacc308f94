//! Input validation, output file names and Excel-safe sheet names

use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{SheetError, SheetResult};

/// Workbook extensions the importer can open
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["xlsx", "xls", "xlsm", "xlsb", "ods"];

/// Default file-name prefix for timestamped grouping output
pub const GROUPED_PREFIX: &str = "分类表格";

/// Default file-name prefix for timestamped lookup output
pub const LOOKUP_PREFIX: &str = "VLOOKUP_结果";

/// Excel's sheet-name length limit
const MAX_SHEET_NAME_CHARS: usize = 31;

const FORBIDDEN_SHEET_CHARS: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];

/// Check that `path` exists and looks like a workbook
pub fn validate_input(path: &Path) -> SheetResult<()> {
    if path.as_os_str().is_empty() {
        return Err(SheetError::InvalidInput("no input file given".to_string()));
    }
    if !path.is_file() {
        return Err(SheetError::InvalidInput(format!(
            "file not found: {}",
            path.display()
        )));
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(SheetError::InvalidInput(format!(
            "not a spreadsheet file: {} (expected one of: {})",
            path.display(),
            SUPPORTED_EXTENSIONS.join(", ")
        )));
    }
    Ok(())
}

/// `<dir>/<stem>_date_classified.xlsx` next to the input
pub fn grouped_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}_date_classified.xlsx", stem))
}

/// `<prefix>_<YYYYMMDD_HHMMSS>.xlsx`
pub fn timestamped_name(prefix: &str, now: NaiveDateTime) -> String {
    format!("{}_{}.xlsx", prefix, now.format("%Y%m%d_%H%M%S"))
}

/// Refuse to write over any of the inputs
pub fn ensure_not_input(output: &Path, inputs: &[&Path]) -> SheetResult<()> {
    let out = normalize_path(output);
    if inputs.iter().any(|input| normalize_path(input) == out) {
        return Err(SheetError::InvalidInput(format!(
            "output {} would overwrite an input file",
            output.display()
        )));
    }
    Ok(())
}

fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Replace characters Excel rejects in sheet names and apply the length limit
pub fn sanitize_sheet_name(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| if FORBIDDEN_SHEET_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let trimmed = replaced.trim().trim_matches('\'');
    let mut name: String = trimmed.chars().take(MAX_SHEET_NAME_CHARS).collect();
    // Trimming to 31 chars can expose a trailing apostrophe again
    while name.ends_with('\'') {
        name.pop();
    }
    if name.is_empty() {
        return "Sheet".to_string();
    }
    if name.eq_ignore_ascii_case("history") {
        name.push('_');
    }
    name
}

/// Hands out unique sanitized sheet names for one workbook
#[derive(Debug, Default)]
pub struct SheetNamer {
    used: HashSet<String>,
}

impl SheetNamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitized `raw`, suffixed with ` (2)`, ` (3)`... when already taken.
    /// Excel compares sheet names case-insensitively.
    pub fn claim(&mut self, raw: &str) -> String {
        let base = sanitize_sheet_name(raw);
        if self.used.insert(base.to_lowercase()) {
            return base;
        }
        let mut n = 2;
        loop {
            let suffix = format!(" ({})", n);
            let room = MAX_SHEET_NAME_CHARS - suffix.chars().count();
            let stem: String = base.chars().take(room).collect();
            let candidate = format!("{}{}", stem, suffix);
            if self.used.insert(candidate.to_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }
}
