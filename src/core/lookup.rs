//! VLOOKUP-style join with newline-separated multi-value cells

use std::collections::HashMap;

use crate::error::SheetResult;
use crate::runner::RunContext;
use crate::types::{CellValue, Table};

/// Default placeholder for sub-values with no match
pub const DEFAULT_NOT_FOUND: &str = "-";

/// Trimmed search value → trimmed result value. Later rows overwrite earlier ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LookupIndex {
    entries: HashMap<String, String>,
}

impl LookupIndex {
    /// Index `reference` by `search_column`, mapping to `result_column`
    pub fn build(reference: &Table, search_column: &str, result_column: &str) -> SheetResult<Self> {
        reference.require_header("reference table")?;
        let header = reference.header_index();
        let search_col = header.position(search_column)?;
        let result_col = header.position(result_column)?;

        let mut entries = HashMap::with_capacity(reference.row_count());
        for row in 0..reference.row_count() {
            let key = reference.cell(row, search_col);
            if key.is_blank() {
                continue;
            }
            let value = reference.cell(row, result_col).to_string();
            entries.insert(key.to_string().trim().to_string(), value.trim().to_string());
        }
        tracing::debug!(keys = entries.len(), "lookup index built");
        Ok(Self { entries })
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let entries = pairs
            .into_iter()
            .map(|(k, v)| (k.into().trim().to_string(), v.into().trim().to_string()))
            .collect();
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where the lookup results go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultColumn {
    /// New trailing column with this header
    Append(String),
    /// Overwrite the named column in place; appended under that name if absent
    Named(String),
}

impl ResultColumn {
    pub fn header(&self) -> &str {
        match self {
            ResultColumn::Append(name) | ResultColumn::Named(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinOptions {
    pub not_found: String,
    pub target: ResultColumn,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            not_found: DEFAULT_NOT_FOUND.to_string(),
            target: ResultColumn::Append("VLOOKUP".to_string()),
        }
    }
}

/// Per-cell and running match counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchCounts {
    pub matched: usize,
    pub not_found: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinResult {
    pub table: Table,
    /// Position of the result column in `table`
    pub result_column: usize,
    /// True when the result column was added rather than overwritten
    pub appended: bool,
    pub counts: MatchCounts,
    pub rows_scanned: usize,
}

/// Split a multi-value cell into trimmed, non-empty sub-values
pub fn split_multi_value(raw: &str) -> Vec<&str> {
    raw.split('\n')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Resolve every sub-value of `cell` against `index`, rejoined with newlines.
///
/// Empty hits count as misses. A null cell or a cell with no sub-values
/// yields an empty string and touches no counter.
pub fn resolve_cell(
    cell: &CellValue,
    index: &LookupIndex,
    not_found: &str,
    counts: &mut MatchCounts,
) -> String {
    if cell.is_null() {
        return String::new();
    }
    let raw = cell.to_string();
    split_multi_value(&raw)
        .into_iter()
        .map(|key| match index.get(key) {
            Some(value) if !value.is_empty() => {
                counts.matched += 1;
                value.to_string()
            }
            _ => {
                counts.not_found += 1;
                not_found.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Look up `lookup_column` of `primary` in `index`, writing one result per row
pub fn join(
    primary: &Table,
    lookup_column: &str,
    index: &LookupIndex,
    options: &JoinOptions,
    ctx: &RunContext,
) -> SheetResult<JoinResult> {
    primary.require_header("primary table")?;
    let header = primary.header_index();
    let lookup_col = header.position(lookup_column)?;

    let mut table = primary.clone();
    let (result_column, appended) = match &options.target {
        ResultColumn::Named(name) if header.contains(name) => (header.position(name)?, false),
        target => {
            table.header.push(target.header().to_string());
            (table.header.len() - 1, true)
        }
    };
    let width = table.width();

    let total = primary.row_count();
    let mut counts = MatchCounts::default();
    for (row_idx, row) in table.rows.iter_mut().enumerate() {
        ctx.checkpoint(row_idx, total)?;
        let resolved = resolve_cell(
            primary.cell(row_idx, lookup_col),
            index,
            &options.not_found,
            &mut counts,
        );
        if row.len() < width {
            row.resize(width, CellValue::Null);
        }
        row[result_column] = CellValue::from(resolved);
    }
    ctx.finish_scan(total);
    tracing::debug!(matched = counts.matched, not_found = counts.not_found, "join finished");

    Ok(JoinResult {
        table,
        result_column,
        appended,
        counts,
        rows_scanned: total,
    })
}
