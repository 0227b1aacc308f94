//! Split a table into per-date groups, merging duplicate rows
//!
//! Rows are bucketed by the normalized date of the key column. Inside a
//! bucket, rows with the same identity (the stringified `merge_on` columns,
//! all non-key columns by default) collapse into one output row; any other
//! column whose value differs is newline-concatenated onto the kept row.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

use crate::core::dates::{self, DateFormat};
use crate::error::SheetResult;
use crate::runner::RunContext;
use crate::types::{CellValue, Table};

/// Grouping knobs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupOptions {
    /// Sheet-name format for each group
    pub date_format: DateFormat,
    /// Keep the key column in each group's body
    pub keep_key_column: bool,
    /// Columns that identify a row for merging; `None` means every non-key column
    pub merge_on: Option<Vec<String>>,
}

/// One date bucket after merging
#[derive(Debug, Clone, PartialEq)]
pub struct DateGroup {
    pub date: NaiveDate,
    /// Rendered with the requested format, not yet sanitized for Excel
    pub sheet_name: String,
    /// Source data-row indices in original order
    pub source_rows: Vec<usize>,
    pub table: Table,
}

/// Groups in ascending date order plus counters for reporting
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupingResult {
    pub groups: Vec<DateGroup>,
    pub invalid_rows: usize,
    pub merged_rows: usize,
    pub rows_scanned: usize,
}

impl GroupingResult {
    /// Source rows that landed in some group (merged rows counted individually)
    pub fn rows_mapped(&self) -> usize {
        self.groups.iter().map(|g| g.source_rows.len()).sum()
    }

    pub fn output_rows(&self) -> usize {
        self.groups.iter().map(|g| g.table.row_count()).sum()
    }
}

/// Group `table` by the date in `key_column`
pub fn group_by_date(
    table: &Table,
    key_column: &str,
    options: &GroupOptions,
    ctx: &RunContext,
) -> SheetResult<GroupingResult> {
    table.require_header("source table")?;
    let index = table.header_index();
    let key_col = index.position(key_column)?;

    let identity_cols: Vec<usize> = match &options.merge_on {
        Some(names) => names
            .iter()
            .map(|name| index.position(name))
            .collect::<SheetResult<_>>()?,
        None => (0..table.width()).filter(|&c| c != key_col).collect(),
    };
    let body_cols: Vec<usize> = (0..table.width())
        .filter(|&c| options.keep_key_column || c != key_col)
        .collect();

    // Pass 1: bucket row indices by date
    let total = table.row_count();
    let mut buckets: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    let mut invalid_rows = 0;
    for row in 0..total {
        ctx.checkpoint(row, total)?;
        match dates::normalize(table.cell(row, key_col)) {
            Some(date) => buckets.entry(date).or_default().push(row),
            None => invalid_rows += 1,
        }
    }
    ctx.finish_scan(total);
    tracing::debug!(groups = buckets.len(), invalid_rows, "rows bucketed by date");

    // Pass 2: merge rows inside each bucket (BTreeMap yields ascending dates)
    let header: Vec<String> = body_cols.iter().map(|&c| table.header[c].clone()).collect();
    let mut groups = Vec::with_capacity(buckets.len());
    let mut merged_rows = 0;
    for (date, source_rows) in buckets {
        ctx.check_cancelled()?;
        let mut merger =
            GroupMerger::new(table, header.clone(), &body_cols, &identity_cols, key_col);
        for &row in &source_rows {
            merger.push(row);
        }
        merged_rows += merger.merged;
        tracing::debug!(%date, rows = source_rows.len(), merged = merger.merged, "group built");
        groups.push(DateGroup {
            date,
            sheet_name: options.date_format.render(date),
            source_rows,
            table: merger.out,
        });
    }

    Ok(GroupingResult {
        groups,
        invalid_rows,
        merged_rows,
        rows_scanned: total,
    })
}

/// Builds one group's output table
struct GroupMerger<'a> {
    source: &'a Table,
    body_cols: &'a [usize],
    identity_cols: &'a [usize],
    key_col: usize,
    seen: HashMap<Vec<String>, usize>,
    out: Table,
    merged: usize,
}

impl<'a> GroupMerger<'a> {
    fn new(
        source: &'a Table,
        header: Vec<String>,
        body_cols: &'a [usize],
        identity_cols: &'a [usize],
        key_col: usize,
    ) -> Self {
        Self {
            source,
            body_cols,
            identity_cols,
            key_col,
            seen: HashMap::new(),
            out: Table::new(header),
            merged: 0,
        }
    }

    fn push(&mut self, row: usize) {
        let identity: Vec<String> = self
            .identity_cols
            .iter()
            .map(|&c| self.source.cell(row, c).to_string())
            .collect();

        let existing_row = self.seen.get(&identity).copied();
        let Some(out_row) = existing_row else {
            let cells = self
                .body_cols
                .iter()
                .map(|&c| self.source.cell(row, c).clone())
                .collect();
            self.seen.insert(identity, self.out.row_count());
            self.out.add_row(cells);
            return;
        };

        for (out_col, &src_col) in self.body_cols.iter().enumerate() {
            if src_col == self.key_col {
                continue;
            }
            let incoming = self.source.cell(row, src_col);
            let existing = &mut self.out.rows[out_row][out_col];
            if incoming.is_null() || incoming.to_string() == existing.to_string() {
                continue;
            }
            *existing = concat_cell(existing, incoming);
        }
        self.merged += 1;
    }
}

/// `existing + "\n" + incoming`, or just `incoming` when existing is empty
fn concat_cell(existing: &CellValue, incoming: &CellValue) -> CellValue {
    let current = existing.to_string();
    if current.is_empty() {
        incoming.clone()
    } else {
        CellValue::Text(format!("{}\n{}", current, incoming))
    }
}
