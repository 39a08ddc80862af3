//! Column fill statistics for a freshly built canonical table.

use sheetcheck_core::{ColumnSchema, Record, Table, ID_COLUMN, TITLE_COLUMN};

use crate::builder::TableBuilder;
use crate::matcher::FIRST_DATA_ROW;
use crate::report::{push_match_listing, MatchEntry, ReportOptions};

const TOP_COLUMNS: usize = 10;
const EMPTY_PREVIEW: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFill {
    pub column: String,
    pub filled: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillReport {
    pub rows: usize,
    pub total_columns: usize,
    pub base_columns: usize,
    pub extension_columns: usize,
    /// Most-filled columns, ties broken by name.
    pub top: Vec<ColumnFill>,
    /// Columns with no non-blank cell, sorted by name.
    pub empty: Vec<String>,
}

pub fn fill_report(table: &Table, schema: &ColumnSchema) -> FillReport {
    let mut fills: Vec<ColumnFill> = table
        .header
        .iter()
        .enumerate()
        .map(|(pos, column)| ColumnFill {
            column: column.clone(),
            filled: table
                .rows
                .iter()
                .filter(|row| row.get(pos).is_some_and(|cell| !cell.trim().is_empty()))
                .count(),
        })
        .collect();

    let (top, empty) = if table.rows.is_empty() {
        (Vec::new(), Vec::new())
    } else {
        let mut empty: Vec<String> = fills
            .iter()
            .filter(|fill| fill.filled == 0)
            .map(|fill| fill.column.clone())
            .collect();
        empty.sort();
        fills.sort_by(|a, b| b.filled.cmp(&a.filled).then_with(|| a.column.cmp(&b.column)));
        fills.truncate(TOP_COLUMNS);
        (fills, empty)
    };

    FillReport {
        rows: table.rows.len(),
        total_columns: schema.len(),
        base_columns: schema.base().len(),
        extension_columns: schema.extension().len(),
        top,
        empty,
    }
}

/// Row listing as the records will land in the store, header on row 1.
pub fn record_matches(builder: &TableBuilder<'_>, records: &[Record]) -> Vec<MatchEntry> {
    let columns = [ID_COLUMN.to_string(), TITLE_COLUMN.to_string()];
    records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let mut cells = builder.build_row(record, &columns).into_iter();
            MatchEntry {
                row: i + FIRST_DATA_ROW,
                id: cells.next().unwrap_or_default(),
                title: cells.next().unwrap_or_default(),
            }
        })
        .collect()
}

pub fn render_fill_report(
    report: &FillReport,
    matches: &[MatchEntry],
    options: &ReportOptions,
) -> String {
    let mut lines = vec![
        format!("rows (excluding header): {}", report.rows),
        format!(
            "columns: {} (base {} + extension {})",
            report.total_columns, report.base_columns, report.extension_columns
        ),
    ];

    if report.rows > 0 {
        lines.push(format!("top {TOP_COLUMNS} filled columns:"));
        for fill in &report.top {
            lines.push(format!("- {}: {}/{}", fill.column, fill.filled, report.rows));
        }
        if !report.empty.is_empty() {
            let preview = report
                .empty
                .iter()
                .take(EMPTY_PREVIEW)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            let suffix = if report.empty.len() > EMPTY_PREVIEW { " ..." } else { "" };
            lines.push(format!("empty columns (0/{}): {preview}{suffix}", report.rows));
        }
    }

    push_match_listing(&mut lines, matches, options);

    let mut text = lines.join("\n");
    text.push('\n');
    text
}
