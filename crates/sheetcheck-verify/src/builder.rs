//! Canonical table construction from catalog records.

use std::collections::BTreeSet;

use sheetcheck_core::{
    format_float, normalize_cell, BaseColumns, CellValue, ColumnSchema, Record, Scalar, Table,
    ID_COLUMN, TITLE_COLUMN,
};

pub const NAME_FIELD: &str = "name";
pub const START_MS_FIELD: &str = "time_start_milliseconds";
pub const END_MS_FIELD: &str = "time_end_milliseconds";

pub const START_MS_COLUMN: &str = "time_start_ms";
pub const END_MS_COLUMN: &str = "time_end_ms";
pub const START_SECONDS_COLUMN: &str = "time_start_S";
pub const END_SECONDS_COLUMN: &str = "time_end_S";

pub struct TableBuilder<'a> {
    base: &'a BaseColumns,
}

impl<'a> TableBuilder<'a> {
    pub fn new(base: &'a BaseColumns) -> Self {
        Self { base }
    }

    /// Base columns, then every attribute key seen across records, sorted.
    pub fn build_header(&self, records: &[Record]) -> ColumnSchema {
        let extension: BTreeSet<String> = records
            .iter()
            .filter_map(Record::attributes)
            .flat_map(|attrs| attrs.keys().cloned())
            .collect();
        ColumnSchema::new(self.base, extension)
    }

    /// One cell per column, in column order. Never fails on missing data.
    pub fn build_row(&self, record: &Record, columns: &[String]) -> Vec<String> {
        columns
            .iter()
            .map(|column| self.cell(record, column))
            .collect()
    }

    pub fn build_table(&self, records: &[Record], columns: &[String]) -> Table {
        Table {
            header: columns.to_vec(),
            rows: records
                .iter()
                .map(|record| self.build_row(record, columns))
                .collect(),
        }
    }

    fn cell(&self, record: &Record, column: &str) -> String {
        match column {
            ID_COLUMN => normalize_cell(record.get(ID_COLUMN)),
            TITLE_COLUMN => title_text(record),
            START_MS_COLUMN => normalize_cell(record.get(START_MS_FIELD)),
            END_MS_COLUMN => normalize_cell(record.get(END_MS_FIELD)),
            START_SECONDS_COLUMN => seconds_text(record, START_MS_FIELD),
            END_SECONDS_COLUMN => seconds_text(record, END_MS_FIELD),
            _ if self.base.is_blank(column) => String::new(),
            _ => record
                .attributes()
                .and_then(|attrs| attrs.get(column))
                .map(normalize_cell)
                .unwrap_or_default(),
        }
    }
}

/// First of title and name that is set; a whitespace-only title still wins.
fn title_text(record: &Record) -> String {
    [TITLE_COLUMN, NAME_FIELD]
        .iter()
        .map(|field| record.get(field))
        .find(|value| !is_unset(value))
        .map(normalize_cell)
        .unwrap_or_default()
}

fn is_unset(value: &CellValue) -> bool {
    match value {
        CellValue::Null => true,
        CellValue::Scalar(Scalar::Text(text)) => text.is_empty(),
        _ => false,
    }
}

// Plain f64 division; see format_float for rendering.
fn seconds_text(record: &Record, field: &str) -> String {
    record
        .get(field)
        .as_f64()
        .map(|ms| format_float(ms / 1000.0))
        .unwrap_or_default()
}
