//! Core value model, column schema and cell normalization for sheetcheck.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use serde_json::{Map as JsonMap, Number, Value as JsonValue};
use thiserror::Error;

pub const CRATE_NAME: &str = "sheetcheck-core";

pub const ID_COLUMN: &str = "id";
pub const TITLE_COLUMN: &str = "title";
pub const ATTRIBUTES_FIELD: &str = "metadata";

pub const DEFAULT_BASE_COLUMNS: [&str; 35] = [
    "id",
    "title",
    "time_start_ms",
    "time_end_ms",
    "time_start_S",
    "time_end_S",
    "Description",
    "ProjectName",
    "ProjectNameTag",
    "SearchTag",
    "Year_",
    "Location",
    "Venue",
    "EpisodeEvent",
    "Source",
    "Scene",
    "GameType",
    "PlayersTags",
    "HandGrade",
    "HANDTag",
    "EPICHAND",
    "Tournament",
    "PokerPlayTags",
    "Adjective",
    "Emotion",
    "AppearanceOutfit",
    "SceneryObject",
    "_gcvi_tags",
    "Badbeat",
    "Bluff",
    "Suckout",
    "Cooler",
    "RUNOUTTag",
    "PostFlop",
    "All-in",
];

pub const DEFAULT_BLANK_COLUMNS: [&str; 2] = ["ProjectNameTag", "SearchTag"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("duplicate column name in base columns: {0}")]
    DuplicateColumn(String),
    #[error("base columns contain an empty name")]
    EmptyColumnName,
    #[error("blank column {0} is not part of the base columns")]
    UnknownBlankColumn(String),
    #[error("observed table is empty (no header row)")]
    EmptyObservedTable,
}

/// Leaf value of a record field.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Number(Number),
    Text(String),
}

impl Scalar {
    /// Untrimmed string form, as the sheet sync tool writes it.
    pub fn render(&self) -> String {
        match self {
            Scalar::Bool(true) => "True".to_string(),
            Scalar::Bool(false) => "False".to_string(),
            Scalar::Number(n) => number_text(n),
            Scalar::Text(s) => s.clone(),
        }
    }
}

/// Dynamically shaped value as delivered by the upstream catalog or read back
/// from the destination store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "JsonValue", into = "JsonValue")]
pub enum CellValue {
    #[default]
    Null,
    Scalar(Scalar),
    Sequence(Vec<CellValue>),
    Mapping(BTreeMap<String, CellValue>),
}

static NULL: CellValue = CellValue::Null;

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Scalar(Scalar::Text(value.into()))
    }

    pub fn integer(value: i64) -> Self {
        CellValue::Scalar(Scalar::Number(Number::from(value)))
    }

    /// Non-finite input becomes `Null`, matching what JSON can carry.
    pub fn float(value: f64) -> Self {
        Number::from_f64(value)
            .map(|n| CellValue::Scalar(Scalar::Number(n)))
            .unwrap_or(CellValue::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Scalar(Scalar::Number(n)) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&BTreeMap<String, CellValue>> {
        match self {
            CellValue::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            CellValue::Null => JsonValue::Null,
            CellValue::Scalar(Scalar::Bool(b)) => JsonValue::Bool(*b),
            CellValue::Scalar(Scalar::Number(n)) => JsonValue::Number(n.clone()),
            CellValue::Scalar(Scalar::Text(s)) => JsonValue::String(s.clone()),
            CellValue::Sequence(items) => {
                JsonValue::Array(items.iter().map(CellValue::to_json).collect())
            }
            CellValue::Mapping(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<JsonMap<_, _>>(),
            ),
        }
    }
}

impl From<JsonValue> for CellValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => CellValue::Null,
            JsonValue::Bool(b) => CellValue::Scalar(Scalar::Bool(b)),
            JsonValue::Number(n) => CellValue::Scalar(Scalar::Number(n)),
            JsonValue::String(s) => CellValue::Scalar(Scalar::Text(s)),
            JsonValue::Array(items) => {
                CellValue::Sequence(items.into_iter().map(CellValue::from).collect())
            }
            JsonValue::Object(map) => CellValue::Mapping(
                map.into_iter()
                    .map(|(k, v)| (k, CellValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<CellValue> for JsonValue {
    fn from(value: CellValue) -> Self {
        value.to_json()
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::text(value)
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::text(value)
    }
}

/// Shortest round-trip decimal text; integral values carry no fractional part.
pub fn format_float(value: f64) -> String {
    format!("{value}")
}

fn number_text(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) => format_float(f),
        None => n.to_string(),
    }
}

/// Canonicalizes a source-side value into comparable text.
///
/// Null becomes empty and scalars are trimmed. A sequence of scalars is
/// newline-joined with nulls dropped. Mappings, nested sequences and empty
/// containers become JSON with `", "` / `": "` separators and sorted keys.
pub fn normalize_cell(value: &CellValue) -> String {
    match value {
        CellValue::Null => String::new(),
        CellValue::Scalar(scalar) => scalar.render().trim().to_string(),
        CellValue::Sequence(items) if !items.is_empty() && items.iter().all(is_flat) => items
            .iter()
            .filter_map(|item| match item {
                CellValue::Scalar(scalar) => Some(scalar.render()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string(),
        CellValue::Sequence(_) | CellValue::Mapping(_) => spaced_json(&value.to_json()),
    }
}

/// JSON writer with a space after every `,` and `:`.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

fn spaced_json(value: &JsonValue) -> String {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, SpacedFormatter);
    match value.serialize(&mut serializer) {
        Ok(()) => String::from_utf8_lossy(&out).into_owned(),
        Err(_) => value.to_string(),
    }
}

fn is_flat(value: &CellValue) -> bool {
    matches!(value, CellValue::Null | CellValue::Scalar(_))
}

/// Normalizes a value read back from the destination store.
pub fn normalize_observed_cell(value: &CellValue) -> String {
    normalize_text(&normalize_cell(value))
}

/// Folds CRLF and lone CR to `\n` and trims surrounding whitespace.
pub fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n").trim().to_string()
}

/// One catalog record: field name to value, immutable once loaded.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, CellValue>,
}

impl Record {
    pub fn new<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<CellValue>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Returns `None` unless the value is a JSON object.
    pub fn from_json(value: JsonValue) -> Option<Self> {
        match CellValue::from(value) {
            CellValue::Mapping(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    pub fn get(&self, field: &str) -> &CellValue {
        self.fields.get(field).unwrap_or(&NULL)
    }

    /// Per-record attribute mapping; a non-mapping value counts as absent.
    pub fn attributes(&self) -> Option<&BTreeMap<String, CellValue>> {
        self.get(ATTRIBUTES_FIELD).as_mapping()
    }
}

/// Fixed, ordered base column list plus the subset left permanently blank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaseColumns {
    names: Vec<String>,
    blank: Vec<String>,
}

impl Default for BaseColumns {
    fn default() -> Self {
        Self {
            names: DEFAULT_BASE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            blank: DEFAULT_BLANK_COLUMNS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl BaseColumns {
    pub fn new(names: Vec<String>, blank: Vec<String>) -> Result<Self, SchemaError> {
        let mut seen = BTreeSet::new();
        for name in &names {
            if name.is_empty() {
                return Err(SchemaError::EmptyColumnName);
            }
            if !seen.insert(name.as_str()) {
                return Err(SchemaError::DuplicateColumn(name.clone()));
            }
        }
        if let Some(unknown) = blank.iter().find(|b| !seen.contains(b.as_str())) {
            return Err(SchemaError::UnknownBlankColumn(unknown.clone()));
        }
        Ok(Self { names, blank })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn is_blank(&self, name: &str) -> bool {
        self.blank.iter().any(|n| n == name)
    }
}

/// Base columns followed by sorted extension columns; never holds duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSchema {
    columns: Vec<String>,
    base_len: usize,
}

impl ColumnSchema {
    pub fn new(base: &BaseColumns, extension: BTreeSet<String>) -> Self {
        let mut columns = base.names().to_vec();
        columns.extend(
            extension
                .into_iter()
                .filter(|name| !name.is_empty() && !base.contains(name)),
        );
        Self {
            columns,
            base_len: base.len(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn base(&self) -> &[String] {
        &self.columns[..self.base_len]
    }

    pub fn extension(&self) -> &[String] {
        &self.columns[self.base_len..]
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

/// Rectangular table of normalized text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|c| c == name)
    }

    /// Cell by column name; empty when the column is not part of the header.
    pub fn cell(&self, row: usize, column: &str) -> &str {
        self.column_position(column)
            .and_then(|pos| self.rows.get(row).and_then(|r| r.get(pos)))
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// Raw table read back from the destination store, header first.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedTable {
    header: Vec<String>,
    rows: Vec<Vec<CellValue>>,
    index: HashMap<String, usize>,
}

impl ObservedTable {
    pub fn from_raw(mut raw: Vec<Vec<CellValue>>) -> Result<Self, SchemaError> {
        if raw.is_empty() {
            return Err(SchemaError::EmptyObservedTable);
        }
        let rows = raw.split_off(1);
        let header: Vec<String> = raw[0].iter().map(normalize_observed_cell).collect();
        let index = header
            .iter()
            .enumerate()
            .filter(|(_, name)| !name.is_empty())
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Ok(Self {
            header,
            rows,
            index,
        })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Normalized cell by column name; empty for unknown columns and short rows.
    pub fn cell(&self, row: usize, column: &str) -> String {
        self.index
            .get(column)
            .and_then(|&pos| self.rows.get(row).and_then(|r| r.get(pos)))
            .map(normalize_observed_cell)
            .unwrap_or_default()
    }

    /// Reads one row out in the given column order.
    pub fn extract_row(&self, row: usize, columns: &[String]) -> Vec<String> {
        columns.iter().map(|c| self.cell(row, c)).collect()
    }
}

impl fmt::Display for ColumnSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} columns ({} base + {} extension)",
            self.len(),
            self.base_len,
            self.len() - self.base_len
        )
    }
}
