//! Pairing canonical rows with observed rows.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sheetcheck_core::{normalize_text, ObservedTable, Table, ID_COLUMN};

use crate::VerifyError;

/// Observed rows are numbered 1-based with the header on row 1.
pub const FIRST_DATA_ROW: usize = 2;

const DUPLICATE_EXAMPLES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    Order,
    Id,
}

impl MatchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchMode::Order => "order",
            MatchMode::Id => "id",
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order" => Ok(MatchMode::Order),
            "id" => Ok(MatchMode::Id),
            other => Err(format!("unknown match mode `{other}` (expected order or id)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowPair {
    pub expected: usize,
    pub observed: usize,
}

impl RowPair {
    pub fn sheet_row(&self) -> usize {
        self.observed + FIRST_DATA_ROW
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pairing {
    pub pairs: Vec<RowPair>,
    /// Canonical ids with no observed row, in canonical order.
    pub missing: Vec<String>,
    /// Non-empty observed ids with no canonical row, in observed order.
    pub extra: Vec<String>,
}

/// Row i with row i; surplus rows on either side stay unpaired.
pub fn pair_by_position(expected_rows: usize, observed_rows: usize) -> Pairing {
    Pairing {
        pairs: (0..expected_rows.min(observed_rows))
            .map(|i| RowPair {
                expected: i,
                observed: i,
            })
            .collect(),
        ..Pairing::default()
    }
}

/// Pairs rows through the `id` column, which must be unique on both sides.
pub fn pair_by_identity(
    expected: &Table,
    observed: &ObservedTable,
) -> Result<Pairing, VerifyError> {
    let id_pos = expected
        .column_position(ID_COLUMN)
        .filter(|_| observed.has_column(ID_COLUMN))
        .ok_or(VerifyError::MissingIdentifierColumn)?;

    let expected_ids: Vec<String> = expected
        .rows
        .iter()
        .map(|row| normalize_text(&row[id_pos]))
        .collect();
    let observed_ids: Vec<String> = (0..observed.row_count())
        .map(|i| observed.cell(i, ID_COLUMN))
        .collect();

    let expected_dupes = duplicates(&expected_ids);
    let observed_dupes = duplicates(&observed_ids);
    if !expected_dupes.is_empty() || !observed_dupes.is_empty() {
        let examples = expected_dupes
            .iter()
            .chain(observed_dupes.iter())
            .take(DUPLICATE_EXAMPLES)
            .cloned()
            .collect();
        return Err(VerifyError::DuplicateIdentifiers {
            expected: expected_dupes.len(),
            observed: observed_dupes.len(),
            examples,
        });
    }

    let observed_by_id: HashMap<&str, usize> = observed_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    let expected_set: HashSet<&str> = expected_ids.iter().map(String::as_str).collect();

    let mut pairing = Pairing::default();
    for (i, id) in expected_ids.iter().enumerate() {
        match observed_by_id.get(id.as_str()) {
            Some(&observed_index) => pairing.pairs.push(RowPair {
                expected: i,
                observed: observed_index,
            }),
            None => pairing.missing.push(id.clone()),
        }
    }
    pairing.extra = observed_ids
        .iter()
        .filter(|id| !id.is_empty() && !expected_set.contains(id.as_str()))
        .cloned()
        .collect();
    Ok(pairing)
}

fn duplicates(ids: &[String]) -> BTreeSet<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| !seen.insert(id.as_str()))
        .cloned()
        .collect()
}
