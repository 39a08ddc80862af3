//! Compared column set selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sheetcheck_core::{ColumnSchema, ObservedTable, ID_COLUMN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareMode {
    #[default]
    Auto,
    Base,
    All,
    Common,
}

impl FromStr for CompareMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(CompareMode::Auto),
            "base" => Ok(CompareMode::Base),
            "all" => Ok(CompareMode::All),
            "common" => Ok(CompareMode::Common),
            other => Err(format!(
                "unknown compare mode `{other}` (expected auto, base, all or common)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedMode {
    All,
    Base,
    Common,
}

/// Auto mode tries these in order; `Common` accepts any header.
const AUTO_CHAIN: [ResolvedMode; 3] = [ResolvedMode::All, ResolvedMode::Base, ResolvedMode::Common];

impl ResolvedMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolvedMode::All => "all",
            ResolvedMode::Base => "base",
            ResolvedMode::Common => "common",
        }
    }

    fn accepts_exact(self, schema: &ColumnSchema, observed_header: &[String]) -> bool {
        match self {
            ResolvedMode::All => observed_header == schema.columns(),
            ResolvedMode::Base => observed_header == schema.base(),
            ResolvedMode::Common => true,
        }
    }
}

impl fmt::Display for ResolvedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn resolve_mode(
    requested: CompareMode,
    schema: &ColumnSchema,
    observed_header: &[String],
) -> ResolvedMode {
    match requested {
        CompareMode::All => ResolvedMode::All,
        CompareMode::Base => ResolvedMode::Base,
        CompareMode::Common => ResolvedMode::Common,
        CompareMode::Auto => AUTO_CHAIN
            .into_iter()
            .find(|mode| mode.accepts_exact(schema, observed_header))
            .unwrap_or(ResolvedMode::Common),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSelection {
    pub mode: ResolvedMode,
    pub columns: Vec<String>,
    pub header_ok: bool,
    /// Human-readable reason when `header_ok` is false.
    pub problem: Option<String>,
}

pub fn select_columns(
    mode: ResolvedMode,
    schema: &ColumnSchema,
    observed: &ObservedTable,
) -> ColumnSelection {
    let (columns, problem) = match mode {
        ResolvedMode::All => {
            let columns = schema.columns().to_vec();
            let problem = (observed.header() != columns.as_slice())
                .then(|| "observed header differs from the full expected header".to_string());
            (columns, problem)
        }
        ResolvedMode::Base => {
            let columns = schema.base().to_vec();
            let missing: Vec<&str> = columns
                .iter()
                .filter(|c| !observed.has_column(c))
                .map(String::as_str)
                .collect();
            let problem = (!missing.is_empty())
                .then(|| format!("observed header lacks base columns: {}", missing.join(", ")));
            (columns, problem)
        }
        ResolvedMode::Common => {
            let columns: Vec<String> = schema
                .columns()
                .iter()
                .filter(|c| observed.has_column(c))
                .cloned()
                .collect();
            let problem = (!columns.iter().any(|c| c == ID_COLUMN))
                .then(|| format!("common columns do not include `{ID_COLUMN}`"));
            (columns, problem)
        }
    };
    ColumnSelection {
        mode,
        header_ok: problem.is_none(),
        columns,
        problem,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetcheck_core::{BaseColumns, CellValue};
    use std::collections::BTreeSet;

    fn schema() -> ColumnSchema {
        let base = BaseColumns::new(vec!["id".into(), "title".into()], vec![]).unwrap();
        let extension: BTreeSet<String> = ["Extra".to_string()].into_iter().collect();
        ColumnSchema::new(&base, extension)
    }

    fn observed(header: &[&str]) -> ObservedTable {
        ObservedTable::from_raw(vec![header.iter().map(|h| CellValue::text(*h)).collect()])
            .expect("observed")
    }

    fn header(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn auto_prefers_full_then_base_then_common() {
        let schema = schema();
        assert_eq!(
            resolve_mode(CompareMode::Auto, &schema, &header(&["id", "title", "Extra"])),
            ResolvedMode::All
        );
        assert_eq!(
            resolve_mode(CompareMode::Auto, &schema, &header(&["id", "title"])),
            ResolvedMode::Base
        );
        assert_eq!(
            resolve_mode(CompareMode::Auto, &schema, &header(&["title", "id"])),
            ResolvedMode::Common
        );
    }

    #[test]
    fn explicit_mode_is_kept() {
        let schema = schema();
        assert_eq!(
            resolve_mode(CompareMode::Base, &schema, &header(&["id", "title", "Extra"])),
            ResolvedMode::Base
        );
    }

    #[test]
    fn all_mode_requires_exact_header() {
        let selection = select_columns(ResolvedMode::All, &schema(), &observed(&["id", "Extra", "title"]));
        assert!(!selection.header_ok);
        assert_eq!(selection.columns, header(&["id", "title", "Extra"]));
    }

    #[test]
    fn base_mode_accepts_reordered_superset() {
        let selection = select_columns(ResolvedMode::Base, &schema(), &observed(&["x", "title", "id"]));
        assert!(selection.header_ok);
        assert_eq!(selection.columns, header(&["id", "title"]));

        let selection = select_columns(ResolvedMode::Base, &schema(), &observed(&["id"]));
        assert!(!selection.header_ok);
        assert!(selection.problem.unwrap().contains("title"));
    }

    #[test]
    fn common_mode_intersects_in_expected_order() {
        let selection = select_columns(ResolvedMode::Common, &schema(), &observed(&["Extra", "id", "other"]));
        assert!(selection.header_ok);
        assert_eq!(selection.columns, header(&["id", "Extra"]));

        let selection = select_columns(ResolvedMode::Common, &schema(), &observed(&["title"]));
        assert!(!selection.header_ok);
    }
}
