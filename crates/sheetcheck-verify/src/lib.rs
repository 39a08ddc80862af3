//! Reconciliation engine: checks that an observed table reproduces the
//! canonical table built from catalog records, cell by cell.

pub mod builder;
pub mod compare;
pub mod export;
pub mod fingerprint;
pub mod matcher;
pub mod mode;
pub mod report;

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sheetcheck_core::{
    normalize_text, BaseColumns, ObservedTable, Record, ID_COLUMN, TITLE_COLUMN,
};
use thiserror::Error;
use tracing::{info, info_span, warn};

pub use builder::TableBuilder;
pub use compare::{DiffCollector, DiffRecord};
pub use fingerprint::fingerprint_table;
pub use matcher::{pair_by_identity, pair_by_position, MatchMode, Pairing, RowPair};
pub use mode::{resolve_mode, select_columns, ColumnSelection, CompareMode, ResolvedMode};
pub use report::{
    render_report, IdentityNotes, MatchEntry, ReportOptions, SourceLabels, VerificationSummary,
    Verdict,
};

pub const CRATE_NAME: &str = "sheetcheck-verify";

/// Conditions that stop a run before any comparison happens.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("id match mode requires an `id` column in both the compared columns and the observed header")]
    MissingIdentifierColumn,
    #[error(
        "id match mode requires unique ids: {expected} duplicated in records, {observed} duplicated in observed table (e.g. {examples:?})"
    )]
    DuplicateIdentifiers {
        expected: usize,
        observed: usize,
        examples: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VerifyConfig {
    pub mode: CompareMode,
    pub match_mode: MatchMode,
    pub report: ReportOptions,
}

#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub summary: VerificationSummary,
    pub matches: Vec<MatchEntry>,
}

impl VerificationOutcome {
    pub fn verdict(&self) -> Verdict {
        self.summary.result
    }

    pub fn render(&self, options: &ReportOptions) -> String {
        render_report(&self.summary, &self.matches, options)
    }
}

pub struct Verifier {
    base: BaseColumns,
    config: VerifyConfig,
}

impl Verifier {
    pub fn new(base: BaseColumns, config: VerifyConfig) -> Self {
        Self { base, config }
    }

    /// Runs one verification pass. Deterministic for fixed inputs and
    /// `generated_at`.
    pub fn verify(
        &self,
        records: &[Record],
        observed: &ObservedTable,
        labels: &SourceLabels,
        generated_at: DateTime<Utc>,
    ) -> Result<VerificationOutcome, VerifyError> {
        let span = info_span!("verify", match_mode = %self.config.match_mode);
        let _guard = span.enter();

        let builder = TableBuilder::new(&self.base);
        let schema = builder.build_header(records);
        let mode = resolve_mode(self.config.mode, &schema, observed.header());
        let selection = select_columns(mode, &schema, observed);
        info!(mode = %mode, columns = selection.columns.len(), %schema, "resolved compare mode");
        if let Some(problem) = &selection.problem {
            warn!(mode = %mode, "{problem}");
        }

        let expected = builder.build_table(records, &selection.columns);
        let pairing = match self.config.match_mode {
            MatchMode::Order => pair_by_position(expected.rows.len(), observed.row_count()),
            MatchMode::Id => pair_by_identity(&expected, observed)?,
        };

        let mut collector = DiffCollector::new(self.config.report.max_diffs);
        let mut matches = Vec::with_capacity(pairing.pairs.len());
        for pair in &pairing.pairs {
            let actual = observed.extract_row(pair.observed, &selection.columns);
            collector.compare_row(
                pair.sheet_row(),
                &selection.columns,
                &expected.rows[pair.expected],
                &actual,
            );
            matches.push(MatchEntry {
                row: pair.sheet_row(),
                id: normalize_text(expected.cell(pair.expected, ID_COLUMN)),
                title: normalize_text(expected.cell(pair.expected, TITLE_COLUMN)),
            });
        }
        let (diff_preview, mismatch_cells) = collector.into_parts();

        let expected_normalized: Vec<Vec<String>> = expected
            .rows
            .iter()
            .map(|row| row.iter().map(|cell| normalize_text(cell)).collect())
            .collect();
        let observed_in_order: Vec<Vec<String>> = (0..observed.row_count().min(expected.rows.len()))
            .map(|i| observed.extract_row(i, &selection.columns))
            .collect();
        let expected_sha256 = fingerprint_table(&selection.columns, &expected_normalized);
        let actual_sha256 = fingerprint_table(&selection.columns, &observed_in_order);

        let id_mode = (self.config.match_mode == MatchMode::Id).then(|| IdentityNotes {
            missing_in_sheet: pairing.missing.len(),
            extra_in_sheet: pairing.extra.len(),
            missing_ids: pairing.missing.clone(),
            extra_ids: pairing.extra.clone(),
        });

        let passed = selection.header_ok
            && expected.rows.len() == observed.row_count()
            && mismatch_cells == 0
            && pairing.missing.is_empty()
            && pairing.extra.is_empty();
        let result = if passed { Verdict::Pass } else { Verdict::Fail };

        info!(
            verdict = result.as_str(),
            mismatch_cells,
            expected_rows = expected.rows.len(),
            observed_rows = observed.row_count(),
            "verification finished"
        );

        Ok(VerificationOutcome {
            summary: VerificationSummary {
                generated_at,
                result,
                records: labels.records.clone(),
                observed: labels.observed.clone(),
                mode,
                match_mode: self.config.match_mode,
                expected_rows: expected.rows.len(),
                observed_rows: observed.row_count(),
                columns_compared: selection.columns.len(),
                header_ok: selection.header_ok,
                mismatch_cells,
                expected_sha256,
                actual_sha256,
                diff_preview,
                id_mode,
            },
            matches,
        })
    }
}

/// Environment-backed defaults; command-line flags override these.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub records_path: PathBuf,
    pub sheet_id: Option<String>,
    pub access_token: Option<String>,
    pub match_preview: usize,
    pub max_diffs: usize,
    pub columns_file: Option<PathBuf>,
    pub archive_dir: Option<PathBuf>,
    pub http_timeout_secs: u64,
}

impl RunSettings {
    pub fn from_env() -> Self {
        Self {
            records_path: std::env::var("SHEETCHECK_RECORDS")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("assets.json")),
            sheet_id: non_empty_var("GOOGLE_SHEET_ID"),
            access_token: non_empty_var("GOOGLE_ACCESS_TOKEN"),
            match_preview: parsed_var("SHEETCHECK_MATCH_PREVIEW").unwrap_or(20),
            max_diffs: parsed_var("SHEETCHECK_MAX_DIFFS").unwrap_or(20),
            columns_file: non_empty_var("SHEETCHECK_COLUMNS_FILE").map(PathBuf::from),
            archive_dir: non_empty_var("SHEETCHECK_ARCHIVE_DIR").map(PathBuf::from),
            http_timeout_secs: parsed_var("SHEETCHECK_HTTP_TIMEOUT_SECS").unwrap_or(20),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[derive(Debug, Clone, Deserialize)]
struct ColumnsFile {
    base_columns: Vec<String>,
    #[serde(default)]
    blank_columns: Vec<String>,
}

pub fn parse_base_columns(yaml: &str) -> anyhow::Result<BaseColumns> {
    let file: ColumnsFile = serde_yaml::from_str(yaml).context("parsing columns yaml")?;
    Ok(BaseColumns::new(file.base_columns, file.blank_columns)?)
}

/// Default base columns unless a columns file is given.
pub fn load_base_columns(path: Option<&Path>) -> anyhow::Result<BaseColumns> {
    let Some(path) = path else {
        return Ok(BaseColumns::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_base_columns(&text).with_context(|| format!("loading base columns from {}", path.display()))
}
