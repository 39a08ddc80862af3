//! Verification summary, verdict and narrative report.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::compare::DiffRecord;
use crate::matcher::MatchMode;
use crate::mode::ResolvedMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityNotes {
    pub missing_in_sheet: usize,
    pub extra_in_sheet: usize,
    pub missing_ids: Vec<String>,
    pub extra_ids: Vec<String>,
}

/// Observed row number paired with the canonical record it was compared to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchEntry {
    pub row: usize,
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLabels {
    pub records: String,
    pub observed: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationSummary {
    pub generated_at: DateTime<Utc>,
    pub result: Verdict,
    pub records: String,
    pub observed: String,
    pub mode: ResolvedMode,
    pub match_mode: MatchMode,
    pub expected_rows: usize,
    pub observed_rows: usize,
    pub columns_compared: usize,
    pub header_ok: bool,
    pub mismatch_cells: usize,
    pub expected_sha256: String,
    pub actual_sha256: String,
    pub diff_preview: Vec<DiffRecord>,
    pub id_mode: Option<IdentityNotes>,
}

impl VerificationSummary {
    pub fn fingerprints_match(&self) -> bool {
        self.expected_sha256 == self.actual_sha256
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    pub max_diffs: usize,
    pub match_preview: usize,
    pub print_all_matches: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            max_diffs: 20,
            match_preview: 20,
            print_all_matches: false,
        }
    }
}

pub fn render_report(
    summary: &VerificationSummary,
    matches: &[MatchEntry],
    options: &ReportOptions,
) -> String {
    let mut lines = vec![
        "Sheet verification report: catalog records vs observed table".to_string(),
        format!(
            "- generated at: {}",
            summary.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ),
        format!("- records: {}", summary.records),
        format!("- observed: {}", summary.observed),
        format!(
            "- compare mode: {} ({} columns)",
            summary.mode, summary.columns_compared
        ),
        format!("- match mode: {}", summary.match_mode),
        format!("- expected rows: {}", summary.expected_rows),
        format!("- observed rows (excluding header): {}", summary.observed_rows),
        format!(
            "- header match: {}",
            if summary.header_ok { "yes" } else { "no" }
        ),
        format!("- mismatched cells: {}", summary.mismatch_cells),
        format!("- SHA256(expected): {}", summary.expected_sha256),
        format!("- SHA256(actual):   {}", summary.actual_sha256),
        format!("- verdict: {}", summary.result.as_str()),
    ];

    if let Some(notes) = &summary.id_mode {
        lines.push(format!(
            "- id mode missing: {}, extra: {}",
            notes.missing_in_sheet, notes.extra_in_sheet
        ));
    }

    if !summary.diff_preview.is_empty() {
        lines.push(String::new());
        lines.push(format!("Mismatch samples (max {}):", options.max_diffs));
        for diff in &summary.diff_preview {
            lines.push(format!(
                "- R{}C[{}] expected={} actual={}",
                diff.row,
                diff.column,
                quoted(&diff.expected),
                quoted(&diff.actual)
            ));
        }
    }

    if options.print_all_matches || options.match_preview > 0 {
        lines.push(String::new());
        push_match_listing(&mut lines, matches, options);
    }

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

/// Appends the row↔record listing, truncated to the preview size unless all
/// matches were requested.
pub fn push_match_listing(lines: &mut Vec<String>, matches: &[MatchEntry], options: &ReportOptions) {
    lines.push("Matches (observed row <-> record):".to_string());
    let shown = if options.print_all_matches {
        matches
    } else {
        &matches[..matches.len().min(options.match_preview)]
    };
    for entry in shown {
        lines.push(format!("- {}: {} | {}", entry.row, entry.id, entry.title));
    }
    if !options.print_all_matches && matches.len() > options.match_preview {
        lines.push(format!(
            "(preview {}/{}; pass --print-matches for the full list)",
            shown.len(),
            matches.len()
        ));
    }
}

fn quoted(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("{text:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn summary() -> VerificationSummary {
        VerificationSummary {
            generated_at: Utc.with_ymd_and_hms(2026, 2, 24, 12, 0, 0).single().unwrap(),
            result: Verdict::Fail,
            records: "assets.json".into(),
            observed: "sheet/tab".into(),
            mode: ResolvedMode::All,
            match_mode: MatchMode::Id,
            expected_rows: 2,
            observed_rows: 2,
            columns_compared: 37,
            header_ok: true,
            mismatch_cells: 1,
            expected_sha256: "aa".into(),
            actual_sha256: "bb".into(),
            diff_preview: vec![DiffRecord {
                row: 3,
                column: "title".into(),
                expected: "Café".into(),
                actual: "Cafe\n".into(),
            }],
            id_mode: Some(IdentityNotes {
                missing_in_sheet: 1,
                extra_in_sheet: 0,
                missing_ids: vec!["9".into()],
                extra_ids: vec![],
            }),
        }
    }

    fn matches(n: usize) -> Vec<MatchEntry> {
        (0..n)
            .map(|i| MatchEntry {
                row: i + 2,
                id: format!("id-{i}"),
                title: format!("T{i}"),
            })
            .collect()
    }

    #[test]
    fn narrative_lists_counts_fingerprints_and_verdict_in_order() {
        let text = render_report(&summary(), &matches(1), &ReportOptions::default());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "- generated at: 2026-02-24T12:00:00Z");
        assert_eq!(lines[4], "- compare mode: all (37 columns)");
        assert_eq!(lines[10], "- SHA256(expected): aa");
        assert_eq!(lines[12], "- verdict: FAIL");
        assert_eq!(lines[13], "- id mode missing: 1, extra: 0");
        assert!(text.contains(r#"- R3C[title] expected="Café" actual="Cafe\n""#));
        assert!(text.contains("- 2: id-0 | T0"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn match_listing_is_previewed() {
        let options = ReportOptions {
            match_preview: 2,
            ..ReportOptions::default()
        };
        let text = render_report(&summary(), &matches(5), &options);
        assert!(text.contains("- 3: id-1 | T1"));
        assert!(!text.contains("- 4: id-2 | T2"));
        assert!(text.contains("(preview 2/5; pass --print-matches for the full list)"));

        let all = ReportOptions {
            match_preview: 2,
            print_all_matches: true,
            ..ReportOptions::default()
        };
        let text = render_report(&summary(), &matches(5), &all);
        assert!(text.contains("- 6: id-4 | T4"));
        assert!(!text.contains("(preview"));
    }

    #[test]
    fn zero_preview_omits_match_section() {
        let options = ReportOptions {
            match_preview: 0,
            ..ReportOptions::default()
        };
        let text = render_report(&summary(), &matches(3), &options);
        assert!(!text.contains("Matches"));
    }

    #[test]
    fn summary_serializes_verdict_and_modes_as_text() {
        let value = serde_json::to_value(summary()).unwrap();
        assert_eq!(value["result"], "FAIL");
        assert_eq!(value["mode"], "all");
        assert_eq!(value["match_mode"], "id");
        assert_eq!(value["id_mode"]["missing_ids"][0], "9");
    }
}
