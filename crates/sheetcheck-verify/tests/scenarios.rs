use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use sheetcheck_core::{BaseColumns, CellValue, ObservedTable, Record};
use sheetcheck_verify::{
    CompareMode, MatchMode, ReportOptions, ResolvedMode, SourceLabels, Verdict, VerifyConfig,
    VerifyError, Verifier,
};

fn generated_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).single().unwrap()
}

fn labels() -> SourceLabels {
    SourceLabels {
        records: "assets.json".into(),
        observed: "sheet/tab".into(),
    }
}

fn records(values: serde_json::Value) -> Vec<Record> {
    values
        .as_array()
        .unwrap()
        .iter()
        .cloned()
        .map(|v| Record::from_json(v).unwrap())
        .collect()
}

fn base_header() -> Vec<CellValue> {
    BaseColumns::default()
        .names()
        .iter()
        .map(|n| CellValue::text(n.as_str()))
        .collect()
}

fn text_row(cells: &[&str]) -> Vec<CellValue> {
    cells.iter().map(|c| CellValue::text(*c)).collect()
}

fn observed(header: Vec<CellValue>, rows: Vec<Vec<CellValue>>) -> ObservedTable {
    let mut raw = vec![header];
    raw.extend(rows);
    ObservedTable::from_raw(raw).unwrap()
}

fn verifier(match_mode: MatchMode, max_diffs: usize) -> Verifier {
    Verifier::new(
        BaseColumns::default(),
        VerifyConfig {
            mode: CompareMode::Auto,
            match_mode,
            report: ReportOptions {
                max_diffs,
                ..ReportOptions::default()
            },
        },
    )
}

fn single_asset() -> Vec<Record> {
    records(json!([{
        "id": "1",
        "title": "A",
        "time_start_milliseconds": 1000,
        "time_end_milliseconds": 2000
    }]))
}

#[test]
fn matching_sheet_passes() {
    let table = observed(base_header(), vec![text_row(&["1", "A", "1000", "2000", "1", "2"])]);
    let outcome = verifier(MatchMode::Order, 20)
        .verify(&single_asset(), &table, &labels(), generated_at())
        .unwrap();

    let summary = &outcome.summary;
    assert_eq!(summary.result, Verdict::Pass);
    assert_eq!(summary.mode, ResolvedMode::All);
    assert_eq!(summary.mismatch_cells, 0);
    assert!(summary.header_ok);
    assert!(summary.fingerprints_match());
    assert_eq!(summary.columns_compared, 35);
    assert!(summary.id_mode.is_none());
    assert_eq!(outcome.verdict(), Verdict::Pass);
}

#[test]
fn numeric_observed_cells_normalize_like_text() {
    let mut row = text_row(&["1", "A"]);
    row.extend([
        CellValue::integer(1000),
        CellValue::float(2000.0),
        CellValue::float(1.0),
        CellValue::integer(2),
    ]);
    let table = observed(base_header(), vec![row]);
    let outcome = verifier(MatchMode::Order, 20)
        .verify(&single_asset(), &table, &labels(), generated_at())
        .unwrap();
    assert_eq!(outcome.summary.result, Verdict::Pass);
}

#[test]
fn changed_title_fails_with_one_diff() {
    let table = observed(base_header(), vec![text_row(&["1", "B", "1000", "2000", "1", "2"])]);
    let outcome = verifier(MatchMode::Order, 20)
        .verify(&single_asset(), &table, &labels(), generated_at())
        .unwrap();

    let summary = &outcome.summary;
    assert_eq!(summary.result, Verdict::Fail);
    assert_eq!(summary.mismatch_cells, 1);
    assert_eq!(summary.diff_preview.len(), 1);
    let diff = &summary.diff_preview[0];
    assert_eq!((diff.row, diff.column.as_str()), (2, "title"));
    assert_eq!((diff.expected.as_str(), diff.actual.as_str()), ("A", "B"));
    assert!(!summary.fingerprints_match());
    assert_eq!(outcome.verdict(), Verdict::Fail);

    let text = outcome.render(&ReportOptions::default());
    assert!(text.contains(r#"- R2C[title] expected="A" actual="B""#));
    assert!(text.contains("- verdict: FAIL"));
}

#[test]
fn duplicate_record_ids_abort_identity_mode() {
    let assets = records(json!([{"id": "1", "title": "A"}, {"id": "1", "title": "B"}]));
    let table = observed(base_header(), vec![text_row(&["1", "A"])]);
    let err = verifier(MatchMode::Id, 20)
        .verify(&assets, &table, &labels(), generated_at())
        .unwrap_err();
    assert!(matches!(err, VerifyError::DuplicateIdentifiers { expected: 1, .. }));
}

#[test]
fn identity_mode_reports_missing_and_extra_ids() {
    let assets = records(json!([{"id": "1", "title": "A"}, {"id": "2", "title": "B"}]));
    let table = observed(
        base_header(),
        vec![text_row(&["2", "B"]), text_row(&["3", "C"])],
    );
    let outcome = verifier(MatchMode::Id, 20)
        .verify(&assets, &table, &labels(), generated_at())
        .unwrap();

    let summary = &outcome.summary;
    assert_eq!(summary.result, Verdict::Fail);
    assert_eq!(summary.mismatch_cells, 0);
    let notes = summary.id_mode.as_ref().unwrap();
    assert_eq!(notes.missing_ids, vec!["1".to_string()]);
    assert_eq!(notes.extra_ids, vec!["3".to_string()]);
    assert_eq!(outcome.matches.len(), 1);
    assert_eq!(outcome.matches[0].row, 2);
    assert_eq!(outcome.matches[0].title, "B");

    let text = outcome.render(&ReportOptions::default());
    assert!(text.contains("- id mode missing: 1, extra: 1"));
}

#[test]
fn identity_mode_without_id_column_is_fatal() {
    let table = observed(text_row(&["title"]), vec![text_row(&["A"])]);
    let err = verifier(MatchMode::Id, 20)
        .verify(&single_asset(), &table, &labels(), generated_at())
        .unwrap_err();
    assert!(matches!(err, VerifyError::MissingIdentifierColumn));
}

#[test]
fn diff_cap_bounds_samples_not_count() {
    let table = observed(base_header(), vec![text_row(&["x", "y", "z", "2000", "1", "2"])]);
    let outcome = verifier(MatchMode::Order, 1)
        .verify(&single_asset(), &table, &labels(), generated_at())
        .unwrap();
    assert_eq!(outcome.summary.diff_preview.len(), 1);
    assert_eq!(outcome.summary.mismatch_cells, 3);
    assert_eq!(outcome.summary.result, Verdict::Fail);
}

#[test]
fn surplus_observed_rows_fail_without_cell_diffs() {
    let table = observed(
        base_header(),
        vec![
            text_row(&["1", "A", "1000", "2000", "1", "2"]),
            text_row(&["2", "extra"]),
        ],
    );
    let outcome = verifier(MatchMode::Order, 20)
        .verify(&single_asset(), &table, &labels(), generated_at())
        .unwrap();
    assert_eq!(outcome.summary.mismatch_cells, 0);
    assert_eq!(outcome.summary.observed_rows, 2);
    assert_eq!(outcome.summary.result, Verdict::Fail);
    assert!(outcome.summary.fingerprints_match());
}

#[test]
fn auto_mode_falls_back_from_all_to_base_to_common() {
    let assets = records(json!([{"id": "1", "title": "A", "metadata": {"Zone": "north"}}]));

    let mut full = base_header();
    full.push(CellValue::text("Zone"));
    let mut full_row = text_row(&["1", "A"]);
    full_row.resize(35, CellValue::text(""));
    full_row.push(CellValue::text("north"));
    let outcome = verifier(MatchMode::Order, 20)
        .verify(&assets, &observed(full, vec![full_row]), &labels(), generated_at())
        .unwrap();
    assert_eq!(outcome.summary.mode, ResolvedMode::All);
    assert_eq!(outcome.summary.result, Verdict::Pass);

    let outcome = verifier(MatchMode::Order, 20)
        .verify(&assets, &observed(base_header(), vec![text_row(&["1", "A"])]), &labels(), generated_at())
        .unwrap();
    assert_eq!(outcome.summary.mode, ResolvedMode::Base);
    assert_eq!(outcome.summary.result, Verdict::Pass);

    let outcome = verifier(MatchMode::Order, 20)
        .verify(
            &assets,
            &observed(text_row(&["Zone", "id"]), vec![text_row(&["north", "1"])]),
            &labels(),
            generated_at(),
        )
        .unwrap();
    assert_eq!(outcome.summary.mode, ResolvedMode::Common);
    assert_eq!(outcome.summary.columns_compared, 2);
    assert_eq!(outcome.summary.result, Verdict::Pass);
}

#[test]
fn common_mode_without_id_fails_the_header_check() {
    let table = observed(text_row(&["title"]), vec![text_row(&["A"])]);
    let outcome = verifier(MatchMode::Order, 20)
        .verify(&single_asset(), &table, &labels(), generated_at())
        .unwrap();
    assert_eq!(outcome.summary.mode, ResolvedMode::Common);
    assert!(!outcome.summary.header_ok);
    assert_eq!(outcome.summary.mismatch_cells, 0);
    assert_eq!(outcome.summary.result, Verdict::Fail);
}

#[test]
fn repeated_runs_are_identical() {
    let table = observed(base_header(), vec![text_row(&["1", "B", "1000"])]);
    let verifier = verifier(MatchMode::Order, 20);
    let first = verifier
        .verify(&single_asset(), &table, &labels(), generated_at())
        .unwrap();
    let second = verifier
        .verify(&single_asset(), &table, &labels(), generated_at())
        .unwrap();
    assert_eq!(first.summary, second.summary);
    assert_eq!(
        first.render(&ReportOptions::default()),
        second.render(&ReportOptions::default())
    );
}

#[test]
fn sheet_written_by_sync_tool_passes_with_mapping_and_boolean_attributes() {
    let assets = records(json!([{
        "id": "1",
        "title": "A",
        "metadata": {"Extra": {"k": "v", "n": [1, 2]}, "Flag": true}
    }]));
    let header = text_row(&["id", "title", "Extra", "Flag"]);
    let row = text_row(&["1", "A", r#"{"k": "v", "n": [1, 2]}"#, "True"]);
    let outcome = verifier(MatchMode::Order, 20)
        .verify(&assets, &observed(header, vec![row]), &labels(), generated_at())
        .unwrap();
    assert_eq!(outcome.summary.mode, ResolvedMode::Common);
    assert_eq!(outcome.summary.mismatch_cells, 0);
    assert_eq!(outcome.summary.result, Verdict::Pass);
}
