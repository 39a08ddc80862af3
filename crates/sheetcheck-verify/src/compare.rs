//! Cell-by-cell comparison with a capped diff sample.

use serde::Serialize;
use sheetcheck_core::normalize_text;

/// One mismatching cell; `row` is the observed row number (header = 1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffRecord {
    pub row: usize,
    pub column: String,
    pub expected: String,
    pub actual: String,
}

/// Counts every mismatch but keeps at most `cap` samples.
#[derive(Debug, Clone)]
pub struct DiffCollector {
    cap: usize,
    diffs: Vec<DiffRecord>,
    mismatches: usize,
}

impl DiffCollector {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            diffs: Vec::new(),
            mismatches: 0,
        }
    }

    pub fn compare_row(
        &mut self,
        row: usize,
        columns: &[String],
        expected: &[String],
        actual: &[String],
    ) {
        for ((column, exp), act) in columns.iter().zip(expected).zip(actual) {
            let exp = normalize_text(exp);
            let act = normalize_text(act);
            if exp != act {
                self.record(DiffRecord {
                    row,
                    column: column.clone(),
                    expected: exp,
                    actual: act,
                });
            }
        }
    }

    fn record(&mut self, diff: DiffRecord) {
        self.mismatches += 1;
        if self.diffs.len() < self.cap {
            self.diffs.push(diff);
        }
    }

    pub fn mismatches(&self) -> usize {
        self.mismatches
    }

    pub fn diffs(&self) -> &[DiffRecord] {
        &self.diffs
    }

    pub fn into_parts(self) -> (Vec<DiffRecord>, usize) {
        (self.diffs, self.mismatches)
    }
}
