//! Process exit codes: the verdict on a completed run, or a fatal abort.

use sheetcheck_verify::Verdict;

/// Verification passed, or an export completed.
pub const SUCCESS: u8 = 0;
/// Verification completed with discrepancies.
pub const FAIL: u8 = 1;
/// Configuration or input error; no report was produced.
pub const FATAL: u8 = 2;

pub fn for_verdict(verdict: Verdict) -> u8 {
    match verdict {
        Verdict::Pass => SUCCESS,
        Verdict::Fail => FAIL,
    }
}
