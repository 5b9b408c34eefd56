//! Stable exit codes for the `gcp_sweeper` binary.

use crate::cleanup_types::CleanupReport;

/// Run finished (individual deletion failures are reported, not escalated),
/// or the operator declined the confirmation prompt.
pub const OK: i32 = 0;
/// Invalid configuration or startup failure; nothing was deleted.
pub const INVALID: i32 = 1;
/// Some deletions or listings failed and `--fail-on-error` was given.
pub const PARTIAL_FAILURE: i32 = 2;
/// The run was interrupted (Ctrl-C / SIGTERM).
pub const INTERRUPTED: i32 = 130;

/// Exit code for a finished run.
#[must_use]
pub fn for_report(report: &CleanupReport, fail_on_error: bool) -> i32 {
    if report.interrupted {
        INTERRUPTED
    } else if fail_on_error && report.has_failures() {
        PARTIAL_FAILURE
    } else {
        OK
    }
}
