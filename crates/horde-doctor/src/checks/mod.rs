//! The individual checks, one module per category.

pub mod cleanup;
pub mod config;
pub mod core;
pub mod infra;
pub mod patrol;
pub mod rig;

use horde_probes::ProbeFailure;

use crate::check::CheckResult;

/// Map a probe failure to a detection result: an absent tool is a
/// graceful skip, anything else a warning naming the object.
pub(crate) fn probe_failure_result(object: &str, err: &ProbeFailure) -> CheckResult {
    match err {
        ProbeFailure::Unavailable { tool } => CheckResult::skipped_unavailable(tool),
        ProbeFailure::Failed(message) => {
            CheckResult::warning(format!("{object}: {message}"))
        }
    }
}
