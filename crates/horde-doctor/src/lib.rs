//! # horde-doctor
//!
//! The fleet doctor: a declarative verifier and repairer for Horde
//! encampments.
//!
//! The doctor owns the invariants of the whole system — the canonical
//! layout on disk, the session-name grammar, the routing table of the
//! issue store, the required records, the shape of every agent
//! `settings.json` — and reconciles the world toward them:
//!
//! - `Check`: one invariant with a detector and, when safe, an
//!   idempotent repair.
//! - `Registry`: the ordered catalogue of every check.
//! - `run`: detect everything; in fix mode repair what detection
//!   flagged, then re-detect so the report shows post-repair truth.
//! - `Report`: per-check results plus aggregate counters and exit codes.
//!
//! Detection is purely observational. Repairs create and delete only
//! horde metadata (records, routes, redirects, settings, gitignores);
//! they never touch user source, never force-push, and never delete a
//! tracked-modified file.

pub mod check;
pub mod checks;
pub mod context;
pub mod registry;
pub mod report;
pub mod runner;
pub mod templates;

pub use check::{Category, Check, CheckResult, CheckStatus, RepairError};
pub use context::CheckContext;
pub use registry::{Registry, default_registry};
pub use report::{FixOutcome, Report, ReportCounts, ReportEntry};
pub use runner::{Mode, RunnerOptions, run, run_with_options};
