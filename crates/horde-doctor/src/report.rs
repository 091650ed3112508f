//! The doctor report: ordered check results plus aggregate counters.

use serde::{Deserialize, Serialize};

use crate::check::{Category, CheckResult, CheckStatus};

/// What happened to a fixable, non-OK check in fix or dry-run mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum FixOutcome {
    /// Repair ran and re-detection came back OK.
    Fixed,
    /// Dry run: the repair was not invoked.
    WouldFix,
    /// Repair ran without error but re-detection still reports findings.
    Attempted,
    /// Repair was not run (skip filter, cancellation, nothing automatic).
    Skipped(String),
    /// Repair returned an error; the precondition still holds.
    Failed(String),
}

impl std::fmt::Display for FixOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FixOutcome::Fixed => f.write_str("fixed"),
            FixOutcome::WouldFix => f.write_str("would fix"),
            FixOutcome::Attempted => f.write_str("attempted"),
            FixOutcome::Skipped(reason) => write!(f, "skipped ({reason})"),
            FixOutcome::Failed(error) => write!(f, "fix failed: {error}"),
        }
    }
}

/// One check's row in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    pub name: String,
    pub category: Category,
    pub status: CheckStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix: Option<FixOutcome>,
}

impl ReportEntry {
    pub fn new(name: &str, category: Category, result: CheckResult) -> Self {
        Self {
            name: name.to_string(),
            category,
            status: result.status,
            message: result.message,
            details: result.details,
            fix_hint: result.fix_hint,
            fix: None,
        }
    }

    /// Replace the detection fields with a fresh result, keeping the fix
    /// outcome.
    pub fn refresh(&mut self, result: CheckResult) {
        self.status = result.status;
        self.message = result.message;
        self.details = result.details;
        self.fix_hint = result.fix_hint;
    }
}

/// Aggregate counters over a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCounts {
    pub ok: u32,
    pub warnings: u32,
    pub errors: u32,
    pub fixed: u32,
    pub skipped: u32,
}

/// The full run outcome, ordered as registered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    pub entries: Vec<ReportEntry>,
    pub counts: ReportCounts,
}

impl Report {
    pub fn recount(&mut self) {
        let mut counts = ReportCounts::default();
        for entry in &self.entries {
            match entry.status {
                CheckStatus::Ok => counts.ok += 1,
                CheckStatus::Warning => counts.warnings += 1,
                CheckStatus::Error => counts.errors += 1,
            }
            match entry.fix {
                Some(FixOutcome::Fixed) => counts.fixed += 1,
                Some(FixOutcome::Skipped(_)) => counts.skipped += 1,
                _ => {}
            }
        }
        self.counts = counts;
    }

    pub fn entry(&self, name: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn has_errors(&self) -> bool {
        self.counts.errors > 0
    }

    pub fn has_warnings(&self) -> bool {
        self.counts.warnings > 0
    }

    /// Exit code for a CLI driver: 0 all OK, 1 warnings only, 2 errors.
    ///
    /// In fix mode re-detection already collapsed repaired findings back
    /// to OK, so a fully-fixed run exits 0 on its own.
    pub fn exit_code(&self) -> i32 {
        if self.has_errors() {
            2
        } else if self.has_warnings() {
            1
        } else {
            0
        }
    }

    pub fn summary_line(&self) -> String {
        let mut summary = format!(
            "{} ok, {} warnings, {} errors",
            self.counts.ok, self.counts.warnings, self.counts.errors
        );
        if self.counts.fixed > 0 {
            summary.push_str(&format!(", {} fixed", self.counts.fixed));
        }
        if self.counts.skipped > 0 {
            summary.push_str(&format!(", {} skipped", self.counts.skipped));
        }
        summary
    }

    /// Human rendering: category headers, one line per check, indented
    /// details and hints.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for category in Category::ALL {
            let entries: Vec<&ReportEntry> = self
                .entries
                .iter()
                .filter(|e| e.category == category)
                .collect();
            if entries.is_empty() {
                continue;
            }
            out.push_str(&format!("{category}\n"));
            for entry in entries {
                let marker = match entry.status {
                    CheckStatus::Ok => "ok",
                    CheckStatus::Warning => "warn",
                    CheckStatus::Error => "FAIL",
                };
                let mut line = format!("  [{marker:>4}] {:<28} {}", entry.name, entry.message);
                if let Some(fix) = &entry.fix {
                    line.push_str(&format!(" ({fix})"));
                }
                out.push_str(&line);
                out.push('\n');
                for detail in &entry.details {
                    out.push_str(&format!("         - {detail}\n"));
                }
                if let Some(hint) = &entry.fix_hint {
                    out.push_str(&format!("         hint: {hint}\n"));
                }
            }
        }
        out.push_str(&self.summary_line());
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, status: CheckStatus, fix: Option<FixOutcome>) -> ReportEntry {
        ReportEntry {
            name: name.to_string(),
            category: Category::Core,
            status,
            message: "m".to_string(),
            details: Vec::new(),
            fix_hint: None,
            fix,
        }
    }

    #[test]
    fn counts_and_exit_codes() {
        let mut report = Report {
            entries: vec![
                entry("a", CheckStatus::Ok, None),
                entry("b", CheckStatus::Warning, None),
                entry("c", CheckStatus::Error, Some(FixOutcome::Failed("x".into()))),
                entry("d", CheckStatus::Ok, Some(FixOutcome::Fixed)),
            ],
            counts: ReportCounts::default(),
        };
        report.recount();
        assert_eq!(report.counts.ok, 2);
        assert_eq!(report.counts.warnings, 1);
        assert_eq!(report.counts.errors, 1);
        assert_eq!(report.counts.fixed, 1);
        assert_eq!(report.exit_code(), 2);

        report.entries.retain(|e| e.status != CheckStatus::Error);
        report.recount();
        assert_eq!(report.exit_code(), 1);

        report.entries.retain(|e| e.status == CheckStatus::Ok);
        report.recount();
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn fix_outcomes_render_for_operators() {
        assert_eq!(FixOutcome::Fixed.to_string(), "fixed");
        assert_eq!(FixOutcome::WouldFix.to_string(), "would fix");
        assert_eq!(
            FixOutcome::Skipped("cancelled".into()).to_string(),
            "skipped (cancelled)"
        );
        assert_eq!(
            FixOutcome::Failed("no prefix".into()).to_string(),
            "fix failed: no prefix"
        );
    }
}
