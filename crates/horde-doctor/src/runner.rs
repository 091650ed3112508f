//! The doctor runner: detect everything, then repair what it can.

use std::collections::BTreeSet;

use crate::check::{CheckResult, CheckStatus};
use crate::context::CheckContext;
use crate::registry::Registry;
use crate::report::{FixOutcome, Report, ReportEntry};

/// Run mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Observe only.
    Detect,
    /// Observe, then repair non-OK fixable findings.
    Fix,
    /// Like fix, but annotate instead of mutating.
    DryRun,
}

/// Options beyond the mode.
#[derive(Debug, Clone, Default)]
pub struct RunnerOptions {
    /// Check names exempted from repair (they still detect).
    pub skip_fixes: BTreeSet<String>,
}

/// Run every registered check in `mode`.
pub fn run(registry: &mut Registry, ctx: &CheckContext, mode: Mode) -> Report {
    run_with_options(registry, ctx, mode, &RunnerOptions::default())
}

/// Run with explicit options.
///
/// Detection never aborts the pass: each check translates its own
/// failures into a result. Repairs run serially in registration order;
/// a repair error is recorded on its entry and the pass continues.
/// After a successful repair the check is re-detected so the final
/// report reflects post-repair state.
pub fn run_with_options(
    registry: &mut Registry,
    ctx: &CheckContext,
    mode: Mode,
    options: &RunnerOptions,
) -> Report {
    let ctx = match mode {
        Mode::DryRun => ctx.clone().with_dry_run(true),
        _ => ctx.clone(),
    };

    let order = registry.ordered_indices();
    let mut report = Report::default();

    for &idx in &order {
        let check = registry.check_mut(idx);
        let result = if ctx.cancelled() {
            CheckResult::warning("cancelled before this check ran")
        } else {
            check.detect(&ctx)
        };
        report
            .entries
            .push(ReportEntry::new(check.name(), check.category(), result));
    }

    if matches!(mode, Mode::Fix | Mode::DryRun) {
        for (position, &idx) in order.iter().enumerate() {
            let needs_fix = {
                let entry = &report.entries[position];
                entry.status != CheckStatus::Ok && registry.check(idx).can_fix()
            };
            if !needs_fix {
                continue;
            }

            let name = registry.check(idx).name().to_string();
            let entry = &mut report.entries[position];

            if options.skip_fixes.contains(&name) {
                entry.fix = Some(FixOutcome::Skipped("exempted by --skip".to_string()));
                continue;
            }
            if mode == Mode::DryRun {
                entry.fix = Some(FixOutcome::WouldFix);
                continue;
            }
            if ctx.cancelled() {
                entry.fix = Some(FixOutcome::Skipped("cancelled".to_string()));
                continue;
            }

            let check = registry.check_mut(idx);
            match check.repair(&ctx) {
                Ok(()) => {
                    let fresh = check.detect(&ctx);
                    let fixed = fresh.is_ok();
                    entry.refresh(fresh);
                    entry.fix = Some(if fixed {
                        FixOutcome::Fixed
                    } else {
                        FixOutcome::Attempted
                    });
                }
                Err(err) => {
                    entry.fix = Some(FixOutcome::Failed(err.to_string()));
                }
            }
        }
    }

    report.recount();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::{Category, Check, RepairError};
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::rc::Rc;

    use horde_probes::traits::{
        DaemonControl, ProbeResult, ProcessSource, RecordStore, SessionSource,
    };
    use horde_probes::{CreateRecord, DriverProcess, RelicRecord};

    struct NullSessions;

    impl SessionSource for NullSessions {
        fn available(&self) -> bool {
            false
        }
        fn list_sessions(&self) -> ProbeResult<Vec<String>> {
            Ok(Vec::new())
        }
        fn environment(&self, _: &str) -> ProbeResult<BTreeMap<String, String>> {
            Ok(BTreeMap::new())
        }
        fn kill_session(&self, _: &str) -> ProbeResult<()> {
            Ok(())
        }
    }

    struct NullStore;

    impl RecordStore for NullStore {
        fn available(&self) -> bool {
            false
        }
        fn list(&self, _: &Path, _: &str, _: Option<&str>) -> ProbeResult<Vec<RelicRecord>> {
            Ok(Vec::new())
        }
        fn show(&self, _: &Path, _: &[String]) -> ProbeResult<Vec<RelicRecord>> {
            Ok(Vec::new())
        }
        fn create(&self, _: &Path, _: &CreateRecord) -> ProbeResult<()> {
            Ok(())
        }
        fn label_add(&self, _: &Path, _: &str, _: &str) -> ProbeResult<()> {
            Ok(())
        }
        fn config_get(&self, _: &Path, _: &str) -> ProbeResult<Option<String>> {
            Ok(None)
        }
        fn config_set(&self, _: &Path, _: &str, _: &str) -> ProbeResult<()> {
            Ok(())
        }
        fn init(&self, _: &Path, _: &str) -> ProbeResult<()> {
            Ok(())
        }
        fn sync(&self, _: &Path, _: bool) -> ProbeResult<()> {
            Ok(())
        }
        fn migrate_update_repo_id(&self, _: &Path) -> ProbeResult<()> {
            Ok(())
        }
        fn doctor_json(&self, _: &Path) -> ProbeResult<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
    }

    struct NullProcesses;

    impl ProcessSource for NullProcesses {
        fn driver_processes(&self) -> ProbeResult<Vec<DriverProcess>> {
            Ok(Vec::new())
        }
    }

    struct NullDaemon;

    impl DaemonControl for NullDaemon {
        fn restart(&self) -> ProbeResult<()> {
            Ok(())
        }
    }

    fn null_ctx() -> CheckContext {
        CheckContext::new(
            std::env::temp_dir(),
            Rc::new(NullStore),
            Rc::new(NullSessions),
            Rc::new(NullProcesses),
            Rc::new(NullDaemon),
        )
    }

    /// A check that starts broken and is healed by its repair.
    struct Flaky {
        healed: bool,
        repairs: u32,
    }

    impl Check for Flaky {
        fn name(&self) -> &'static str {
            "flaky"
        }
        fn description(&self) -> &'static str {
            "test check"
        }
        fn category(&self) -> Category {
            Category::Core
        }
        fn can_fix(&self) -> bool {
            true
        }
        fn detect(&mut self, _: &CheckContext) -> CheckResult {
            if self.healed {
                CheckResult::ok("sound")
            } else {
                CheckResult::warning("broken")
            }
        }
        fn repair(&mut self, _: &CheckContext) -> Result<(), RepairError> {
            self.repairs += 1;
            self.healed = true;
            Ok(())
        }
    }

    struct AlwaysBroken;

    impl Check for AlwaysBroken {
        fn name(&self) -> &'static str {
            "always-broken"
        }
        fn description(&self) -> &'static str {
            "test check"
        }
        fn category(&self) -> Category {
            Category::Config
        }
        fn can_fix(&self) -> bool {
            true
        }
        fn detect(&mut self, _: &CheckContext) -> CheckResult {
            CheckResult::error("still broken")
        }
        fn repair(&mut self, _: &CheckContext) -> Result<(), RepairError> {
            Err(RepairError::new("cannot apply mutation"))
        }
    }

    #[test]
    fn fix_mode_repairs_and_refreshes_status() {
        let mut registry = Registry::new();
        registry.register(Box::new(Flaky {
            healed: false,
            repairs: 0,
        }));
        registry.register(Box::new(AlwaysBroken));

        let report = run(&mut registry, &null_ctx(), Mode::Fix);

        let flaky = report.entry("flaky").unwrap();
        assert_eq!(flaky.status, CheckStatus::Ok);
        assert_eq!(flaky.fix, Some(FixOutcome::Fixed));

        let broken = report.entry("always-broken").unwrap();
        assert_eq!(broken.status, CheckStatus::Error);
        assert!(matches!(broken.fix, Some(FixOutcome::Failed(_))));

        // A failed repair never aborts the pass and errors keep exit 2.
        assert_eq!(report.exit_code(), 2);
        assert_eq!(report.counts.fixed, 1);
    }

    #[test]
    fn dry_run_annotates_without_mutating() {
        let mut registry = Registry::new();
        registry.register(Box::new(Flaky {
            healed: false,
            repairs: 0,
        }));

        let report = run(&mut registry, &null_ctx(), Mode::DryRun);
        let entry = report.entry("flaky").unwrap();
        assert_eq!(entry.status, CheckStatus::Warning);
        assert_eq!(entry.fix, Some(FixOutcome::WouldFix));
    }

    #[test]
    fn detect_mode_never_repairs() {
        let mut registry = Registry::new();
        registry.register(Box::new(AlwaysBroken));
        let report = run(&mut registry, &null_ctx(), Mode::Detect);
        assert!(report.entry("always-broken").unwrap().fix.is_none());
        assert_eq!(report.exit_code(), 2);
    }

    #[test]
    fn skip_filter_exempts_named_checks() {
        let mut registry = Registry::new();
        registry.register(Box::new(Flaky {
            healed: false,
            repairs: 0,
        }));
        let options = RunnerOptions {
            skip_fixes: ["flaky".to_string()].into_iter().collect(),
        };
        let report = run_with_options(&mut registry, &null_ctx(), Mode::Fix, &options);
        let entry = report.entry("flaky").unwrap();
        assert_eq!(entry.status, CheckStatus::Warning);
        assert!(matches!(entry.fix, Some(FixOutcome::Skipped(_))));
    }

    #[test]
    fn cancellation_skips_remaining_repairs() {
        let mut registry = Registry::new();
        registry.register(Box::new(Flaky {
            healed: false,
            repairs: 0,
        }));
        let ctx = null_ctx();
        ctx.cancel.store(true, std::sync::atomic::Ordering::Relaxed);
        let report = run(&mut registry, &ctx, Mode::Fix);
        let entry = report.entry("flaky").unwrap();
        assert!(matches!(entry.fix, Some(FixOutcome::Skipped(_))));
    }
}
