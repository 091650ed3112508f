//! Infrastructure checks: the store's view of the repos and the
//! platform surface.

use std::path::PathBuf;

use sha2::{Digest, Sha256};

use horde_probes::{GhCli, GitCli, github_repo_slug};

use crate::check::{Category, Check, CheckResult, RepairError};
use crate::checks::probe_failure_result;
use crate::context::CheckContext;
use crate::registry::Registry;

pub fn register(registry: &mut Registry) {
    registry.register(Box::new(RepoFingerprintCheck::default()));
    registry.register(Box::new(ForgeQueueReachableCheck));
}

/// Fingerprint the store should report for a clone: the digest of its
/// root commit, which survives rebases and remote moves.
pub fn expected_repo_fingerprint(clone: &PathBuf) -> Option<String> {
    let root_commit = GitCli::new(clone).root_commit().ok().flatten()?;
    let mut hasher = Sha256::new();
    hasher.update(root_commit.as_bytes());
    Some(format!("{:x}", hasher.finalize()))
}

/// The store indexes records by repo fingerprint; after a history
/// rewrite the index goes stale and every query misses. `rl migrate`
/// re-keys the index, and the daemon must restart to drop its cache.
#[derive(Default)]
struct RepoFingerprintCheck {
    stale: Vec<PathBuf>, // store cwds needing migration
}

impl Check for RepoFingerprintCheck {
    fn name(&self) -> &'static str {
        "repo-fingerprint"
    }

    fn description(&self) -> &'static str {
        "the store's repo fingerprints match the clones"
    }

    fn category(&self) -> Category {
        Category::Infrastructure
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.stale.clear();
        if !ctx.store.available() {
            return CheckResult::skipped_unavailable("rl");
        }
        if !GitCli::is_available() {
            return CheckResult::skipped_unavailable("git");
        }
        let mut details = Vec::new();
        for warband in ctx.warbands() {
            let clone = ctx.warband_handle(&warband).warchief_clone();
            if !clone.join(".git").exists() {
                continue;
            }
            let Some(expected) = expected_repo_fingerprint(&clone) else {
                continue;
            };
            let cwd = ctx.warband_store_cwd(&warband);
            let report = match ctx.store.doctor_json(&cwd) {
                Ok(report) => report,
                Err(err) => return probe_failure_result("repo-fingerprint", &err),
            };
            let reported = report
                .get("repo_id")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default();
            if reported != expected {
                details.push(if reported.is_empty() {
                    format!("{warband}: store reports no repo fingerprint")
                } else {
                    format!("{warband}: store fingerprint diverges from the clone")
                });
                self.stale.push(cwd);
            }
        }
        if self.stale.is_empty() {
            CheckResult::ok("repo fingerprints match")
        } else {
            CheckResult::error("the store's repo fingerprints are stale")
                .with_details(details)
                .with_fix_hint("fix mode runs rl migrate --update-repo-id and restarts the daemon")
        }
    }

    fn repair(&mut self, ctx: &CheckContext) -> Result<(), RepairError> {
        if self.stale.is_empty() {
            return Ok(());
        }
        for cwd in &self.stale {
            ctx.store.migrate_update_repo_id(cwd)?;
        }
        ctx.daemon.restart()?;
        Ok(())
    }
}

/// The forge needs the platform CLI to see its merge queue; probe it
/// once per warband with a GitHub remote. Advisory only.
struct ForgeQueueReachableCheck;

impl Check for ForgeQueueReachableCheck {
    fn name(&self) -> &'static str {
        "forge-queue-reachable"
    }

    fn description(&self) -> &'static str {
        "gh can list the merge queue of github-backed warbands"
    }

    fn category(&self) -> Category {
        Category::Infrastructure
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        let Some(registry) = ctx.registry() else {
            return CheckResult::ok("no warbands registry, nothing to probe");
        };
        let mut slugs = Vec::new();
        for warband in ctx.warbands() {
            let handle = ctx.warband_handle(&warband);
            if !handle.forge_clone().is_dir() {
                continue;
            }
            let Some(entry) = registry.warbands.get(&warband) else {
                continue;
            };
            if let Some(slug) = github_repo_slug(&entry.git_url) {
                slugs.push((warband, slug));
            }
        }
        if slugs.is_empty() {
            return CheckResult::ok("no github-backed forges to probe");
        }
        if !GhCli::is_available() {
            return CheckResult::skipped_unavailable("gh");
        }

        let gh = GhCli::default();
        let mut details = Vec::new();
        for (warband, slug) in slugs {
            if let Err(err) = gh.pr_list(&slug) {
                details.push(format!("{warband}: gh pr list --repo {slug}: {err}"));
            }
        }
        if details.is_empty() {
            CheckResult::ok("forge queues are reachable")
        } else {
            CheckResult::warning("forge queues are unreachable")
                .with_details(details)
                .with_fix_hint("check gh auth status and the repo slugs in warbands.json")
        }
    }
}
