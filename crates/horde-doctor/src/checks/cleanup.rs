//! Cleanup checks: stale state the fleet leaves behind.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use horde_camp::{is_clan_session, list_warbands, parse_session_name, write_atomic};
use horde_probes::GitCli;

use crate::check::{Category, Check, CheckResult, CheckStatus, RepairError};
use crate::checks::config::declared_agents;
use crate::checks::probe_failure_result;
use crate::context::CheckContext;
use crate::registry::Registry;

/// Label carried by handoff records.
pub const HANDOFF_LABEL: &str = "gt:handoff";

/// Extensions that count as code for the sync-orphan check.
const CODE_EXTENSIONS: [&str; 14] = [
    "rs", "go", "py", "ts", "tsx", "js", "jsx", "java", "c", "h", "cpp", "hpp", "sh", "rb",
];

pub fn register(registry: &mut Registry) {
    registry.register(Box::new(ClanStateCheck::default()));
    registry.register(Box::new(ClanWorktreesCheck::default()));
    registry.register(Box::new(PersistentRoleBranchesCheck::default()));
    registry.register(Box::new(RelicsSyncOrphansCheck));
    registry.register(Box::new(CloneDivergenceCheck));
    registry.register(Box::new(OrphanSessionsCheck::default()));
    registry.register(Box::new(OrphanProcessesCheck));
    registry.register(Box::new(HandoffIntegrityCheck));
    registry.register(Box::new(SettingsDirectoryCheck::default()));
    registry.register(Box::new(RuntimeGitignoreCheck::default()));
    registry.register(Box::new(LegacyHordeCheck::default()));
}

/// Persistent clones of one warband: role clones plus clan clones.
fn persistent_clones(ctx: &CheckContext, warband: &str) -> Vec<(String, PathBuf)> {
    let handle = ctx.warband_handle(warband);
    let mut clones = Vec::new();
    for (label, path) in [
        ("warchief", handle.warchief_clone()),
        ("witness", handle.witness_clone()),
        ("forge", handle.forge_clone()),
    ] {
        if path.join(".git").is_dir() {
            clones.push((format!("{warband}/{label}"), path));
        }
    }
    for clan in handle.clans() {
        let clone = handle.clan_clone(&clan);
        if clone.join(".git").is_dir() {
            clones.push((format!("{warband}/clan/{clan}"), clone));
        }
    }
    clones
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClanState {
    #[serde(default)]
    name: String,
    #[serde(default)]
    warband: String,
    #[serde(default)]
    clone_path: String,
}

/// Every clan worker's state file carries its identity; all three
/// fields are derivable, so regeneration is safe.
#[derive(Default)]
struct ClanStateCheck {
    broken: Vec<(PathBuf, ClanState)>, // (state path, regenerated state)
}

impl Check for ClanStateCheck {
    fn name(&self) -> &'static str {
        "clan-state"
    }

    fn description(&self) -> &'static str {
        "clan state files carry name, warband, and clone path"
    }

    fn category(&self) -> Category {
        Category::Cleanup
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.broken.clear();
        let mut details = Vec::new();
        for warband in ctx.warbands() {
            let handle = ctx.warband_handle(&warband);
            for clan in handle.clans() {
                let path = handle.clan_state_path(&clan);
                let sound = fs::read_to_string(&path)
                    .ok()
                    .and_then(|text| serde_json::from_str::<ClanState>(&text).ok())
                    .is_some_and(|state| {
                        !state.name.is_empty()
                            && !state.warband.is_empty()
                            && !state.clone_path.is_empty()
                    });
                if !sound {
                    details.push(format!("{warband}/clan/{clan}: state.json missing or incomplete"));
                    self.broken.push((
                        path,
                        ClanState {
                            name: clan.clone(),
                            warband: warband.clone(),
                            clone_path: format!("{warband}/clan/{clan}"),
                        },
                    ));
                }
            }
        }
        if self.broken.is_empty() {
            CheckResult::ok("clan state files are sound")
        } else {
            CheckResult::warning("clan state files need regeneration")
                .with_details(details)
                .with_fix_hint("fix mode regenerates them from the directory layout")
        }
    }

    fn repair(&mut self, _ctx: &CheckContext) -> Result<(), RepairError> {
        for (path, state) in &self.broken {
            let mut text = serde_json::to_string_pretty(state)
                .map_err(|e| RepairError::new(e.to_string()))?;
            text.push('\n');
            write_atomic(path, &text)?;
        }
        Ok(())
    }
}

/// A clan subdirectory named `<source-warband>-<worker>` is a stale
/// cross-warband worktree left by an old spawn path.
#[derive(Default)]
struct ClanWorktreesCheck {
    stale: Vec<(PathBuf, PathBuf)>, // (source clone, worktree path)
}

impl Check for ClanWorktreesCheck {
    fn name(&self) -> &'static str {
        "clan-worktrees"
    }

    fn description(&self) -> &'static str {
        "no stale cross-warband worktrees under clan/"
    }

    fn category(&self) -> Category {
        Category::Cleanup
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.stale.clear();
        let all_warbands = list_warbands(&ctx.root, ctx.registry().as_ref());
        let mut details = Vec::new();
        for warband in ctx.warbands() {
            let handle = ctx.warband_handle(&warband);
            for clan in handle.clans() {
                let source = all_warbands.iter().find(|other| {
                    **other != warband
                        && clan
                            .strip_prefix(&format!("{other}-"))
                            .is_some_and(|rest| !rest.is_empty())
                });
                if let Some(source) = source {
                    let worktree = handle.clan_clone(&clan);
                    details.push(format!(
                        "{}: stale worktree of warband '{source}'",
                        ctx.display_path(&worktree)
                    ));
                    self.stale.push((
                        ctx.warband_handle(source).warchief_clone(),
                        worktree,
                    ));
                }
            }
        }
        if self.stale.is_empty() {
            CheckResult::ok("no stale cross-warband worktrees")
        } else {
            CheckResult::warning("stale cross-warband worktrees under clan/")
                .with_details(details)
                .with_fix_hint("fix mode removes them via git worktree remove --force")
        }
    }

    fn repair(&mut self, _ctx: &CheckContext) -> Result<(), RepairError> {
        for (source_clone, worktree) in &self.stale {
            if !worktree.exists() {
                continue;
            }
            GitCli::new(source_clone).worktree_remove_force(worktree)?;
        }
        Ok(())
    }
}

/// Clan, witness, and forge clones stay on main between tasks.
#[derive(Default)]
struct PersistentRoleBranchesCheck {
    astray: Vec<(String, PathBuf)>,
}

impl Check for PersistentRoleBranchesCheck {
    fn name(&self) -> &'static str {
        "persistent-role-branches"
    }

    fn description(&self) -> &'static str {
        "persistent clones rest on main or master"
    }

    fn category(&self) -> Category {
        Category::Cleanup
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.astray.clear();
        if !GitCli::is_available() {
            return CheckResult::skipped_unavailable("git");
        }
        let mut details = Vec::new();
        for warband in ctx.warbands() {
            for (label, clone) in persistent_clones(ctx, &warband) {
                if label.ends_with("/warchief") {
                    continue; // the canonical clone is the user's business
                }
                match GitCli::new(&clone).current_branch() {
                    Ok(Some(branch)) if branch == "main" || branch == "master" => {}
                    Ok(Some(branch)) => {
                        details.push(format!("{label}: on '{branch}'"));
                        self.astray.push((label, clone));
                    }
                    Ok(None) => {
                        details.push(format!("{label}: detached HEAD"));
                        self.astray.push((label, clone));
                    }
                    Err(err) => details.push(format!("{label}: {err}")),
                }
            }
        }
        if self.astray.is_empty() {
            CheckResult::ok("persistent clones rest on main")
        } else {
            CheckResult::warning("persistent clones wandered off main")
                .with_details(details)
                .with_fix_hint("fix mode checks out main and pulls --rebase when clean")
        }
    }

    fn repair(&mut self, _ctx: &CheckContext) -> Result<(), RepairError> {
        let mut failures = Vec::new();
        for (label, clone) in &self.astray {
            let git = GitCli::new(clone);
            match git.is_clean() {
                Ok(true) => {}
                Ok(false) => {
                    failures.push(format!("{label}: uncommitted changes, not switching"));
                    continue;
                }
                Err(err) => {
                    failures.push(format!("{label}: {err}"));
                    continue;
                }
            }
            let branch = if git.rev_exists("main") { "main" } else { "master" };
            if let Err(err) = git.checkout(branch).and_then(|()| git.pull_rebase()) {
                failures.push(format!("{label}: {err}"));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RepairError::new(format!(
                "persistent-role-branches: {}",
                failures.join("; ")
            )))
        }
    }
}

/// The store's sync branch must never touch code: a code diff between
/// `main` and `relics-sync` means a record write landed in the wrong
/// tree.
struct RelicsSyncOrphansCheck;

impl Check for RelicsSyncOrphansCheck {
    fn name(&self) -> &'static str {
        "relics-sync-orphans"
    }

    fn description(&self) -> &'static str {
        "no code differs between main and relics-sync"
    }

    fn category(&self) -> Category {
        Category::Cleanup
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        if !GitCli::is_available() {
            return CheckResult::skipped_unavailable("git");
        }
        let mut details = Vec::new();
        for warband in ctx.warbands() {
            let clone = ctx.warband_handle(&warband).warchief_clone();
            if !clone.join(".git").exists() {
                continue;
            }
            let git = GitCli::new(&clone);
            if !git.rev_exists("relics-sync") || !git.rev_exists("main") {
                continue;
            }
            let changed = match git.diff_names("main..relics-sync") {
                Ok(changed) => changed,
                Err(err) => {
                    details.push(format!("{warband}: {err}"));
                    continue;
                }
            };
            for path in changed {
                let is_code = path
                    .rsplit('.')
                    .next()
                    .is_some_and(|ext| CODE_EXTENSIONS.contains(&ext));
                if is_code {
                    details.push(format!("{warband}: {path} differs on relics-sync"));
                }
            }
        }
        if details.is_empty() {
            CheckResult::ok("relics-sync carries no code changes")
        } else {
            CheckResult::warning("code drifted onto the relics-sync branch")
                .with_details(details)
                .with_fix_hint("review and cherry-pick or drop the commits by hand")
        }
    }
}

/// Divergence from origin/main, measured only. A fetch failure (offline,
/// no remote) silently degrades to the last-known refs.
struct CloneDivergenceCheck;

impl Check for CloneDivergenceCheck {
    fn name(&self) -> &'static str {
        "clone-divergence"
    }

    fn description(&self) -> &'static str {
        "no persistent clone trails origin/main too far"
    }

    fn category(&self) -> Category {
        Category::Cleanup
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        if !GitCli::is_available() {
            return CheckResult::skipped_unavailable("git");
        }
        let mut details = Vec::new();
        let mut status = CheckStatus::Ok;
        for warband in ctx.warbands() {
            for (label, clone) in persistent_clones(ctx, &warband) {
                let git = GitCli::new(&clone);
                let on_main = matches!(
                    git.current_branch(),
                    Ok(Some(ref b)) if b == "main" || b == "master"
                );
                if !on_main {
                    continue;
                }
                git.fetch_quiet();
                let upstream = if git.rev_exists("origin/main") {
                    "origin/main"
                } else if git.rev_exists("origin/master") {
                    "origin/master"
                } else {
                    continue;
                };
                let behind = match git.behind_count(upstream) {
                    Ok(behind) => behind,
                    Err(_) => continue,
                };
                if behind > 50 {
                    status = status.max(CheckStatus::Error);
                    details.push(format!("{label}: {behind} commits behind {upstream}"));
                } else if behind > 10 {
                    status = status.max(CheckStatus::Warning);
                    details.push(format!("{label}: {behind} commits behind {upstream}"));
                }
            }
        }
        match status {
            CheckStatus::Ok => CheckResult::ok("clones track origin closely"),
            status => CheckResult {
                status,
                message: "clones trail origin/main".to_string(),
                details,
                fix_hint: Some("pull the trailing clones".to_string()),
            },
        }
    }
}

/// Every Horde-prefixed session names a live, configured
/// agent. Clan sessions are never auto-killed, whatever their state.
#[derive(Default)]
struct OrphanSessionsCheck {
    orphans: Vec<String>,
}

impl OrphanSessionsCheck {
    fn find_orphans(ctx: &CheckContext) -> Result<Vec<String>, CheckResult> {
        let sessions = match ctx.sessions.list_sessions() {
            Ok(sessions) => sessions,
            Err(err) => return Err(probe_failure_result("orphan-sessions", &err)),
        };
        // The full warband list, ignoring any --warband narrowing: a
        // session for another warband is not an orphan.
        let warbands: BTreeSet<String> =
            list_warbands(&ctx.root, ctx.registry().as_ref())
                .into_iter()
                .collect();
        let mut orphans = Vec::new();
        for session in sessions {
            if !horde_camp::is_horde_session(&session) {
                continue;
            }
            let valid = match parse_session_name(&session) {
                Ok(identity) => match &identity.warband {
                    None => true, // hq-warchief / hq-shaman
                    Some(warband) => warbands.contains(warband),
                },
                Err(_) => false,
            };
            if !valid {
                orphans.push(session);
            }
        }
        Ok(orphans)
    }
}

impl Check for OrphanSessionsCheck {
    fn name(&self) -> &'static str {
        "orphan-sessions"
    }

    fn description(&self) -> &'static str {
        "every horde session names a configured agent"
    }

    fn category(&self) -> Category {
        Category::Cleanup
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.orphans.clear();
        if !ctx.sessions.available() {
            return CheckResult::skipped_unavailable("tmux");
        }
        self.orphans = match Self::find_orphans(ctx) {
            Ok(orphans) => orphans,
            Err(result) => return result,
        };
        if self.orphans.is_empty() {
            CheckResult::ok("every horde session names a configured agent")
        } else {
            CheckResult::warning("orphan sessions are running")
                .with_details(self.orphans.clone())
                .with_fix_hint("fix mode kills them (clan sessions are never auto-killed)")
        }
    }

    fn repair(&mut self, ctx: &CheckContext) -> Result<(), RepairError> {
        // Refresh the orphan list: an earlier repair may have removed
        // warbands or sessions since detection.
        self.orphans = Self::find_orphans(ctx).map_err(|result| {
            RepairError::new(format!("orphan-sessions: {}", result.message))
        })?;
        let mut failures = Vec::new();
        for session in &self.orphans {
            if is_clan_session(session) {
                eprintln!("Warning: {session}: clan session, never auto-killed");
                continue;
            }
            if let Err(err) = ctx.sessions.kill_session(session) {
                failures.push(format!("{session}: {err}"));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RepairError::new(format!(
                "orphan-sessions: {}",
                failures.join("; ")
            )))
        }
    }
}

/// Driver processes with no controlling terminal escaped their tmux
/// pane. Informational: the doctor never kills processes.
struct OrphanProcessesCheck;

impl Check for OrphanProcessesCheck {
    fn name(&self) -> &'static str {
        "orphan-processes"
    }

    fn description(&self) -> &'static str {
        "no driver processes outside tmux"
    }

    fn category(&self) -> Category {
        Category::Cleanup
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        let drivers = match ctx.processes.driver_processes() {
            Ok(drivers) => drivers,
            Err(err) => return probe_failure_result("orphan-processes", &err),
        };
        let details: Vec<String> = drivers
            .iter()
            .filter(|d| d.is_detached())
            .map(|d| format!("pid {}: {}", d.pid, d.command))
            .collect();
        if details.is_empty() {
            CheckResult::ok("no stray driver processes")
        } else {
            CheckResult::warning("driver processes are running outside tmux")
                .with_details(details)
                .with_fix_hint("inspect and kill them by hand if they are strays")
        }
    }
}

/// Handoff records reference existing agents, at most one per agent.
/// The store surface has no delete verb, so violations are reported for
/// the operator.
struct HandoffIntegrityCheck;

impl Check for HandoffIntegrityCheck {
    fn name(&self) -> &'static str {
        "handoff-integrity"
    }

    fn description(&self) -> &'static str {
        "handoff records attach to existing agents, one each"
    }

    fn category(&self) -> Category {
        Category::Cleanup
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        if !ctx.store.available() {
            return CheckResult::skipped_unavailable("rl");
        }

        // Known agent record ids, per store they live in.
        let mut known: BTreeSet<String> = BTreeSet::new();
        for agent in declared_agents(ctx) {
            if agent.role.is_encampment_scope() {
                known.insert(agent.record_id(horde_camp::ENCAMPMENT_RECORD_PREFIX));
            } else if let Some(prefix) =
                ctx.warband_prefix(agent.warband.as_deref().unwrap_or_default())
            {
                known.insert(agent.record_id(&prefix));
            }
        }

        let mut stores = vec![ctx.encampment_store_cwd()];
        for warband in ctx.warbands() {
            let cwd = ctx.warband_store_cwd(&warband);
            if cwd.is_dir() {
                stores.push(cwd);
            }
        }

        let mut details = Vec::new();
        let mut per_agent: BTreeMap<String, u32> = BTreeMap::new();
        for cwd in stores {
            let records = match ctx.store.list(&cwd, "slot", None) {
                Ok(records) => records,
                Err(err) => return probe_failure_result("handoff-integrity", &err),
            };
            for record in records {
                if !record.has_label(HANDOFF_LABEL) {
                    continue;
                }
                if record.assignee.is_empty() {
                    details.push(format!("{}: handoff has no assignee", record.id));
                    continue;
                }
                if !known.contains(&record.assignee) {
                    details.push(format!(
                        "{}: attached to unknown agent '{}'",
                        record.id, record.assignee
                    ));
                    continue;
                }
                *per_agent.entry(record.assignee.clone()).or_insert(0) += 1;
            }
        }
        for (agent, count) in per_agent {
            if count > 1 {
                details.push(format!("{agent}: {count} handoffs attached, expected at most one"));
            }
        }

        if details.is_empty() {
            CheckResult::ok("handoffs are coherent")
        } else {
            CheckResult::warning("handoff records need attention")
                .with_details(details)
                .with_fix_hint("close or reassign the offending handoffs with rl")
        }
    }
}

/// Each warband keeps a `settings/` directory for worker metadata.
#[derive(Default)]
struct SettingsDirectoryCheck {
    missing: Vec<PathBuf>,
}

impl Check for SettingsDirectoryCheck {
    fn name(&self) -> &'static str {
        "settings-directory"
    }

    fn description(&self) -> &'static str {
        "each warband has a settings/ directory"
    }

    fn category(&self) -> Category {
        Category::Cleanup
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.missing.clear();
        for warband in ctx.warbands() {
            let dir = ctx.warband_handle(&warband).settings_dir();
            if !dir.is_dir() {
                self.missing.push(dir);
            }
        }
        if self.missing.is_empty() {
            CheckResult::ok("settings directories exist")
        } else {
            CheckResult::warning("settings directories are missing")
                .with_details(self.missing.iter().map(|p| ctx.display_path(p)).collect())
                .with_fix_hint("fix mode creates them")
        }
    }

    fn repair(&mut self, _ctx: &CheckContext) -> Result<(), RepairError> {
        for dir in &self.missing {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// `.runtime/` holds ephemeral state and must be ignored at the
/// encampment root and inside clan clones.
#[derive(Default)]
struct RuntimeGitignoreCheck {
    gitignores: Vec<PathBuf>, // .gitignore / exclude files missing the entry
}

impl RuntimeGitignoreCheck {
    fn has_entry(path: &PathBuf) -> bool {
        fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(str::trim)
            .any(|l| l == ".runtime/")
    }
}

impl Check for RuntimeGitignoreCheck {
    fn name(&self) -> &'static str {
        "runtime-gitignore"
    }

    fn description(&self) -> &'static str {
        ".runtime/ is ignored at the root and in clan clones"
    }

    fn category(&self) -> Category {
        Category::Cleanup
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.gitignores.clear();
        let mut details = Vec::new();

        if ctx.root.join(".git").is_dir() {
            let gitignore = ctx.root.join(".gitignore");
            if !Self::has_entry(&gitignore) {
                details.push(".gitignore at the root is missing .runtime/".to_string());
                self.gitignores.push(gitignore);
            }
        }
        for warband in ctx.warbands() {
            let handle = ctx.warband_handle(&warband);
            for clan in handle.clans() {
                let clone = handle.clan_clone(&clan);
                if !clone.join(".git").is_dir() {
                    continue;
                }
                let exclude = clone.join(".git").join("info").join("exclude");
                if !Self::has_entry(&exclude) {
                    details.push(format!("{warband}/clan/{clan}: exclude is missing .runtime/"));
                    self.gitignores.push(exclude);
                }
            }
        }

        if self.gitignores.is_empty() {
            CheckResult::ok(".runtime/ is ignored everywhere it matters")
        } else {
            CheckResult::warning(".runtime/ is not ignored")
                .with_details(details)
                .with_fix_hint("fix mode appends the entry")
        }
    }

    fn repair(&mut self, _ctx: &CheckContext) -> Result<(), RepairError> {
        for path in &self.gitignores {
            if Self::has_entry(path) {
                continue;
            }
            let mut text = fs::read_to_string(path).unwrap_or_default();
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(".runtime/\n");
            write_atomic(path, &text)?;
        }
        Ok(())
    }
}

/// Leftover `.horde/` directories from before the settings/ move.
#[derive(Default)]
struct LegacyHordeCheck {
    leftovers: Vec<PathBuf>,
}

impl Check for LegacyHordeCheck {
    fn name(&self) -> &'static str {
        "legacy-horde"
    }

    fn description(&self) -> &'static str {
        "no legacy .horde/ directories remain"
    }

    fn category(&self) -> Category {
        Category::Cleanup
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.leftovers.clear();
        let mut candidates = vec![ctx.root.join(".horde")];
        for warband in ctx.warbands() {
            let handle = ctx.warband_handle(&warband);
            candidates.push(handle.dir().join(".horde"));
            for clan in handle.clans() {
                candidates.push(handle.clan_clone(&clan).join(".horde"));
            }
        }
        for candidate in candidates {
            if candidate.is_dir() {
                self.leftovers.push(candidate);
            }
        }
        if self.leftovers.is_empty() {
            CheckResult::ok("no legacy .horde/ directories")
        } else {
            CheckResult::warning("legacy .horde/ directories remain")
                .with_details(self.leftovers.iter().map(|p| ctx.display_path(p)).collect())
                .with_fix_hint("fix mode deletes them")
        }
    }

    fn repair(&mut self, _ctx: &CheckContext) -> Result<(), RepairError> {
        for dir in &self.leftovers {
            if dir.exists() {
                fs::remove_dir_all(dir)
                    .map_err(|e| RepairError::new(format!("{}: {e}", dir.display())))?;
            }
        }
        Ok(())
    }
}
