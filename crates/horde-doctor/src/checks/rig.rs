//! Rig checks: the git plumbing of every warband.

use std::fs;
use std::path::PathBuf;

use horde_camp::{redirect, write_atomic};
use horde_probes::{GitCli, GitFileStatus};

use crate::check::{Category, Check, CheckResult, CheckStatus, RepairError};
use crate::context::CheckContext;
use crate::registry::Registry;

/// Sparse-checkout patterns that keep per-agent config out of every
/// checkout.
pub const SPARSE_PATTERNS: [&str; 5] = [
    "/*",
    "!/.claude/",
    "!/CLAUDE.md",
    "!/CLAUDE.local.md",
    "!/.mcp.json",
];

/// Tracked paths the sparse patterns would drop from checkouts.
const SPARSE_CANDIDATES: [&str; 4] = [".claude", "CLAUDE.md", "CLAUDE.local.md", ".mcp.json"];

/// Required refspec of the shared bare repo.
pub const BARE_REFSPEC: &str = "+refs/heads/*:refs/remotes/origin/*";

/// Entries every role clone lists in `.git/info/exclude`.
pub const EXCLUDE_ENTRIES: [&str; 4] = ["raiders/", "witness/", "forge/", "warchief/"];

pub fn register(registry: &mut Registry) {
    registry.register(Box::new(WarbandIsGitRepoCheck));
    registry.register(Box::new(GitExcludeConfiguredCheck::default()));
    registry.register(Box::new(HooksPathConfiguredCheck::default()));
    registry.register(Box::new(SparseCheckoutCheck::default()));
    registry.register(Box::new(BareRepoRefspecCheck::default()));
    registry.register(Box::new(RoleDirCheck::witness()));
    registry.register(Box::new(RoleDirCheck::forge()));
    registry.register(Box::new(WarchiefCloneExistsCheck::default()));
    registry.register(Box::new(RaiderClonesValidCheck));
    registry.register(Box::new(RelicsConfigValidCheck::default()));
    registry.register(Box::new(RelicsRedirectCheck::default()));
}

/// The role clones of one warband that exist as real repositories
/// (`.git` directory; linked worktrees are skipped).
fn role_clones(ctx: &CheckContext, warband: &str) -> Vec<(String, PathBuf)> {
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
    clones
}

/// The canonical clone exists and `git status` succeeds. Cloning needs a
/// remote the doctor will not guess, so this is report-only.
struct WarbandIsGitRepoCheck;

impl Check for WarbandIsGitRepoCheck {
    fn name(&self) -> &'static str {
        "warband-is-git-repo"
    }

    fn description(&self) -> &'static str {
        "each warband's canonical clone is a working git repo"
    }

    fn category(&self) -> Category {
        Category::Rig
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        if !GitCli::is_available() {
            return CheckResult::skipped_unavailable("git");
        }
        let mut details = Vec::new();
        for warband in ctx.warbands() {
            let clone = ctx.warband_handle(&warband).warchief_clone();
            if !clone.join(".git").exists() {
                details.push(format!("{warband}: no clone at {}", ctx.display_path(&clone)));
                continue;
            }
            let git = GitCli::new(&clone);
            if let Err(err) = git.status_porcelain() {
                details.push(format!("{warband}: git status failed: {err}"));
            }
        }
        if details.is_empty() {
            CheckResult::ok("canonical clones are working repositories")
        } else {
            CheckResult::error("canonical clones are broken or missing")
                .with_details(details)
                .with_fix_hint("clone the project into <warband>/warchief/warband yourself")
        }
    }
}

/// Role clones ignore the sibling role directories via
/// `.git/info/exclude`.
#[derive(Default)]
struct GitExcludeConfiguredCheck {
    incomplete: Vec<PathBuf>, // exclude file paths
}

impl GitExcludeConfiguredCheck {
    fn missing_entries(exclude_path: &PathBuf) -> Vec<&'static str> {
        let text = fs::read_to_string(exclude_path).unwrap_or_default();
        let present: Vec<&str> = text.lines().map(str::trim).collect();
        EXCLUDE_ENTRIES
            .iter()
            .copied()
            .filter(|entry| !present.contains(entry))
            .collect()
    }
}

impl Check for GitExcludeConfiguredCheck {
    fn name(&self) -> &'static str {
        "git-exclude-configured"
    }

    fn description(&self) -> &'static str {
        "role clones exclude the sibling role directories"
    }

    fn category(&self) -> Category {
        Category::Rig
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.incomplete.clear();
        let mut details = Vec::new();
        for warband in ctx.warbands() {
            for (label, clone) in role_clones(ctx, &warband) {
                let exclude = clone.join(".git").join("info").join("exclude");
                let missing = Self::missing_entries(&exclude);
                if !missing.is_empty() {
                    details.push(format!("{label}: missing {}", missing.join(", ")));
                    self.incomplete.push(exclude);
                }
            }
        }
        if self.incomplete.is_empty() {
            CheckResult::ok("role clones exclude the horde directories")
        } else {
            CheckResult::warning("exclude files are incomplete")
                .with_details(details)
                .with_fix_hint("fix mode appends the missing entries")
        }
    }

    fn repair(&mut self, _ctx: &CheckContext) -> Result<(), RepairError> {
        for exclude in &self.incomplete {
            let missing = Self::missing_entries(exclude);
            if missing.is_empty() {
                continue;
            }
            let mut text = fs::read_to_string(exclude).unwrap_or_default();
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            for entry in missing {
                text.push_str(entry);
                text.push('\n');
            }
            write_atomic(exclude, &text)?;
        }
        Ok(())
    }
}

/// Clones that ship a `.githooks` directory point
/// `core.hooksPath` at it.
#[derive(Default)]
struct HooksPathConfiguredCheck {
    unconfigured: Vec<PathBuf>,
}

impl Check for HooksPathConfiguredCheck {
    fn name(&self) -> &'static str {
        "hooks-path-configured"
    }

    fn description(&self) -> &'static str {
        "clones with .githooks use core.hooksPath"
    }

    fn category(&self) -> Category {
        Category::Rig
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.unconfigured.clear();
        if !GitCli::is_available() {
            return CheckResult::skipped_unavailable("git");
        }
        let mut details = Vec::new();
        for warband in ctx.warbands() {
            for (label, clone) in role_clones(ctx, &warband) {
                if !clone.join(".githooks").is_dir() {
                    continue;
                }
                let configured = GitCli::new(&clone)
                    .config_get("core.hooksPath")
                    .ok()
                    .flatten();
                if configured.as_deref() != Some(".githooks") {
                    details.push(format!("{label}: core.hooksPath is not .githooks"));
                    self.unconfigured.push(clone);
                }
            }
        }
        if self.unconfigured.is_empty() {
            CheckResult::ok("hook paths are configured")
        } else {
            CheckResult::warning("clones ship .githooks but do not use it")
                .with_details(details)
                .with_fix_hint("fix mode sets core.hooksPath=.githooks")
        }
    }

    fn repair(&mut self, _ctx: &CheckContext) -> Result<(), RepairError> {
        for clone in &self.unconfigured {
            GitCli::new(clone).config_set("core.hooksPath", ".githooks")?;
        }
        Ok(())
    }
}

/// Project clones exclude per-agent config through
/// sparse checkout, so one agent's `.claude/` never reaches another's
/// checkout.
#[derive(Default)]
struct SparseCheckoutCheck {
    unconfigured: Vec<PathBuf>,
}

fn sparse_file_complete(clone: &PathBuf) -> bool {
    let sparse = clone.join(".git").join("info").join("sparse-checkout");
    let text = fs::read_to_string(sparse).unwrap_or_default();
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    SPARSE_PATTERNS.iter().all(|p| lines.contains(p))
}

impl Check for SparseCheckoutCheck {
    fn name(&self) -> &'static str {
        "sparse-checkout"
    }

    fn description(&self) -> &'static str {
        "project clones exclude per-agent config via sparse checkout"
    }

    fn category(&self) -> Category {
        Category::Rig
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.unconfigured.clear();
        if !GitCli::is_available() {
            return CheckResult::skipped_unavailable("git");
        }
        let mut details = Vec::new();
        for warband in ctx.warbands() {
            let handle = ctx.warband_handle(&warband);
            let mut clones = role_clones(ctx, &warband);
            for clan in handle.clans() {
                let clone = handle.clan_clone(&clan);
                if clone.join(".git").is_dir() {
                    clones.push((format!("{warband}/clan/{clan}"), clone));
                }
            }
            for (label, clone) in clones {
                let enabled = GitCli::new(&clone)
                    .config_get("core.sparseCheckout")
                    .ok()
                    .flatten()
                    .is_some_and(|v| v == "true");
                if !enabled || !sparse_file_complete(&clone) {
                    details.push(format!("{label}: sparse patterns not set"));
                    self.unconfigured.push(clone);
                }
            }
        }
        if self.unconfigured.is_empty() {
            CheckResult::ok("sparse checkouts are configured")
        } else {
            CheckResult::warning("clones are missing the sparse-checkout patterns")
                .with_details(details)
                .with_fix_hint("fix mode writes the patterns and re-reads the tree")
        }
    }

    fn repair(&mut self, _ctx: &CheckContext) -> Result<(), RepairError> {
        for clone in &self.unconfigured {
            let git = GitCli::new(clone);

            // Never clobber user work: refuse while a candidate is
            // modified, or an untracked config file sits where the
            // patterns would act. An untracked .claude/ is horde's own
            // metadata and does not block.
            let mut blockers = Vec::new();
            for candidate in SPARSE_CANDIDATES {
                match git.file_status(candidate) {
                    GitFileStatus::TrackedModified => {
                        blockers.push(format!("{candidate} (modified)"));
                    }
                    GitFileStatus::Untracked => {
                        if candidate != ".claude" && clone.join(candidate).exists() {
                            blockers.push(format!("{candidate} (untracked)"));
                        }
                    }
                    _ => {}
                }
            }
            if !blockers.is_empty() {
                return Err(RepairError::new(format!(
                    "sparse-checkout: {}: refusing while {} present",
                    clone.display(),
                    blockers.join(", ")
                )));
            }

            let sparse = clone.join(".git").join("info").join("sparse-checkout");
            let mut text = SPARSE_PATTERNS.join("\n");
            text.push('\n');
            write_atomic(&sparse, &text)?;
            git.config_set("core.sparseCheckout", "true")?;
            git.read_tree_update()?;
        }
        Ok(())
    }
}

/// The shared bare repo fetches all branches, not a narrowed set.
#[derive(Default)]
struct BareRepoRefspecCheck {
    misconfigured: Vec<PathBuf>,
}

impl Check for BareRepoRefspecCheck {
    fn name(&self) -> &'static str {
        "bare-repo-refspec"
    }

    fn description(&self) -> &'static str {
        "shared bare repos fetch all branches"
    }

    fn category(&self) -> Category {
        Category::Rig
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.misconfigured.clear();
        if !GitCli::is_available() {
            return CheckResult::skipped_unavailable("git");
        }
        let mut details = Vec::new();
        for warband in ctx.warbands() {
            let bare = ctx.warband_handle(&warband).bare_repo();
            if !bare.is_dir() {
                continue;
            }
            let refspec = GitCli::new(&bare)
                .config_get("remote.origin.fetch")
                .ok()
                .flatten();
            if refspec.as_deref() != Some(BARE_REFSPEC) {
                details.push(format!("{warband}: remote.origin.fetch is not '{BARE_REFSPEC}'"));
                self.misconfigured.push(bare);
            }
        }
        if self.misconfigured.is_empty() {
            CheckResult::ok("bare repo refspecs are sound")
        } else {
            CheckResult::warning("bare repos fetch a narrowed refspec")
                .with_details(details)
                .with_fix_hint("fix mode sets the full refspec")
        }
    }

    fn repair(&mut self, _ctx: &CheckContext) -> Result<(), RepairError> {
        for bare in &self.misconfigured {
            GitCli::new(bare).config_set("remote.origin.fetch", BARE_REFSPEC)?;
        }
        Ok(())
    }
}

/// Witness/forge scaffolding: the role directory and its mail queue.
/// Directories and queue files are created; clones never are.
struct RoleDirCheck {
    name: &'static str,
    role_dir: &'static str,
    missing_queues: Vec<PathBuf>,
}

impl RoleDirCheck {
    fn witness() -> Self {
        Self {
            name: "witness-exists",
            role_dir: "witness",
            missing_queues: Vec::new(),
        }
    }

    fn forge() -> Self {
        Self {
            name: "forge-exists",
            role_dir: "forge",
            missing_queues: Vec::new(),
        }
    }
}

impl Check for RoleDirCheck {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        "role directory, clone, and mail queue exist"
    }

    fn category(&self) -> Category {
        Category::Rig
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.missing_queues.clear();
        let mut details = Vec::new();
        let mut status = CheckStatus::Ok;
        for warband in ctx.warbands() {
            let dir = ctx.root.join(&warband).join(self.role_dir);
            let clone = dir.join("warband");
            let queue = dir.join("drums").join("inbox.jsonl");
            if !clone.is_dir() {
                status = status.max(CheckStatus::Error);
                details.push(format!(
                    "{warband}: no {} clone; clone the project into {} yourself",
                    self.role_dir,
                    ctx.display_path(&clone)
                ));
            }
            if !queue.is_file() {
                status = status.max(CheckStatus::Warning);
                details.push(format!("{warband}: missing {}", ctx.display_path(&queue)));
                self.missing_queues.push(queue);
            }
        }
        match status {
            CheckStatus::Ok => CheckResult::ok(format!("{} scaffolding is in place", self.role_dir)),
            status => CheckResult {
                status,
                message: format!("{} scaffolding is incomplete", self.role_dir),
                details,
                fix_hint: Some("fix mode creates directories and queues, never clones".to_string()),
            },
        }
    }

    fn repair(&mut self, _ctx: &CheckContext) -> Result<(), RepairError> {
        for queue in &self.missing_queues {
            if let Some(parent) = queue.parent() {
                fs::create_dir_all(parent)?;
            }
            if !queue.exists() {
                write_atomic(queue, "")?;
            }
        }
        Ok(())
    }
}

/// The warchief's mail queue beside the canonical clone.
#[derive(Default)]
struct WarchiefCloneExistsCheck {
    missing_queues: Vec<PathBuf>,
}

impl Check for WarchiefCloneExistsCheck {
    fn name(&self) -> &'static str {
        "warchief-clone-exists"
    }

    fn description(&self) -> &'static str {
        "the canonical clone directory and warchief queue exist"
    }

    fn category(&self) -> Category {
        Category::Rig
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.missing_queues.clear();
        let mut details = Vec::new();
        let mut status = CheckStatus::Ok;
        for warband in ctx.warbands() {
            let handle = ctx.warband_handle(&warband);
            let clone = handle.warchief_clone();
            let queue = handle.dir().join("warchief").join("drums").join("inbox.jsonl");
            if !clone.is_dir() {
                status = status.max(CheckStatus::Error);
                details.push(format!(
                    "{warband}: no canonical clone at {}",
                    ctx.display_path(&clone)
                ));
            }
            if !queue.is_file() {
                status = status.max(CheckStatus::Warning);
                details.push(format!("{warband}: missing {}", ctx.display_path(&queue)));
                self.missing_queues.push(queue);
            }
        }
        match status {
            CheckStatus::Ok => CheckResult::ok("warchief scaffolding is in place"),
            status => CheckResult {
                status,
                message: "warchief scaffolding is incomplete".to_string(),
                details,
                fix_hint: Some("fix mode creates queues; cloning needs a remote url".to_string()),
            },
        }
    }

    fn repair(&mut self, _ctx: &CheckContext) -> Result<(), RepairError> {
        for queue in &self.missing_queues {
            if let Some(parent) = queue.parent() {
                fs::create_dir_all(parent)?;
            }
            if !queue.exists() {
                write_atomic(queue, "")?;
            }
        }
        Ok(())
    }
}

/// Raider worktrees are disposable but must be coherent while they
/// exist: a `raider/` branch and a clean tree.
struct RaiderClonesValidCheck;

impl Check for RaiderClonesValidCheck {
    fn name(&self) -> &'static str {
        "raider-clones-valid"
    }

    fn description(&self) -> &'static str {
        "raider clones are on raider/ branches with clean trees"
    }

    fn category(&self) -> Category {
        Category::Rig
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        if !GitCli::is_available() {
            return CheckResult::skipped_unavailable("git");
        }
        let mut details = Vec::new();
        for warband in ctx.warbands() {
            let handle = ctx.warband_handle(&warband);
            for raider in handle.raiders() {
                let clone = handle.raider_clone(&raider);
                if !clone.join(".git").exists() {
                    details.push(format!("{warband}/{raider}: no clone at {}", ctx.display_path(&clone)));
                    continue;
                }
                let git = GitCli::new(&clone);
                match git.current_branch() {
                    Ok(Some(branch)) if branch.starts_with("raider/") => {}
                    Ok(Some(branch)) => details.push(format!(
                        "{warband}/{raider}: on '{branch}', expected a raider/ branch"
                    )),
                    Ok(None) => details.push(format!("{warband}/{raider}: detached HEAD")),
                    Err(err) => {
                        details.push(format!("{warband}/{raider}: {err}"));
                        continue;
                    }
                }
                match git.is_clean() {
                    Ok(true) => {}
                    Ok(false) => details.push(format!("{warband}/{raider}: uncommitted changes")),
                    Err(err) => details.push(format!("{warband}/{raider}: {err}")),
                }
            }
        }
        if details.is_empty() {
            CheckResult::ok("raider clones are coherent")
        } else {
            CheckResult::warning("raider clones need attention").with_details(details)
        }
    }
}

/// The store answers queries in each warband; a sync usually heals a
/// store that is present but stale.
#[derive(Default)]
struct RelicsConfigValidCheck {
    broken: Vec<PathBuf>, // store cwds needing a sync
}

impl Check for RelicsConfigValidCheck {
    fn name(&self) -> &'static str {
        "relics-config-valid"
    }

    fn description(&self) -> &'static str {
        "the issue store answers in every warband"
    }

    fn category(&self) -> Category {
        Category::Rig
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.broken.clear();
        if !ctx.store.available() {
            return CheckResult::skipped_unavailable("rl");
        }
        let mut details = Vec::new();
        for warband in ctx.warbands() {
            let cwd = ctx.warband_store_cwd(&warband);
            if !cwd.is_dir() {
                continue;
            }
            if let Err(err) = ctx.store.list(&cwd, "agent", None) {
                if err.is_unavailable() {
                    return CheckResult::skipped_unavailable("rl");
                }
                details.push(format!("{warband}: {err}"));
                self.broken.push(cwd);
            }
        }
        if details.is_empty() {
            CheckResult::ok("the store answers in every warband")
        } else {
            CheckResult::warning("the store fails in some warbands")
                .with_details(details)
                .with_fix_hint("fix mode runs rl sync there")
        }
    }

    fn repair(&mut self, ctx: &CheckContext) -> Result<(), RepairError> {
        for cwd in &self.broken {
            ctx.store.sync(cwd, false)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum RedirectIssue {
    /// Local data conflicts with the tracked store.
    Conflict { warband: String },
    /// Redirect missing or wrong while the tracked store exists.
    NeedsRedirect { warband: String },
    /// No store at all; initialise a local one.
    NeedsInit { warband: String },
}

/// A warband-level `.relics/` defers to the tracked store
/// when one exists, and a warband without any store gets a local one.
#[derive(Default)]
struct RelicsRedirectCheck {
    issues: Vec<RedirectIssue>,
}

impl Check for RelicsRedirectCheck {
    fn name(&self) -> &'static str {
        "relics-redirect"
    }

    fn description(&self) -> &'static str {
        "warband stores redirect to the tracked store when one exists"
    }

    fn category(&self) -> Category {
        Category::Rig
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.issues.clear();
        let mut details = Vec::new();
        let mut conflict = false;

        for warband in ctx.warbands() {
            let handle = ctx.warband_handle(&warband);
            let tracked = handle.warchief_clone().join(".relics");
            let local = handle.relics_dir();
            let state = match redirect::classify_relics_dir(&local) {
                Ok(state) => state,
                Err(err) => {
                    details.push(format!("{warband}: {err}"));
                    continue;
                }
            };

            if tracked.is_dir() {
                match state {
                    redirect::RelicsState::Data { files } => {
                        conflict = true;
                        details.push(format!(
                            "{warband}: local .relics holds {} while the tracked store exists",
                            files.join(", ")
                        ));
                        self.issues.push(RedirectIssue::Conflict { warband });
                    }
                    redirect::RelicsState::Redirect { ref target }
                        if target == redirect::REDIRECT_TARGET => {}
                    redirect::RelicsState::Redirect { target } => {
                        details.push(format!(
                            "{warband}: redirect points at '{target}', expected '{}'",
                            redirect::REDIRECT_TARGET
                        ));
                        self.issues.push(RedirectIssue::NeedsRedirect { warband });
                    }
                    redirect::RelicsState::Missing | redirect::RelicsState::Empty => {
                        details.push(format!("{warband}: missing redirect to the tracked store"));
                        self.issues.push(RedirectIssue::NeedsRedirect { warband });
                    }
                }
            } else {
                match state {
                    redirect::RelicsState::Data { .. } => {}
                    redirect::RelicsState::Redirect { target } => {
                        details.push(format!(
                            "{warband}: redirect points at '{target}' but no tracked store exists"
                        ));
                        self.issues.push(RedirectIssue::NeedsInit { warband });
                    }
                    redirect::RelicsState::Missing | redirect::RelicsState::Empty => {
                        details.push(format!("{warband}: no store at all"));
                        self.issues.push(RedirectIssue::NeedsInit { warband });
                    }
                }
            }
        }

        if self.issues.is_empty() && details.is_empty() {
            return CheckResult::ok("warband stores are coherent");
        }
        let message = if conflict {
            "Conflicting local relics"
        } else {
            "warband stores need reconciliation"
        };
        let status = if conflict {
            CheckStatus::Error
        } else {
            CheckStatus::Warning
        };
        CheckResult {
            status,
            message: message.to_string(),
            details,
            fix_hint: Some("fix mode rewrites redirects or initialises a local store".to_string()),
        }
    }

    fn repair(&mut self, ctx: &CheckContext) -> Result<(), RepairError> {
        for issue in &self.issues {
            match issue {
                RedirectIssue::Conflict { warband } => {
                    let local = ctx.warband_handle(warband).relics_dir();
                    if local.exists() {
                        fs::remove_dir_all(&local)
                            .map_err(|e| RepairError::new(format!("{}: {e}", local.display())))?;
                    }
                    fs::create_dir_all(&local)?;
                    write_atomic(
                        local.join(redirect::REDIRECT_FILE),
                        &redirect::redirect_body(),
                    )?;
                }
                RedirectIssue::NeedsRedirect { warband } => {
                    let local = ctx.warband_handle(warband).relics_dir();
                    fs::create_dir_all(&local)?;
                    write_atomic(
                        local.join(redirect::REDIRECT_FILE),
                        &redirect::redirect_body(),
                    )?;
                }
                RedirectIssue::NeedsInit { warband } => {
                    let Some(prefix) = ctx.warband_prefix(warband) else {
                        return Err(RepairError::new(format!(
                            "relics-redirect: warband '{warband}' has no prefix; cannot initialise a store"
                        )));
                    };
                    let dir = ctx.warband_handle(warband).dir();
                    let prefixed = format!("{prefix}-");
                    let initialised = ctx.store.available()
                        && ctx.store.init(&dir, &prefixed).is_ok();
                    if !initialised {
                        // Fallback: a minimal config.yaml is enough for
                        // the store to adopt the directory later.
                        let local = ctx.warband_handle(warband).relics_dir();
                        fs::create_dir_all(&local)?;
                        write_atomic(
                            local.join("config.yaml"),
                            &format!("prefix: {prefixed}\n"),
                        )?;
                    }
                }
            }
        }
        Ok(())
    }
}
