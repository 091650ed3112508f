//! Core checks: the encampment's own identity and version control.

use std::fs;

use horde_camp::{
    EncampmentConfigError, RegistryError, WarbandsRegistry, global_shell_hook_path,
    global_state_path,
};
use horde_probes::GitCli;

use crate::check::{Category, Check, CheckResult, RepairError};
use crate::context::CheckContext;
use crate::registry::Registry;

pub fn register(registry: &mut Registry) {
    registry.register(Box::new(EncampmentConfigCheck));
    registry.register(Box::new(WarbandsRegistryCheck::default()));
    registry.register(Box::new(EncampmentGitCheck));
    registry.register(Box::new(EncampmentRootBranchCheck));
    registry.register(Box::new(GlobalStateCheck));
}

/// `warchief/encampment.json` exists and carries the required fields.
/// Creating it is an install-time decision, so there is no repair.
struct EncampmentConfigCheck;

impl Check for EncampmentConfigCheck {
    fn name(&self) -> &'static str {
        "encampment-config"
    }

    fn description(&self) -> &'static str {
        "warchief/encampment.json exists and is valid"
    }

    fn category(&self) -> Category {
        Category::Core
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        match ctx.encampment().load_config() {
            Ok(config) => CheckResult::ok(format!("encampment '{}' is configured", config.name)),
            Err(EncampmentConfigError::Missing(path)) => {
                CheckResult::error(format!("encampment config not found: {path}"))
                    .with_fix_hint("run 'hd install' to initialise the encampment")
            }
            Err(err) => CheckResult::error(err.to_string()),
        }
    }
}

/// `warchief/warbands.json` parses and registered warbands exist on disk.
#[derive(Default)]
struct WarbandsRegistryCheck {
    file_missing: bool,
    stale_entries: Vec<String>,
}

impl Check for WarbandsRegistryCheck {
    fn name(&self) -> &'static str {
        "warbands-registry"
    }

    fn description(&self) -> &'static str {
        "warchief/warbands.json parses and matches the directory tree"
    }

    fn category(&self) -> Category {
        Category::Core
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.file_missing = false;
        self.stale_entries.clear();

        let path = ctx.encampment().warbands_path();
        let registry = match WarbandsRegistry::load(&path) {
            Ok(registry) => registry,
            Err(RegistryError::Missing(path)) => {
                self.file_missing = true;
                return CheckResult::warning(format!("warbands registry not found: {path}"))
                    .with_fix_hint("fix mode creates an empty registry");
            }
            Err(err) => return CheckResult::error(err.to_string()),
        };

        for name in registry.warbands.keys() {
            if !ctx.root.join(name).is_dir() {
                self.stale_entries.push(name.clone());
            }
        }

        if self.stale_entries.is_empty() {
            CheckResult::ok(format!(
                "{} warband(s) registered, all present",
                registry.warbands.len()
            ))
        } else {
            CheckResult::warning("registered warbands are missing on disk")
                .with_details(
                    self.stale_entries
                        .iter()
                        .map(|n| format!("no directory for registered warband '{n}'"))
                        .collect(),
                )
                .with_fix_hint("fix mode removes the stale entries")
        }
    }

    fn repair(&mut self, ctx: &CheckContext) -> Result<(), RepairError> {
        let path = ctx.encampment().warbands_path();
        if self.file_missing {
            if !path.exists() {
                WarbandsRegistry::empty().save(&path)?;
            }
            return Ok(());
        }
        if self.stale_entries.is_empty() {
            return Ok(());
        }
        let mut registry = WarbandsRegistry::load(&path)
            .map_err(|e| RepairError::new(format!("warbands-registry: {e}")))?;
        for name in &self.stale_entries {
            registry.warbands.remove(name);
        }
        registry.save(&path)?;
        Ok(())
    }
}

/// The encampment root, when under version control, must be a plain
/// repository: a `.git` file would mean a worktree whose parent repo the
/// fleet does not manage.
struct EncampmentGitCheck;

impl Check for EncampmentGitCheck {
    fn name(&self) -> &'static str {
        "encampment-git"
    }

    fn description(&self) -> &'static str {
        "the encampment root is a plain git repository, if any"
    }

    fn category(&self) -> Category {
        Category::Core
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        let git_path = ctx.root.join(".git");
        if !git_path.exists() {
            return CheckResult::ok("encampment root is not version controlled");
        }
        if git_path.is_dir() {
            CheckResult::ok("encampment root has a plain .git directory")
        } else {
            CheckResult::error("encampment-git: .git is a file, not a directory")
                .with_detail("the encampment root must not be a linked worktree")
        }
    }
}

/// The encampment root stays on `main`/`master`.
struct EncampmentRootBranchCheck;

impl Check for EncampmentRootBranchCheck {
    fn name(&self) -> &'static str {
        "encampment-root-branch"
    }

    fn description(&self) -> &'static str {
        "the encampment root is on main or master"
    }

    fn category(&self) -> Category {
        Category::Core
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        if !ctx.root.join(".git").is_dir() {
            return CheckResult::ok("encampment root is not version controlled");
        }
        if !GitCli::is_available() {
            return CheckResult::skipped_unavailable("git");
        }
        let git = GitCli::new(&ctx.root);
        match git.current_branch() {
            Ok(Some(branch)) if branch == "main" || branch == "master" => {
                CheckResult::ok(format!("encampment root is on {branch}"))
            }
            Ok(Some(branch)) => {
                CheckResult::warning(format!("encampment root is on '{branch}', not main"))
                    .with_fix_hint("fix mode checks out main when the tree is clean")
            }
            Ok(None) => CheckResult::warning("encampment root is on a detached HEAD"),
            Err(err) => CheckResult::warning(format!("encampment-root-branch: {err}")),
        }
    }

    fn repair(&mut self, ctx: &CheckContext) -> Result<(), RepairError> {
        let git = GitCli::new(&ctx.root);
        match git.current_branch() {
            Ok(Some(branch)) if branch == "main" || branch == "master" => return Ok(()),
            Ok(_) => {}
            Err(err) => return Err(err.into()),
        }
        if !git.is_clean().map_err(RepairError::from)? {
            return Err(RepairError::new(
                "encampment-root-branch: uncommitted changes at the root, not switching branches",
            ));
        }
        let branch = if git.rev_exists("main") { "main" } else { "master" };
        git.checkout(branch)?;
        Ok(())
    }
}

/// Global state file and shell hook, written by the installer. The
/// doctor only points back at `hd install`.
struct GlobalStateCheck;

impl Check for GlobalStateCheck {
    fn name(&self) -> &'static str {
        "global-state"
    }

    fn description(&self) -> &'static str {
        "global state file initialised and shell hook installed"
    }

    fn category(&self) -> Category {
        Category::Core
    }

    fn detect(&mut self, _ctx: &CheckContext) -> CheckResult {
        let state_path = global_state_path();
        let hook_path = global_shell_hook_path();
        let mut details = Vec::new();

        match fs::read_to_string(&state_path) {
            Ok(text) => {
                if serde_json::from_str::<serde_json::Value>(&text).is_err() {
                    details.push(format!("global state is not valid JSON: {}", state_path.display()));
                }
            }
            Err(_) => details.push(format!("global state not found: {}", state_path.display())),
        }
        if !hook_path.is_file() {
            details.push(format!("shell hook not installed: {}", hook_path.display()));
        }

        if details.is_empty() {
            CheckResult::ok("global state and shell hook are in place")
        } else {
            CheckResult::warning("global installation is incomplete")
                .with_details(details)
                .with_fix_hint("run 'hd install' to reinstall the global state")
        }
    }
}
