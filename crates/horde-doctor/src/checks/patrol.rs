//! Patrol checks: the monitoring loops and their provisioning.

use std::fs;
use std::path::PathBuf;

use horde_camp::{DaemonScoutConfig, SCOUT_KINDS, SCOUT_LABEL, scout_record_id, write_atomic};
use horde_probes::CreateRecord;

use crate::check::{Category, Check, CheckResult, RepairError};
use crate::checks::probe_failure_result;
use crate::context::CheckContext;
use crate::registry::Registry;
use crate::templates::{RITUAL_TEMPLATES, ROLE_TEMPLATES};

pub fn register(registry: &mut Registry) {
    registry.register(Box::new(ScoutTotemsExistCheck::default()));
    registry.register(Box::new(ScoutHooksWiredCheck::default()));
    registry.register(Box::new(ScoutNotStuckCheck));
    registry.register(Box::new(ScoutPluginsAccessibleCheck));
    registry.register(Box::new(ScoutRolesHavePromptsCheck::default()));
    registry.register(Box::new(RitualsProvisionedCheck::default()));
}

/// Each warband carries the three scout template records.
#[derive(Default)]
struct ScoutTotemsExistCheck {
    missing: Vec<(PathBuf, String)>, // (store cwd, record id)
}

impl Check for ScoutTotemsExistCheck {
    fn name(&self) -> &'static str {
        "scout-totems-exist"
    }

    fn description(&self) -> &'static str {
        "scout template records exist per warband"
    }

    fn category(&self) -> Category {
        Category::Patrol
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.missing.clear();
        if !ctx.store.available() {
            return CheckResult::skipped_unavailable("rl");
        }
        let mut details = Vec::new();
        for warband in ctx.warbands() {
            let Some(prefix) = ctx.warband_prefix(&warband) else {
                details.push(format!("warband '{warband}' has no prefix; skipping"));
                continue;
            };
            let cwd = ctx.warband_store_cwd(&warband);
            let ids: Vec<String> = SCOUT_KINDS
                .iter()
                .map(|kind| scout_record_id(&prefix, kind))
                .collect();
            let found = match ctx.store.show(&cwd, &ids) {
                Ok(found) => found,
                Err(err) => return probe_failure_result("scout-totems-exist", &err),
            };
            for id in ids {
                if !found.iter().any(|r| r.id == id) {
                    details.push(format!("missing scout record {id}"));
                    self.missing.push((cwd.clone(), id));
                }
            }
        }
        if self.missing.is_empty() && details.is_empty() {
            CheckResult::ok("scout template records exist")
        } else {
            CheckResult::warning("scout template records are missing")
                .with_details(details)
                .with_fix_hint("fix mode creates the missing scout records")
        }
    }

    fn repair(&mut self, ctx: &CheckContext) -> Result<(), RepairError> {
        for (cwd, id) in &self.missing {
            let kind = id.rsplit('-').next().unwrap_or("scout");
            ctx.store.create(
                cwd,
                &CreateRecord {
                    record_type: "agent".to_string(),
                    id: id.clone(),
                    title: format!("Scout template: {kind}"),
                    description: format!("Template record for the {kind} scout loop."),
                },
            )?;
            ctx.store.label_add(cwd, id, SCOUT_LABEL)?;
        }
        Ok(())
    }
}

/// The daemon's scout wiring exists and enables patrols or a heartbeat.
#[derive(Default)]
struct ScoutHooksWiredCheck {
    config_missing: bool,
}

impl Check for ScoutHooksWiredCheck {
    fn name(&self) -> &'static str {
        "scout-hooks-wired"
    }

    fn description(&self) -> &'static str {
        "daemon scout config exists and enables monitoring"
    }

    fn category(&self) -> Category {
        Category::Patrol
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.config_missing = false;
        let path = ctx.encampment().daemon_scout_config_path();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(_) => {
                self.config_missing = true;
                return CheckResult::warning("daemon scout config is missing")
                    .with_detail(ctx.display_path(&path))
                    .with_fix_hint("fix mode writes the default config (heartbeat on)");
            }
        };
        let config: DaemonScoutConfig = match serde_json::from_str(&text) {
            Ok(config) => config,
            Err(err) => {
                return CheckResult::error(format!(
                    "scout-hooks-wired: {}: {err}",
                    ctx.display_path(&path)
                ));
            }
        };
        if !config.is_well_typed() {
            return CheckResult::error(format!(
                "scout-hooks-wired: {}: wrong type or version",
                ctx.display_path(&path)
            ));
        }
        if config.enables_anything() {
            CheckResult::ok("daemon scouts are wired")
        } else {
            CheckResult::warning("scout config is present but everything is disabled")
                .with_fix_hint("enable a patrol or the heartbeat in daemon-scout-config.json")
        }
    }

    fn repair(&mut self, ctx: &CheckContext) -> Result<(), RepairError> {
        // Only a missing config is created; an existing-but-disabled or
        // malformed one is the operator's to resolve.
        if !self.config_missing {
            return Ok(());
        }
        let path = ctx.encampment().daemon_scout_config_path();
        if path.exists() {
            return Ok(());
        }
        let mut text = serde_json::to_string_pretty(&DaemonScoutConfig::default())
            .map_err(|e| RepairError::new(e.to_string()))?;
        text.push('\n');
        write_atomic(&path, &text)?;
        Ok(())
    }
}

/// No scout record sits `in_progress` past its staleness budget. A stuck
/// scout usually means a dead daemon, which only the operator can
/// confirm.
struct ScoutNotStuckCheck;

impl Check for ScoutNotStuckCheck {
    fn name(&self) -> &'static str {
        "scout-not-stuck"
    }

    fn description(&self) -> &'static str {
        "no scout record is in_progress past its budget"
    }

    fn category(&self) -> Category {
        Category::Patrol
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        if !ctx.store.available() {
            return CheckResult::skipped_unavailable("rl");
        }
        let scout_config: DaemonScoutConfig =
            fs::read_to_string(ctx.encampment().daemon_scout_config_path())
                .ok()
                .and_then(|text| serde_json::from_str(&text).ok())
                .unwrap_or_default();

        let mut details = Vec::new();
        for warband in ctx.warbands() {
            let Some(prefix) = ctx.warband_prefix(&warband) else {
                continue;
            };
            let cwd = ctx.warband_store_cwd(&warband);
            let records = match ctx.store.list(&cwd, "agent", Some("in_progress")) {
                Ok(records) => records,
                Err(err) => return probe_failure_result("scout-not-stuck", &err),
            };
            for record in records {
                if !record.id.starts_with(&format!("{prefix}-scout-")) {
                    continue;
                }
                let Some(updated_at) = record.updated_at else {
                    continue;
                };
                let kind = record.id.rsplit('-').next().unwrap_or_default();
                let budget = scout_config.stuck_threshold(kind);
                let age = ctx.now.signed_duration_since(updated_at);
                if age > budget {
                    details.push(format!(
                        "{}: in_progress for {}m (budget {}m)",
                        record.id,
                        age.num_minutes(),
                        budget.num_minutes()
                    ));
                }
            }
        }

        if details.is_empty() {
            CheckResult::ok("no scout is stuck")
        } else {
            CheckResult::warning("scouts are stuck in_progress")
                .with_details(details)
                .with_fix_hint("check the daemon and reset the records by hand")
        }
    }
}

/// Plugin directories the scouts load from exist and are readable.
struct ScoutPluginsAccessibleCheck;

impl Check for ScoutPluginsAccessibleCheck {
    fn name(&self) -> &'static str {
        "scout-plugins-accessible"
    }

    fn description(&self) -> &'static str {
        "plugin directories exist and are readable"
    }

    fn category(&self) -> Category {
        Category::Patrol
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        let dir = ctx.encampment().plugins_dir();
        match fs::read_dir(&dir) {
            Ok(_) => CheckResult::ok("plugin directory is accessible"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                CheckResult::warning("plugin directory is missing")
                    .with_detail(ctx.display_path(&dir))
                    .with_fix_hint("fix mode creates it")
            }
            Err(err) => CheckResult::warning(format!(
                "scout-plugins-accessible: {}: {err}",
                ctx.display_path(&dir)
            )),
        }
    }

    fn repair(&mut self, ctx: &CheckContext) -> Result<(), RepairError> {
        fs::create_dir_all(ctx.encampment().plugins_dir())?;
        Ok(())
    }
}

/// Each warband has the three role prompt templates.
#[derive(Default)]
struct ScoutRolesHavePromptsCheck {
    missing: Vec<(PathBuf, &'static str)>, // (templates dir, file name)
}

impl Check for ScoutRolesHavePromptsCheck {
    fn name(&self) -> &'static str {
        "scout-roles-have-prompts"
    }

    fn description(&self) -> &'static str {
        "role prompt templates are provisioned per warband"
    }

    fn category(&self) -> Category {
        Category::Patrol
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.missing.clear();
        for warband in ctx.warbands() {
            let dir = ctx.warband_handle(&warband).role_templates_dir();
            for (name, _) in ROLE_TEMPLATES {
                if !dir.join(name).is_file() {
                    self.missing.push((dir.clone(), name));
                }
            }
        }
        if self.missing.is_empty() {
            CheckResult::ok("role prompt templates are provisioned")
        } else {
            CheckResult::warning("role prompt templates are missing")
                .with_details(
                    self.missing
                        .iter()
                        .map(|(dir, name)| ctx.display_path(&dir.join(name)))
                        .collect(),
                )
                .with_fix_hint("fix mode copies the embedded role templates")
        }
    }

    fn repair(&mut self, _ctx: &CheckContext) -> Result<(), RepairError> {
        for (dir, name) in &self.missing {
            let body = ROLE_TEMPLATES
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, body)| *body)
                .unwrap_or_default();
            let path = dir.join(name);
            if !path.is_file() {
                write_atomic(&path, body)?;
            }
        }
        Ok(())
    }
}

/// Ritual definitions are provisioned under `.relics/rituals/`.
#[derive(Default)]
struct RitualsProvisionedCheck {
    missing: Vec<&'static str>,
}

impl Check for RitualsProvisionedCheck {
    fn name(&self) -> &'static str {
        "rituals"
    }

    fn description(&self) -> &'static str {
        "ritual definitions are provisioned"
    }

    fn category(&self) -> Category {
        Category::Patrol
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.missing.clear();
        let dir = ctx.encampment().rituals_dir();
        for (name, _) in RITUAL_TEMPLATES {
            if !dir.join(name).is_file() {
                self.missing.push(name);
            }
        }
        if self.missing.is_empty() {
            CheckResult::ok("rituals are provisioned")
        } else {
            CheckResult::warning("ritual definitions are missing")
                .with_details(self.missing.iter().map(|n| n.to_string()).collect())
                .with_fix_hint("fix mode re-provisions the embedded rituals")
        }
    }

    fn repair(&mut self, ctx: &CheckContext) -> Result<(), RepairError> {
        let dir = ctx.encampment().rituals_dir();
        for (name, body) in RITUAL_TEMPLATES {
            let path = dir.join(name);
            if !path.is_file() {
                write_atomic(&path, body)?;
            }
        }
        Ok(())
    }
}
