//! Config checks: routing, record templates, and agent settings.

use std::fs;
use std::path::PathBuf;

use horde_camp::{
    AgentIdentity, RelicsSettings, Role, WarbandsRegistry, redirect, routes, settings,
    write_atomic,
};
use horde_probes::{CreateRecord, GitCli, GitFileStatus};

use crate::check::{Category, Check, CheckResult, CheckStatus, RepairError};
use crate::checks::probe_failure_result;
use crate::context::CheckContext;
use crate::registry::Registry;
use crate::templates::{COMMAND_TEMPLATES, SETTINGS_TEMPLATE};

/// The custom record types the store must know about.
pub const REQUIRED_CUSTOM_TYPES: &str = "agent,role,warband,raid,slot,queue";

/// Label carried by every role template record.
pub const ROLE_LABEL: &str = "gt:role";

pub fn register(registry: &mut Registry) {
    registry.register(Box::new(RelicsCustomTypesCheck));
    registry.register(Box::new(RelicsDatabaseCheck::default()));
    registry.register(Box::new(PrefixConflictCheck));
    registry.register(Box::new(PrefixMismatchCheck::default()));
    registry.register(Box::new(RoutesConfigCheck::default()));
    registry.register(Box::new(WarbandRoutesJsonlCheck::default()));
    registry.register(Box::new(RoleRelicsExistCheck::default()));
    registry.register(Box::new(RoleBeadLabelsCheck::default()));
    registry.register(Box::new(AgentRelicsExistCheck::default()));
    registry.register(Box::new(CommandsProvisionedCheck::default()));
    registry.register(Box::new(ClaudeSettingsCheck::default()));
    registry.register(Box::new(SessionHooksCheck));
    registry.register(Box::new(EnvVarsCheck));
}

/// Every declared agent, encampment roles first.
///
/// Witness and forge are declared by the warband existing; clan and
/// raider agents are declared by their directories.
pub(crate) fn declared_agents(ctx: &CheckContext) -> Vec<AgentIdentity> {
    let mut agents = vec![AgentIdentity::warchief(), AgentIdentity::shaman()];
    for warband in ctx.warbands() {
        let handle = ctx.warband_handle(&warband);
        agents.push(AgentIdentity::witness(&warband));
        agents.push(AgentIdentity::forge(&warband));
        for clan in handle.clans() {
            agents.push(AgentIdentity::clan(&warband, clan));
        }
        for raider in handle.raiders() {
            agents.push(AgentIdentity::raider(&warband, raider));
        }
    }
    agents
}

/// `rl config get types.custom` must report the fixed type list.
struct RelicsCustomTypesCheck;

impl Check for RelicsCustomTypesCheck {
    fn name(&self) -> &'static str {
        "relics-custom-types"
    }

    fn description(&self) -> &'static str {
        "the issue store knows the horde record types"
    }

    fn category(&self) -> Category {
        Category::Config
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        if !ctx.store.available() {
            return CheckResult::skipped_unavailable("rl");
        }
        let configured = match ctx
            .store
            .config_get(&ctx.encampment_store_cwd(), "types.custom")
        {
            Ok(value) => value.unwrap_or_default(),
            Err(err) => return probe_failure_result("relics-custom-types", &err),
        };
        let mut have: Vec<&str> = configured
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();
        have.sort_unstable();
        let mut want: Vec<&str> = REQUIRED_CUSTOM_TYPES.split(',').collect();
        want.sort_unstable();
        if have == want {
            CheckResult::ok("custom record types are configured")
        } else {
            CheckResult::warning("custom record types are not configured")
                .with_detail(format!(
                    "types.custom is '{configured}', expected '{REQUIRED_CUSTOM_TYPES}'"
                ))
                .with_fix_hint(format!("rl config set types.custom {REQUIRED_CUSTOM_TYPES}"))
        }
    }

    fn repair(&mut self, ctx: &CheckContext) -> Result<(), RepairError> {
        ctx.store
            .config_set(
                &ctx.encampment_store_cwd(),
                "types.custom",
                REQUIRED_CUSTOM_TYPES,
            )
            .map_err(RepairError::from)
    }
}

/// An empty `issues.db` beside a non-empty `issues.jsonl` means the
/// store's database was created but never hydrated; queries would come
/// back empty while the JSONL export holds the truth.
#[derive(Default)]
struct RelicsDatabaseCheck {
    stale: Vec<(PathBuf, PathBuf)>, // (db path, sync cwd)
}

impl RelicsDatabaseCheck {
    fn scan(&mut self, ctx: &CheckContext) {
        self.stale.clear();
        let mut stores = vec![(ctx.encampment().relics_dir(), ctx.encampment_store_cwd())];
        for warband in ctx.warbands() {
            let dir = redirect::resolve_relics_dir(&ctx.warband_handle(&warband).dir());
            stores.push((dir, ctx.warband_store_cwd(&warband)));
        }
        for (relics_dir, sync_cwd) in stores {
            let db = relics_dir.join("issues.db");
            let jsonl = relics_dir.join("issues.jsonl");
            let db_empty = fs::metadata(&db).map(|m| m.len() == 0).unwrap_or(false);
            let jsonl_full = fs::metadata(&jsonl).map(|m| m.len() > 0).unwrap_or(false);
            if db_empty && jsonl_full {
                self.stale.push((db, sync_cwd));
            }
        }
    }
}

impl Check for RelicsDatabaseCheck {
    fn name(&self) -> &'static str {
        "relics-database"
    }

    fn description(&self) -> &'static str {
        "no empty issue database shadows a non-empty JSONL export"
    }

    fn category(&self) -> Category {
        Category::Config
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.scan(ctx);
        if self.stale.is_empty() {
            CheckResult::ok("issue databases are consistent with their exports")
        } else {
            CheckResult::error("empty issue database beside a non-empty JSONL export")
                .with_details(
                    self.stale
                        .iter()
                        .map(|(db, _)| ctx.display_path(db))
                        .collect(),
                )
                .with_fix_hint("fix mode deletes the empty database and resyncs from JSONL")
        }
    }

    fn repair(&mut self, ctx: &CheckContext) -> Result<(), RepairError> {
        self.scan(ctx);
        let mut failures = Vec::new();
        for (db, sync_cwd) in &self.stale {
            if db.exists()
                && let Err(err) = fs::remove_file(db)
            {
                failures.push(format!("{}: {err}", db.display()));
                continue;
            }
            if let Err(err) = ctx.store.sync(sync_cwd, true) {
                failures.push(format!("rl sync --from-main in {}: {err}", sync_cwd.display()));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RepairError::new(format!(
                "relics-database: {}",
                failures.join("; ")
            )))
        }
    }
}

/// No two routes may share a prefix. Which route is the real
/// one is a human call, so there is no repair.
struct PrefixConflictCheck;

impl Check for PrefixConflictCheck {
    fn name(&self) -> &'static str {
        "prefix-conflict"
    }

    fn description(&self) -> &'static str {
        "route prefixes are unique"
    }

    fn category(&self) -> Category {
        Category::Config
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        let routes = match routes::read_routes(ctx.encampment().routes_path()) {
            Ok(routes) => routes,
            Err(err) => return CheckResult::warning(format!("prefix-conflict: {err}")),
        };
        let duplicates = routes::duplicate_prefixes(&routes);
        if duplicates.is_empty() {
            CheckResult::ok("route prefixes are unique")
        } else {
            CheckResult::error("conflicting route prefixes")
                .with_details(
                    duplicates
                        .iter()
                        .map(|p| format!("prefix '{p}' is routed more than once"))
                        .collect(),
                )
                .with_fix_hint("edit .relics/routes.jsonl and keep one route per prefix")
        }
    }
}

/// The registry's declared prefix must agree with routes.jsonl.
/// The routing table is what the store actually follows, so the repair
/// rewrites the registry to match it.
#[derive(Default)]
struct PrefixMismatchCheck {
    mismatches: Vec<(String, String)>, // (warband, bare route prefix)
}

impl Check for PrefixMismatchCheck {
    fn name(&self) -> &'static str {
        "prefix-mismatch"
    }

    fn description(&self) -> &'static str {
        "warbands.json prefixes agree with routes.jsonl"
    }

    fn category(&self) -> Category {
        Category::Config
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.mismatches.clear();
        let Some(registry) = ctx.registry() else {
            return CheckResult::ok("no warbands registry to compare");
        };
        let routes = routes::read_routes(ctx.encampment().routes_path()).unwrap_or_default();

        let mut details = Vec::new();
        for (name, entry) in &registry.warbands {
            let Some(declared) = entry.prefix() else {
                continue;
            };
            let Some(route) = routes::route_for_warband(&routes, name) else {
                continue;
            };
            let routed = route.prefix.trim_end_matches('-');
            if declared != routed {
                details.push(format!(
                    "Warband '{name}': warbands.json says '{declared}', routes.jsonl uses '{routed}'"
                ));
                self.mismatches.push((name.clone(), routed.to_string()));
            }
        }

        if self.mismatches.is_empty() {
            CheckResult::ok("registry prefixes agree with the routing table")
        } else {
            CheckResult::warning("registry prefixes disagree with routes.jsonl")
                .with_details(details)
                .with_fix_hint("fix mode rewrites warbands.json to match routes.jsonl")
        }
    }

    fn repair(&mut self, ctx: &CheckContext) -> Result<(), RepairError> {
        if self.mismatches.is_empty() {
            return Ok(());
        }
        let path = ctx.encampment().warbands_path();
        let mut registry = WarbandsRegistry::load(&path)
            .map_err(|e| RepairError::new(format!("prefix-mismatch: {e}")))?;
        for (name, routed) in &self.mismatches {
            if let Some(entry) = registry.warbands.get_mut(name) {
                entry
                    .relics
                    .get_or_insert_with(RelicsSettings::default)
                    .prefix = Some(routed.clone());
            }
        }
        registry.save(&path)?;
        Ok(())
    }
}

/// The routing table holds the reserved encampment routes and one route
/// per warband. Repair appends, never deletes.
#[derive(Default)]
struct RoutesConfigCheck {
    missing_warbands: Vec<(String, String)>, // (warband, bare prefix)
    reserved_missing: bool,
}

impl Check for RoutesConfigCheck {
    fn name(&self) -> &'static str {
        "routes-config"
    }

    fn description(&self) -> &'static str {
        "routes.jsonl holds the reserved and per-warband routes"
    }

    fn category(&self) -> Category {
        Category::Config
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.missing_warbands.clear();
        self.reserved_missing = false;

        let table = match routes::read_routes(ctx.encampment().routes_path()) {
            Ok(table) => table,
            Err(err) => return CheckResult::warning(format!("routes-config: {err}")),
        };

        let mut details = Vec::new();
        let mut status = CheckStatus::Ok;

        for reserved in routes::reserved_routes() {
            if !table.contains(&reserved) {
                self.reserved_missing = true;
            }
        }
        if self.reserved_missing {
            status = status.max(CheckStatus::Warning);
        }

        let registry = ctx.registry();
        for warband in ctx.warbands() {
            match routes::route_for_warband(&table, &warband) {
                Some(route) => {
                    let target = ctx.root.join(&route.path);
                    let has_store = target.join(".relics").exists()
                        || ctx
                            .warband_handle(&warband)
                            .relics_dir()
                            .join(redirect::REDIRECT_FILE)
                            .is_file();
                    if !target.is_dir() || !has_store {
                        status = status.max(CheckStatus::Warning);
                        details.push(format!(
                            "route '{}' points at '{}' which has no store",
                            route.prefix, route.path
                        ));
                    }
                }
                None => {
                    status = status.max(CheckStatus::Error);
                    match registry.as_ref().and_then(|r| r.prefix_of(&warband)) {
                        Some(prefix) => {
                            details.push(format!("no route for warband '{warband}'"));
                            self.missing_warbands
                                .push((warband.clone(), prefix.to_string()));
                        }
                        None => details.push(format!(
                            "no route for warband '{warband}' and no declared prefix to create one"
                        )),
                    }
                }
            }
        }

        let message = match status {
            CheckStatus::Ok => return CheckResult::ok("routing table is complete"),
            _ if self.reserved_missing => "Required encampment routes are missing".to_string(),
            _ => "routing table is incomplete".to_string(),
        };
        CheckResult {
            status,
            message,
            details,
            fix_hint: Some("fix mode appends the missing routes".to_string()),
        }
    }

    fn repair(&mut self, ctx: &CheckContext) -> Result<(), RepairError> {
        if !self.reserved_missing && self.missing_warbands.is_empty() {
            return Ok(());
        }
        let path = ctx.encampment().routes_path();
        let mut table = routes::read_routes(&path)?;

        for (warband, prefix) in &self.missing_warbands {
            let prefixed = format!("{prefix}-");
            if !routes::prefix_is_valid(&prefixed) {
                return Err(RepairError::new(format!(
                    "routes-config: declared prefix '{prefix}' for warband '{warband}' is not usable"
                )));
            }
            if routes::route_for_warband(&table, warband).is_none() {
                table.push(routes::Route::new(
                    prefixed,
                    routes::warband_route_path(warband),
                ));
            }
        }
        for reserved in routes::reserved_routes() {
            if !table.contains(&reserved) {
                table.push(reserved);
            }
        }

        routes::write_routes(&path, &table)?;
        Ok(())
    }
}

/// A warband-level `routes.jsonl` would shadow the encampment table.
#[derive(Default)]
struct WarbandRoutesJsonlCheck {
    offending: Vec<PathBuf>,
}

impl Check for WarbandRoutesJsonlCheck {
    fn name(&self) -> &'static str {
        "warband-routes-jsonl"
    }

    fn description(&self) -> &'static str {
        "no warband store carries its own routes.jsonl"
    }

    fn category(&self) -> Category {
        Category::Config
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.offending.clear();
        for warband in ctx.warbands() {
            let handle = ctx.warband_handle(&warband);
            for dir in [
                handle.relics_dir(),
                handle.warchief_clone().join(".relics"),
            ] {
                let candidate = dir.join("routes.jsonl");
                if candidate.is_file() {
                    self.offending.push(candidate);
                }
            }
        }
        if self.offending.is_empty() {
            CheckResult::ok("no shadowing routes.jsonl in warband stores")
        } else {
            CheckResult::error("warband-level routes.jsonl shadows the encampment table")
                .with_details(
                    self.offending
                        .iter()
                        .map(|p| ctx.display_path(p))
                        .collect(),
                )
                .with_fix_hint("fix mode deletes the shadowing file")
        }
    }

    fn repair(&mut self, _ctx: &CheckContext) -> Result<(), RepairError> {
        for path in &self.offending {
            if path.exists() {
                fs::remove_file(path)
                    .map_err(|e| RepairError::new(format!("{}: {e}", path.display())))?;
            }
        }
        Ok(())
    }
}

/// Every role has a shared template record in the encampment store.
#[derive(Default)]
struct RoleRelicsExistCheck {
    missing: Vec<Role>,
}

impl Check for RoleRelicsExistCheck {
    fn name(&self) -> &'static str {
        "role-relics-exist"
    }

    fn description(&self) -> &'static str {
        "role template records exist in the encampment store"
    }

    fn category(&self) -> Category {
        Category::Config
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.missing.clear();
        if !ctx.store.available() {
            return CheckResult::skipped_unavailable("rl");
        }
        let ids: Vec<String> = Role::ALL.iter().map(Role::role_record_id).collect();
        let found = match ctx.store.show(&ctx.encampment_store_cwd(), &ids) {
            Ok(found) => found,
            Err(err) => return probe_failure_result("role-relics-exist", &err),
        };
        for role in Role::ALL {
            if !found.iter().any(|r| r.id == role.role_record_id()) {
                self.missing.push(role);
            }
        }
        if self.missing.is_empty() {
            CheckResult::ok("all six role template records exist")
        } else {
            CheckResult::warning("role template records are missing")
                .with_details(
                    self.missing
                        .iter()
                        .map(|r| r.role_record_id())
                        .collect(),
                )
                .with_fix_hint("fix mode creates the missing role records")
        }
    }

    fn repair(&mut self, ctx: &CheckContext) -> Result<(), RepairError> {
        for role in &self.missing {
            ctx.store.create(
                &ctx.encampment_store_cwd(),
                &CreateRecord {
                    record_type: "role".to_string(),
                    id: role.role_record_id(),
                    title: format!("Role template: {role}"),
                    description: format!("Shared template record for the {role} role."),
                },
            )?;
            ctx.store
                .label_add(&ctx.encampment_store_cwd(), &role.role_record_id(), ROLE_LABEL)?;
        }
        Ok(())
    }
}

/// Role records carry the `gt:role` label so the daemon can find them.
#[derive(Default)]
struct RoleBeadLabelsCheck {
    unlabeled: Vec<String>,
}

impl Check for RoleBeadLabelsCheck {
    fn name(&self) -> &'static str {
        "role-bead-labels"
    }

    fn description(&self) -> &'static str {
        "role records carry the gt:role label"
    }

    fn category(&self) -> Category {
        Category::Config
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.unlabeled.clear();
        if !ctx.store.available() {
            return CheckResult::skipped_unavailable("rl");
        }
        let ids: Vec<String> = Role::ALL.iter().map(Role::role_record_id).collect();
        let found = match ctx.store.show(&ctx.encampment_store_cwd(), &ids) {
            Ok(found) => found,
            Err(err) => return probe_failure_result("role-bead-labels", &err),
        };
        for record in &found {
            if !record.has_label(ROLE_LABEL) {
                self.unlabeled.push(record.id.clone());
            }
        }
        if self.unlabeled.is_empty() {
            CheckResult::ok("role records are labeled")
        } else {
            CheckResult::warning("role records are missing the gt:role label")
                .with_details(self.unlabeled.clone())
                .with_fix_hint("fix mode adds the label")
        }
    }

    fn repair(&mut self, ctx: &CheckContext) -> Result<(), RepairError> {
        for id in &self.unlabeled {
            ctx.store
                .label_add(&ctx.encampment_store_cwd(), id, ROLE_LABEL)?;
        }
        Ok(())
    }
}

/// Every declared agent has its record in the right store: the
/// encampment store for warchief/shaman, the warband store otherwise.
#[derive(Default)]
struct AgentRelicsExistCheck {
    missing: Vec<(PathBuf, String, String)>, // (store cwd, record id, title)
}

impl Check for AgentRelicsExistCheck {
    fn name(&self) -> &'static str {
        "agent-relics-exist"
    }

    fn description(&self) -> &'static str {
        "every declared agent has a record in its store"
    }

    fn category(&self) -> Category {
        Category::Config
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
        let mut unroutable = Vec::new();

        for agent in declared_agents(ctx) {
            let (cwd, prefix) = if agent.role.is_encampment_scope() {
                (
                    ctx.encampment_store_cwd(),
                    horde_camp::ENCAMPMENT_RECORD_PREFIX.to_string(),
                )
            } else {
                let warband = agent.warband.clone().unwrap_or_default();
                match ctx.warband_prefix(&warband) {
                    Some(prefix) => (ctx.warband_store_cwd(&warband), prefix),
                    None => {
                        unroutable.push(warband);
                        continue;
                    }
                }
            };
            let id = agent.record_id(&prefix);
            let found = match ctx.store.show(&cwd, std::slice::from_ref(&id)) {
                Ok(found) => found,
                Err(err) => return probe_failure_result("agent-relics-exist", &err),
            };
            if !found.iter().any(|r| r.id == id) {
                details.push(format!("missing agent record {id}"));
                self.missing.push((cwd, id, agent.session_name()));
            }
        }

        unroutable.sort();
        unroutable.dedup();
        for warband in unroutable {
            details.push(format!(
                "warband '{warband}' has no prefix; cannot derive its record ids"
            ));
        }

        if details.is_empty() {
            CheckResult::ok("all declared agents have records")
        } else {
            CheckResult::warning("agent records are missing")
                .with_details(details)
                .with_fix_hint("fix mode creates the missing agent records")
        }
    }

    fn repair(&mut self, ctx: &CheckContext) -> Result<(), RepairError> {
        for (cwd, id, session) in &self.missing {
            ctx.store.create(
                cwd,
                &CreateRecord {
                    record_type: "agent".to_string(),
                    id: id.clone(),
                    title: format!("Agent: {session}"),
                    description: format!("Coordination record for session {session}."),
                },
            )?;
        }
        Ok(())
    }
}

/// Encampment-level slash commands are fully provisioned.
#[derive(Default)]
struct CommandsProvisionedCheck {
    missing: Vec<&'static str>,
}

impl Check for CommandsProvisionedCheck {
    fn name(&self) -> &'static str {
        "commands-provisioned"
    }

    fn description(&self) -> &'static str {
        "encampment slash commands are provisioned"
    }

    fn category(&self) -> Category {
        Category::Config
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.missing.clear();
        let dir = ctx.encampment().commands_dir();
        for (name, _) in COMMAND_TEMPLATES {
            if !dir.join(name).is_file() {
                self.missing.push(name);
            }
        }
        if self.missing.is_empty() {
            CheckResult::ok("slash commands are provisioned")
        } else {
            CheckResult::warning("slash commands are missing")
                .with_details(self.missing.iter().map(|n| n.to_string()).collect())
                .with_fix_hint("fix mode copies the embedded command templates")
        }
    }

    fn repair(&mut self, ctx: &CheckContext) -> Result<(), RepairError> {
        let dir = ctx.encampment().commands_dir();
        for (name, body) in COMMAND_TEMPLATES {
            let path = dir.join(name);
            if !path.is_file() {
                write_atomic(&path, body)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum SettingsIssue {
    Missing {
        identity: AgentIdentity,
        path: PathBuf,
    },
    Broken {
        identity: AgentIdentity,
        path: PathBuf,
        why: String,
    },
    WrongLocation {
        path: PathBuf,
        status: GitFileStatus,
    },
    RootPollution {
        path: PathBuf,
        dest: PathBuf,
    },
}

/// The three settings rules over every agent `settings.json`:
/// hook integrity, no root-level pollution, and witness/forge settings
/// outside the tracked clone.
#[derive(Default)]
struct ClaudeSettingsCheck {
    issues: Vec<SettingsIssue>,
}

impl ClaudeSettingsCheck {
    fn scan(&mut self, ctx: &CheckContext) {
        self.issues.clear();

        // Root-level pollution is inherited by every child directory.
        for (file, dest) in [
            (".claude/settings.json", "warchief/.claude/settings.json"),
            ("CLAUDE.md", "warchief/CLAUDE.md"),
        ] {
            let path = ctx.root.join(file);
            if path.is_file() {
                self.issues.push(SettingsIssue::RootPollution {
                    path,
                    dest: ctx.root.join(dest),
                });
            }
        }

        for agent in declared_agents(ctx) {
            let path = settings::settings_path(&agent, &ctx.root);
            let base = path
                .parent()
                .and_then(|claude_dir| claude_dir.parent())
                .map(std::path::Path::to_path_buf)
                .unwrap_or_default();
            if base.is_dir() {
                if !path.is_file() {
                    self.issues.push(SettingsIssue::Missing {
                        identity: agent.clone(),
                        path: path.clone(),
                    });
                } else {
                    match fs::read_to_string(&path)
                        .map_err(|e| e.to_string())
                        .and_then(|text| {
                            serde_json::from_str::<settings::AgentSettings>(&text)
                                .map_err(|e| format!("invalid JSON: {e}"))
                        }) {
                        Ok(parsed) => {
                            let defects = parsed.defects();
                            if !defects.is_empty() {
                                self.issues.push(SettingsIssue::Broken {
                                    identity: agent.clone(),
                                    path: path.clone(),
                                    why: defects
                                        .iter()
                                        .map(ToString::to_string)
                                        .collect::<Vec<_>>()
                                        .join(", "),
                                });
                            }
                        }
                        Err(why) => self.issues.push(SettingsIssue::Broken {
                            identity: agent.clone(),
                            path: path.clone(),
                            why,
                        }),
                    }
                }
            }

            // Witness/forge settings inside the tracked clone contaminate
            // every agent that pulls the repo.
            if let Some(wrong) = settings::wrong_location_settings_path(&agent, &ctx.root)
                && wrong.is_file()
            {
                let clone = agent.workdir(&ctx.root);
                let status = if GitCli::is_available() {
                    GitCli::new(&clone).file_status(".claude/settings.json")
                } else {
                    GitFileStatus::Unknown
                };
                self.issues.push(SettingsIssue::WrongLocation {
                    path: wrong,
                    status,
                });
            }
        }
    }
}

impl Check for ClaudeSettingsCheck {
    fn name(&self) -> &'static str {
        "claude-settings"
    }

    fn description(&self) -> &'static str {
        "agent settings files are present, well-formed, and well-placed"
    }

    fn category(&self) -> Category {
        Category::Config
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        self.scan(ctx);
        if self.issues.is_empty() {
            return CheckResult::ok("agent settings are sound");
        }
        // A missing file is auto-creatable from the template; anything
        // malformed or misplaced impairs the fleet.
        let status = if self
            .issues
            .iter()
            .all(|i| matches!(i, SettingsIssue::Missing { .. }))
        {
            CheckStatus::Warning
        } else {
            CheckStatus::Error
        };
        let details: Vec<String> = self
            .issues
            .iter()
            .map(|issue| match issue {
                SettingsIssue::Missing { path, .. } => {
                    format!("{}: missing", ctx.display_path(path))
                }
                SettingsIssue::Broken { path, why, .. } => {
                    format!("{}: {why}", ctx.display_path(path))
                }
                SettingsIssue::WrongLocation { path, status, .. } => match status {
                    GitFileStatus::TrackedModified => format!(
                        "{}: wrong location, tracked with local modifications",
                        ctx.display_path(path)
                    ),
                    _ => format!("{}: wrong location", ctx.display_path(path)),
                },
                SettingsIssue::RootPollution { path, .. } => format!(
                    "{}: pollutes every agent via directory traversal",
                    ctx.display_path(path)
                ),
            })
            .collect();
        let message = match status {
            CheckStatus::Warning => "agent settings are not yet provisioned",
            _ => "agent settings violate the hook invariants",
        };
        CheckResult {
            status,
            message: message.to_string(),
            details,
            fix_hint: Some("fix mode rewrites, relocates, or removes the offending files".to_string()),
        }
    }

    fn repair(&mut self, ctx: &CheckContext) -> Result<(), RepairError> {
        let mut failures = Vec::new();

        for issue in &self.issues {
            match issue {
                SettingsIssue::Missing { identity, path }
                | SettingsIssue::Broken { identity, path, .. } => {
                    if let Err(err) = write_atomic(path, SETTINGS_TEMPLATE) {
                        failures.push(err.to_string());
                        continue;
                    }
                    notify_stale_session(ctx, identity, &mut failures);
                }
                SettingsIssue::WrongLocation { path, status, .. } => match status {
                    GitFileStatus::TrackedModified => {
                        eprintln!(
                            "Warning: {}: has local modifications, skipping",
                            path.display()
                        );
                    }
                    // Unknown is treated as untracked for this one case:
                    // a settings file in the wrong place is horde
                    // metadata, not user work.
                    _ => {
                        if path.exists()
                            && let Err(err) = fs::remove_file(path)
                        {
                            failures.push(format!("{}: {err}", path.display()));
                        }
                    }
                },
                SettingsIssue::RootPollution { path, dest } => {
                    if dest.exists() {
                        eprintln!(
                            "Warning: {}: destination {} already exists, skipping move",
                            path.display(),
                            dest.display()
                        );
                        continue;
                    }
                    let moved = dest
                        .parent()
                        .map(fs::create_dir_all)
                        .unwrap_or(Ok(()))
                        .and_then(|()| fs::rename(path, dest));
                    if let Err(err) = moved {
                        failures.push(format!("{} -> {}: {err}", path.display(), dest.display()));
                    }
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RepairError::new(format!(
                "claude-settings: {}",
                failures.join("; ")
            )))
        }
    }
}

/// After a settings rewrite, a running session still holds the old file
/// in memory. Kill it only when the operator opted in.
fn notify_stale_session(ctx: &CheckContext, identity: &AgentIdentity, failures: &mut Vec<String>) {
    if !ctx.sessions.available() {
        return;
    }
    let session = identity.session_name();
    let running = ctx
        .sessions
        .list_sessions()
        .map(|all| all.contains(&session))
        .unwrap_or(false);
    if !running {
        return;
    }
    if ctx.restart_sessions {
        if let Err(err) = ctx.sessions.kill_session(&session) {
            failures.push(format!("restarting {session}: {err}"));
        }
    } else {
        eprintln!(
            "Warning: {session}: running agent has the old settings in memory; \
             rerun with --restart-sessions to bounce it"
        );
    }
}

/// The session hook must survive the driver boundary: wrapper script or
/// a complete `--hook` flag. Report-only; the template rewrite in
/// `claude-settings` is the fix path.
struct SessionHooksCheck;

impl Check for SessionHooksCheck {
    fn name(&self) -> &'static str {
        "session-hooks"
    }

    fn description(&self) -> &'static str {
        "session hooks pass session ids through the driver"
    }

    fn category(&self) -> Category {
        Category::Config
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        let mut details = Vec::new();
        for agent in declared_agents(ctx) {
            let path = settings::settings_path(&agent, &ctx.root);
            let Ok(text) = fs::read_to_string(&path) else {
                continue;
            };
            let Ok(parsed) = serde_json::from_str::<settings::AgentSettings>(&text) else {
                continue;
            };
            if !parsed.session_hook_passed_through() {
                details.push(format!(
                    "{}: session hook uses neither {} nor {}",
                    ctx.display_path(&path),
                    settings::SESSION_WRAPPER_SCRIPT,
                    settings::RALLY_HOOK_FLAG
                ));
            }
        }
        if details.is_empty() {
            CheckResult::ok("session hooks pass ids through")
        } else {
            CheckResult::warning("session hooks drop session ids").with_details(details)
        }
    }
}

/// A running session's environment matches what its name
/// implies, and `RELICS_DIR` is never set. Environments are baked at
/// session start, so there is nothing to fix short of a restart.
struct EnvVarsCheck;

impl Check for EnvVarsCheck {
    fn name(&self) -> &'static str {
        "env-vars"
    }

    fn description(&self) -> &'static str {
        "running sessions carry the expected environment"
    }

    fn category(&self) -> Category {
        Category::Config
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult {
        if !ctx.sessions.available() {
            return CheckResult::skipped_unavailable("tmux");
        }
        let sessions = match ctx.sessions.list_sessions() {
            Ok(sessions) => sessions,
            Err(err) => return probe_failure_result("env-vars", &err),
        };

        let mut details = Vec::new();
        for session in sessions {
            let Ok(identity) = horde_camp::parse_session_name(&session) else {
                continue;
            };
            let actual = match ctx.sessions.environment(&session) {
                Ok(env) => env,
                Err(err) => {
                    details.push(format!("{session}: {err}"));
                    continue;
                }
            };
            if actual.contains_key("RELICS_DIR") {
                details.push(format!(
                    "{session}: RELICS_DIR is set and overrides prefix routing"
                ));
            }
            for (key, expected) in identity.expected_env(&ctx.root) {
                match actual.get(&key) {
                    Some(value) if *value == expected => {}
                    Some(value) => details.push(format!(
                        "{session}: {key} is '{value}', expected '{expected}'"
                    )),
                    None => details.push(format!("{session}: {key} is unset")),
                }
            }
        }

        if details.is_empty() {
            CheckResult::ok("session environments agree with their names")
        } else {
            CheckResult::error("session environments diverge from their names")
                .with_details(details)
                .with_fix_hint("restart the affected sessions to pick up the derived environment")
        }
    }
}
