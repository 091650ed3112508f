//! End-to-end doctor runs against throwaway encampments.
//!
//! The scenarios build a synthetic encampment on disk, substitute
//! in-memory fakes for the issue store, tmux, and the process table,
//! and assert on whole detect/fix passes.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;
use std::sync::Once;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use horde_doctor::{CheckContext, CheckStatus, FixOutcome, Mode, default_registry, run};
use horde_probes::traits::{
    DaemonControl, ProbeFailure, ProbeResult, ProcessSource, RecordStore, SessionSource,
};
use horde_probes::{CreateRecord, DriverProcess, RelicRecord};

// ── harness ──

struct TempDirGuard {
    path: PathBuf,
}

impl TempDirGuard {
    fn new(prefix: &str) -> Self {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "horde-doctor-{prefix}-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&path).expect("temp dir should be created");
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// All scenarios share one global-state fixture so `global-state` stays
/// green without racing on the environment.
fn ensure_global_state() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let dir = std::env::temp_dir().join(format!("horde-global-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("global fixture dir");
        fs::write(dir.join("state.json"), "{\"version\":1}\n").expect("state fixture");
        fs::write(dir.join("hook.sh"), "# horde shell hook\n").expect("hook fixture");
        // Safety: set exactly once, before any test reads it.
        unsafe { std::env::set_var("HORDE_HOME", &dir) };
    });
}

fn write(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("fixture parents");
    }
    fs::write(path, contents).expect("fixture write");
}

/// Minimal valid encampment: config, empty registry, empty store dir.
fn fresh_encampment(prefix: &str) -> TempDirGuard {
    ensure_global_state();
    let camp = TempDirGuard::new(prefix);
    write(
        &camp.path().join("warchief/encampment.json"),
        "{\"type\":\"encampment\",\"version\":2,\"name\":\"t\"}\n",
    );
    write(
        &camp.path().join("warchief/warbands.json"),
        "{\"version\":1,\"warbands\":{}}\n",
    );
    fs::create_dir_all(camp.path().join(".relics")).expect(".relics dir");
    camp
}

fn reserved_routes_text() -> &'static str {
    "{\"prefix\":\"hq-\",\"path\":\".\"}\n{\"prefix\":\"hq-cv-\",\"path\":\".\"}\n"
}

// ── fakes ──

#[derive(Default)]
struct MockStore {
    available: bool,
    records: RefCell<BTreeMap<PathBuf, Vec<RelicRecord>>>,
    config: RefCell<BTreeMap<String, String>>,
    syncs: RefCell<Vec<(PathBuf, bool)>>,
    migrations: RefCell<Vec<PathBuf>>,
    doctor_reports: RefCell<BTreeMap<PathBuf, serde_json::Value>>,
}

impl MockStore {
    fn available() -> Self {
        Self {
            available: true,
            ..Self::default()
        }
    }

    fn unavailable() -> Self {
        Self::default()
    }
}

impl RecordStore for MockStore {
    fn available(&self) -> bool {
        self.available
    }

    fn list(
        &self,
        dir: &Path,
        record_type: &str,
        status: Option<&str>,
    ) -> ProbeResult<Vec<RelicRecord>> {
        if !self.available {
            return Err(ProbeFailure::unavailable("rl"));
        }
        Ok(self
            .records
            .borrow()
            .get(dir)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.issue_type == record_type)
                    .filter(|r| status.is_none_or(|s| r.status == s))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn show(&self, dir: &Path, ids: &[String]) -> ProbeResult<Vec<RelicRecord>> {
        if !self.available {
            return Err(ProbeFailure::unavailable("rl"));
        }
        Ok(self
            .records
            .borrow()
            .get(dir)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| ids.contains(&r.id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn create(&self, dir: &Path, record: &CreateRecord) -> ProbeResult<()> {
        self.records
            .borrow_mut()
            .entry(dir.to_path_buf())
            .or_default()
            .push(RelicRecord {
                id: record.id.clone(),
                title: record.title.clone(),
                issue_type: record.record_type.clone(),
                status: "open".to_string(),
                ..RelicRecord::default()
            });
        Ok(())
    }

    fn label_add(&self, dir: &Path, id: &str, label: &str) -> ProbeResult<()> {
        let mut records = self.records.borrow_mut();
        let records = records.entry(dir.to_path_buf()).or_default();
        match records.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                if !record.has_label(label) {
                    record.labels.push(label.to_string());
                }
                Ok(())
            }
            None => Err(ProbeFailure::Failed(format!("no such record: {id}"))),
        }
    }

    fn config_get(&self, _dir: &Path, key: &str) -> ProbeResult<Option<String>> {
        Ok(self.config.borrow().get(key).cloned())
    }

    fn config_set(&self, _dir: &Path, key: &str, value: &str) -> ProbeResult<()> {
        self.config
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn init(&self, _dir: &Path, _prefix: &str) -> ProbeResult<()> {
        Err(ProbeFailure::Failed("init not supported in fixture".into()))
    }

    fn sync(&self, dir: &Path, from_main: bool) -> ProbeResult<()> {
        self.syncs.borrow_mut().push((dir.to_path_buf(), from_main));
        Ok(())
    }

    fn migrate_update_repo_id(&self, dir: &Path) -> ProbeResult<()> {
        self.migrations.borrow_mut().push(dir.to_path_buf());
        Ok(())
    }

    fn doctor_json(&self, dir: &Path) -> ProbeResult<serde_json::Value> {
        Ok(self
            .doctor_reports
            .borrow()
            .get(dir)
            .cloned()
            .unwrap_or_else(|| serde_json::json!({})))
    }
}

#[derive(Default)]
struct MockSessions {
    available: bool,
    sessions: RefCell<Vec<String>>,
    environments: RefCell<BTreeMap<String, BTreeMap<String, String>>>,
    killed: RefCell<Vec<String>>,
}

impl MockSessions {
    fn with_sessions(names: &[&str]) -> Self {
        Self {
            available: true,
            sessions: RefCell::new(names.iter().map(|s| s.to_string()).collect()),
            ..Self::default()
        }
    }

    fn none() -> Self {
        Self::default()
    }
}

impl SessionSource for MockSessions {
    fn available(&self) -> bool {
        self.available
    }

    fn list_sessions(&self) -> ProbeResult<Vec<String>> {
        if !self.available {
            return Err(ProbeFailure::unavailable("tmux"));
        }
        Ok(self.sessions.borrow().clone())
    }

    fn environment(&self, session: &str) -> ProbeResult<BTreeMap<String, String>> {
        Ok(self
            .environments
            .borrow()
            .get(session)
            .cloned()
            .unwrap_or_default())
    }

    fn kill_session(&self, session: &str) -> ProbeResult<()> {
        self.killed.borrow_mut().push(session.to_string());
        self.sessions.borrow_mut().retain(|s| s != session);
        Ok(())
    }
}

#[derive(Default)]
struct MockProcesses;

impl ProcessSource for MockProcesses {
    fn driver_processes(&self) -> ProbeResult<Vec<DriverProcess>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct MockDaemon {
    restarts: RefCell<u32>,
}

impl DaemonControl for MockDaemon {
    fn restart(&self) -> ProbeResult<()> {
        *self.restarts.borrow_mut() += 1;
        Ok(())
    }
}

struct Fleet {
    store: Rc<MockStore>,
    sessions: Rc<MockSessions>,
    daemon: Rc<MockDaemon>,
}

fn context(camp: &TempDirGuard, store: MockStore, sessions: MockSessions) -> (CheckContext, Fleet) {
    let store = Rc::new(store);
    let sessions = Rc::new(sessions);
    let daemon = Rc::new(MockDaemon::default());
    let store_seam: Rc<dyn RecordStore> = store.clone();
    let session_seam: Rc<dyn SessionSource> = sessions.clone();
    let process_seam: Rc<dyn ProcessSource> = Rc::new(MockProcesses);
    let daemon_seam: Rc<dyn DaemonControl> = daemon.clone();
    let ctx = CheckContext::new(
        camp.path().to_path_buf(),
        store_seam,
        session_seam,
        process_seam,
        daemon_seam,
    );
    (
        ctx,
        Fleet {
            store,
            sessions,
            daemon,
        },
    )
}

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git should execute");
    assert!(
        out.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
}

fn init_repo(dir: &Path) {
    fs::create_dir_all(dir).expect("repo dir");
    git(dir, &["init", "--quiet", "--initial-branch=main"]);
    git(dir, &["config", "user.email", "doctor@horde.test"]);
    git(dir, &["config", "user.name", "Horde Doctor"]);
}

// ── scenarios ──

#[test]
fn e1_fresh_encampment_detect_then_fix() {
    let camp = fresh_encampment("e1");
    let (ctx, _) = context(&camp, MockStore::unavailable(), MockSessions::none());
    let mut registry = default_registry();

    let report = run(&mut registry, &ctx, Mode::Detect);
    assert_eq!(report.counts.errors, 0, "fresh encampment must not error");
    for name in [
        "encampment-config",
        "warbands-registry",
        "encampment-git",
        "encampment-root-branch",
        "global-state",
    ] {
        assert_eq!(
            report.entry(name).unwrap().status,
            CheckStatus::Ok,
            "core check {name} should be ok"
        );
    }
    let routes = report.entry("routes-config").unwrap();
    assert_eq!(routes.status, CheckStatus::Warning);
    assert_eq!(routes.message, "Required encampment routes are missing");

    let report = run(&mut registry, &ctx, Mode::Fix);
    let routes = report.entry("routes-config").unwrap();
    assert_eq!(routes.status, CheckStatus::Ok);
    assert_eq!(routes.fix, Some(FixOutcome::Fixed));
    let written = fs::read_to_string(camp.path().join(".relics/routes.jsonl")).unwrap();
    assert_eq!(written, reserved_routes_text());

    // The fix pass provisions everything the registry can; a fresh
    // detect comes back clean.
    let report = run(&mut registry, &ctx, Mode::Detect);
    assert_eq!(report.exit_code(), 0, "post-fix report:\n{}", report.render_text());
}

#[test]
fn e1_fix_is_idempotent_on_disk() {
    let camp = fresh_encampment("e1-idem");
    let (ctx, _) = context(&camp, MockStore::unavailable(), MockSessions::none());
    let mut registry = default_registry();

    run(&mut registry, &ctx, Mode::Fix);
    let routes_once = fs::read_to_string(camp.path().join(".relics/routes.jsonl")).unwrap();
    let settings_once =
        fs::read_to_string(camp.path().join("warchief/.claude/settings.json")).unwrap();

    run(&mut registry, &ctx, Mode::Fix);
    let routes_twice = fs::read_to_string(camp.path().join(".relics/routes.jsonl")).unwrap();
    let settings_twice =
        fs::read_to_string(camp.path().join("warchief/.claude/settings.json")).unwrap();

    assert_eq!(routes_once, routes_twice);
    assert_eq!(settings_once, settings_twice);
}

#[test]
fn e2_prefix_mismatch_follows_routes() {
    let camp = fresh_encampment("e2");
    write(
        &camp.path().join("warchief/warbands.json"),
        "{\"version\":1,\"warbands\":{\"foo\":{\"relics\":{\"prefix\":\"ga\"}}}}\n",
    );
    let routes = format!(
        "{}{}",
        "{\"prefix\":\"hd-\",\"path\":\"foo/warchief/warband\"}\n",
        reserved_routes_text()
    );
    write(&camp.path().join(".relics/routes.jsonl"), &routes);
    fs::create_dir_all(camp.path().join("foo/warchief/warband/.relics")).unwrap();

    let (ctx, _) = context(&camp, MockStore::unavailable(), MockSessions::none());
    let mut registry = default_registry();

    let report = run(&mut registry, &ctx, Mode::Detect);
    let entry = report.entry("prefix-mismatch").unwrap();
    assert_eq!(entry.status, CheckStatus::Warning);
    assert_eq!(
        entry.details,
        vec!["Warband 'foo': warbands.json says 'ga', routes.jsonl uses 'hd'".to_string()]
    );

    let report = run(&mut registry, &ctx, Mode::Fix);
    let entry = report.entry("prefix-mismatch").unwrap();
    assert_eq!(entry.status, CheckStatus::Ok);
    assert_eq!(entry.fix, Some(FixOutcome::Fixed));

    let registry_text = fs::read_to_string(camp.path().join("warchief/warbands.json")).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&registry_text).unwrap();
    assert_eq!(
        parsed["warbands"]["foo"]["relics"]["prefix"],
        serde_json::json!("hd")
    );
}

#[test]
fn e3_orphan_sessions_detected_and_clan_protected() {
    let camp = fresh_encampment("e3");
    fs::create_dir_all(camp.path().join("horde/clan")).unwrap();
    fs::create_dir_all(camp.path().join("relics/clan")).unwrap();

    let sessions = MockSessions::with_sessions(&[
        "hd-horde-witness",
        "hd-horde-raider1",
        "hd-relics-forge",
        "hd-unknown-witness",
        "hd-missing-clan-joe",
        "hd-horde-clan-joe",
        "random-session",
    ]);
    let (ctx, fleet) = context(&camp, MockStore::unavailable(), sessions);
    let mut registry = default_registry();

    let report = run(&mut registry, &ctx, Mode::Detect);
    let entry = report.entry("orphan-sessions").unwrap();
    assert_eq!(entry.status, CheckStatus::Warning);
    assert_eq!(
        entry.details,
        vec![
            "hd-unknown-witness".to_string(),
            "hd-missing-clan-joe".to_string(),
        ]
    );

    run(&mut registry, &ctx, Mode::Fix);
    let killed = fleet.sessions.killed.borrow();
    assert_eq!(*killed, vec!["hd-unknown-witness".to_string()]);
    assert!(
        !killed.iter().any(|s| s.contains("-clan-")),
        "clan sessions are never auto-killed"
    );
}

#[test]
fn e4_tracked_modified_settings_survive_fix() {
    if !git_available() {
        return;
    }
    let camp = fresh_encampment("e4");
    let clone = camp.path().join("wb/witness/warband");
    init_repo(&clone);
    write(
        &clone.join(".claude/settings.json"),
        "{\"enabledPlugins\":[]}\n",
    );
    git(&clone, &["add", ".claude/settings.json"]);
    git(&clone, &["commit", "--quiet", "-m", "seed settings"]);
    let modified = "{\"enabledPlugins\":[\"local-change\"]}\n";
    write(&clone.join(".claude/settings.json"), modified);

    let (ctx, _) = context(&camp, MockStore::unavailable(), MockSessions::none());
    let mut registry = default_registry();

    let report = run(&mut registry, &ctx, Mode::Detect);
    let entry = report.entry("claude-settings").unwrap();
    assert_eq!(entry.status, CheckStatus::Error);
    assert!(
        entry
            .details
            .iter()
            .any(|d| d.ends_with("wrong location, tracked with local modifications")),
        "details: {:?}",
        entry.details
    );

    run(&mut registry, &ctx, Mode::Fix);
    let still_there = fs::read_to_string(clone.join(".claude/settings.json")).unwrap();
    assert_eq!(still_there, modified, "tracked-modified files are never clobbered");
}

#[test]
fn e5_stale_database_is_deleted_and_resynced() {
    let camp = fresh_encampment("e5");
    write(&camp.path().join(".relics/routes.jsonl"), reserved_routes_text());
    write(&camp.path().join(".relics/issues.jsonl"), "{\"id\":\"hq-1\"}\n");
    fs::write(camp.path().join(".relics/issues.db"), b"").unwrap();

    let (ctx, fleet) = context(&camp, MockStore::available(), MockSessions::none());
    let mut registry = default_registry();

    let report = run(&mut registry, &ctx, Mode::Detect);
    assert_eq!(
        report.entry("relics-database").unwrap().status,
        CheckStatus::Error
    );

    let report = run(&mut registry, &ctx, Mode::Fix);
    let entry = report.entry("relics-database").unwrap();
    assert_eq!(entry.status, CheckStatus::Ok);
    assert_eq!(entry.fix, Some(FixOutcome::Fixed));
    assert!(!camp.path().join(".relics/issues.db").exists());
    assert_eq!(
        *fleet.store.syncs.borrow(),
        vec![(camp.path().to_path_buf(), true)]
    );
}

#[test]
fn e6_conflicting_local_relics_become_a_redirect() {
    let camp = fresh_encampment("e6");
    fs::create_dir_all(camp.path().join("foo/clan")).unwrap();
    write(
        &camp.path().join("foo/warchief/warband/.relics/issues.jsonl"),
        "{\"id\":\"hd-1\"}\n",
    );
    write(&camp.path().join("foo/.relics/issues.jsonl"), "{\"id\":\"hd-2\"}\n");

    let (ctx, _) = context(&camp, MockStore::unavailable(), MockSessions::none());
    let mut registry = default_registry();

    let report = run(&mut registry, &ctx, Mode::Detect);
    let entry = report.entry("relics-redirect").unwrap();
    assert_eq!(entry.status, CheckStatus::Error);
    assert_eq!(entry.message, "Conflicting local relics");

    let report = run(&mut registry, &ctx, Mode::Fix);
    let entry = report.entry("relics-redirect").unwrap();
    assert_eq!(entry.status, CheckStatus::Ok);
    assert_eq!(entry.fix, Some(FixOutcome::Fixed));

    let relics = camp.path().join("foo/.relics");
    let entries: Vec<String> = fs::read_dir(&relics)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(entries, vec!["redirect".to_string()]);
    assert_eq!(
        fs::read_to_string(relics.join("redirect")).unwrap(),
        "warchief/warband/.relics\n"
    );
}

#[test]
fn route_regeneration_appends_reserved_routes_last() {
    let camp = fresh_encampment("routes");
    let original = "{\"prefix\":\"zz-\",\"path\":\"bar/warchief/warband\"}\n";
    write(&camp.path().join(".relics/routes.jsonl"), original);

    let (ctx, _) = context(&camp, MockStore::unavailable(), MockSessions::none());
    let mut registry = default_registry();

    run(&mut registry, &ctx, Mode::Fix);
    let expected = format!("{original}{}", reserved_routes_text());
    let written = fs::read_to_string(camp.path().join(".relics/routes.jsonl")).unwrap();
    assert_eq!(written, expected, "originals first, hq- then hq-cv- last");

    // A second pass must not duplicate anything.
    run(&mut registry, &ctx, Mode::Fix);
    let written = fs::read_to_string(camp.path().join(".relics/routes.jsonl")).unwrap();
    assert_eq!(written, expected);
}

#[test]
fn dry_run_never_mutates() {
    let camp = fresh_encampment("dry");
    let (ctx, _) = context(&camp, MockStore::unavailable(), MockSessions::none());
    let mut registry = default_registry();

    let report = run(&mut registry, &ctx, Mode::DryRun);
    let routes = report.entry("routes-config").unwrap();
    assert_eq!(routes.status, CheckStatus::Warning);
    assert_eq!(routes.fix, Some(FixOutcome::WouldFix));
    assert!(!camp.path().join(".relics/routes.jsonl").exists());
    assert!(!camp.path().join("warchief/.claude/settings.json").exists());
}

#[test]
fn record_templates_are_created_and_labeled() {
    let camp = fresh_encampment("records");
    write(&camp.path().join(".relics/routes.jsonl"), reserved_routes_text());

    let (ctx, fleet) = context(&camp, MockStore::available(), MockSessions::none());
    let mut registry = default_registry();

    let report = run(&mut registry, &ctx, Mode::Fix);
    for name in ["role-relics-exist", "agent-relics-exist", "relics-custom-types"] {
        let entry = report.entry(name).unwrap();
        assert_eq!(entry.status, CheckStatus::Ok, "{name} should settle");
    }

    let records = fleet.store.records.borrow();
    let camp_records = records.get(camp.path()).expect("encampment records");
    let roles: Vec<&RelicRecord> = camp_records
        .iter()
        .filter(|r| r.issue_type == "role")
        .collect();
    assert_eq!(roles.len(), 6);
    assert!(roles.iter().all(|r| r.has_label("gt:role")));
    assert!(camp_records.iter().any(|r| r.id == "hq-agent-warchief"));
    assert!(camp_records.iter().any(|r| r.id == "hq-agent-shaman"));
    assert_eq!(
        fleet.store.config.borrow().get("types.custom").map(String::as_str),
        Some("agent,role,warband,raid,slot,queue")
    );
}

#[test]
fn repo_fingerprint_migrates_and_restarts_the_daemon() {
    if !git_available() {
        return;
    }
    let camp = fresh_encampment("fingerprint");
    fs::create_dir_all(camp.path().join("foo/clan")).unwrap();
    write(
        &camp.path().join(".relics/routes.jsonl"),
        &format!(
            "{}{}",
            "{\"prefix\":\"hd-\",\"path\":\"foo/warchief/warband\"}\n",
            reserved_routes_text()
        ),
    );
    let clone = camp.path().join("foo/warchief/warband");
    init_repo(&clone);
    write(&clone.join("README.md"), "seed\n");
    git(&clone, &["add", "README.md"]);
    git(&clone, &["commit", "--quiet", "-m", "seed"]);
    fs::create_dir_all(clone.join(".relics")).unwrap();

    let store = MockStore::available();
    store.doctor_reports.borrow_mut().insert(
        camp.path().join("foo/warchief/warband"),
        serde_json::json!({"repo_id": "stale"}),
    );
    let (ctx, fleet) = context(&camp, store, MockSessions::none());
    let mut registry = default_registry();

    let report = run(&mut registry, &ctx, Mode::Detect);
    assert_eq!(
        report.entry("repo-fingerprint").unwrap().status,
        CheckStatus::Error
    );

    run(&mut registry, &ctx, Mode::Fix);
    assert_eq!(
        *fleet.store.migrations.borrow(),
        vec![camp.path().join("foo/warchief/warband")]
    );
    assert_eq!(*fleet.daemon.restarts.borrow(), 1);
}

#[test]
fn report_rendering_is_stable() {
    let camp = fresh_encampment("render");
    let (ctx, _) = context(&camp, MockStore::unavailable(), MockSessions::none());
    let mut registry = default_registry();
    run(&mut registry, &ctx, Mode::Fix);
    let report = run(&mut registry, &ctx, Mode::Detect);
    insta::assert_snapshot!(report.summary_line(), @"48 ok, 0 warnings, 0 errors");
}

/// Scout queries use the relics timeout budget; spot-check the default
/// the probes crate exposes for TUIs and checks alike.
#[test]
fn store_query_budget_is_five_seconds() {
    assert_eq!(
        horde_probes::relics::DEFAULT_RELICS_TIMEOUT,
        Duration::from_secs(5)
    );
}
