//! The immutable context handed to every check.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use horde_camp::{Encampment, Warband, WarbandsRegistry, list_warbands, routes};
use horde_probes::{
    DaemonControl, HdDaemonControl, ProcessSource, PsProcesses, RecordStore, RelicsCli,
    SessionSource, TmuxCli,
};

/// Everything a check may consult: the encampment root, the optional
/// warband filter, run flags, a deterministic clock, a cancellation
/// flag, and the substitution seams to the outside world.
#[derive(Clone)]
pub struct CheckContext {
    pub root: PathBuf,
    pub warband: Option<String>,
    pub dry_run: bool,
    pub restart_sessions: bool,
    pub now: DateTime<Utc>,
    pub cancel: Arc<AtomicBool>,
    pub store: Rc<dyn RecordStore>,
    pub sessions: Rc<dyn SessionSource>,
    pub processes: Rc<dyn ProcessSource>,
    pub daemon: Rc<dyn DaemonControl>,
}

impl CheckContext {
    pub fn new(
        root: impl Into<PathBuf>,
        store: Rc<dyn RecordStore>,
        sessions: Rc<dyn SessionSource>,
        processes: Rc<dyn ProcessSource>,
        daemon: Rc<dyn DaemonControl>,
    ) -> Self {
        Self {
            root: root.into(),
            warband: None,
            dry_run: false,
            restart_sessions: false,
            now: Utc::now(),
            cancel: Arc::new(AtomicBool::new(false)),
            store,
            sessions,
            processes,
            daemon,
        }
    }

    /// Production wiring: the real CLIs.
    pub fn production(root: impl Into<PathBuf>) -> Self {
        Self::new(
            root,
            Rc::new(RelicsCli::default()),
            Rc::new(TmuxCli::default()),
            Rc::new(PsProcesses),
            Rc::new(HdDaemonControl),
        )
    }

    pub fn with_warband(mut self, warband: Option<String>) -> Self {
        self.warband = warband;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_restart_sessions(mut self, restart_sessions: bool) -> Self {
        self.restart_sessions = restart_sessions;
        self
    }

    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn encampment(&self) -> Encampment {
        Encampment::new(&self.root)
    }

    /// The registry, when present and parseable. Checks that care about
    /// the difference load it themselves.
    pub fn registry(&self) -> Option<WarbandsRegistry> {
        WarbandsRegistry::load(self.encampment().warbands_path()).ok()
    }

    /// Warbands in scope for this run, honoring the `--warband` filter.
    pub fn warbands(&self) -> Vec<String> {
        let registry = self.registry();
        let mut names = list_warbands(&self.root, registry.as_ref());
        if let Some(filter) = &self.warband {
            names.retain(|n| n == filter);
        }
        names
    }

    pub fn warband_handle(&self, name: &str) -> Warband {
        Warband::new(&self.root, name)
    }

    /// Bare record prefix for a warband: routes.jsonl is authoritative,
    /// the registry is the fallback.
    pub fn warband_prefix(&self, name: &str) -> Option<String> {
        let routes = routes::read_routes(self.encampment().routes_path()).unwrap_or_default();
        if let Some(route) = routes::route_for_warband(&routes, name) {
            return Some(route.prefix.trim_end_matches('-').to_string());
        }
        self.registry()
            .as_ref()
            .and_then(|r| r.prefix_of(name).map(str::to_string))
    }

    /// Working directory for issue-store commands addressing the
    /// encampment store.
    pub fn encampment_store_cwd(&self) -> PathBuf {
        self.root.clone()
    }

    /// Working directory for issue-store commands addressing a warband
    /// store: the canonical clone the routes table points at.
    pub fn warband_store_cwd(&self, name: &str) -> PathBuf {
        self.root.join(routes::warband_route_path(name))
    }

    /// Render a path relative to the encampment root where possible.
    pub fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}
