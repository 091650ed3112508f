//! Substitution seams between the doctor and the outside world.
//!
//! Checks consume these traits instead of the concrete clients, so tests
//! can run whole doctor passes against deterministic in-memory fakes.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::exec::{ExecError, run_command};
use crate::gh::GhError;
use crate::git::GitError;
use crate::process::{DriverProcess, PsProcesses};
use crate::relics::{CreateRecord, RelicRecord, RelicsCli, RelicsError};
use crate::tmux::{TmuxCli, TmuxError};

/// Probe failure, split by whether the tool exists at all.
///
/// Checks map `Unavailable` to a graceful skip and `Failed` to a
/// warning; repairs propagate both.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProbeFailure {
    #[error("{tool} is not installed")]
    Unavailable { tool: String },

    #[error("{0}")]
    Failed(String),
}

pub type ProbeResult<T> = Result<T, ProbeFailure>;

impl ProbeFailure {
    pub fn unavailable(tool: &str) -> Self {
        Self::Unavailable {
            tool: tool.to_string(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, ProbeFailure::Unavailable { .. })
    }
}

fn from_exec(tool: &str, err: ExecError) -> ProbeFailure {
    if err.is_unavailable() {
        ProbeFailure::unavailable(tool)
    } else {
        ProbeFailure::Failed(err.to_string())
    }
}

impl From<TmuxError> for ProbeFailure {
    fn from(err: TmuxError) -> Self {
        match err {
            TmuxError::Exec(e) => from_exec("tmux", e),
            other => ProbeFailure::Failed(other.to_string()),
        }
    }
}

impl From<RelicsError> for ProbeFailure {
    fn from(err: RelicsError) -> Self {
        match err {
            RelicsError::Exec(e) => from_exec("rl", e),
            other => ProbeFailure::Failed(other.to_string()),
        }
    }
}

impl From<GitError> for ProbeFailure {
    fn from(err: GitError) -> Self {
        match err {
            GitError::Exec(e) => from_exec("git", e),
            other => ProbeFailure::Failed(other.to_string()),
        }
    }
}

impl From<GhError> for ProbeFailure {
    fn from(err: GhError) -> Self {
        match err {
            GhError::Exec(e) => from_exec("gh", e),
            other => ProbeFailure::Failed(other.to_string()),
        }
    }
}

/// Live terminal sessions and their environments.
pub trait SessionSource {
    fn available(&self) -> bool;
    fn list_sessions(&self) -> ProbeResult<Vec<String>>;
    fn environment(&self, session: &str) -> ProbeResult<BTreeMap<String, String>>;
    fn kill_session(&self, session: &str) -> ProbeResult<()>;
}

impl SessionSource for TmuxCli {
    fn available(&self) -> bool {
        TmuxCli::is_available()
    }

    fn list_sessions(&self) -> ProbeResult<Vec<String>> {
        Ok(TmuxCli::list_sessions(self)?)
    }

    fn environment(&self, session: &str) -> ProbeResult<BTreeMap<String, String>> {
        Ok(TmuxCli::show_environment(self, session)?)
    }

    fn kill_session(&self, session: &str) -> ProbeResult<()> {
        Ok(TmuxCli::kill_session(self, session)?)
    }
}

/// The issue-store surface the doctor uses, scoped per call to a store
/// working directory.
pub trait RecordStore {
    fn available(&self) -> bool;
    fn list(
        &self,
        dir: &Path,
        record_type: &str,
        status: Option<&str>,
    ) -> ProbeResult<Vec<RelicRecord>>;
    fn show(&self, dir: &Path, ids: &[String]) -> ProbeResult<Vec<RelicRecord>>;
    fn create(&self, dir: &Path, record: &CreateRecord) -> ProbeResult<()>;
    fn label_add(&self, dir: &Path, id: &str, label: &str) -> ProbeResult<()>;
    fn config_get(&self, dir: &Path, key: &str) -> ProbeResult<Option<String>>;
    fn config_set(&self, dir: &Path, key: &str, value: &str) -> ProbeResult<()>;
    fn init(&self, dir: &Path, prefix: &str) -> ProbeResult<()>;
    fn sync(&self, dir: &Path, from_main: bool) -> ProbeResult<()>;
    fn migrate_update_repo_id(&self, dir: &Path) -> ProbeResult<()>;
    fn doctor_json(&self, dir: &Path) -> ProbeResult<serde_json::Value>;
}

impl RecordStore for RelicsCli {
    fn available(&self) -> bool {
        RelicsCli::is_available()
    }

    fn list(
        &self,
        dir: &Path,
        record_type: &str,
        status: Option<&str>,
    ) -> ProbeResult<Vec<RelicRecord>> {
        Ok(RelicsCli::list(self, dir, record_type, status)?)
    }

    fn show(&self, dir: &Path, ids: &[String]) -> ProbeResult<Vec<RelicRecord>> {
        Ok(RelicsCli::show(self, dir, ids)?)
    }

    fn create(&self, dir: &Path, record: &CreateRecord) -> ProbeResult<()> {
        Ok(RelicsCli::create(self, dir, record)?)
    }

    fn label_add(&self, dir: &Path, id: &str, label: &str) -> ProbeResult<()> {
        Ok(RelicsCli::label_add(self, dir, id, label)?)
    }

    fn config_get(&self, dir: &Path, key: &str) -> ProbeResult<Option<String>> {
        Ok(RelicsCli::config_get(self, dir, key)?)
    }

    fn config_set(&self, dir: &Path, key: &str, value: &str) -> ProbeResult<()> {
        Ok(RelicsCli::config_set(self, dir, key, value)?)
    }

    fn init(&self, dir: &Path, prefix: &str) -> ProbeResult<()> {
        Ok(RelicsCli::init(self, dir, prefix)?)
    }

    fn sync(&self, dir: &Path, from_main: bool) -> ProbeResult<()> {
        Ok(RelicsCli::sync(self, dir, from_main)?)
    }

    fn migrate_update_repo_id(&self, dir: &Path) -> ProbeResult<()> {
        Ok(RelicsCli::migrate_update_repo_id(self, dir)?)
    }

    fn doctor_json(&self, dir: &Path) -> ProbeResult<serde_json::Value> {
        Ok(RelicsCli::doctor_json(self, dir)?)
    }
}

/// Driver processes on the host.
pub trait ProcessSource {
    fn driver_processes(&self) -> ProbeResult<Vec<DriverProcess>>;
}

impl ProcessSource for PsProcesses {
    fn driver_processes(&self) -> ProbeResult<Vec<DriverProcess>> {
        self.list().map_err(|e| from_exec("ps", e))
    }
}

/// The operational CLI surface used to bounce the daemon after a store
/// migration.
pub trait DaemonControl {
    fn restart(&self) -> ProbeResult<()>;
}

/// Restarts the daemon through `hd daemon restart`.
#[derive(Debug, Clone, Default)]
pub struct HdDaemonControl;

impl DaemonControl for HdDaemonControl {
    fn restart(&self) -> ProbeResult<()> {
        let output = run_command(
            "hd",
            &["daemon", "restart"],
            None,
            Duration::from_secs(30),
        )
        .map_err(|e| from_exec("hd", e))?;
        if output.success() {
            Ok(())
        } else {
            Err(ProbeFailure::Failed(format!(
                "hd daemon restart failed: {}",
                output.stderr.trim()
            )))
        }
    }
}
