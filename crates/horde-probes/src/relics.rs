//! Client for the external issue store CLI (`rl`).
//!
//! Every method takes the store working directory explicitly: `rl`
//! resolves which database it addresses from its cwd and the encampment
//! routing table, so the doctor must be precise about where it runs.
//!
//! `rl` stdout may carry informational `Note:` lines ahead of the payload
//! (both for `config get` and, defensively, for `--json` output); they
//! are filtered before parsing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::exec::{CommandOutput, ExecError, probe_version, run_command};

/// Default budget for issue-store queries.
pub const DEFAULT_RELICS_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from interacting with the issue store.
#[derive(Debug, thiserror::Error)]
pub enum RelicsError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("rl {args} failed: {message}")]
    CommandFailed { args: String, message: String },

    #[error("unable to parse rl output: {0}")]
    Parse(String),
}

/// A record as the store reports it. The doctor cares about existence,
/// labels, and a handful of typed fields; everything else rides along.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelicRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub issue_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub assignee: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl RelicRecord {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// Arguments for `rl create`.
#[derive(Debug, Clone)]
pub struct CreateRecord {
    pub record_type: String,
    pub id: String,
    pub title: String,
    pub description: String,
}

/// Drop informational `Note:` lines, returning the remaining payload.
pub fn strip_notes(stdout: &str) -> String {
    stdout
        .lines()
        .filter(|line| !line.trim_start().starts_with("Note:"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Thin client around the `rl` CLI.
#[derive(Debug, Clone)]
pub struct RelicsCli {
    timeout: Duration,
}

impl Default for RelicsCli {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_RELICS_TIMEOUT,
        }
    }
}

impl RelicsCli {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Returns true if `rl` is available in PATH.
    pub fn is_available() -> bool {
        probe_version("rl", &["--version"])
    }

    fn run(&self, dir: &Path, args: &[&str]) -> Result<CommandOutput, RelicsError> {
        let output = run_command("rl", args, Some(dir), self.timeout)?;
        if !output.success() {
            return Err(RelicsError::CommandFailed {
                args: args.join(" "),
                message: first_error_line(&output),
            });
        }
        Ok(output)
    }

    fn parse_records(&self, stdout: &str) -> Result<Vec<RelicRecord>, RelicsError> {
        let payload = strip_notes(stdout);
        let payload = payload.trim();
        if payload.is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(payload).map_err(|e| RelicsError::Parse(e.to_string()))
    }

    /// `rl list --type=<t> [--status=<s>] --json`
    pub fn list(
        &self,
        dir: &Path,
        record_type: &str,
        status: Option<&str>,
    ) -> Result<Vec<RelicRecord>, RelicsError> {
        let type_arg = format!("--type={record_type}");
        let mut args = vec!["list", type_arg.as_str()];
        let status_arg = status.map(|s| format!("--status={s}"));
        if let Some(status_arg) = &status_arg {
            args.push(status_arg.as_str());
        }
        args.push("--json");
        let output = self.run(dir, &args)?;
        self.parse_records(&output.stdout)
    }

    /// `rl show <id>... --json` — absent ids are simply not returned.
    pub fn show(&self, dir: &Path, ids: &[String]) -> Result<Vec<RelicRecord>, RelicsError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut args = vec!["show"];
        args.extend(ids.iter().map(String::as_str));
        args.push("--json");
        match self.run(dir, &args) {
            Ok(output) => self.parse_records(&output.stdout),
            // A show over only-missing ids exits non-zero; report none.
            Err(RelicsError::CommandFailed { .. }) => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    /// `rl create --type=<t> --id=<id> --title=<t> --description=<d>`
    pub fn create(&self, dir: &Path, record: &CreateRecord) -> Result<(), RelicsError> {
        let type_arg = format!("--type={}", record.record_type);
        let id_arg = format!("--id={}", record.id);
        let title_arg = format!("--title={}", record.title);
        let description_arg = format!("--description={}", record.description);
        self.run(
            dir,
            &[
                "create",
                type_arg.as_str(),
                id_arg.as_str(),
                title_arg.as_str(),
                description_arg.as_str(),
            ],
        )?;
        Ok(())
    }

    /// `rl label add <id> <label>`
    pub fn label_add(&self, dir: &Path, id: &str, label: &str) -> Result<(), RelicsError> {
        self.run(dir, &["label", "add", id, label])?;
        Ok(())
    }

    /// `rl config get <key>` — `Note:` lines are filtered; an unset key
    /// reads as `None`.
    pub fn config_get(&self, dir: &Path, key: &str) -> Result<Option<String>, RelicsError> {
        let output = match self.run(dir, &["config", "get", key]) {
            Ok(output) => output,
            Err(RelicsError::CommandFailed { .. }) => return Ok(None),
            Err(err) => return Err(err),
        };
        let payload = strip_notes(&output.stdout);
        Ok(payload
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string))
    }

    /// `rl config set <key> <value>`
    pub fn config_set(&self, dir: &Path, key: &str, value: &str) -> Result<(), RelicsError> {
        self.run(dir, &["config", "set", key, value])?;
        Ok(())
    }

    /// `rl init --prefix <p>`
    pub fn init(&self, dir: &Path, prefix: &str) -> Result<(), RelicsError> {
        self.run(dir, &["init", "--prefix", prefix])?;
        Ok(())
    }

    /// `rl sync [--from-main]`
    pub fn sync(&self, dir: &Path, from_main: bool) -> Result<(), RelicsError> {
        let mut args = vec!["sync"];
        if from_main {
            args.push("--from-main");
        }
        self.run(dir, &args)?;
        Ok(())
    }

    /// `rl migrate --update-repo-id`
    pub fn migrate_update_repo_id(&self, dir: &Path) -> Result<(), RelicsError> {
        self.run(dir, &["migrate", "--update-repo-id"])?;
        Ok(())
    }

    /// `rl doctor --json`
    pub fn doctor_json(&self, dir: &Path) -> Result<serde_json::Value, RelicsError> {
        let output = self.run(dir, &["doctor", "--json"])?;
        let payload = strip_notes(&output.stdout);
        serde_json::from_str(payload.trim()).map_err(|e| RelicsError::Parse(e.to_string()))
    }
}

fn first_error_line(output: &CommandOutput) -> String {
    output
        .stderr
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .or_else(|| {
            output
                .stdout
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
        })
        .unwrap_or("no output")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notes_are_filtered_before_the_value_line() {
        let stdout = "Note: store migrated to v3\nNote: run rl sync\nagent,role,warband\n";
        let payload = strip_notes(stdout);
        assert_eq!(payload.trim(), "agent,role,warband");
    }

    #[test]
    fn record_parsing_tolerates_sparse_fields() {
        let record: RelicRecord =
            serde_json::from_str(r#"{"id":"hd-agent-witness","labels":["gt:role"]}"#).unwrap();
        assert_eq!(record.id, "hd-agent-witness");
        assert!(record.has_label("gt:role"));
        assert!(record.updated_at.is_none());
    }

    #[test]
    fn record_parsing_keeps_unknown_fields() {
        let record: RelicRecord = serde_json::from_str(
            r#"{"id":"x","status":"open","pinned":true,"updated_at":"2026-08-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(record.status, "open");
        assert!(record.extra.contains_key("pinned"));
        assert!(record.updated_at.is_some());
    }
}
