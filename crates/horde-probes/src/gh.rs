//! Client for the platform CLI (`gh`).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::exec::{ExecError, probe_version, run_command};

const DEFAULT_GH_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from running gh.
#[derive(Debug, thiserror::Error)]
pub enum GhError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("gh {args} failed: {message}")]
    CommandFailed { args: String, message: String },

    #[error("unable to parse gh output: {0}")]
    Parse(String),
}

/// One open pull request, as reported by `gh pr list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub mergeable: String,
    #[serde(default)]
    pub status_check_rollup: serde_json::Value,
}

/// Thin client around the `gh` CLI.
#[derive(Debug, Clone)]
pub struct GhCli {
    timeout: Duration,
}

impl Default for GhCli {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_GH_TIMEOUT,
        }
    }
}

impl GhCli {
    pub fn is_available() -> bool {
        probe_version("gh", &["--version"])
    }

    /// `gh pr list --repo <r> --state open --json ...`
    pub fn pr_list(&self, repo: &str) -> Result<Vec<PullRequest>, GhError> {
        let args = [
            "pr",
            "list",
            "--repo",
            repo,
            "--state",
            "open",
            "--json",
            "number,title,url,mergeable,statusCheckRollup",
        ];
        let output = run_command("gh", &args, None, self.timeout)?;
        if !output.success() {
            return Err(GhError::CommandFailed {
                args: args.join(" "),
                message: output.stderr.trim().to_string(),
            });
        }
        serde_json::from_str(output.stdout.trim()).map_err(|e| GhError::Parse(e.to_string()))
    }
}

/// Extract `owner/name` from an HTTPS or SSH GitHub remote URL.
pub fn github_repo_slug(url: &str) -> Option<String> {
    let trimmed = url.trim().trim_end_matches(".git");
    let rest = trimmed
        .strip_prefix("https://github.com/")
        .or_else(|| trimmed.strip_prefix("git@github.com:"))
        .or_else(|| trimmed.strip_prefix("ssh://git@github.com/"))?;
    let mut parts = rest.splitn(2, '/');
    let owner = parts.next()?;
    let name = parts.next()?;
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some(format!("{owner}/{name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_extraction_covers_both_remote_forms() {
        assert_eq!(
            github_repo_slug("https://github.com/horde/warband.git").as_deref(),
            Some("horde/warband")
        );
        assert_eq!(
            github_repo_slug("git@github.com:horde/warband").as_deref(),
            Some("horde/warband")
        );
        assert_eq!(github_repo_slug("https://gitlab.com/x/y"), None);
    }

    #[test]
    fn pull_request_parsing_accepts_the_json_fields() {
        let prs: Vec<PullRequest> = serde_json::from_str(
            r#"[{"number":7,"title":"t","url":"u","mergeable":"MERGEABLE","statusCheckRollup":[]}]"#,
        )
        .unwrap();
        assert_eq!(prs[0].number, 7);
        assert_eq!(prs[0].mergeable, "MERGEABLE");
    }
}
