//! Client for the terminal multiplexer.
//!
//! An absent tmux server is an ordinary state (no agents running), not an
//! error: `list_sessions` reports it as an empty list.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::exec::{CommandOutput, ExecError, probe_version, run_command};

const DEFAULT_TMUX_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from interacting with tmux.
#[derive(Debug, thiserror::Error)]
pub enum TmuxError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("tmux {args} failed: {message}")]
    CommandFailed { args: String, message: String },
}

/// Thin client around the `tmux` CLI.
#[derive(Debug, Clone)]
pub struct TmuxCli {
    timeout: Duration,
}

impl Default for TmuxCli {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TMUX_TIMEOUT,
        }
    }
}

impl TmuxCli {
    pub fn is_available() -> bool {
        probe_version("tmux", &["-V"])
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput, TmuxError> {
        let output = run_command("tmux", args, None, self.timeout)?;
        if !output.success() {
            return Err(TmuxError::CommandFailed {
                args: args.join(" "),
                message: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Names of all sessions; an absent server reads as none.
    pub fn list_sessions(&self) -> Result<Vec<String>, TmuxError> {
        match self.run(&["list-sessions", "-F", "#{session_name}"]) {
            Ok(output) => Ok(output
                .stdout_lines()
                .into_iter()
                .map(str::to_string)
                .collect()),
            Err(TmuxError::CommandFailed { message, .. })
                if message.contains("no server running")
                    || message.contains("No such file or directory") =>
            {
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    pub fn has_session(&self, session: &str) -> Result<bool, TmuxError> {
        let output = run_command(
            "tmux",
            &["has-session", "-t", session],
            None,
            self.timeout,
        )
        .map_err(TmuxError::from)?;
        Ok(output.success())
    }

    pub fn kill_session(&self, session: &str) -> Result<(), TmuxError> {
        self.run(&["kill-session", "-t", session])?;
        Ok(())
    }

    /// Session environment as a map. Lines starting with `-` mark
    /// variables removed from the session and are skipped.
    pub fn show_environment(&self, session: &str) -> Result<BTreeMap<String, String>, TmuxError> {
        let output = self.run(&["show-environment", "-t", session])?;
        Ok(parse_environment(&output.stdout))
    }

    /// `tmux capture-pane -p -J -t <session>`
    pub fn capture_pane(&self, session: &str) -> Result<String, TmuxError> {
        let output = self.run(&["capture-pane", "-p", "-J", "-t", session])?;
        Ok(output.stdout)
    }
}

fn parse_environment(stdout: &str) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    for line in stdout.lines() {
        if line.starts_with('-') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            env.insert(key.to_string(), value.to_string());
        }
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parse_skips_removal_markers() {
        let stdout = "HORDE_ROLE=witness\n-RELICS_DIR\nHORDE_WARBAND=foo\nnoequals\n";
        let env = parse_environment(stdout);
        assert_eq!(env.get("HORDE_ROLE").map(String::as_str), Some("witness"));
        assert_eq!(env.get("HORDE_WARBAND").map(String::as_str), Some("foo"));
        assert!(!env.contains_key("-RELICS_DIR"));
        assert_eq!(env.len(), 2);
    }
}
