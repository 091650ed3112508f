//! Driver-process listing for the orphan-process check.

use std::time::Duration;

use crate::exec::{ExecError, run_command};

const DEFAULT_PS_TIMEOUT: Duration = Duration::from_secs(5);

/// Name of the external agent driver binary.
pub const DRIVER_BINARY: &str = "claude";

/// One running driver process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverProcess {
    pub pid: u32,
    pub tty: String,
    pub command: String,
}

impl DriverProcess {
    /// A driver with no controlling terminal runs outside any tmux pane.
    pub fn is_detached(&self) -> bool {
        self.tty == "?"
    }
}

/// `ps`-backed process listing.
#[derive(Debug, Clone, Default)]
pub struct PsProcesses;

impl PsProcesses {
    /// All driver processes, parsed from `ps -eo pid=,tty=,args=`.
    pub fn list(&self) -> Result<Vec<DriverProcess>, ExecError> {
        let output = run_command(
            "ps",
            &["-eo", "pid=,tty=,args="],
            None,
            DEFAULT_PS_TIMEOUT,
        )?;
        Ok(parse_ps(&output.stdout))
    }
}

fn parse_ps(stdout: &str) -> Vec<DriverProcess> {
    let mut drivers = Vec::new();
    for line in stdout.lines() {
        let mut parts = line.split_whitespace();
        let (Some(pid), Some(tty)) = (parts.next(), parts.next()) else {
            continue;
        };
        let command = parts.collect::<Vec<_>>().join(" ");
        let binary = command.split_whitespace().next().unwrap_or_default();
        let is_driver = binary == DRIVER_BINARY
            || binary.ends_with(&format!("/{DRIVER_BINARY}"));
        if !is_driver {
            continue;
        }
        if let Ok(pid) = pid.parse() {
            drivers.push(DriverProcess {
                pid,
                tty: tty.to_string(),
                command,
            });
        }
    }
    drivers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_driver_processes_are_kept() {
        let stdout = "\
  101 pts/3 claude --resume
  102 ?     /usr/local/bin/claude -p task
  103 pts/1 vim notes.md
  104 ?     claudette --no
";
        let drivers = parse_ps(stdout);
        assert_eq!(drivers.len(), 2);
        assert!(!drivers[0].is_detached());
        assert!(drivers[1].is_detached());
        assert_eq!(drivers[1].pid, 102);
    }
}
