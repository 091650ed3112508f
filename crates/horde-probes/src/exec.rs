//! Bounded subprocess execution.
//!
//! Every external command the doctor runs goes through `run_command`:
//! output is drained by helper threads while the calling thread polls
//! `try_wait` against a deadline, and a child that overruns its budget
//! is killed and reaped. The calling thread keeps direct ownership of
//! the `Child`, so kill/wait never contend with the readers.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Upper bound on captured stdout/stderr per stream.
pub const MAX_CAPTURED_BYTES: u64 = 4 * 1024 * 1024;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Errors from running an external command.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("{program} is not available in PATH")]
    NotInstalled { program: String },

    #[error("{program} {args} timed out after {timeout_secs}s")]
    TimedOut {
        program: String,
        args: String,
        timeout_secs: u64,
    },

    #[error("failed to run {program}: {message}")]
    Io { program: String, message: String },
}

impl ExecError {
    /// Whether the failure means the tool itself is absent.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ExecError::NotInstalled { .. })
    }
}

/// Captured result of a completed command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code; `None` when the child died to a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Non-empty stdout lines, trimmed.
    pub fn stdout_lines(&self) -> Vec<&str> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect()
    }
}

/// Run `program` with `args`, bounded by `timeout`.
pub fn run_command(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
    timeout: Duration,
) -> Result<CommandOutput, ExecError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let mut child = command.spawn().map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            ExecError::NotInstalled {
                program: program.to_string(),
            }
        } else {
            ExecError::Io {
                program: program.to_string(),
                message: err.to_string(),
            }
        }
    })?;

    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(err) => {
                return Err(ExecError::Io {
                    program: program.to_string(),
                    message: err.to_string(),
                });
            }
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            let _ = stdout_reader.join();
            let _ = stderr_reader.join();
            return Err(ExecError::TimedOut {
                program: program.to_string(),
                args: args.join(" "),
                timeout_secs: timeout.as_secs(),
            });
        }
        thread::sleep(POLL_INTERVAL);
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();

    Ok(CommandOutput {
        status: status.code(),
        stdout,
        stderr,
    })
}

fn spawn_reader(pipe: Option<impl Read + Send + 'static>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(pipe) = pipe {
            let _ = pipe.take(MAX_CAPTURED_BYTES).read_to_end(&mut buffer);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

/// Quick availability probe: the program runs and exits zero for
/// `--version`-style invocations.
pub fn probe_version(program: &str, args: &[&str]) -> bool {
    run_command(program, args, None, Duration::from_secs(5))
        .map(|out| out.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_of_a_fast_command() {
        let out = run_command("echo", &["grok"], None, Duration::from_secs(5))
            .expect("echo should run");
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "grok");
    }

    #[test]
    fn missing_binary_maps_to_not_installed() {
        let err = run_command(
            "horde-no-such-binary",
            &[],
            None,
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[test]
    fn overrunning_child_is_killed() {
        let started = Instant::now();
        let err = run_command("sleep", &["30"], None, Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, ExecError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
