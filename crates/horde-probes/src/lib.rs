//! # horde-probes
//!
//! Thin adapters over the external tools the doctor consults: the issue
//! store CLI (`rl`), the terminal multiplexer (`tmux`), `git`, and the
//! platform CLI (`gh`).
//!
//! The crates here are intentionally thin: they shell out, bound every
//! subprocess with a deadline, tolerate informational noise in output,
//! and keep no orchestration policy. Checks decide what the answers mean.
//!
//! `traits` defines the substitution seams (`SessionSource`,
//! `RecordStore`, `ProcessSource`, `DaemonControl`) the doctor consumes,
//! so tests can run against deterministic in-memory fakes.

pub mod exec;
pub mod gh;
pub mod git;
pub mod process;
pub mod relics;
pub mod tmux;
pub mod traits;

pub use exec::{CommandOutput, ExecError, MAX_CAPTURED_BYTES, run_command};
pub use gh::{GhCli, GhError, PullRequest, github_repo_slug};
pub use git::{GitCli, GitError, GitFileStatus};
pub use process::{DriverProcess, PsProcesses};
pub use relics::{CreateRecord, RelicRecord, RelicsCli, RelicsError, strip_notes};
pub use tmux::{TmuxCli, TmuxError};
pub use traits::{
    DaemonControl, HdDaemonControl, ProbeFailure, ProbeResult, ProcessSource, RecordStore,
    SessionSource,
};
