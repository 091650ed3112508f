//! Client for `git`, bound to one repository directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::exec::{CommandOutput, ExecError, probe_version, run_command};

const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from running git.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("git {args} failed in {repo}: {message}")]
    CommandFailed {
        args: String,
        repo: String,
        message: String,
    },
}

/// Git status of one file, for the repair deletion policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitFileStatus {
    Untracked,
    TrackedClean,
    TrackedModified,
    Unknown,
}

/// Thin client around `git`, scoped to a repository.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo: PathBuf,
    timeout: Duration,
}

impl GitCli {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            timeout: DEFAULT_GIT_TIMEOUT,
        }
    }

    pub fn is_available() -> bool {
        probe_version("git", &["--version"])
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput, GitError> {
        let output = run_command("git", args, Some(&self.repo), self.timeout)?;
        if !output.success() {
            return Err(GitError::CommandFailed {
                args: args.join(" "),
                repo: self.repo.display().to_string(),
                message: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    fn run_unchecked(&self, args: &[&str]) -> Result<CommandOutput, GitError> {
        Ok(run_command("git", args, Some(&self.repo), self.timeout)?)
    }

    /// Whether the directory is inside a working tree with a usable repo.
    pub fn is_repo(&self) -> bool {
        self.run(&["rev-parse", "--git-dir"]).is_ok()
    }

    /// `git status --porcelain` lines.
    pub fn status_porcelain(&self) -> Result<Vec<String>, GitError> {
        let output = self.run(&["status", "--porcelain"])?;
        Ok(output.stdout.lines().map(str::to_string).collect())
    }

    pub fn is_clean(&self) -> Result<bool, GitError> {
        Ok(self.status_porcelain()?.is_empty())
    }

    /// Current branch; `None` when detached.
    pub fn current_branch(&self) -> Result<Option<String>, GitError> {
        let output = self.run(&["branch", "--show-current"])?;
        let branch = output.stdout.trim();
        if branch.is_empty() {
            Ok(None)
        } else {
            Ok(Some(branch.to_string()))
        }
    }

    pub fn checkout(&self, branch: &str) -> Result<(), GitError> {
        self.run(&["checkout", branch])?;
        Ok(())
    }

    pub fn pull_rebase(&self) -> Result<(), GitError> {
        self.run(&["pull", "--rebase"])?;
        Ok(())
    }

    /// `git fetch --quiet`; failures are measurement noise and swallowed.
    pub fn fetch_quiet(&self) {
        let _ = self.run_unchecked(&["fetch", "--quiet"]);
    }

    /// Whether `rev` resolves (branch, tag, or remote ref).
    pub fn rev_exists(&self, rev: &str) -> bool {
        self.run_unchecked(&["rev-parse", "--verify", "--quiet", rev])
            .map(|out| out.success())
            .unwrap_or(false)
    }

    /// Commits on `upstream` not reachable from HEAD.
    pub fn behind_count(&self, upstream: &str) -> Result<u64, GitError> {
        let range = format!("HEAD..{upstream}");
        let output = self.run(&["rev-list", "--count", range.as_str()])?;
        Ok(output.stdout.trim().parse().unwrap_or(0))
    }

    /// The repository's root commit id, when resolvable.
    pub fn root_commit(&self) -> Result<Option<String>, GitError> {
        let output = self.run(&["rev-list", "--max-parents=0", "HEAD"])?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string))
    }

    /// `git diff --name-only <range>`.
    pub fn diff_names(&self, range: &str) -> Result<Vec<String>, GitError> {
        let output = self.run(&["diff", "--name-only", range])?;
        Ok(output
            .stdout_lines()
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    pub fn worktree_remove_force(&self, path: &Path) -> Result<(), GitError> {
        let path = path.display().to_string();
        self.run(&["worktree", "remove", "--force", path.as_str()])?;
        Ok(())
    }

    /// `git config <key>`; unset keys read as `None`.
    pub fn config_get(&self, key: &str) -> Result<Option<String>, GitError> {
        let output = self.run_unchecked(&["config", key])?;
        if !output.success() {
            return Ok(None);
        }
        Ok(Some(output.stdout.trim().to_string()))
    }

    pub fn config_set(&self, key: &str, value: &str) -> Result<(), GitError> {
        self.run(&["config", key, value])?;
        Ok(())
    }

    /// Tracked paths among `paths` (empty `paths` lists everything).
    pub fn ls_files(&self, paths: &[&str]) -> Result<Vec<String>, GitError> {
        let mut args = vec!["ls-files", "--"];
        args.extend_from_slice(paths);
        let output = self.run(&args)?;
        Ok(output
            .stdout_lines()
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// `git read-tree -mu HEAD` — re-applies sparse-checkout patterns.
    pub fn read_tree_update(&self) -> Result<(), GitError> {
        self.run(&["read-tree", "-mu", "HEAD"])?;
        Ok(())
    }

    /// Classify one path (relative to the repo root) for the deletion
    /// policy. Any git failure degrades to `Unknown`.
    pub fn file_status(&self, path: &str) -> GitFileStatus {
        let tracked = match self.run_unchecked(&["ls-files", "--", path]) {
            Ok(out) if out.success() => !out.stdout.trim().is_empty(),
            _ => return GitFileStatus::Unknown,
        };
        if !tracked {
            return GitFileStatus::Untracked;
        }
        match self.run_unchecked(&["diff", "--quiet", "HEAD", "--", path]) {
            Ok(out) => match out.status {
                Some(0) => GitFileStatus::TrackedClean,
                Some(1) => GitFileStatus::TrackedModified,
                _ => GitFileStatus::Unknown,
            },
            Err(_) => GitFileStatus::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_repo(prefix: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "horde-git-{prefix}-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).expect("temp dir should be created");
        dir
    }

    fn git(dir: &Path, args: &[&str]) {
        let out = run_command("git", args, Some(dir), Duration::from_secs(10))
            .expect("git should execute");
        assert!(out.success(), "git {args:?} failed: {}", out.stderr);
    }

    fn init_repo(dir: &Path) {
        git(dir, &["init", "--quiet", "--initial-branch=main"]);
        git(dir, &["config", "user.email", "doctor@horde.test"]);
        git(dir, &["config", "user.name", "Horde Doctor"]);
    }

    #[test]
    fn file_status_distinguishes_the_three_cases() {
        if !GitCli::is_available() {
            return;
        }
        let dir = temp_repo("status");
        init_repo(&dir);
        fs::write(dir.join("tracked.txt"), "one\n").unwrap();
        git(&dir, &["add", "tracked.txt"]);
        git(&dir, &["commit", "--quiet", "-m", "seed"]);
        fs::write(dir.join("untracked.txt"), "stray\n").unwrap();

        let cli = GitCli::new(&dir);
        assert_eq!(cli.file_status("tracked.txt"), GitFileStatus::TrackedClean);
        assert_eq!(cli.file_status("untracked.txt"), GitFileStatus::Untracked);

        fs::write(dir.join("tracked.txt"), "two\n").unwrap();
        assert_eq!(
            cli.file_status("tracked.txt"),
            GitFileStatus::TrackedModified
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn branch_and_cleanliness_probes() {
        if !GitCli::is_available() {
            return;
        }
        let dir = temp_repo("branch");
        init_repo(&dir);
        fs::write(dir.join("a.txt"), "a\n").unwrap();
        git(&dir, &["add", "a.txt"]);
        git(&dir, &["commit", "--quiet", "-m", "seed"]);

        let cli = GitCli::new(&dir);
        assert!(cli.is_repo());
        assert_eq!(cli.current_branch().unwrap().as_deref(), Some("main"));
        assert!(cli.is_clean().unwrap());
        assert!(cli.root_commit().unwrap().is_some());

        let _ = fs::remove_dir_all(&dir);
    }
}
