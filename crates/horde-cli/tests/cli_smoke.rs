use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

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
            "horde-cli-{prefix}-{}-{unique}",
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

fn run_hd<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let bin = env!("CARGO_BIN_EXE_hd");
    Command::new(bin)
        .args(args)
        .output()
        .expect("hd command should execute")
}

#[test]
fn doctor_reports_a_missing_encampment_with_exit_2() {
    let dir = TempDirGuard::new("empty");
    let root = dir.path().display().to_string();
    let output = run_hd(["doctor", "--root", &root, "--json"]);

    assert_eq!(output.status.code(), Some(2));
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("doctor --json should emit JSON");
    let entries = report["entries"].as_array().expect("entries array");
    let config = entries
        .iter()
        .find(|e| e["name"] == "encampment-config")
        .expect("encampment-config entry");
    assert_eq!(config["status"], "error");
}

#[test]
fn doctor_renders_text_by_default() {
    let dir = TempDirGuard::new("text");
    let root = dir.path().display().to_string();
    let output = run_hd(["doctor", "--root", &root]);

    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("encampment-config"));
    assert!(stdout.contains("errors"));
}

#[test]
fn fix_and_dry_run_are_mutually_exclusive() {
    let dir = TempDirGuard::new("flags");
    let root = dir.path().display().to_string();
    let output = run_hd(["doctor", "--root", &root, "--fix", "--dry-run"]);
    assert_ne!(output.status.code(), Some(0));
    assert!(!String::from_utf8_lossy(&output.stderr).is_empty());
}
