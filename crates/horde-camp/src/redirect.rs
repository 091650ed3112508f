//! Relics redirect resolution for warband-level stores.
//!
//! A warband's store may live in two places: tracked inside the canonical
//! clone (`<warband>/warchief/warband/.relics`) or local at the warband
//! root (`<warband>/.relics`). When the tracked store exists, the local
//! directory must defer to it through a one-line `redirect` file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the redirect file inside a warband-level `.relics/`.
pub const REDIRECT_FILE: &str = "redirect";

/// Required redirect target, relative to the warband directory.
pub const REDIRECT_TARGET: &str = "warchief/warband/.relics";

/// Files that make a `.relics/` directory a data-bearing store.
pub const RELICS_DATA_FILES: [&str; 3] = ["issues.jsonl", "issues.db", "config.yaml"];

/// Canonical redirect file body, trailing newline included.
pub fn redirect_body() -> String {
    format!("{REDIRECT_TARGET}\n")
}

/// Classification of a warband-level `.relics/` directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelicsState {
    /// The directory does not exist.
    Missing,
    /// Exists but holds neither data files nor a redirect.
    Empty,
    /// Exists and redirects; `target` is the trimmed file body.
    Redirect { target: String },
    /// Exists and holds data files directly.
    Data { files: Vec<String> },
}

impl RelicsState {
    /// Whether the state satisfies the redirect invariant for a warband
    /// whose tracked store exists.
    pub fn defers_to_tracked_store(&self) -> bool {
        match self {
            RelicsState::Missing | RelicsState::Empty => true,
            RelicsState::Redirect { target } => target == REDIRECT_TARGET,
            RelicsState::Data { .. } => false,
        }
    }
}

/// Classify `dir` (a warband-level `.relics/` path).
pub fn classify_relics_dir(dir: &Path) -> io::Result<RelicsState> {
    if !dir.exists() {
        return Ok(RelicsState::Missing);
    }

    let mut data_files = Vec::new();
    for name in RELICS_DATA_FILES {
        if dir.join(name).is_file() {
            data_files.push(name.to_string());
        }
    }
    if !data_files.is_empty() {
        return Ok(RelicsState::Data { files: data_files });
    }

    let redirect_path = dir.join(REDIRECT_FILE);
    if redirect_path.is_file() {
        let target = fs::read_to_string(&redirect_path)?.trim().to_string();
        return Ok(RelicsState::Redirect { target });
    }

    Ok(RelicsState::Empty)
}

/// Resolve the effective store directory for a warband directory,
/// following at most one redirect hop.
pub fn resolve_relics_dir(warband_dir: &Path) -> PathBuf {
    let local = warband_dir.join(".relics");
    match classify_relics_dir(&local) {
        Ok(RelicsState::Redirect { target }) => warband_dir.join(target),
        _ => local,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "horde-redirect-{prefix}-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).expect("temp dir should be created");
        dir
    }

    #[test]
    fn classification_matrix() {
        let base = temp_dir("matrix");

        assert_eq!(
            classify_relics_dir(&base.join("absent")).unwrap(),
            RelicsState::Missing
        );

        let empty = base.join("empty");
        fs::create_dir_all(&empty).unwrap();
        assert_eq!(classify_relics_dir(&empty).unwrap(), RelicsState::Empty);

        let redirected = base.join("redirected");
        fs::create_dir_all(&redirected).unwrap();
        fs::write(redirected.join(REDIRECT_FILE), redirect_body()).unwrap();
        let state = classify_relics_dir(&redirected).unwrap();
        assert_eq!(
            state,
            RelicsState::Redirect {
                target: REDIRECT_TARGET.to_string()
            }
        );
        assert!(state.defers_to_tracked_store());

        let data = base.join("data");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("issues.jsonl"), "{}\n").unwrap();
        fs::write(data.join(REDIRECT_FILE), redirect_body()).unwrap();
        let state = classify_relics_dir(&data).unwrap();
        assert_eq!(
            state,
            RelicsState::Data {
                files: vec!["issues.jsonl".to_string()]
            }
        );
        assert!(!state.defers_to_tracked_store());

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn resolve_follows_one_hop() {
        let warband = temp_dir("resolve");
        let local = warband.join(".relics");
        fs::create_dir_all(&local).unwrap();
        fs::write(local.join(REDIRECT_FILE), redirect_body()).unwrap();

        assert_eq!(
            resolve_relics_dir(&warband),
            warband.join(REDIRECT_TARGET)
        );

        let _ = fs::remove_dir_all(&warband);
    }

    #[test]
    fn stray_redirect_targets_are_not_canonical() {
        let state = RelicsState::Redirect {
            target: "../somewhere/else".to_string(),
        };
        assert!(!state.defers_to_tracked_store());
    }
}
