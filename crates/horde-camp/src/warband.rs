//! Warband registry and on-disk warband enumeration.
//!
//! A directory under the encampment root is a warband iff it contains at
//! least one of the role directories (`clan/`, `raiders/`, `witness/`,
//! `forge/`) or is listed in `warchief/warbands.json`. Reserved names and
//! dot-prefixed directories are never warbands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::fsio::{FsWriteError, write_atomic};

/// Directory names that can never be warbands.
pub const RESERVED_NAMES: [&str; 6] = ["warchief", "shaman", "daemon", "docs", ".relics", ".git"];

const ROLE_MARKERS: [&str; 4] = ["clan", "raiders", "witness", "forge"];

/// Errors from loading or saving `warbands.json`.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("warbands registry not found: {0}")]
    Missing(String),

    #[error("{path}: {message}")]
    Io { path: String, message: String },

    #[error("{path}: invalid warbands registry: {message}")]
    Malformed { path: String, message: String },

    #[error(transparent)]
    Write(#[from] FsWriteError),
}

/// Per-warband relics settings inside the registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelicsSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

/// One entry of `warbands.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarbandEntry {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub git_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relics: Option<RelicsSettings>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl WarbandEntry {
    /// Declared bare record prefix, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.relics
            .as_ref()
            .and_then(|r| r.prefix.as_deref())
            .filter(|p| !p.is_empty())
    }
}

/// `warchief/warbands.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarbandsRegistry {
    pub version: u32,
    #[serde(default)]
    pub warbands: BTreeMap<String, WarbandEntry>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl WarbandsRegistry {
    pub fn empty() -> Self {
        Self {
            version: 1,
            warbands: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(RegistryError::Missing(path.display().to_string()));
        }
        let text = fs::read_to_string(path).map_err(|e| RegistryError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| RegistryError::Malformed {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Persist atomically, pretty-printed with a trailing newline.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RegistryError> {
        let mut text = serde_json::to_string_pretty(self).map_err(|e| RegistryError::Io {
            path: path.as_ref().display().to_string(),
            message: e.to_string(),
        })?;
        text.push('\n');
        write_atomic(path, &text)?;
        Ok(())
    }

    /// Declared prefix for `warband`, if any.
    pub fn prefix_of(&self, warband: &str) -> Option<&str> {
        self.warbands.get(warband).and_then(WarbandEntry::prefix)
    }
}

/// True when `path` looks like a warband directory (contains at least one
/// role marker directory).
pub fn is_warband_dir(path: &Path) -> bool {
    ROLE_MARKERS.iter().any(|m| path.join(m).is_dir())
}

fn name_is_eligible(name: &str) -> bool {
    !name.starts_with('.') && !RESERVED_NAMES.contains(&name)
}

/// Enumerate warbands: the union of registered names and directories that
/// look like warbands, sorted.
pub fn list_warbands(root: &Path, registry: Option<&WarbandsRegistry>) -> Vec<String> {
    let mut names = BTreeSet::new();
    if let Some(registry) = registry {
        for name in registry.warbands.keys() {
            if name_is_eligible(name) {
                names.insert(name.clone());
            }
        }
    }
    if let Ok(entries) = fs::read_dir(root) {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name_is_eligible(&name) {
                continue;
            }
            if entry.path().is_dir() && is_warband_dir(&entry.path()) {
                names.insert(name);
            }
        }
    }
    names.into_iter().collect()
}

/// Path helpers for one warband.
#[derive(Debug, Clone)]
pub struct Warband {
    root: PathBuf,
    name: String,
}

impl Warband {
    pub fn new(root: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> PathBuf {
        self.root.join(&self.name)
    }

    /// The canonical project clone.
    pub fn warchief_clone(&self) -> PathBuf {
        self.dir().join("warchief").join("warband")
    }

    pub fn witness_dir(&self) -> PathBuf {
        self.dir().join("witness")
    }

    pub fn witness_clone(&self) -> PathBuf {
        self.witness_dir().join("warband")
    }

    pub fn forge_dir(&self) -> PathBuf {
        self.dir().join("forge")
    }

    pub fn forge_clone(&self) -> PathBuf {
        self.forge_dir().join("warband")
    }

    pub fn clan_dir(&self) -> PathBuf {
        self.dir().join("clan")
    }

    pub fn clan_clone(&self, name: &str) -> PathBuf {
        self.clan_dir().join(name)
    }

    pub fn raiders_dir(&self) -> PathBuf {
        self.dir().join("raiders")
    }

    pub fn raider_clone(&self, name: &str) -> PathBuf {
        self.raiders_dir().join(name).join(&self.name)
    }

    pub fn settings_dir(&self) -> PathBuf {
        self.dir().join("settings")
    }

    pub fn clan_state_path(&self, name: &str) -> PathBuf {
        self.settings_dir().join("clan").join(name).join("state.json")
    }

    /// Shared bare repo, when present.
    pub fn bare_repo(&self) -> PathBuf {
        self.dir().join(".repo.git")
    }

    pub fn relics_dir(&self) -> PathBuf {
        self.dir().join(".relics")
    }

    pub fn role_templates_dir(&self) -> PathBuf {
        self.dir().join("internal").join("templates").join("roles")
    }

    /// Names of clan worker clones, sorted.
    pub fn clans(&self) -> Vec<String> {
        sorted_subdirs(&self.clan_dir())
    }

    /// Names of raider worker directories, sorted.
    pub fn raiders(&self) -> Vec<String> {
        sorted_subdirs(&self.raiders_dir())
    }
}

fn sorted_subdirs(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            if entry.path().is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
    }
    names.sort();
    names
}
