//! Encampment root discovery and canonical sub-paths.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Required `type` field of `warchief/encampment.json`.
pub const ENCAMPMENT_CONFIG_TYPE: &str = "encampment";

/// Errors from loading or validating `encampment.json`.
#[derive(Debug, thiserror::Error)]
pub enum EncampmentConfigError {
    #[error("encampment config not found: {0}")]
    Missing(String),

    #[error("{path}: {message}")]
    Io { path: String, message: String },

    #[error("{path}: invalid encampment config: {message}")]
    Malformed { path: String, message: String },

    #[error("{path}: {message}")]
    Invalid { path: String, message: String },
}

/// `warchief/encampment.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncampmentConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl EncampmentConfig {
    /// Structural validation: `type == "encampment"`, non-zero version,
    /// non-empty name.
    pub fn validate(&self, path: &Path) -> Result<(), EncampmentConfigError> {
        let mut problems = Vec::new();
        if self.kind != ENCAMPMENT_CONFIG_TYPE {
            problems.push(format!(
                "type must be {ENCAMPMENT_CONFIG_TYPE:?}, got {:?}",
                self.kind
            ));
        }
        if self.version == 0 {
            problems.push("version must be non-zero".to_string());
        }
        if self.name.trim().is_empty() {
            problems.push("name must be non-empty".to_string());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(EncampmentConfigError::Invalid {
                path: path.display().to_string(),
                message: problems.join("; "),
            })
        }
    }
}

/// Handle to an encampment root with its canonical sub-paths.
#[derive(Debug, Clone)]
pub struct Encampment {
    root: PathBuf,
}

impl Encampment {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Walk up from `start` to the nearest directory containing
    /// `warchief/encampment.json`.
    pub fn discover(start: impl AsRef<Path>) -> Option<Self> {
        let mut current = Some(start.as_ref().to_path_buf());
        while let Some(dir) = current {
            if dir.join("warchief/encampment.json").is_file() {
                return Some(Self::new(dir));
            }
            current = dir.parent().map(Path::to_path_buf);
        }
        None
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn warchief_dir(&self) -> PathBuf {
        self.root.join("warchief")
    }

    pub fn shaman_dir(&self) -> PathBuf {
        self.root.join("shaman")
    }

    pub fn relics_dir(&self) -> PathBuf {
        self.root.join(".relics")
    }

    pub fn routes_path(&self) -> PathBuf {
        self.relics_dir().join("routes.jsonl")
    }

    pub fn rituals_dir(&self) -> PathBuf {
        self.relics_dir().join("rituals")
    }

    pub fn config_path(&self) -> PathBuf {
        self.warchief_dir().join("encampment.json")
    }

    pub fn warbands_path(&self) -> PathBuf {
        self.warchief_dir().join("warbands.json")
    }

    /// Encampment-level slash commands provisioned for every agent.
    pub fn commands_dir(&self) -> PathBuf {
        self.warchief_dir().join(".claude").join("commands")
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.warchief_dir().join("plugins")
    }

    pub fn daemon_scout_config_path(&self) -> PathBuf {
        self.warchief_dir().join("daemon-scout-config.json")
    }

    /// Load and validate `encampment.json`.
    pub fn load_config(&self) -> Result<EncampmentConfig, EncampmentConfigError> {
        let path = self.config_path();
        if !path.is_file() {
            return Err(EncampmentConfigError::Missing(path.display().to_string()));
        }
        let text = fs::read_to_string(&path).map_err(|e| EncampmentConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config: EncampmentConfig =
            serde_json::from_str(&text).map_err(|e| EncampmentConfigError::Malformed {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        config.validate(&path)?;
        Ok(config)
    }
}

/// Installer-owned global state directory.
///
/// Honors `HORDE_HOME`, defaulting to `~/.horde`. Contains `state.json`
/// and the installed shell hook `hook.sh`.
pub fn global_state_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HORDE_HOME")
        && !home.trim().is_empty()
    {
        return PathBuf::from(home);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".horde")
}

/// Path of the global state file.
pub fn global_state_path() -> PathBuf {
    global_state_dir().join("state.json")
}

/// Path of the installed shell hook.
pub fn global_shell_hook_path() -> PathBuf {
    global_state_dir().join("hook.sh")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_reports_every_problem_at_once() {
        let config = EncampmentConfig {
            kind: "camp".to_string(),
            version: 0,
            name: String::new(),
            extra: BTreeMap::new(),
        };
        let err = config
            .validate(Path::new("/x/encampment.json"))
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("type must be"));
        assert!(message.contains("version must be non-zero"));
        assert!(message.contains("name must be non-empty"));
    }

    #[test]
    fn config_round_trips_unknown_fields() {
        let text = r#"{"type":"encampment","version":2,"name":"t","banner":"red"}"#;
        let config: EncampmentConfig = serde_json::from_str(text).unwrap();
        assert!(config.validate(Path::new("x")).is_ok());
        let out = serde_json::to_string(&config).unwrap();
        assert!(out.contains("banner"));
    }
}
