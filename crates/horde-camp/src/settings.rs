//! The agent `settings.json` model and its validation predicates.
//!
//! Every agent session is driven by an external `claude` CLI that loads a
//! per-agent `settings.json`. The doctor requires four things of it:
//! a non-empty `enabledPlugins`, a SessionStart hook that exports `PATH`
//! and signals the daemon, a Stop hook that records cost, and a session
//! hook routed through the wrapper script or the `--hook` flag so session
//! ids survive the driver boundary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::identity::{AgentIdentity, Role};

/// Wrapper script that forwards session ids to the daemon.
pub const SESSION_WRAPPER_SCRIPT: &str = "horde-hook.sh";

/// Flag form of the session-id pass-through (`hd rally --hook ...`).
pub const RALLY_HOOK_FLAG: &str = "--hook";

/// One `{type, command}` hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookCommand {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub command: String,
}

/// A matcher with its hooks, as the driver consumes them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookMatcher {
    #[serde(default)]
    pub matcher: String,
    #[serde(default)]
    pub hooks: Vec<HookCommand>,
}

/// Parsed agent settings. Unknown keys round-trip through `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default, rename = "enabledPlugins")]
    pub enabled_plugins: Vec<String>,
    #[serde(default)]
    pub hooks: BTreeMap<String, Vec<HookMatcher>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// One way a settings file falls short of the hook invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsDefect {
    NoEnabledPlugins,
    MissingSessionStartHook,
    SessionStartMissingPathExport,
    SessionStartMissingDaemonSignal,
    MissingStopHook,
    StopMissingCostRecording,
    SessionHookNotPassedThrough,
}

impl std::fmt::Display for SettingsDefect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            SettingsDefect::NoEnabledPlugins => "enabledPlugins is empty",
            SettingsDefect::MissingSessionStartHook => "no SessionStart hook",
            SettingsDefect::SessionStartMissingPathExport => {
                "SessionStart hook does not export PATH"
            }
            SettingsDefect::SessionStartMissingDaemonSignal => {
                "SessionStart hook does not signal the daemon"
            }
            SettingsDefect::MissingStopHook => "no Stop hook",
            SettingsDefect::StopMissingCostRecording => "Stop hook does not record cost",
            SettingsDefect::SessionHookNotPassedThrough => {
                "session hook uses neither the wrapper script nor --hook"
            }
        };
        f.write_str(text)
    }
}

impl AgentSettings {
    fn commands_for(&self, event: &str) -> Vec<&str> {
        self.hooks
            .get(event)
            .map(|matchers| {
                matchers
                    .iter()
                    .flat_map(|m| m.hooks.iter())
                    .filter(|h| h.kind == "command")
                    .map(|h| h.command.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Check the invariants; an empty vector means the file is sound.
    pub fn defects(&self) -> Vec<SettingsDefect> {
        let mut defects = Vec::new();

        if self.enabled_plugins.iter().all(|p| p.trim().is_empty()) {
            defects.push(SettingsDefect::NoEnabledPlugins);
        }

        let session_start = self.commands_for("SessionStart");
        if session_start.is_empty() {
            defects.push(SettingsDefect::MissingSessionStartHook);
        } else {
            if !session_start.iter().any(|c| c.contains("export PATH")) {
                defects.push(SettingsDefect::SessionStartMissingPathExport);
            }
            if !session_start.iter().any(|c| c.contains("hd rally")) {
                defects.push(SettingsDefect::SessionStartMissingDaemonSignal);
            }
        }

        let stop = self.commands_for("Stop");
        if stop.is_empty() {
            defects.push(SettingsDefect::MissingStopHook);
        } else if !stop.iter().any(|c| c.contains("--record-cost")) {
            defects.push(SettingsDefect::StopMissingCostRecording);
        }

        if !self.session_hook_passed_through() {
            defects.push(SettingsDefect::SessionHookNotPassedThrough);
        }

        defects
    }

    /// Whether the session-handling hook goes through the wrapper script
    /// or carries the `--hook` flag as a complete token.
    pub fn session_hook_passed_through(&self) -> bool {
        let session_start = self.commands_for("SessionStart");
        if session_start.is_empty() {
            return false;
        }
        session_start
            .iter()
            .any(|c| c.contains(SESSION_WRAPPER_SCRIPT) || command_has_flag(c, RALLY_HOOK_FLAG))
    }
}

/// Complete-flag match: `flag` must appear as its own whitespace token,
/// optionally in `--flag=value` form. Substrings (`--hook-legacy`) do not
/// count.
pub fn command_has_flag(command: &str, flag: &str) -> bool {
    command.split_whitespace().any(|token| {
        token == flag
            || token
                .strip_prefix(flag)
                .is_some_and(|rest| rest.starts_with('='))
    })
}

/// Canonical settings location for an agent.
///
/// Witness and forge settings live beside the clone, never inside it;
/// clan and raider settings live at the worker directory root.
pub fn settings_path(identity: &AgentIdentity, root: &Path) -> PathBuf {
    let warband = identity.warband.as_deref().unwrap_or_default();
    let name = identity.name.as_deref().unwrap_or_default();
    let base = match identity.role {
        Role::Warchief => root.join("warchief"),
        Role::Shaman => root.join("shaman"),
        Role::Witness => root.join(warband).join("witness"),
        Role::Forge => root.join(warband).join("forge"),
        Role::Clan => root.join(warband).join("clan").join(name),
        Role::Raider => root.join(warband).join("raiders").join(name),
    };
    base.join(".claude").join("settings.json")
}

/// The wrong, contaminating location for witness/forge settings: inside
/// the tracked clone.
pub fn wrong_location_settings_path(identity: &AgentIdentity, root: &Path) -> Option<PathBuf> {
    let warband = identity.warband.as_deref()?;
    let role_dir = match identity.role {
        Role::Witness => "witness",
        Role::Forge => "forge",
        _ => return None,
    };
    Some(
        root.join(warband)
            .join(role_dir)
            .join("warband")
            .join(".claude")
            .join("settings.json"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sound_settings() -> AgentSettings {
        serde_json::from_str(
            r#"{
                "enabledPlugins": ["horde"],
                "hooks": {
                    "SessionStart": [{"matcher": "", "hooks": [{"type": "command",
                        "command": "export PATH=\"$HOME/.local/bin:$PATH\" && hd rally --hook session-start"}]}],
                    "Stop": [{"matcher": "", "hooks": [{"type": "command",
                        "command": "hd rally --hook stop --record-cost"}]}]
                }
            }"#,
        )
        .expect("fixture should parse")
    }

    #[test]
    fn sound_settings_have_no_defects() {
        assert!(sound_settings().defects().is_empty());
    }

    #[test]
    fn each_invariant_is_reported() {
        let mut s = sound_settings();
        s.enabled_plugins.clear();
        assert!(s.defects().contains(&SettingsDefect::NoEnabledPlugins));

        let mut s = sound_settings();
        s.hooks.remove("Stop");
        assert!(s.defects().contains(&SettingsDefect::MissingStopHook));

        let mut s = sound_settings();
        s.hooks.remove("SessionStart");
        let defects = s.defects();
        assert!(defects.contains(&SettingsDefect::MissingSessionStartHook));
        assert!(defects.contains(&SettingsDefect::SessionHookNotPassedThrough));
    }

    #[test]
    fn flag_match_is_complete_not_substring() {
        assert!(command_has_flag("hd rally --hook session-start", "--hook"));
        assert!(command_has_flag("hd rally --hook=stop", "--hook"));
        assert!(!command_has_flag("hd rally --hook-legacy stop", "--hook"));
        assert!(!command_has_flag("hd rally --hooks stop", "--hook"));
    }

    #[test]
    fn wrapper_script_also_satisfies_pass_through() {
        let s: AgentSettings = serde_json::from_str(
            r#"{
                "enabledPlugins": ["horde"],
                "hooks": {
                    "SessionStart": [{"matcher": "", "hooks": [{"type": "command",
                        "command": "export PATH=/usr/bin && hd rally wake && horde-hook.sh session-start"}]}],
                    "Stop": [{"matcher": "", "hooks": [{"type": "command",
                        "command": "hd rally cost --record-cost"}]}]
                }
            }"#,
        )
        .unwrap();
        assert!(s.defects().is_empty());
    }

    #[test]
    fn settings_paths_stay_outside_tracked_clones() {
        let root = Path::new("/camp");
        let witness = AgentIdentity::witness("foo");
        assert_eq!(
            settings_path(&witness, root),
            Path::new("/camp/foo/witness/.claude/settings.json")
        );
        assert_eq!(
            wrong_location_settings_path(&witness, root).unwrap(),
            Path::new("/camp/foo/witness/warband/.claude/settings.json")
        );
        assert!(wrong_location_settings_path(&AgentIdentity::shaman(), root).is_none());
    }
}
