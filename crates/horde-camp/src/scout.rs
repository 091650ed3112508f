//! Daemon scout configuration and scout record naming.
//!
//! Scouts are the monitoring loops the shaman daemon runs per warband.
//! Each warband carries three scout template records in its store; the
//! daemon's own wiring lives in `warchief/daemon-scout-config.json`.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Required `type` field of the daemon scout config.
pub const DAEMON_SCOUT_CONFIG_TYPE: &str = "daemon-scout-config";

/// The three scout template kinds every warband carries.
pub const SCOUT_KINDS: [&str; 3] = ["patrol", "heartbeat", "triage"];

/// Label carried by scout records.
pub const SCOUT_LABEL: &str = "gt:scout";

/// Default staleness budget for an `in_progress` scout record.
pub const DEFAULT_STUCK_AFTER_MINUTES: u64 = 60;

/// Record identifier of one scout template in a warband store.
pub fn scout_record_id(prefix: &str, kind: &str) -> String {
    format!("{prefix}-scout-{kind}")
}

/// Per-patrol wiring inside the daemon scout config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatrolConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stuck_after_minutes: Option<u64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Heartbeat wiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    #[serde(default)]
    pub interval: u64,
}

/// `warchief/daemon-scout-config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonScoutConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: u32,
    #[serde(default)]
    pub patrols: BTreeMap<String, PatrolConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat: Option<HeartbeatConfig>,
}

impl DaemonScoutConfig {
    pub fn is_well_typed(&self) -> bool {
        self.kind == DAEMON_SCOUT_CONFIG_TYPE && self.version >= 1
    }

    /// Whether the config enables any monitoring at all.
    pub fn enables_anything(&self) -> bool {
        self.patrols.values().any(|p| p.enabled)
            || self.heartbeat.as_ref().is_some_and(|h| h.enabled)
    }

    /// Staleness budget for a scout kind, honoring per-patrol overrides.
    pub fn stuck_threshold(&self, kind: &str) -> Duration {
        let minutes = self
            .patrols
            .get(kind)
            .and_then(|p| p.stuck_after_minutes)
            .unwrap_or(DEFAULT_STUCK_AFTER_MINUTES);
        Duration::minutes(minutes as i64)
    }
}

impl Default for DaemonScoutConfig {
    /// Heartbeat on, patrols declared but left for the operator to enable.
    fn default() -> Self {
        let mut patrols = BTreeMap::new();
        for kind in SCOUT_KINDS {
            patrols.insert(kind.to_string(), PatrolConfig::default());
        }
        Self {
            kind: DAEMON_SCOUT_CONFIG_TYPE.to_string(),
            version: 1,
            patrols,
            heartbeat: Some(HeartbeatConfig {
                enabled: true,
                interval: 300,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_enables_heartbeat() {
        let config = DaemonScoutConfig::default();
        assert!(config.is_well_typed());
        assert!(config.enables_anything());
        assert_eq!(config.patrols.len(), SCOUT_KINDS.len());
    }

    #[test]
    fn stuck_threshold_honors_overrides() {
        let mut config = DaemonScoutConfig::default();
        assert_eq!(config.stuck_threshold("patrol"), Duration::minutes(60));
        config.patrols.get_mut("patrol").unwrap().stuck_after_minutes = Some(15);
        assert_eq!(config.stuck_threshold("patrol"), Duration::minutes(15));
    }

    #[test]
    fn scout_ids_are_prefix_namespaced() {
        assert_eq!(scout_record_id("hd", "patrol"), "hd-scout-patrol");
    }
}
