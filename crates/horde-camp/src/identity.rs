//! Agent identities and the session-name grammar.
//!
//! Every agent is identified by the triple (role, warband, instance name)
//! and everything else hangs off that triple: its tmux session name, its
//! record identifier in the issue store, its canonical working directory,
//! and its expected session environment.
//!
//! Two session prefixes exist:
//! - `hq-` for encampment-scope agents (`hq-warchief`, `hq-shaman`)
//! - `hd-` for warband-scope agents
//!
//! The warband-scope grammar, applied after stripping `hd-`:
//! 1. exactly one segment is malformed;
//! 2. a trailing `witness`/`forge` segment names that role, with the
//!    warband being everything before it (hyphens allowed);
//! 3. otherwise the first `clan` segment splits warband from worker name;
//! 4. otherwise the session is a raider: the warband is the first segment
//!    and the name is the remainder joined with `-`.
//!
//! The grammar is ambiguous in pathological cases (a warband literally
//! named `clan`, a raider named exactly `witness`). Those names route to
//! the wrong bucket; the round-trip tests below pin the behavior for the
//! six canonical shapes instead.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Session prefix for encampment-scope agents.
pub const ENCAMPMENT_SESSION_PREFIX: &str = "hq-";

/// Session prefix for warband-scope agents.
pub const WARBAND_SESSION_PREFIX: &str = "hd-";

/// Record-id prefix reserved for the encampment store.
pub const ENCAMPMENT_RECORD_PREFIX: &str = "hq";

/// The six agent roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Warchief,
    Shaman,
    Witness,
    Forge,
    Raider,
    Clan,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Warchief,
        Role::Shaman,
        Role::Witness,
        Role::Forge,
        Role::Raider,
        Role::Clan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Warchief => "warchief",
            Role::Shaman => "shaman",
            Role::Witness => "witness",
            Role::Forge => "forge",
            Role::Raider => "raider",
            Role::Clan => "clan",
        }
    }

    /// Whether the role is bound to the encampment rather than a warband.
    pub fn is_encampment_scope(&self) -> bool {
        matches!(self, Role::Warchief | Role::Shaman)
    }

    /// The shared role-record identifier in the encampment store.
    pub fn role_record_id(&self) -> String {
        format!("{ENCAMPMENT_RECORD_PREFIX}-role-{}", self.as_str())
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warchief" => Ok(Role::Warchief),
            "shaman" => Ok(Role::Shaman),
            "witness" => Ok(Role::Witness),
            "forge" => Ok(Role::Forge),
            "raider" => Ok(Role::Raider),
            "clan" => Ok(Role::Clan),
            other => Err(IdentityError::UnknownRole(other.to_string())),
        }
    }
}

/// Errors from parsing session names or building identities.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("not a horde session: {0}")]
    NotAHordeSession(String),

    #[error("unknown encampment session: {0}")]
    UnknownEncampmentSession(String),

    #[error("malformed session name: {0}")]
    MalformedSession(String),
}

/// A role-bound agent identity.
///
/// Encampment-scope roles carry neither warband nor name. Witness and
/// forge carry a warband; clan and raider carry a warband and a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warband: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl AgentIdentity {
    pub fn warchief() -> Self {
        Self {
            role: Role::Warchief,
            warband: None,
            name: None,
        }
    }

    pub fn shaman() -> Self {
        Self {
            role: Role::Shaman,
            warband: None,
            name: None,
        }
    }

    pub fn witness(warband: impl Into<String>) -> Self {
        Self {
            role: Role::Witness,
            warband: Some(warband.into()),
            name: None,
        }
    }

    pub fn forge(warband: impl Into<String>) -> Self {
        Self {
            role: Role::Forge,
            warband: Some(warband.into()),
            name: None,
        }
    }

    pub fn clan(warband: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role: Role::Clan,
            warband: Some(warband.into()),
            name: Some(name.into()),
        }
    }

    pub fn raider(warband: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role: Role::Raider,
            warband: Some(warband.into()),
            name: Some(name.into()),
        }
    }

    /// The canonical tmux session name for this identity.
    pub fn session_name(&self) -> String {
        match self.role {
            Role::Warchief => format!("{ENCAMPMENT_SESSION_PREFIX}warchief"),
            Role::Shaman => format!("{ENCAMPMENT_SESSION_PREFIX}shaman"),
            Role::Witness => format!(
                "{WARBAND_SESSION_PREFIX}{}-witness",
                self.warband.as_deref().unwrap_or_default()
            ),
            Role::Forge => format!(
                "{WARBAND_SESSION_PREFIX}{}-forge",
                self.warband.as_deref().unwrap_or_default()
            ),
            Role::Clan => format!(
                "{WARBAND_SESSION_PREFIX}{}-clan-{}",
                self.warband.as_deref().unwrap_or_default(),
                self.name.as_deref().unwrap_or_default()
            ),
            Role::Raider => format!(
                "{WARBAND_SESSION_PREFIX}{}-{}",
                self.warband.as_deref().unwrap_or_default(),
                self.name.as_deref().unwrap_or_default()
            ),
        }
    }

    /// The canonical record identifier, namespaced by `prefix`.
    ///
    /// `prefix` is the warband's bare record prefix (no trailing dash).
    /// Encampment-scope roles always use the reserved `hq` prefix,
    /// whatever is passed.
    pub fn record_id(&self, prefix: &str) -> String {
        match self.role {
            Role::Warchief | Role::Shaman => {
                format!("{ENCAMPMENT_RECORD_PREFIX}-agent-{}", self.role)
            }
            Role::Witness | Role::Forge => format!("{prefix}-agent-{}", self.role),
            Role::Clan | Role::Raider => format!(
                "{prefix}-agent-{}-{}",
                self.role,
                self.name.as_deref().unwrap_or_default()
            ),
        }
    }

    /// The canonical working directory under the encampment root.
    pub fn workdir(&self, root: &Path) -> PathBuf {
        let warband = self.warband.as_deref().unwrap_or_default();
        let name = self.name.as_deref().unwrap_or_default();
        match self.role {
            Role::Warchief => root.join("warchief"),
            Role::Shaman => root.join("shaman"),
            Role::Witness => root.join(warband).join("witness").join("warband"),
            Role::Forge => root.join(warband).join("forge").join("warband"),
            Role::Clan => root.join(warband).join("clan").join(name),
            Role::Raider => root.join(warband).join("raiders").join(name).join(warband),
        }
    }

    /// The expected session environment, derived purely from the identity.
    ///
    /// Never contains `RELICS_DIR`: that variable would override
    /// prefix-based routing and is explicitly checked against.
    pub fn expected_env(&self, root: &Path) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert(
            "HORDE_ENCAMPMENT".to_string(),
            root.display().to_string(),
        );
        env.insert("HORDE_ROLE".to_string(), self.role.to_string());
        env.insert("HORDE_SESSION".to_string(), self.session_name());
        if let Some(warband) = &self.warband {
            env.insert("HORDE_WARBAND".to_string(), warband.clone());
        }
        if let Some(name) = &self.name {
            env.insert("HORDE_AGENT".to_string(), name.clone());
        }
        env
    }
}

impl std::fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.session_name())
    }
}

/// True when `session` carries one of the two Horde session prefixes.
pub fn is_horde_session(session: &str) -> bool {
    session.starts_with(ENCAMPMENT_SESSION_PREFIX) || session.starts_with(WARBAND_SESSION_PREFIX)
}

/// Parse a tmux session name back into an agent identity.
pub fn parse_session_name(session: &str) -> Result<AgentIdentity, IdentityError> {
    if let Some(rest) = session.strip_prefix(ENCAMPMENT_SESSION_PREFIX) {
        return match rest {
            "warchief" => Ok(AgentIdentity::warchief()),
            "shaman" => Ok(AgentIdentity::shaman()),
            _ => Err(IdentityError::UnknownEncampmentSession(
                session.to_string(),
            )),
        };
    }

    let Some(rest) = session.strip_prefix(WARBAND_SESSION_PREFIX) else {
        return Err(IdentityError::NotAHordeSession(session.to_string()));
    };

    let segments: Vec<&str> = rest.split('-').collect();
    if segments.len() < 2 || segments.iter().any(|s| s.is_empty()) {
        return Err(IdentityError::MalformedSession(session.to_string()));
    }

    let last = segments[segments.len() - 1];
    if last == "witness" || last == "forge" {
        let warband = segments[..segments.len() - 1].join("-");
        let role = if last == "witness" {
            Role::Witness
        } else {
            Role::Forge
        };
        return Ok(AgentIdentity {
            role,
            warband: Some(warband),
            name: None,
        });
    }

    if let Some(pos) = segments.iter().position(|s| *s == "clan") {
        let warband = segments[..pos].join("-");
        let name = segments[pos + 1..].join("-");
        if warband.is_empty() || name.is_empty() {
            return Err(IdentityError::MalformedSession(session.to_string()));
        }
        return Ok(AgentIdentity::clan(warband, name));
    }

    Ok(AgentIdentity::raider(
        segments[0].to_string(),
        segments[1..].join("-"),
    ))
}

/// True when `session` names a clan worker (`hd-<warband>-clan-<name>`).
///
/// Clan sessions are never auto-killed, so orphan cleanup asks this
/// before issuing any `kill-session`.
pub fn is_clan_session(session: &str) -> bool {
    matches!(
        parse_session_name(session),
        Ok(AgentIdentity {
            role: Role::Clan,
            ..
        })
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical_identities() -> Vec<AgentIdentity> {
        vec![
            AgentIdentity::warchief(),
            AgentIdentity::shaman(),
            AgentIdentity::witness("foo"),
            AgentIdentity::forge("foo"),
            AgentIdentity::clan("foo", "grok"),
            AgentIdentity::raider("foo", "zug"),
        ]
    }

    #[test]
    fn round_trip_for_the_six_canonical_shapes() {
        for identity in canonical_identities() {
            let session = identity.session_name();
            let parsed = parse_session_name(&session)
                .unwrap_or_else(|e| panic!("{session} should parse: {e}"));
            assert_eq!(parsed, identity, "round trip failed for {session}");
        }
    }

    #[test]
    fn expected_env_agrees_in_both_directions() {
        let root = Path::new("/camp");
        for identity in canonical_identities() {
            let direct = identity.expected_env(root);
            let reparsed = parse_session_name(&identity.session_name())
                .expect("canonical session should parse")
                .expected_env(root);
            assert_eq!(direct, reparsed);
            assert!(!direct.contains_key("RELICS_DIR"));
        }
    }

    #[test]
    fn witness_warband_may_contain_hyphens() {
        let parsed = parse_session_name("hd-two-part-witness").unwrap();
        assert_eq!(parsed, AgentIdentity::witness("two-part"));
    }

    #[test]
    fn raider_warband_is_first_segment_only() {
        let parsed = parse_session_name("hd-foo-long-raider-name").unwrap();
        assert_eq!(parsed, AgentIdentity::raider("foo", "long-raider-name"));
    }

    #[test]
    fn clan_splits_on_first_marker() {
        let parsed = parse_session_name("hd-foo-clan-clan-joe").unwrap();
        assert_eq!(parsed, AgentIdentity::clan("foo", "clan-joe"));
    }

    #[test]
    fn single_segment_is_malformed() {
        assert!(matches!(
            parse_session_name("hd-foo"),
            Err(IdentityError::MalformedSession(_))
        ));
        assert!(matches!(
            parse_session_name("hd-"),
            Err(IdentityError::MalformedSession(_))
        ));
    }

    #[test]
    fn non_horde_prefixes_are_rejected() {
        assert!(matches!(
            parse_session_name("random-session"),
            Err(IdentityError::NotAHordeSession(_))
        ));
        assert!(matches!(
            parse_session_name("hq-mystery"),
            Err(IdentityError::UnknownEncampmentSession(_))
        ));
    }

    #[test]
    fn record_ids_are_prefix_namespaced() {
        assert_eq!(
            AgentIdentity::warchief().record_id("ignored"),
            "hq-agent-warchief"
        );
        assert_eq!(
            AgentIdentity::witness("foo").record_id("hd"),
            "hd-agent-witness"
        );
        assert_eq!(
            AgentIdentity::clan("foo", "grok").record_id("hd"),
            "hd-agent-clan-grok"
        );
        assert_eq!(Role::Witness.role_record_id(), "hq-role-witness");
    }

    #[test]
    fn workdirs_follow_the_canonical_layout() {
        let root = Path::new("/camp");
        assert_eq!(
            AgentIdentity::witness("foo").workdir(root),
            Path::new("/camp/foo/witness/warband")
        );
        assert_eq!(
            AgentIdentity::raider("foo", "zug").workdir(root),
            Path::new("/camp/foo/raiders/zug/foo")
        );
        assert_eq!(
            AgentIdentity::clan("foo", "grok").workdir(root),
            Path::new("/camp/foo/clan/grok")
        );
    }

    // Ambiguity pin: a raider literally named `witness` parses as the
    // warband's witness. The grammar is recorded as-is.
    #[test]
    fn raider_named_witness_routes_to_the_witness_bucket() {
        let raider = AgentIdentity::raider("foo", "witness");
        let parsed = parse_session_name(&raider.session_name()).unwrap();
        assert_eq!(parsed, AgentIdentity::witness("foo"));
    }

    #[test]
    fn clan_sessions_are_recognised_for_protection() {
        assert!(is_clan_session("hd-foo-clan-grok"));
        assert!(is_clan_session("hd-missing-clan-joe"));
        assert!(!is_clan_session("hd-foo-witness"));
        assert!(!is_clan_session("random-session"));
    }
}
