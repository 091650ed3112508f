//! # horde-camp
//!
//! The encampment layout model: the canonical on-disk shape of a Horde
//! workspace and the identities of the agents that live in it.
//!
//! This crate provides:
//! - `Encampment` (root discovery, canonical sub-paths)
//! - `WarbandsRegistry` and warband enumeration
//! - `routes.jsonl` read/write and the reserved encampment routes
//! - relics redirect classification for warband-level stores
//! - `AgentIdentity` (the session-name grammar, record identifiers,
//!   canonical working directories, expected environment maps)
//! - the agent `settings.json` model and its validation predicates
//! - the daemon scout configuration
//!
//! It intentionally holds no check or repair logic. Those concerns live
//! in `horde-doctor`; external command execution lives in `horde-probes`.

pub mod encampment;
pub mod fsio;
pub mod identity;
pub mod redirect;
pub mod routes;
pub mod scout;
pub mod settings;
pub mod warband;

pub use encampment::{
    Encampment, EncampmentConfig, EncampmentConfigError, global_shell_hook_path, global_state_dir,
    global_state_path,
};
pub use fsio::{FsWriteError, write_atomic};
pub use identity::{
    AgentIdentity, ENCAMPMENT_RECORD_PREFIX, ENCAMPMENT_SESSION_PREFIX, IdentityError, Role,
    WARBAND_SESSION_PREFIX, is_clan_session, is_horde_session, parse_session_name,
};
pub use redirect::{
    REDIRECT_FILE, REDIRECT_TARGET, RELICS_DATA_FILES, RelicsState, classify_relics_dir,
    redirect_body, resolve_relics_dir,
};
pub use routes::{
    ENCAMPMENT_ROUTE, RAID_ROUTE, Route, RoutesError, duplicate_prefixes, prefix_is_valid,
    read_routes, reserved_routes, route_for_warband, warband_route_path, write_routes,
};
pub use scout::{
    DAEMON_SCOUT_CONFIG_TYPE, DaemonScoutConfig, HeartbeatConfig, PatrolConfig, SCOUT_KINDS,
    SCOUT_LABEL, scout_record_id,
};
pub use settings::{
    AgentSettings, HookCommand, HookMatcher, RALLY_HOOK_FLAG, SESSION_WRAPPER_SCRIPT,
    SettingsDefect, command_has_flag, settings_path, wrong_location_settings_path,
};
pub use warband::{
    RESERVED_NAMES, RegistryError, RelicsSettings, Warband, WarbandEntry, WarbandsRegistry,
    is_warband_dir, list_warbands,
};
