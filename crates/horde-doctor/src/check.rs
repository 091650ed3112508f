//! The check contract: one invariant, one detector, one optional repair.

use serde::{Deserialize, Serialize};

use crate::context::CheckContext;

/// Check categories, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Core,
    Config,
    Patrol,
    Rig,
    Cleanup,
    Infrastructure,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Core,
        Category::Config,
        Category::Patrol,
        Category::Rig,
        Category::Cleanup,
        Category::Infrastructure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Core => "core",
            Category::Config => "config",
            Category::Patrol => "patrol",
            Category::Rig => "rig",
            Category::Cleanup => "cleanup",
            Category::Infrastructure => "infrastructure",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of one detection.
///
/// `Warning` means the invariant could be strengthened but the system is
/// operable; `Error` means functionality is impaired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Ok => "ok",
            CheckStatus::Warning => "warning",
            CheckStatus::Error => "error",
        }
    }
}

/// Outcome of one detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
}

impl CheckResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Ok,
            message: message.into(),
            details: Vec::new(),
            fix_hint: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Warning,
            message: message.into(),
            details: Vec::new(),
            fix_hint: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Error,
            message: message.into(),
            details: Vec::new(),
            fix_hint: None,
        }
    }

    /// An advisory check whose external tool is absent reports OK with a
    /// skipped note, never a false failure.
    pub fn skipped_unavailable(tool: &str) -> Self {
        Self::ok(format!("skipped: {tool} not available"))
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.details.push(detail.into());
        self
    }

    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == CheckStatus::Ok
    }
}

/// Error from a repair that could not apply its planned mutation.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct RepairError(pub String);

impl RepairError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<horde_probes::ProbeFailure> for RepairError {
    fn from(err: horde_probes::ProbeFailure) -> Self {
        Self(err.to_string())
    }
}

impl From<horde_probes::GitError> for RepairError {
    fn from(err: horde_probes::GitError) -> Self {
        Self(err.to_string())
    }
}

impl From<horde_camp::FsWriteError> for RepairError {
    fn from(err: horde_camp::FsWriteError) -> Self {
        Self(err.to_string())
    }
}

impl From<horde_camp::RoutesError> for RepairError {
    fn from(err: horde_camp::RoutesError) -> Self {
        Self(err.to_string())
    }
}

impl From<horde_camp::RegistryError> for RepairError {
    fn from(err: horde_camp::RegistryError) -> Self {
        Self(err.to_string())
    }
}

impl From<std::io::Error> for RepairError {
    fn from(err: std::io::Error) -> Self {
        Self(err.to_string())
    }
}

/// One declarative invariant over the encampment.
///
/// Detection is purely observational and must never mutate state; it may
/// cache the offending items for the repair that follows. Repairs must
/// be idempotent: re-running after success is a no-op, re-running after
/// a partial failure makes forward progress.
pub trait Check {
    /// Stable kebab-case identifier, used in reports and skip filters.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn category(&self) -> Category;

    fn can_fix(&self) -> bool {
        false
    }

    fn detect(&mut self, ctx: &CheckContext) -> CheckResult;

    /// Only called when `can_fix()` and the last detection was non-OK.
    fn repair(&mut self, ctx: &CheckContext) -> Result<(), RepairError> {
        let _ = ctx;
        Ok(())
    }
}
