//! GitLab API types
//!
//! Wire types for the handful of endpoints the ruler touches, plus the
//! access level model shared with the configuration.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// GitLab group (root group lookup and subgroup listings)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub full_path: String,
    #[serde(default)]
    pub parent_id: Option<u64>,
}

/// GitLab project as returned by group project listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub path_with_namespace: String,
    /// Absent or null for an empty repository
    #[serde(default)]
    pub default_branch: Option<String>,
}

impl Project {
    /// The declared default branch, if the repository has one
    pub fn default_branch(&self) -> Option<&str> {
        self.default_branch
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
    }
}

/// Access level required to push or merge on a protected branch
///
/// GitLab encodes levels as integers. Named constants cover the values that
/// are valid for protected branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct AccessLevel(pub u32);

impl AccessLevel {
    pub const NO_ACCESS: AccessLevel = AccessLevel(0);
    pub const DEVELOPER: AccessLevel = AccessLevel(30);
    pub const MAINTAINER: AccessLevel = AccessLevel(40);
    pub const ADMIN: AccessLevel = AccessLevel(60);

    /// Parse a level name as written in configuration files
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "no_access" | "no_one" | "none" => Some(Self::NO_ACCESS),
            "developer" | "developers" => Some(Self::DEVELOPER),
            "maintainer" | "maintainers" => Some(Self::MAINTAINER),
            "admin" | "administrator" => Some(Self::ADMIN),
            other => other.parse().ok().map(AccessLevel),
        }
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for AccessLevel {
    fn default() -> Self {
        Self::DEVELOPER
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NO_ACCESS => write!(f, "no access (0)"),
            Self::DEVELOPER => write!(f, "developer (30)"),
            Self::MAINTAINER => write!(f, "maintainer (40)"),
            Self::ADMIN => write!(f, "admin (60)"),
            AccessLevel(other) => write!(f, "level {}", other),
        }
    }
}

impl<'de> Deserialize<'de> for AccessLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u32),
            Name(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(AccessLevel(n)),
            Raw::Name(name) => AccessLevel::from_name(&name).ok_or_else(|| {
                serde::de::Error::custom(format!("unknown access level '{}'", name))
            }),
        }
    }
}

/// One entry of `push_access_levels` / `merge_access_levels`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLevelEntry {
    #[serde(default)]
    pub id: Option<u64>,
    pub access_level: Option<u32>,
    #[serde(default)]
    pub access_level_description: Option<String>,
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub group_id: Option<u64>,
}

/// GitLab protected branch representation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedBranch {
    #[serde(default)]
    pub id: Option<u64>,
    pub name: String,
    #[serde(default)]
    pub push_access_levels: Vec<AccessLevelEntry>,
    #[serde(default)]
    pub merge_access_levels: Vec<AccessLevelEntry>,
    #[serde(default)]
    pub allow_force_push: bool,
}

impl ProtectedBranch {
    /// Whether the role-based push entries are exactly `{level}`
    pub fn push_level_is(&self, level: AccessLevel) -> bool {
        roles_are_exactly(&self.push_access_levels, level)
    }

    /// Whether the role-based merge entries are exactly `{level}`
    pub fn merge_level_is(&self, level: AccessLevel) -> bool {
        roles_are_exactly(&self.merge_access_levels, level)
    }
}

/// Per-user and per-group entries are not managed here and are ignored.
/// Any other role level next to `level` widens access, so it fails the check.
fn roles_are_exactly(entries: &[AccessLevelEntry], level: AccessLevel) -> bool {
    let mut roles = entries
        .iter()
        .filter(|e| e.user_id.is_none() && e.group_id.is_none())
        .map(|e| e.access_level)
        .peekable();

    roles.peek().is_some() && roles.all(|l| l == Some(level.value()))
}

/// Role-based access holder used in protection request bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccessLevelHolder {
    pub access_level: AccessLevel,
}

/// Body of `POST`/`PATCH /projects/:id/protected_branches`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtectionPayload<'a> {
    pub name: &'a str,
    pub allowed_to_push: [AccessLevelHolder; 1],
    pub allowed_to_merge: [AccessLevelHolder; 1],
}

impl<'a> ProtectionPayload<'a> {
    pub fn new(name: &'a str, push: AccessLevel, merge: AccessLevel) -> Self {
        Self {
            name,
            allowed_to_push: [AccessLevelHolder { access_level: push }],
            allowed_to_merge: [AccessLevelHolder {
                access_level: merge,
            }],
        }
    }
}
