//! Configuration types for branch-ruler
//!
//! This module defines the configuration structure that can be loaded from
//! TOML/JSON files and/or environment variables.

use crate::gitlab::AccessLevel;
use crate::util::SecretString;
use serde::Deserialize;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// GitLab connection settings
    pub gitlab: GitLabConfig,

    /// What to protect and how
    pub protection: ProtectionConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// GitLab connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitLabConfig {
    /// GitLab instance URL (e.g., `https://gitlab.com`)
    pub url: String,

    /// Personal/group access token (prefer env var GITLAB_TOKEN)
    pub token: Option<SecretString>,

    /// API version (default: "v4")
    pub api_version: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Retries for connection/timeout failures. Statuses are never retried.
    pub max_retries: u32,

    /// Whether to verify SSL certificates
    pub verify_ssl: bool,

    /// Header used to send the token
    pub auth_scheme: AuthScheme,
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            url: "https://gitlab.com".to_string(),
            token: None,
            api_version: "v4".to_string(),
            timeout_secs: 30,
            max_retries: 0,
            verify_ssl: true,
            auth_scheme: AuthScheme::PrivateToken,
        }
    }
}

impl GitLabConfig {
    /// Get the full API base URL
    pub fn api_url(&self) -> String {
        format!(
            "{}/api/{}",
            self.url.trim_end_matches('/'),
            self.api_version
        )
    }
}

/// How the token is presented to GitLab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// `PRIVATE-TOKEN: <token>`
    #[default]
    PrivateToken,
    /// `Authorization: Bearer <token>`
    Bearer,
}

/// Which branches of a project are protection candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchPolicy {
    /// Only the project's declared default branch
    #[default]
    DefaultOnly,
    /// `main`, `master`, and the default branch if it is neither
    Conventional,
}

/// Protection policy applied to every selected branch in the tree
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProtectionConfig {
    /// Root group ID or full path (e.g., `org` or `org/platform`)
    pub root_group: String,

    /// Minimum level allowed to push (developer when unset)
    pub push_access_level: Option<AccessLevel>,

    /// Minimum level allowed to merge (developer when unset)
    pub merge_access_level: Option<AccessLevel>,

    /// Branch selection policy
    pub branch_policy: BranchPolicy,

    /// Page size for group listings
    pub per_page: u32,

    /// Projects reconciled in parallel within one group (1 = sequential)
    pub concurrency: usize,

    /// Reconcile each project ID at most once per run
    pub dedupe_projects: bool,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            root_group: String::new(),
            push_access_level: None,
            merge_access_level: None,
            branch_policy: BranchPolicy::DefaultOnly,
            per_page: 100,
            concurrency: 1,
            dedupe_projects: false,
        }
    }
}

impl ProtectionConfig {
    pub fn push_level(&self) -> AccessLevel {
        self.push_access_level.unwrap_or_default()
    }

    pub fn merge_level(&self) -> AccessLevel {
        self.merge_access_level.unwrap_or_default()
    }

    /// Page size clamped to what GitLab accepts
    pub fn page_size(&self) -> u32 {
        self.per_page.clamp(1, 100)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format (pretty, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// JSON structured output
    Json,
}

/// Flat JSON layout used by earlier versions of the tool
///
/// ```json
/// {"gitlab_token": "...", "gitlab_base_url": "...", "root_group_path": "org",
///  "push_access_level": 40, "merge_access_level": 30}
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyConfig {
    #[serde(default)]
    pub gitlab_token: Option<String>,
    #[serde(default)]
    pub gitlab_base_url: Option<String>,
    pub root_group_path: String,
    #[serde(default)]
    pub push_access_level: u32,
    #[serde(default)]
    pub merge_access_level: u32,
}

impl LegacyConfig {
    /// Re-shape into the sectioned layout. A zero level means "unset".
    pub fn into_sectioned(self) -> serde_json::Value {
        let mut gitlab = serde_json::Map::new();
        if let Some(url) = self.gitlab_base_url {
            gitlab.insert("url".into(), url.into());
        }
        if let Some(token) = self.gitlab_token {
            gitlab.insert("token".into(), token.into());
        }

        let mut protection = serde_json::Map::new();
        protection.insert("root_group".into(), self.root_group_path.into());
        if self.push_access_level != 0 {
            protection.insert("push_access_level".into(), self.push_access_level.into());
        }
        if self.merge_access_level != 0 {
            protection.insert("merge_access_level".into(), self.merge_access_level.into());
        }

        serde_json::json!({ "gitlab": gitlab, "protection": protection })
    }
}
