//! Configuration loader with layered sources
//!
//! Loads configuration from multiple sources with the following precedence
//! (highest to lowest):
//! 1. Environment variables (BRANCH_RULER__*)
//! 2. Well-known GitLab variables (GITLAB_TOKEN, GITLAB_URL, ...)
//! 3. Configuration file (TOML, or JSON by extension)
//! 4. Default values

use crate::config::types::{AppConfig, LegacyConfig};
use crate::error::ConfigError;
use crate::util::SecretString;
use config::{Config, Environment, File, FileFormat};
use std::path::Path;

/// Default configuration file paths to check (in order)
const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "branch-ruler.toml",
    ".branch-ruler.toml",
    "config.json",
    "~/.config/branch-ruler/config.toml",
    "/etc/branch-ruler/config.toml",
];

const ENV_PREFIX: &str = "BRANCH_RULER";

/// Token variables checked in order of precedence
const TOKEN_ENV_VARS: &[&str] = &[
    "GITLAB_TOKEN",
    "GITLAB_PRIVATE_TOKEN",
    "GITLAB_ACCESS_TOKEN",
];

/// Load configuration from a TOML string (useful for testing)
///
/// Unlike [`load_config`], a missing token is not an error.
pub fn load_config_from_str(toml_str: &str) -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::from_str(toml_str, FileFormat::Toml))
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    validate_config(&app_config, false)?;

    Ok(app_config)
}

/// Load configuration from files and environment
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        // Explicit path provided - must exist
        if !Path::new(path).exists() {
            return Err(ConfigError::Load(format!(
                "Configuration file not found: {}",
                path
            )));
        }
        builder = builder.add_source(file_source(path)?);
    } else {
        for path in DEFAULT_CONFIG_PATHS {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                builder = builder.add_source(file_source(&expanded)?);
                break;
            }
        }
    }

    // e.g., BRANCH_RULER__GITLAB__URL, BRANCH_RULER__PROTECTION__ROOT_GROUP
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let mut app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    apply_well_known_env(&mut app_config);

    validate_config(&app_config, true)?;

    Ok(app_config)
}

/// Pick the file format from the extension. Flat legacy JSON files are
/// re-shaped into the sectioned layout before they reach the builder.
fn file_source(path: &str) -> Result<File<config::FileSourceString, FileFormat>, ConfigError> {
    let is_json = Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {}", path, e)))?;

    let (contents, format) = if is_json {
        (normalize_json(&raw)?, FileFormat::Json)
    } else {
        (raw, FileFormat::Toml)
    };

    Ok(File::from_str(&contents, format))
}

/// Convert a legacy flat JSON document, pass anything else through
pub fn normalize_json(raw: &str) -> Result<String, ConfigError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| ConfigError::Load(format!("invalid JSON: {}", e)))?;

    if value.get("root_group_path").is_none() {
        return Ok(raw.to_string());
    }

    let legacy: LegacyConfig = serde_json::from_value(value)
        .map_err(|e| ConfigError::Load(format!("invalid legacy config: {}", e)))?;
    Ok(legacy.into_sectioned().to_string())
}

/// GITLAB_TOKEN and GITLAB_URL beat the file but not BRANCH_RULER__* vars
fn apply_well_known_env(config: &mut AppConfig) {
    if std::env::var(format!("{}__GITLAB__TOKEN", ENV_PREFIX)).is_err() {
        let token = TOKEN_ENV_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|t| !t.is_empty());
        if let Some(token) = token {
            config.gitlab.token = Some(SecretString::new(token));
        }
    }

    if std::env::var(format!("{}__GITLAB__URL", ENV_PREFIX)).is_err()
        && let Ok(url) = std::env::var("GITLAB_URL")
        && !url.is_empty()
    {
        config.gitlab.url = url;
    }
}

/// Validate configuration values
fn validate_config(config: &AppConfig, require_token: bool) -> Result<(), ConfigError> {
    if config.gitlab.url.is_empty() {
        return Err(ConfigError::Missing {
            field: "gitlab.url".to_string(),
        });
    }

    if !config.gitlab.url.starts_with("http://") && !config.gitlab.url.starts_with("https://") {
        return Err(ConfigError::Invalid {
            message: format!(
                "gitlab.url must start with http:// or https://, got: {}",
                config.gitlab.url
            ),
        });
    }

    if require_token && config.gitlab.token.as_ref().is_none_or(|t| t.is_blank()) {
        return Err(ConfigError::Missing {
            field: "gitlab.token (set GITLAB_TOKEN environment variable)".to_string(),
        });
    }

    if config.gitlab.timeout_secs == 0 {
        return Err(ConfigError::Invalid {
            message: "gitlab.timeout_secs must be greater than 0".to_string(),
        });
    }

    if config.protection.root_group.trim().is_empty() {
        return Err(ConfigError::Missing {
            field: "protection.root_group".to_string(),
        });
    }

    if config.protection.concurrency == 0 {
        return Err(ConfigError::Invalid {
            message: "protection.concurrency must be at least 1".to_string(),
        });
    }

    Ok(())
}
