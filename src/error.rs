//! Error types for branch-ruler
//!
//! This module defines the error hierarchy used throughout the application.
//! Bootstrap errors (`ConfigError`, `AuthError`, root group resolution) are
//! fatal. Everything raised while walking the group tree is logged by the
//! walker and the walk carries on.

use std::fmt;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("GitLab API error: {0}")]
    GitLab(#[from] GitLabError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Branch protection error: {0}")]
    Protect(#[from] ProtectError),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {field}")]
    Missing { field: String },
}

/// GitLab API specific errors
#[derive(Error, Debug)]
pub enum GitLabError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("GitLab API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited, retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Unauthorized: invalid or expired token")]
    Unauthorized,

    #[error("Forbidden: insufficient permissions for {action}")]
    Forbidden { action: String },

    #[error("Invalid response from GitLab: {0}")]
    InvalidResponse(String),

    #[error("Request timeout after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },
}

impl GitLabError {
    /// Create an appropriate error from an HTTP status code and response body
    pub fn from_response(status: u16, body: &str) -> Self {
        match status {
            401 => GitLabError::Unauthorized,
            403 => GitLabError::Forbidden {
                action: "this operation".into(),
            },
            404 => GitLabError::NotFound {
                resource: "requested resource".into(),
            },
            429 => GitLabError::RateLimited { retry_after: 60 },
            _ => GitLabError::Api {
                status,
                message: if body.is_empty() {
                    format!("HTTP {}", status)
                } else {
                    body.to_string()
                },
            },
        }
    }
}

/// Authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No authentication configured")]
    NotConfigured,

    #[error("Invalid token format")]
    InvalidToken,
}

/// Step of the protection state machine that produced a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectStep {
    Create,
    Delete,
    Recreate,
}

impl fmt::Display for ProtectStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtectStep::Create => "create",
            ProtectStep::Delete => "delete",
            ProtectStep::Recreate => "re-create",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the protection reconciler
#[derive(Error, Debug)]
pub enum ProtectError {
    /// The request payload could not be serialized
    #[error("Failed to encode protection payload: {0}")]
    Encode(#[from] serde_json::Error),

    /// The request never produced an HTTP response
    #[error("Transport failure: {0}")]
    Transport(#[from] GitLabError),

    /// GitLab answered with a status the state machine cannot continue from
    #[error("{step} failed (HTTP {status}): {body}")]
    Api {
        step: ProtectStep,
        status: u16,
        body: String,
    },
}

impl ProtectError {
    /// The state machine step that failed, when the failure came from GitLab
    pub fn step(&self) -> Option<ProtectStep> {
        match self {
            ProtectError::Api { step, .. } => Some(*step),
            _ => None,
        }
    }
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type alias for GitLab API operations
pub type GitLabResult<T> = std::result::Result<T, GitLabError>;

/// Result type alias for protection reconciliation
pub type ProtectResult<T> = std::result::Result<T, ProtectError>;
