//! GitLab Branch Ruler
//!
//! Enforces one branch protection policy across a whole GitLab group tree.
//!
//! Starting from a root group, the ruler lists every project and subgroup,
//! picks the branches that must be protected and reconciles each protected
//! branch rule to a configured (push, merge) access level pair.
//!
//! ## Example Configuration
//!
//! ```toml
//! [gitlab]
//! url = "https://gitlab.example.com"
//! # token from GITLAB_TOKEN env var
//!
//! [protection]
//! root_group = "org"
//! push_access_level = "maintainer"
//! merge_access_level = "developer"
//! branch_policy = "conventional"   # or "default_only"
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod gitlab;
pub mod ruler;
pub mod util;

// Re-export main types
pub use config::{AppConfig, load_config};
pub use error::{AppError, Result};
pub use ruler::{GroupWalker, WalkOptions, WalkReport};
