//! GitLab API module
//!
//! Provides the [`GitLabApi`] seam, its HTTP implementation and the wire types.

pub mod api;
pub mod client;
pub mod types;

pub use api::{ApiResponse, GitLabApi, ListEndpoint};
pub use client::GitLabClient;
pub use types::*;
