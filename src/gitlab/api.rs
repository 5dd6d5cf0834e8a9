//! The seam between the ruler and GitLab
//!
//! Every remote call the ruler makes goes through [`GitLabApi`]. The HTTP
//! client implements it; tests plug in an in-memory fake.

use crate::error::GitLabResult;
use crate::gitlab::types::Group;
use async_trait::async_trait;
use std::fmt;

/// A paginated collection endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListEndpoint {
    /// `GET /groups/:id/subgroups`
    Subgroups(u64),
    /// `GET /groups/:id/projects`
    Projects(u64),
}

impl ListEndpoint {
    /// API path relative to the versioned base URL
    pub fn path(&self) -> String {
        match self {
            ListEndpoint::Subgroups(id) => format!("/groups/{}/subgroups", id),
            ListEndpoint::Projects(id) => format!("/groups/{}/projects", id),
        }
    }

    pub fn group_id(&self) -> u64 {
        match self {
            ListEndpoint::Subgroups(id) | ListEndpoint::Projects(id) => *id,
        }
    }
}

impl fmt::Display for ListEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListEndpoint::Subgroups(id) => write!(f, "subgroups of group {}", id),
            ListEndpoint::Projects(id) => write!(f, "projects of group {}", id),
        }
    }
}

/// An HTTP response reduced to what the ruler inspects
///
/// Any status is a valid `ApiResponse`; only transport failures are errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
    /// Parsed `X-Next-Page` header; `None` when absent or empty
    pub next_page: Option<u32>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            next_page: None,
        }
    }

    pub fn with_next_page(mut self, next_page: Option<u32>) -> Self {
        self.next_page = next_page;
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    pub fn is_conflict(&self) -> bool {
        self.status == 409
    }

    pub fn is_created(&self) -> bool {
        self.status == 201
    }
}

/// Remote operations used by the lister, selector, reconciler and walker
#[async_trait]
pub trait GitLabApi: Send + Sync {
    /// `GET /groups/:id_or_path`; non-2xx is an error
    async fn get_group(&self, id_or_path: &str) -> GitLabResult<Group>;

    /// One page of a collection endpoint
    async fn list_page(
        &self,
        endpoint: ListEndpoint,
        page: u32,
        per_page: u32,
    ) -> GitLabResult<ApiResponse>;

    /// `GET /projects/:id/repository/branches/:branch`
    async fn get_branch(&self, project_id: u64, branch: &str) -> GitLabResult<ApiResponse>;

    /// `POST /projects/:id/protected_branches`
    async fn create_protected_branch(
        &self,
        project_id: u64,
        body: &[u8],
    ) -> GitLabResult<ApiResponse>;

    /// `PATCH /projects/:id/protected_branches/:branch`
    async fn update_protected_branch(
        &self,
        project_id: u64,
        branch: &str,
        body: &[u8],
    ) -> GitLabResult<ApiResponse>;

    /// `GET /projects/:id/protected_branches/:branch`
    async fn get_protected_branch(
        &self,
        project_id: u64,
        branch: &str,
    ) -> GitLabResult<ApiResponse>;

    /// `DELETE /projects/:id/protected_branches/:branch`
    async fn delete_protected_branch(
        &self,
        project_id: u64,
        branch: &str,
    ) -> GitLabResult<ApiResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_endpoint_paths() {
        assert_eq!(ListEndpoint::Subgroups(7).path(), "/groups/7/subgroups");
        assert_eq!(ListEndpoint::Projects(7).path(), "/groups/7/projects");
        assert_eq!(ListEndpoint::Projects(9).group_id(), 9);
        assert_eq!(ListEndpoint::Subgroups(3).to_string(), "subgroups of group 3");
    }

    #[test]
    fn test_api_response_status_helpers() {
        assert!(ApiResponse::new(201, "").is_created());
        assert!(ApiResponse::new(201, "").is_success());
        assert!(ApiResponse::new(204, "").is_success());
        assert!(ApiResponse::new(409, "").is_conflict());
        assert!(!ApiResponse::new(409, "").is_success());
        assert!(ApiResponse::new(404, "").is_not_found());
        assert!(!ApiResponse::new(302, "").is_success());
    }
}
