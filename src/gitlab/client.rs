//! GitLab API client
//!
//! Provides an HTTP client for the GitLab REST API. Typed helpers map error
//! statuses to [`GitLabError`]; the raw helpers hand every status back to the
//! caller so the ruler can branch on 404/409 and friends.

use crate::auth::AuthHeader;
use crate::config::GitLabConfig;
use crate::error::{GitLabError, GitLabResult};
use crate::gitlab::api::{ApiResponse, GitLabApi, ListEndpoint};
use crate::gitlab::types::Group;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const NEXT_PAGE_HEADER: &str = "x-next-page";

/// GitLab API client
pub struct GitLabClient {
    http: Client,
    base_url: String,
    auth: AuthHeader,
    max_retries: u32,
    timeout_secs: u64,
}

impl GitLabClient {
    /// Create a new GitLab client from configuration
    pub fn new(config: &GitLabConfig, auth: AuthHeader) -> GitLabResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .danger_accept_invalid_certs(!config.verify_ssl)
            .user_agent(format!("branch-ruler/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(GitLabError::Request)?;

        Ok(Self {
            http,
            base_url: config.api_url(),
            auth,
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }

    /// Build a URL for an API endpoint
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Add authentication to a request
    fn authenticate(&self, request: RequestBuilder) -> GitLabResult<RequestBuilder> {
        let value = self.auth.header_value().map_err(|e| GitLabError::Api {
            status: 401,
            message: e.to_string(),
        })?;

        Ok(request.header(self.auth.header_name(), value))
    }

    /// Send a request, retrying connection and timeout failures only
    async fn send(&self, request: RequestBuilder) -> GitLabResult<Response> {
        let mut attempt = 0;

        loop {
            let req = request
                .try_clone()
                .ok_or_else(|| GitLabError::InvalidResponse("Cannot clone request".to_string()))?;

            match req.send().await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let retryable = is_retryable(&e);
                    warn!(error = %e, attempt = attempt + 1, "Request failed");

                    if !retryable || attempt >= self.max_retries {
                        return Err(if e.is_timeout() {
                            GitLabError::Timeout {
                                timeout_secs: self.timeout_secs,
                            }
                        } else {
                            GitLabError::Request(e)
                        });
                    }
                }
            }

            attempt += 1;
            // Exponential backoff
            let delay = Duration::from_millis(100 * 2u64.pow(attempt - 1));
            tokio::time::sleep(delay).await;
            debug!("Retrying request (attempt {})", attempt + 1);
        }
    }

    /// Read status, pagination header and body of any response
    async fn into_api_response(response: Response) -> GitLabResult<ApiResponse> {
        let status = response.status().as_u16();
        let next_page = response
            .headers()
            .get(NEXT_PAGE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .and_then(|v| v.parse().ok());

        let body = response.text().await.map_err(GitLabError::Request)?;

        Ok(ApiResponse::new(status, body).with_next_page(next_page))
    }

    /// Make a GET request and decode a successful response
    #[instrument(skip(self), fields(endpoint = %endpoint))]
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> GitLabResult<T> {
        let response = self.raw(Method::GET, endpoint, &[], None).await?;

        if !response.is_success() {
            return Err(GitLabError::from_response(response.status, &response.body));
        }

        serde_json::from_str(&response.body).map_err(|e| {
            GitLabError::InvalidResponse(format!("Failed to parse response: {}", e))
        })
    }

    /// Make a request and return the response whatever its status
    #[instrument(skip(self, query, body), fields(method = %method, endpoint = %endpoint))]
    pub async fn raw(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, String)],
        body: Option<&[u8]>,
    ) -> GitLabResult<ApiResponse> {
        let mut request = self.http.request(method, self.url(endpoint));
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(body.to_vec());
        }
        let request = self.authenticate(request)?;

        let response = self.send(request).await?;
        let response = Self::into_api_response(response).await?;
        debug!(status = response.status, "GitLab responded");
        Ok(response)
    }

    /// URL-encode a path segment (group path, branch name) for use in API endpoints
    pub fn encode(segment: &str) -> String {
        urlencoding::encode(segment).into_owned()
    }

    fn protected_branch_path(project_id: u64, branch: &str) -> String {
        format!(
            "/projects/{}/protected_branches/{}",
            project_id,
            Self::encode(branch)
        )
    }
}

#[async_trait]
impl GitLabApi for GitLabClient {
    async fn get_group(&self, id_or_path: &str) -> GitLabResult<Group> {
        self.get(&format!("/groups/{}", Self::encode(id_or_path)))
            .await
    }

    async fn list_page(
        &self,
        endpoint: ListEndpoint,
        page: u32,
        per_page: u32,
    ) -> GitLabResult<ApiResponse> {
        let query = [("per_page", per_page.to_string()), ("page", page.to_string())];
        self.raw(Method::GET, &endpoint.path(), &query, None).await
    }

    async fn get_branch(&self, project_id: u64, branch: &str) -> GitLabResult<ApiResponse> {
        let endpoint = format!(
            "/projects/{}/repository/branches/{}",
            project_id,
            Self::encode(branch)
        );
        self.raw(Method::GET, &endpoint, &[], None).await
    }

    async fn create_protected_branch(
        &self,
        project_id: u64,
        body: &[u8],
    ) -> GitLabResult<ApiResponse> {
        let endpoint = format!("/projects/{}/protected_branches", project_id);
        self.raw(Method::POST, &endpoint, &[], Some(body)).await
    }

    async fn update_protected_branch(
        &self,
        project_id: u64,
        branch: &str,
        body: &[u8],
    ) -> GitLabResult<ApiResponse> {
        let endpoint = Self::protected_branch_path(project_id, branch);
        self.raw(Method::PATCH, &endpoint, &[], Some(body)).await
    }

    async fn get_protected_branch(
        &self,
        project_id: u64,
        branch: &str,
    ) -> GitLabResult<ApiResponse> {
        let endpoint = Self::protected_branch_path(project_id, branch);
        self.raw(Method::GET, &endpoint, &[], None).await
    }

    async fn delete_protected_branch(
        &self,
        project_id: u64,
        branch: &str,
    ) -> GitLabResult<ApiResponse> {
        let endpoint = Self::protected_branch_path(project_id, branch);
        self.raw(Method::DELETE, &endpoint, &[], None).await
    }
}

/// Check if a transport error is worth another attempt
fn is_retryable(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}
