//! Paginated listing
//!
//! Walks a GitLab collection endpoint page by page and concatenates the
//! results in order.

use crate::error::{GitLabError, GitLabResult};
use crate::gitlab::{GitLabApi, ListEndpoint};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Fetch every record of `endpoint`, starting at page 1.
///
/// Stops at the first empty page or at the first page without a next-page
/// header, whichever comes first. Any transport failure, error status or
/// undecodable page aborts the whole listing; partial results are dropped.
pub async fn fetch_all<T, A>(api: &A, endpoint: ListEndpoint, per_page: u32) -> GitLabResult<Vec<T>>
where
    T: DeserializeOwned,
    A: GitLabApi + ?Sized,
{
    let mut items = Vec::new();
    let mut page = 1;

    loop {
        let response = api.list_page(endpoint, page, per_page).await?;

        if !response.is_success() {
            return Err(GitLabError::from_response(response.status, &response.body));
        }

        let batch: Vec<T> = serde_json::from_str(&response.body).map_err(|e| {
            GitLabError::InvalidResponse(format!("page {} of {}: {}", page, endpoint, e))
        })?;

        debug!(%endpoint, page, records = batch.len(), next_page = ?response.next_page, "Fetched page");

        if batch.is_empty() {
            break;
        }
        items.extend(batch);

        if response.next_page.is_none() {
            break;
        }
        page += 1;
    }

    Ok(items)
}
