//! Branch selection
//!
//! Decides which branches of a project should be protected and confirms each
//! one exists before anything is written.

use crate::config::BranchPolicy;
use crate::error::{GitLabError, GitLabResult};
use crate::gitlab::{GitLabApi, Project};
use tracing::{debug, warn};

const CONVENTIONAL_BRANCHES: [&str; 2] = ["main", "master"];

/// Ordered, duplicate-free protection candidates for `project`
pub fn candidates(policy: BranchPolicy, project: &Project) -> Vec<String> {
    let default_branch = project.default_branch();

    match policy {
        BranchPolicy::DefaultOnly => default_branch.map(str::to_string).into_iter().collect(),
        BranchPolicy::Conventional => {
            let mut names = Vec::with_capacity(3);
            if let Some(branch) = default_branch
                && !CONVENTIONAL_BRANCHES.contains(&branch)
            {
                names.push(branch.to_string());
            }
            names.extend(CONVENTIONAL_BRANCHES.iter().map(|b| b.to_string()));
            names
        }
    }
}

/// `true` on 200, `false` on 404, an error for anything else
pub async fn branch_exists<A>(api: &A, project_id: u64, branch: &str) -> GitLabResult<bool>
where
    A: GitLabApi + ?Sized,
{
    let response = api.get_branch(project_id, branch).await?;

    match response.status {
        200 => Ok(true),
        404 => Ok(false),
        status => Err(GitLabError::from_response(status, &response.body)),
    }
}

/// Result of checking every candidate of one project
#[derive(Debug, Default)]
pub struct Selection {
    /// Candidates confirmed to exist, in candidate order
    pub existing: Vec<String>,
    /// Candidates GitLab reported as absent
    pub missing: Vec<String>,
    /// Candidates whose existence check failed
    pub failed: Vec<(String, GitLabError)>,
}

/// Pick the candidates of `project` that exist on the remote.
///
/// A failed existence check only drops that candidate.
pub async fn select_branches<A>(api: &A, policy: BranchPolicy, project: &Project) -> Selection
where
    A: GitLabApi + ?Sized,
{
    let mut selection = Selection::default();

    for branch in candidates(policy, project) {
        match branch_exists(api, project.id, &branch).await {
            Ok(true) => selection.existing.push(branch),
            Ok(false) => {
                debug!(project_id = project.id, project = %project.name, %branch, "Branch does not exist");
                selection.missing.push(branch);
            }
            Err(e) => {
                warn!(
                    project_id = project.id,
                    project = %project.name,
                    %branch,
                    error = %e,
                    "Branch existence check failed"
                );
                selection.failed.push((branch, e));
            }
        }
    }

    selection
}
