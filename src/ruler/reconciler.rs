//! Protected branch reconciliation
//!
//! GitLab has no upsert for protected branches: creating an already
//! protected branch answers 409, and an accepted PATCH does not always change
//! the stored access levels. The reconciler escalates from the cheapest call
//! to the most destructive one:
//!
//! ```text
//! create ──201──▶ Created
//!   │409
//!   ▼
//! update ──2xx──▶ verify ──match──▶ Updated
//!   │error          │mismatch
//!   ▼               ▼
//! delete ──2xx/404──▶ create ──2xx──▶ Recreated
//! ```
//!
//! The branch is unprotected only between the delete and the final create.

use crate::error::{ProtectError, ProtectResult, ProtectStep};
use crate::gitlab::{AccessLevel, ApiResponse, GitLabApi, ProtectedBranch, ProtectionPayload};
use std::fmt;
use tracing::{debug, warn};

/// Access levels every selected branch must end up with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesiredProtection {
    pub push: AccessLevel,
    pub merge: AccessLevel,
}

impl DesiredProtection {
    pub fn new(push: AccessLevel, merge: AccessLevel) -> Self {
        Self { push, merge }
    }

    /// Whether `current` grants exactly the desired push and merge levels
    pub fn is_satisfied_by(&self, current: &ProtectedBranch) -> bool {
        current.push_level_is(self.push) && current.merge_level_is(self.merge)
    }
}

impl fmt::Display for DesiredProtection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "push: {}, merge: {}", self.push, self.merge)
    }
}

/// How the desired state was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The branch was not protected and now is
    Created,
    /// The existing rule was updated in place and verified
    Updated,
    /// The existing rule was deleted and created again
    Recreated,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Created => "created",
            Outcome::Updated => "updated",
            Outcome::Recreated => "recreated",
        })
    }
}

/// Drives one (project, branch) to the desired protection
pub struct Reconciler<'a, A: GitLabApi + ?Sized> {
    api: &'a A,
    desired: DesiredProtection,
}

impl<'a, A: GitLabApi + ?Sized> Reconciler<'a, A> {
    pub fn new(api: &'a A, desired: DesiredProtection) -> Self {
        Self { api, desired }
    }

    pub fn desired(&self) -> DesiredProtection {
        self.desired
    }

    /// Make the protected branch rule of `branch` match the desired levels.
    ///
    /// Callers must not run two reconciliations of the same (project, branch)
    /// at once.
    pub async fn reconcile(&self, project_id: u64, branch: &str) -> ProtectResult<Outcome> {
        let payload = ProtectionPayload::new(branch, self.desired.push, self.desired.merge);
        let body = serde_json::to_vec(&payload)?;

        let created = self.api.create_protected_branch(project_id, &body).await?;
        if created.is_created() {
            return Ok(Outcome::Created);
        }
        if !created.is_conflict() {
            return Err(api_error(ProtectStep::Create, created));
        }

        debug!(project_id, branch, "Branch already protected, updating");
        let updated = self
            .api
            .update_protected_branch(project_id, branch, &body)
            .await?;

        if updated.is_success() {
            if self.verify(project_id, branch).await? {
                return Ok(Outcome::Updated);
            }
            warn!(project_id, branch, desired = %self.desired, "Update was not applied, recreating protection");
        } else {
            warn!(
                project_id,
                branch,
                status = updated.status,
                "Update rejected, recreating protection"
            );
        }

        self.recreate(project_id, branch, &body).await
    }

    /// Re-read the rule and compare it with the desired levels.
    ///
    /// An error status or an undecodable body counts as "not applied".
    async fn verify(&self, project_id: u64, branch: &str) -> ProtectResult<bool> {
        let response = self.api.get_protected_branch(project_id, branch).await?;

        if !response.is_success() {
            debug!(project_id, branch, status = response.status, "Verification read failed");
            return Ok(false);
        }

        match serde_json::from_str::<ProtectedBranch>(&response.body) {
            Ok(current) => Ok(self.desired.is_satisfied_by(&current)),
            Err(e) => {
                debug!(project_id, branch, error = %e, "Verification body not understood");
                Ok(false)
            }
        }
    }

    async fn recreate(&self, project_id: u64, branch: &str, body: &[u8]) -> ProtectResult<Outcome> {
        let deleted = self.api.delete_protected_branch(project_id, branch).await?;
        if !deleted.is_success() && !deleted.is_not_found() {
            return Err(api_error(ProtectStep::Delete, deleted));
        }

        let created = self.api.create_protected_branch(project_id, body).await?;
        if !created.is_success() {
            return Err(api_error(ProtectStep::Recreate, created));
        }

        Ok(Outcome::Recreated)
    }
}

fn api_error(step: ProtectStep, response: ApiResponse) -> ProtectError {
    ProtectError::Api {
        step,
        status: response.status,
        body: response.body,
    }
}
