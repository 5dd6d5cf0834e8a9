//! Branch protection enforcement
//!
//! - [`lister`]: paginated collection fetches
//! - [`selector`]: which branches of a project to protect
//! - [`reconciler`]: the create / update / verify / recreate state machine
//! - [`walker`]: depth-first traversal of the group tree
//! - [`locks`]: per-(project, branch) exclusion for parallel runs

pub mod lister;
pub mod locks;
pub mod reconciler;
pub mod selector;
pub mod walker;

pub use lister::fetch_all;
pub use locks::{BranchGuard, BranchLocks};
pub use reconciler::{DesiredProtection, Outcome, Reconciler};
pub use selector::{Selection, branch_exists, candidates, select_branches};
pub use walker::{GroupWalker, WalkOptions, WalkReport};

use crate::error::GitLabResult;
use crate::gitlab::{GitLabApi, Group};

/// Look up the root group by numeric ID or full path
pub async fn resolve_root<A>(api: &A, id_or_path: &str) -> GitLabResult<Group>
where
    A: GitLabApi + ?Sized,
{
    api.get_group(id_or_path.trim().trim_matches('/')).await
}
