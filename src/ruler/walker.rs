//! Group tree traversal
//!
//! Visits the root group and every descendant subgroup depth-first, parent
//! before children, and reconciles branch protection for each project found.
//! Failures are logged and counted; they never stop the walk.

use crate::config::{BranchPolicy, ProtectionConfig};
use crate::gitlab::{GitLabApi, Group, ListEndpoint, Project};
use crate::ruler::lister::fetch_all;
use crate::ruler::locks::BranchLocks;
use crate::ruler::reconciler::{DesiredProtection, Outcome, Reconciler};
use crate::ruler::selector::select_branches;
use futures::StreamExt;
use futures::stream;
use std::collections::HashSet;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Settings shared read-only by every reconciliation of a run
#[derive(Debug, Clone, Copy)]
pub struct WalkOptions {
    pub desired: DesiredProtection,
    pub policy: BranchPolicy,
    pub per_page: u32,
    pub concurrency: usize,
    pub dedupe_projects: bool,
}

impl WalkOptions {
    pub fn from_config(config: &ProtectionConfig) -> Self {
        Self {
            desired: DesiredProtection::new(config.push_level(), config.merge_level()),
            policy: config.branch_policy,
            per_page: config.page_size(),
            concurrency: config.concurrency.max(1),
            dedupe_projects: config.dedupe_projects,
        }
    }
}

/// Counters collected during a walk, for the closing log line and tests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkReport {
    pub groups_visited: usize,
    pub projects_seen: usize,
    pub projects_skipped: usize,
    pub branches_absent: usize,
    pub created: usize,
    pub updated: usize,
    pub recreated: usize,
    pub listing_failures: usize,
    pub existence_failures: usize,
    pub reconcile_failures: usize,
    pub cancelled: bool,
}

impl WalkReport {
    /// Branches that reached the desired state
    pub fn branches_protected(&self) -> usize {
        self.created + self.updated + self.recreated
    }

    pub fn failures(&self) -> usize {
        self.listing_failures + self.existence_failures + self.reconcile_failures
    }

    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Recreated => self.recreated += 1,
        }
    }

    fn merge(&mut self, other: WalkReport) {
        self.groups_visited += other.groups_visited;
        self.projects_seen += other.projects_seen;
        self.projects_skipped += other.projects_skipped;
        self.branches_absent += other.branches_absent;
        self.created += other.created;
        self.updated += other.updated;
        self.recreated += other.recreated;
        self.listing_failures += other.listing_failures;
        self.existence_failures += other.existence_failures;
        self.reconcile_failures += other.reconcile_failures;
        self.cancelled |= other.cancelled;
    }
}

/// Walks a group hierarchy and enforces branch protection
pub struct GroupWalker<'a, A: GitLabApi + ?Sized> {
    api: &'a A,
    options: WalkOptions,
    locks: BranchLocks,
    claimed_projects: Mutex<HashSet<u64>>,
    cancel: CancellationToken,
}

impl<'a, A: GitLabApi + ?Sized> GroupWalker<'a, A> {
    pub fn new(api: &'a A, options: WalkOptions) -> Self {
        Self {
            api,
            options,
            locks: BranchLocks::new(),
            claimed_projects: Mutex::new(HashSet::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Stop the walk early when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Visit `root` and all of its descendants.
    ///
    /// Uses an explicit stack rather than recursion. Subgroups are pushed in
    /// reverse listing order so they are visited in listing order.
    pub async fn walk(&self, root: Group) -> WalkReport {
        let mut report = WalkReport::default();
        let mut visited = HashSet::new();
        let mut stack = vec![root];

        while let Some(group) = stack.pop() {
            if self.cancel.is_cancelled() {
                warn!(pending = stack.len() + 1, "Walk cancelled, remaining groups skipped");
                report.cancelled = true;
                break;
            }

            if !visited.insert(group.id) {
                warn!(group_id = group.id, group = %group.name, "Group already visited, skipping");
                continue;
            }

            info!(group_id = group.id, group = %group.name, "Processing group");
            report.groups_visited += 1;

            self.process_projects(&group, &mut report).await;

            match fetch_all::<Group, A>(self.api, ListEndpoint::Subgroups(group.id), self.options.per_page).await {
                Ok(subgroups) => stack.extend(subgroups.into_iter().rev()),
                Err(e) => {
                    error!(
                        group_id = group.id,
                        group = %group.name,
                        error = %e,
                        "Failed to list subgroups"
                    );
                    report.listing_failures += 1;
                }
            }
        }

        report
    }

    async fn process_projects(&self, group: &Group, report: &mut WalkReport) {
        let projects = match fetch_all::<Project, A>(
            self.api,
            ListEndpoint::Projects(group.id),
            self.options.per_page,
        )
        .await
        {
            Ok(projects) => projects,
            Err(e) => {
                error!(
                    group_id = group.id,
                    group = %group.name,
                    error = %e,
                    "Failed to list projects"
                );
                report.listing_failures += 1;
                return;
            }
        };

        let mut results = stream::iter(projects.iter().map(|p| self.process_project(p)))
            .buffer_unordered(self.options.concurrency);

        while let Some(project_report) = results.next().await {
            report.merge(project_report);
        }
    }

    async fn process_project(&self, project: &Project) -> WalkReport {
        let mut report = WalkReport::default();

        if self.cancel.is_cancelled() {
            report.cancelled = true;
            return report;
        }

        if self.options.dedupe_projects && !self.claim(project.id) {
            info!(project_id = project.id, project = %project.name, "Project already reconciled, skipping");
            report.projects_skipped += 1;
            return report;
        }
        report.projects_seen += 1;

        let selection = select_branches(self.api, self.options.policy, project).await;
        report.branches_absent += selection.missing.len();
        report.existence_failures += selection.failed.len();

        let reconciler = Reconciler::new(self.api, self.options.desired);
        for branch in &selection.existing {
            let _guard = self.locks.lock(project.id, branch).await;

            match reconciler.reconcile(project.id, branch).await {
                Ok(outcome) => {
                    info!(
                        project_id = project.id,
                        project = %project.name,
                        %branch,
                        %outcome,
                        "Branch protection enforced"
                    );
                    report.record(outcome);
                }
                Err(e) => {
                    error!(
                        project_id = project.id,
                        project = %project.name,
                        %branch,
                        error = %e,
                        "Failed to enforce branch protection"
                    );
                    report.reconcile_failures += 1;
                }
            }
        }

        report
    }

    /// `true` the first time a project ID is seen in this run
    fn claim(&self, project_id: u64) -> bool {
        self.claimed_projects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(project_id)
    }
}
