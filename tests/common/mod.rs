//! In-memory GitLab used by the reconciler and walker tests
//!
//! Models groups, projects, branches and protected branch rules, records
//! every call, and lets tests inject the misbehaviours the ruler must cope
//! with (ignored updates, failing deletes, listing errors, ...).

#![allow(dead_code)]

use async_trait::async_trait;
use branch_ruler::config::GitLabConfig;
use branch_ruler::error::{GitLabError, GitLabResult};
use branch_ruler::gitlab::{AccessLevel, ApiResponse, GitLabApi, Group, ListEndpoint, Project};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// One remote call, as seen by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetGroup(String),
    ListPage(ListEndpoint, u32),
    GetBranch(u64, String),
    Create(u64, String),
    Update(u64, String),
    GetProtected(u64, String),
    Delete(u64, String),
}

/// How the fake answers a PATCH on an existing rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMode {
    /// Store the new levels, answer 200
    #[default]
    Applies,
    /// Answer 200 but keep the old levels
    Ignored,
    /// Answer 200 and add the new levels next to the old ones
    Appends,
    /// Answer with this status and keep the old levels
    Rejected(u16),
}

/// Role levels of one protected branch, in the order GitLab lists them
#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    push: Vec<u32>,
    merge: Vec<u32>,
}

impl Rule {
    fn new(push: u32, merge: u32) -> Self {
        Self {
            push: vec![push],
            merge: vec![merge],
        }
    }
}

#[derive(Default)]
struct State {
    groups: HashMap<u64, Group>,
    subgroups: HashMap<u64, Vec<Group>>,
    projects: HashMap<u64, Vec<Project>>,
    branches: HashSet<(u64, String)>,
    protected: HashMap<(u64, String), Rule>,

    update_mode: UpdateMode,
    create_status: Option<u16>,
    recreate_status: Option<u16>,
    delete_status: Option<u16>,
    verify_transport_error: bool,
    update_transport_error: bool,
    failing_subgroup_listings: HashSet<u64>,
    failing_project_listings: HashSet<u64>,
    branch_check_status: HashMap<(u64, String), u16>,

    calls: Vec<Call>,
}

#[derive(Default)]
pub struct FakeGitLab {
    state: Mutex<State>,
}

pub fn group(id: u64, name: &str) -> Group {
    Group {
        id,
        name: name.to_string(),
        path: name.rsplit('/').next().unwrap_or(name).to_string(),
        full_path: name.to_string(),
        parent_id: None,
    }
}

pub fn project(id: u64, name: &str, default_branch: &str) -> Project {
    Project {
        id,
        name: name.to_string(),
        path_with_namespace: name.to_string(),
        default_branch: Some(default_branch.to_string()),
    }
}

impl FakeGitLab {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn add_group(&self, parent: Option<u64>, group: Group) {
        let mut state = self.state();
        if let Some(parent) = parent {
            state.subgroups.entry(parent).or_default().push(group.clone());
        }
        state.subgroups.entry(group.id).or_default();
        state.projects.entry(group.id).or_default();
        state.groups.insert(group.id, group);
    }

    /// Attach an existing group to another parent as well
    pub fn link_subgroup(&self, parent: u64, child: Group) {
        self.state().subgroups.entry(parent).or_default().push(child);
    }

    /// Add a project to a group; `branches` are the branches that exist
    pub fn add_project(&self, group_id: u64, project: Project, branches: &[&str]) {
        let mut state = self.state();
        for branch in branches {
            state.branches.insert((project.id, branch.to_string()));
        }
        state.projects.entry(group_id).or_default().push(project);
    }

    pub fn protect(&self, project_id: u64, branch: &str, push: AccessLevel, merge: AccessLevel) {
        self.state()
            .protected
            .insert((project_id, branch.to_string()), Rule::new(push.value(), merge.value()));
    }

    /// The (push, merge) levels of a rule holding one entry per field
    pub fn protection(&self, project_id: u64, branch: &str) -> Option<(AccessLevel, AccessLevel)> {
        self.protection_entries(project_id, branch).map(|(push, merge)| {
            assert_eq!((push.len(), merge.len()), (1, 1), "rule has several entries");
            (AccessLevel(push[0]), AccessLevel(merge[0]))
        })
    }

    /// Every role level stored for a rule
    pub fn protection_entries(&self, project_id: u64, branch: &str) -> Option<(Vec<u32>, Vec<u32>)> {
        self.state()
            .protected
            .get(&(project_id, branch.to_string()))
            .map(|rule| (rule.push.clone(), rule.merge.clone()))
    }

    pub fn set_update_mode(&self, mode: UpdateMode) {
        self.state().update_mode = mode;
    }

    /// Status for the first create of every reconciliation
    pub fn set_create_status(&self, status: u16) {
        self.state().create_status = Some(status);
    }

    /// Status for a create that follows a delete
    pub fn set_recreate_status(&self, status: u16) {
        self.state().recreate_status = Some(status);
    }

    pub fn set_delete_status(&self, status: u16) {
        self.state().delete_status = Some(status);
    }

    pub fn fail_verify_transport(&self) {
        self.state().verify_transport_error = true;
    }

    pub fn fail_update_transport(&self) {
        self.state().update_transport_error = true;
    }

    pub fn fail_subgroup_listing(&self, group_id: u64) {
        self.state().failing_subgroup_listings.insert(group_id);
    }

    pub fn fail_project_listing(&self, group_id: u64) {
        self.state().failing_project_listings.insert(group_id);
    }

    pub fn set_branch_check_status(&self, project_id: u64, branch: &str, status: u16) {
        self.state()
            .branch_check_status
            .insert((project_id, branch.to_string()), status);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn creates_for(&self, project_id: u64) -> usize {
        self.count(|c| matches!(c, Call::Create(p, _) if *p == project_id))
    }

    /// Group IDs in the order their projects were listed
    pub fn project_listing_order(&self) -> Vec<u64> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::ListPage(ListEndpoint::Projects(id), 1) => Some(*id),
                _ => None,
            })
            .collect()
    }

    fn rule_json(name: &str, rule: &Rule) -> String {
        let entries = |levels: &[u32]| -> Vec<Value> {
            levels.iter().map(|l| json!({"access_level": l})).collect()
        };
        json!({
            "id": 1,
            "name": name,
            "push_access_levels": entries(&rule.push),
            "merge_access_levels": entries(&rule.merge),
            "allow_force_push": false
        })
        .to_string()
    }

    fn parse_levels(body: &[u8]) -> (String, u32, u32) {
        let value: Value = serde_json::from_slice(body).unwrap();
        let level = |key: &str| value[key][0]["access_level"].as_u64().unwrap() as u32;
        (
            value["name"].as_str().unwrap_or_default().to_string(),
            level("allowed_to_push"),
            level("allowed_to_merge"),
        )
    }

    fn page<T: serde::Serialize>(items: &[T], page: u32, per_page: u32) -> ApiResponse {
        let per_page = per_page.max(1) as usize;
        let start = (page.saturating_sub(1) as usize) * per_page;
        let chunk: Vec<&T> = items.iter().skip(start).take(per_page).collect();
        let has_more = start + per_page < items.len();

        ApiResponse::new(200, serde_json::to_string(&chunk).unwrap())
            .with_next_page(has_more.then_some(page + 1))
    }
}

#[async_trait]
impl GitLabApi for FakeGitLab {
    async fn get_group(&self, id_or_path: &str) -> GitLabResult<Group> {
        let mut state = self.state();
        state.calls.push(Call::GetGroup(id_or_path.to_string()));

        state
            .groups
            .values()
            .find(|g| g.id.to_string() == id_or_path || g.full_path == id_or_path)
            .cloned()
            .ok_or(GitLabError::NotFound {
                resource: format!("group {}", id_or_path),
            })
    }

    async fn list_page(
        &self,
        endpoint: ListEndpoint,
        page: u32,
        per_page: u32,
    ) -> GitLabResult<ApiResponse> {
        let mut state = self.state();
        state.calls.push(Call::ListPage(endpoint, page));

        match endpoint {
            ListEndpoint::Subgroups(id) => {
                if state.failing_subgroup_listings.contains(&id) {
                    return Ok(ApiResponse::new(500, "subgroups unavailable"));
                }
                let items = state.subgroups.get(&id).cloned().unwrap_or_default();
                Ok(Self::page(&items, page, per_page))
            }
            ListEndpoint::Projects(id) => {
                if state.failing_project_listings.contains(&id) {
                    return Ok(ApiResponse::new(500, "projects unavailable"));
                }
                let items = state.projects.get(&id).cloned().unwrap_or_default();
                Ok(Self::page(&items, page, per_page))
            }
        }
    }

    async fn get_branch(&self, project_id: u64, branch: &str) -> GitLabResult<ApiResponse> {
        let mut state = self.state();
        let key = (project_id, branch.to_string());
        state.calls.push(Call::GetBranch(project_id, branch.to_string()));

        if let Some(status) = state.branch_check_status.get(&key) {
            return Ok(ApiResponse::new(*status, "injected"));
        }
        if state.branches.contains(&key) {
            Ok(ApiResponse::new(200, json!({"name": branch}).to_string()))
        } else {
            Ok(ApiResponse::new(404, r#"{"message":"404 Branch Not Found"}"#))
        }
    }

    async fn create_protected_branch(
        &self,
        project_id: u64,
        body: &[u8],
    ) -> GitLabResult<ApiResponse> {
        let (name, push, merge) = Self::parse_levels(body);
        let mut state = self.state();
        let after_delete = matches!(state.calls.last(), Some(Call::Delete(..)));
        state.calls.push(Call::Create(project_id, name.clone()));

        let injected = if after_delete {
            state.recreate_status
        } else {
            state.create_status
        };
        if let Some(status) = injected {
            return Ok(ApiResponse::new(status, "injected"));
        }

        let key = (project_id, name.clone());
        if state.protected.contains_key(&key) {
            return Ok(ApiResponse::new(
                409,
                r#"{"message":"Protected branch 'main' already exists"}"#,
            ));
        }
        let rule = Rule::new(push, merge);
        let body = Self::rule_json(&name, &rule);
        state.protected.insert(key, rule);
        Ok(ApiResponse::new(201, body))
    }

    async fn update_protected_branch(
        &self,
        project_id: u64,
        branch: &str,
        body: &[u8],
    ) -> GitLabResult<ApiResponse> {
        let (_, push, merge) = Self::parse_levels(body);
        let mut state = self.state();
        let key = (project_id, branch.to_string());
        state.calls.push(Call::Update(project_id, branch.to_string()));

        if state.update_transport_error {
            return Err(GitLabError::Timeout { timeout_secs: 30 });
        }

        let current = state
            .protected
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Rule::new(push, merge));

        match state.update_mode {
            UpdateMode::Rejected(status) => Ok(ApiResponse::new(status, "update rejected")),
            UpdateMode::Ignored => Ok(ApiResponse::new(200, Self::rule_json(branch, &current))),
            UpdateMode::Appends => {
                let mut rule = current;
                if !rule.push.contains(&push) {
                    rule.push.push(push);
                }
                if !rule.merge.contains(&merge) {
                    rule.merge.push(merge);
                }
                let body = Self::rule_json(branch, &rule);
                state.protected.insert(key, rule);
                Ok(ApiResponse::new(200, body))
            }
            UpdateMode::Applies => {
                let rule = Rule::new(push, merge);
                let body = Self::rule_json(branch, &rule);
                state.protected.insert(key, rule);
                Ok(ApiResponse::new(200, body))
            }
        }
    }

    async fn get_protected_branch(
        &self,
        project_id: u64,
        branch: &str,
    ) -> GitLabResult<ApiResponse> {
        let mut state = self.state();
        state.calls.push(Call::GetProtected(project_id, branch.to_string()));

        if state.verify_transport_error {
            return Err(GitLabError::Timeout { timeout_secs: 30 });
        }

        match state.protected.get(&(project_id, branch.to_string())) {
            Some(rule) => Ok(ApiResponse::new(200, Self::rule_json(branch, rule))),
            None => Ok(ApiResponse::new(404, r#"{"message":"404 Not found"}"#)),
        }
    }

    async fn delete_protected_branch(
        &self,
        project_id: u64,
        branch: &str,
    ) -> GitLabResult<ApiResponse> {
        let mut state = self.state();
        state.calls.push(Call::Delete(project_id, branch.to_string()));

        if let Some(status) = state.delete_status {
            return Ok(ApiResponse::new(status, "injected"));
        }

        match state.protected.remove(&(project_id, branch.to_string())) {
            Some(_) => Ok(ApiResponse::new(204, "")),
            None => Ok(ApiResponse::new(404, r#"{"message":"404 Not found"}"#)),
        }
    }
}

/// GitLab settings pointing at a wiremock server
pub fn mock_config(uri: String) -> GitLabConfig {
    GitLabConfig {
        url: uri,
        token: Some("test-token".into()),
        timeout_secs: 5,
        ..Default::default()
    }
}
