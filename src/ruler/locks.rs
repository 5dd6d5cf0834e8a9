//! Per-branch mutual exclusion
//!
//! The reconciler's create/update/delete sequence is not atomic, so two
//! reconciliations of the same (project, branch) must never interleave.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Key = (u64, String);
type Table = Mutex<HashMap<Key, Arc<AsyncMutex<()>>>>;

/// Lazily created async lock per (project ID, branch name)
///
/// An entry lives only while someone holds or waits for it.
#[derive(Default)]
pub struct BranchLocks {
    locks: Arc<Table>,
}

/// Held for the duration of one reconciliation
pub struct BranchGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: Key,
    table: Arc<Table>,
}

fn table(locks: &Table) -> MutexGuard<'_, HashMap<Key, Arc<AsyncMutex<()>>>> {
    locks.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("branch lock table poisoned, recovering");
        poisoned.into_inner()
    })
}

impl BranchLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no one else holds (project_id, branch)
    pub async fn lock(&self, project_id: u64, branch: &str) -> BranchGuard {
        let key = (project_id, branch.to_string());
        let lock = table(&self.locks).entry(key.clone()).or_default().clone();

        BranchGuard {
            guard: Some(lock.lock_owned().await),
            key,
            table: Arc::clone(&self.locks),
        }
    }

    /// Number of (project, branch) keys currently held or awaited
    pub fn len(&self) -> usize {
        table(&self.locks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for BranchGuard {
    fn drop(&mut self) {
        self.guard.take();

        // Waiters hold their own clone, so a count of one means the table's
        // entry is the last reference.
        let mut locks = table(&self.table);
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
    }
}
