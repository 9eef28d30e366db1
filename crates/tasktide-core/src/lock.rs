//! Per-task mutation locks.
//!
//! Status toggles and deletes on one task share a key, so at most one of
//! them is in flight for that task at a time. Different tasks never contend.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::task::TaskId;

#[derive(Debug, Clone, Default)]
pub struct MutationLocks {
    held: Arc<Mutex<HashSet<TaskId>>>,
}

impl MutationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` while another holder has the key. The lock is released when the
    /// guard drops, whichever way the guarded operation ends.
    pub fn try_acquire(&self, id: &TaskId) -> Option<LockGuard> {
        let mut held = self.held.lock();
        if !held.insert(id.clone()) {
            trace!(id = %id, "mutation lock already held");
            return None;
        }
        trace!(id = %id, "mutation lock acquired");
        Some(LockGuard {
            held: Arc::clone(&self.held),
            id: id.clone(),
        })
    }

    pub fn is_locked(&self, id: &TaskId) -> bool {
        self.held.lock().contains(id)
    }

    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }
}

#[derive(Debug)]
pub struct LockGuard {
    held: Arc<Mutex<HashSet<TaskId>>>,
    id: TaskId,
}

impl LockGuard {
    pub fn id(&self) -> &TaskId {
        &self.id
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.held.lock().remove(&self.id);
        trace!(id = %self.id, "mutation lock released");
    }
}
