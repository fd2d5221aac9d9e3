//! Per-task mutual exclusion for callback publication.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use vgen_models::TaskId;

struct LockEntry {
    mutex: Arc<Mutex<()>>,
    /// Callers holding or waiting on `mutex`
    users: usize,
}

/// Lazily created async mutex per task ID.
///
/// Every caller of [`TaskLocks::lock`] counts as a user from the moment it
/// asks until its guard is dropped or its wait is cancelled. The entry is
/// removed when the last user goes away.
#[derive(Clone, Default)]
pub struct TaskLocks {
    locks: Arc<std::sync::Mutex<HashMap<TaskId, LockEntry>>>,
}

/// One caller's claim on a task's entry; released on drop.
struct Lease {
    task_id: TaskId,
    locks: TaskLocks,
}

/// Guard returned by [`TaskLocks::lock`]; releases the task on drop.
pub struct TaskLockGuard {
    // Field order matters: unlock before giving up the lease.
    _guard: OwnedMutexGuard<()>,
    _lease: Lease,
}

impl TaskLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `task_id`.
    ///
    /// Cancelling the returned future while it waits releases its claim.
    pub async fn lock(&self, task_id: &TaskId) -> TaskLockGuard {
        let (mutex, lease) = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            let entry = locks.entry(task_id.clone()).or_insert_with(|| LockEntry {
                mutex: Arc::new(Mutex::new(())),
                users: 0,
            });
            entry.users += 1;
            (
                Arc::clone(&entry.mutex),
                Lease {
                    task_id: task_id.clone(),
                    locks: self.clone(),
                },
            )
        };

        let guard = mutex.lock_owned().await;

        TaskLockGuard {
            _guard: guard,
            _lease: lease,
        }
    }

    /// Number of tasks with a live lock entry.
    pub fn active(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut locks = self.locks.locks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = locks.get_mut(&self.task_id) {
            entry.users = entry.users.saturating_sub(1);
            if entry.users == 0 {
                locks.remove(&self.task_id);
            }
        }
    }
}
