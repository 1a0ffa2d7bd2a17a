//! Per-scope mutual exclusion
//!
//! Full detection deletes and recreates every community of a scope, so an
//! incremental assignment running at the same time could write members into
//! communities that are about to vanish. Both paths acquire the scope's lock
//! from a shared [`ScopeLocks`] registry. Different scopes never contend.
//! A scope's entry is dropped from the registry once its last guard is
//! released and nobody is waiting on it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

type Registry = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Registry of per-scope async locks
///
/// Cloning shares the registry.
#[derive(Clone, Default)]
pub struct ScopeLocks {
    locks: Registry,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and hold the lock of a scope
    pub async fn acquire(&self, scope_id: &str) -> ScopeGuard {
        let lock = self.lock_for(scope_id);
        let guard = lock.lock_owned().await;
        debug!(scope_id = %scope_id, "Scope lock acquired");

        ScopeGuard {
            scope_id: scope_id.to_string(),
            guard: Some(guard),
            registry: Arc::clone(&self.locks),
        }
    }

    /// Take the lock only if nobody holds it
    pub fn try_acquire(&self, scope_id: &str) -> Option<ScopeGuard> {
        let lock = self.lock_for(scope_id);
        let acquired = lock.clone().try_lock_owned().ok().map(|guard| ScopeGuard {
            scope_id: scope_id.to_string(),
            guard: Some(guard),
            registry: Arc::clone(&self.locks),
        });
        drop(lock);
        if acquired.is_none() {
            prune(&self.locks, scope_id);
        }
        acquired
    }

    /// Whether a scope's lock is currently held
    pub fn is_locked(&self, scope_id: &str) -> bool {
        registry(&self.locks)
            .get(scope_id)
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    /// Number of scopes with a live registry entry
    pub fn tracked_scopes(&self) -> usize {
        registry(&self.locks).len()
    }

    fn lock_for(&self, scope_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = registry(&self.locks);
        locks
            .entry(scope_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

fn registry(locks: &Registry) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
    locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Remove a scope's entry when only the registry still references it.
/// Waiters hold a clone, so a contended lock is never removed.
fn prune(locks: &Registry, scope_id: &str) {
    let mut locks = registry(locks);
    if locks
        .get(scope_id)
        .is_some_and(|lock| Arc::strong_count(lock) == 1)
    {
        locks.remove(scope_id);
    }
}

impl fmt::Debug for ScopeLocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeLocks")
            .field("scopes", &self.tracked_scopes())
            .finish()
    }
}

/// Held scope lock, released on drop
pub struct ScopeGuard {
    scope_id: String,
    guard: Option<OwnedMutexGuard<()>>,
    registry: Registry,
}

impl ScopeGuard {
    pub fn scope_id(&self) -> &str {
        &self.scope_id
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        prune(&self.registry, &self.scope_id);
        debug!(scope_id = %self.scope_id, "Scope lock released");
    }
}

impl fmt::Debug for ScopeGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeGuard").field("scope_id", &self.scope_id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_scope_is_exclusive() {
        let locks = ScopeLocks::new();

        let guard = locks.acquire("scope-1").await;
        assert_eq!(guard.scope_id(), "scope-1");
        assert!(locks.is_locked("scope-1"));
        assert!(locks.try_acquire("scope-1").is_none());

        drop(guard);
        assert!(!locks.is_locked("scope-1"));
        assert!(locks.try_acquire("scope-1").is_some());
    }

    #[tokio::test]
    async fn test_different_scopes_do_not_contend() {
        let locks = ScopeLocks::new();

        let _a = locks.acquire("scope-a").await;
        let b = locks.try_acquire("scope-b");
        assert!(b.is_some());
    }

    #[tokio::test]
    async fn test_clones_share_registry() {
        let locks = ScopeLocks::new();
        let shared = locks.clone();

        let guard = locks.acquire("scope-1").await;
        let waiter = tokio::spawn(async move {
            let _guard = shared.acquire("scope-1").await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should acquire after release")
            .unwrap();
    }

    #[tokio::test]
    async fn test_released_scopes_leave_the_registry() {
        let locks = ScopeLocks::new();

        for n in 0..10 {
            let _guard = locks.acquire(&format!("scope-{}", n)).await;
        }
        assert_eq!(locks.tracked_scopes(), 0);

        let held = locks.acquire("scope-held").await;
        let _other = locks.try_acquire("scope-other");
        assert!(locks.try_acquire("scope-held").is_none());
        assert_eq!(locks.tracked_scopes(), 2);

        drop(held);
        assert_eq!(locks.tracked_scopes(), 1);
    }

    #[tokio::test]
    async fn test_waiter_keeps_entry_alive() {
        let locks = ScopeLocks::new();
        let shared = locks.clone();

        let guard = locks.acquire("scope-1").await;
        let waiter = tokio::spawn(async move {
            let _guard = shared.acquire("scope-1").await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(guard);
        assert_eq!(locks.tracked_scopes(), 1);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should acquire after release")
            .unwrap();
        assert_eq!(locks.tracked_scopes(), 0);
    }
}
