//! Per-project review locks.
//!
//! One async mutex per project id, created lazily and never removed
//! (the key space is bounded by active projects). The map itself is
//! behind a short-held std mutex: lookup-or-insert only, never across
//! a review.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Mutex as AsyncMutex;

#[derive(Default)]
pub struct ProjectLocks {
    inner: Mutex<HashMap<u64, Arc<AsyncMutex<()>>>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock for this project, creating it on first use.
    /// Callers hold the returned mutex for the duration of one review.
    pub fn lock_for(&self, project_id: u64) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(project_id).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    async fn timed_hold(locks: Arc<ProjectLocks>, project_id: u64) -> (Instant, Instant) {
        let lock = locks.lock_for(project_id);
        let _held = lock.lock().await;
        let enter = Instant::now();
        tokio::time::sleep(Duration::from_millis(100)).await;
        (enter, Instant::now())
    }

    #[tokio::test]
    async fn same_project_reviews_never_overlap() {
        let locks = Arc::new(ProjectLocks::new());
        let a = tokio::spawn(timed_hold(locks.clone(), 7));
        let b = tokio::spawn(timed_hold(locks.clone(), 7));
        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        // One window ends before the other begins.
        assert!(a.1 <= b.0 || b.1 <= a.0);
    }

    #[tokio::test]
    async fn distinct_projects_run_concurrently() {
        let locks = Arc::new(ProjectLocks::new());
        let start = Instant::now();
        let a = tokio::spawn(timed_hold(locks.clone(), 1));
        let b = tokio::spawn(timed_hold(locks.clone(), 2));
        a.await.unwrap();
        b.await.unwrap();
        // Serialized execution would need at least 200ms.
        assert!(start.elapsed() < Duration::from_millis(190));
    }

    #[tokio::test]
    async fn lock_is_released_after_use() {
        let locks = ProjectLocks::new();
        {
            let lock = locks.lock_for(3);
            let _held = lock.lock().await;
        }
        let lock = locks.lock_for(3);
        assert!(lock.try_lock().is_ok());
    }

    #[test]
    fn same_id_returns_same_lock() {
        let locks = ProjectLocks::new();
        assert!(Arc::ptr_eq(&locks.lock_for(5), &locks.lock_for(5)));
        assert!(!Arc::ptr_eq(&locks.lock_for(5), &locks.lock_for(6)));
    }
}
