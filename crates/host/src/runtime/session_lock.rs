//! Per-session turn serialization.
//!
//! Each session maps to a `Semaphore(1)`. A turn holds the permit for
//! its entire duration; a second turn arriving while one is in flight is
//! rejected with [`SessionBusy`] rather than queued. Sentinel-driven
//! turns on the reserved session take the same lock as human turns.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

pub struct SessionLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for SessionLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the session's run lock without waiting. The permit
    /// auto-releases on drop at turn end.
    pub fn try_acquire(&self, session: &str) -> Result<OwnedSemaphorePermit, SessionBusy> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(session.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        sem.try_acquire_owned().map_err(|e| match e {
            TryAcquireError::NoPermits | TryAcquireError::Closed => SessionBusy,
        })
    }

    /// Whether a turn currently holds the session's permit.
    pub fn is_busy(&self, session: &str) -> bool {
        self.locks
            .lock()
            .get(session)
            .is_some_and(|sem| sem.available_permits() == 0)
    }
}

/// A turn is already in progress on this session.
#[derive(Debug)]
pub struct SessionBusy;

impl std::fmt::Display for SessionBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session is busy: a turn is already in progress")
    }
}

impl std::error::Error for SessionBusy {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequential_turns_succeed() {
        let map = SessionLockMap::new();
        let p1 = map.try_acquire("s1").unwrap();
        drop(p1);
        let p2 = map.try_acquire("s1").unwrap();
        drop(p2);
    }

    #[tokio::test]
    async fn concurrent_same_session_is_rejected() {
        let map = SessionLockMap::new();
        let _held = map.try_acquire("s1").unwrap();
        assert!(map.is_busy("s1"));
        assert!(map.try_acquire("s1").is_err());
    }

    #[tokio::test]
    async fn different_sessions_run_concurrently() {
        let map = SessionLockMap::new();
        let _p1 = map.try_acquire("s1").unwrap();
        let _p2 = map.try_acquire("s2").unwrap();
        assert!(map.is_busy("s1"));
        assert!(map.is_busy("s2"));
    }

    #[tokio::test]
    async fn permit_drop_frees_the_session() {
        let map = SessionLockMap::new();
        let permit = map.try_acquire("s1").unwrap();
        drop(permit);
        assert!(!map.is_busy("s1"));
        assert!(map.try_acquire("s1").is_ok());
    }
}
