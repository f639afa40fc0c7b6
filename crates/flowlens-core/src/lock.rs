use crate::error::ErrorCode;
use crate::model::WorkItemId;
use std::{
    collections::HashSet,
    sync::{Condvar, Mutex},
    time::{Duration, Instant},
};

/// Errors raised while waiting for a per-item rebuild lock.
#[derive(Debug)]
pub enum LockError {
    Timeout { item: WorkItemId, waited: Duration },
    Poisoned,
}

impl LockError {
    /// Machine-readable code associated with this lock error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } => ErrorCode::LockContention,
            Self::Poisoned => ErrorCode::InternalUnexpected,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { item, waited } => write!(
                f,
                "{}: rebuild lock for {} timed out after {:?}",
                self.code().code(),
                item,
                waited
            ),
            Self::Poisoned => write!(f, "{}: rebuild lock registry poisoned", self.code().code()),
        }
    }
}

impl std::error::Error for LockError {}

/// Registry of work items whose effort records are being rebuilt.
///
/// At most one rebuild per item runs at a time; rebuilds of different items
/// never wait on each other.
#[derive(Debug)]
pub struct RebuildLocks {
    held: Mutex<HashSet<WorkItemId>>,
    released: Condvar,
    timeout: Duration,
}

impl Default for RebuildLocks {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl RebuildLocks {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
            timeout,
        }
    }

    /// Block until `item` is free, then hold it until the guard drops.
    ///
    /// # Errors
    ///
    /// [`LockError::Timeout`] when the item stays held past the timeout.
    pub fn acquire(&self, item: &WorkItemId) -> Result<RebuildGuard<'_>, LockError> {
        let start = Instant::now();
        let mut held = self.held.lock().map_err(|_| LockError::Poisoned)?;

        while held.contains(item) {
            let waited = start.elapsed();
            let Some(remaining) = self.timeout.checked_sub(waited) else {
                return Err(LockError::Timeout {
                    item: item.clone(),
                    waited,
                });
            };
            let (next, result) = self
                .released
                .wait_timeout(held, remaining)
                .map_err(|_| LockError::Poisoned)?;
            held = next;
            if result.timed_out() && held.contains(item) {
                return Err(LockError::Timeout {
                    item: item.clone(),
                    waited: start.elapsed(),
                });
            }
        }

        held.insert(item.clone());
        tracing::trace!(item = %item, "rebuild lock acquired");
        Ok(RebuildGuard {
            locks: self,
            item: item.clone(),
        })
    }

    /// Returns `true` if a rebuild currently holds `item`.
    #[must_use]
    pub fn is_held(&self, item: &WorkItemId) -> bool {
        self.held.lock().is_ok_and(|held| held.contains(item))
    }
}

/// RAII guard for a per-item rebuild lock.
#[derive(Debug)]
pub struct RebuildGuard<'a> {
    locks: &'a RebuildLocks,
    item: WorkItemId,
}

impl RebuildGuard<'_> {
    #[must_use]
    pub const fn item(&self) -> &WorkItemId {
        &self.item
    }
}

impl Drop for RebuildGuard<'_> {
    fn drop(&mut self) {
        let mut held = match self.locks.held.lock() {
            Ok(held) => held,
            Err(poisoned) => poisoned.into_inner(),
        };
        held.remove(&self.item);
        drop(held);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn guard_releases_on_drop() {
        let locks = RebuildLocks::default();
        let item = WorkItemId::new("D-1");
        {
            let guard = locks.acquire(&item).expect("acquire");
            assert_eq!(guard.item(), &item);
            assert!(locks.is_held(&item));
        }
        assert!(!locks.is_held(&item));
        let _again = locks.acquire(&item).expect("re-acquire");
    }

    #[test]
    fn different_items_do_not_contend() {
        let locks = RebuildLocks::new(Duration::from_millis(10));
        let _a = locks.acquire(&WorkItemId::new("D-1")).expect("a");
        let _b = locks.acquire(&WorkItemId::new("D-2")).expect("b");
    }

    #[test]
    fn same_item_times_out_while_held() {
        let locks = RebuildLocks::new(Duration::from_millis(20));
        let item = WorkItemId::new("D-1");
        let _guard = locks.acquire(&item).expect("first");
        let err = locks.acquire(&item).expect_err("second must time out");
        assert_eq!(err.code(), ErrorCode::LockContention);
        assert!(err.to_string().starts_with("E5001"));
    }

    #[test]
    fn waiter_proceeds_after_release() {
        let locks = Arc::new(RebuildLocks::new(Duration::from_secs(5)));
        let item = WorkItemId::new("D-1");
        let guard = locks.acquire(&item).expect("first");

        let waiter = {
            let locks = Arc::clone(&locks);
            let item = item.clone();
            thread::spawn(move || locks.acquire(&item).map(|_| ()).is_ok())
        };

        thread::sleep(Duration::from_millis(20));
        drop(guard);
        assert!(waiter.join().expect("thread"));
    }
}
