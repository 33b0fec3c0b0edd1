//! Per-tree serialization of structural mutations.
//!
//! A mutation names the tree roots it touches and acquires all of them at once,
//! so two operations never hold one root each while waiting for the other.

use std::collections::{BTreeSet, HashSet};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::types::AssociationId;

/// Lock table keyed by tree root id.
#[derive(Default)]
pub struct SubtreeLocks {
    held: Mutex<HashSet<AssociationId>>,
    released: Condvar,
}

/// Guard holding a set of tree roots; releases them on drop.
pub struct SubtreeGuard<'a> {
    locks: &'a SubtreeLocks,
    roots: BTreeSet<AssociationId>,
}

impl SubtreeLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires every root in `roots`, waiting at most `timeout`.
    ///
    /// Returns `None` if the roots could not all be acquired in time.
    pub fn acquire(
        &self,
        roots: BTreeSet<AssociationId>,
        timeout: Duration,
    ) -> Option<SubtreeGuard<'_>> {
        let deadline = Instant::now() + timeout;
        let mut held = self.held.lock();
        while roots.iter().any(|root| held.contains(root)) {
            if self.released.wait_until(&mut held, deadline).timed_out()
                && roots.iter().any(|root| held.contains(root))
            {
                return None;
            }
        }
        held.extend(roots.iter().cloned());
        trace!(roots = ?roots, "subtree locks acquired");
        Some(SubtreeGuard { locks: self, roots })
    }

    /// Number of roots currently locked.
    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }
}

impl SubtreeGuard<'_> {
    /// Roots covered by this guard.
    pub fn roots(&self) -> &BTreeSet<AssociationId> {
        &self.roots
    }
}

impl Drop for SubtreeGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.locks.held.lock();
        for root in &self.roots {
            held.remove(root);
        }
        drop(held);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn roots(raw: &[&str]) -> BTreeSet<AssociationId> {
        raw.iter().map(|id| AssociationId::new(*id)).collect()
    }

    #[test]
    fn disjoint_roots_do_not_block() {
        let locks = SubtreeLocks::new();
        let a = locks.acquire(roots(&["a"]), Duration::from_millis(10));
        let b = locks.acquire(roots(&["b"]), Duration::from_millis(10));
        assert!(a.is_some());
        assert!(b.is_some());
        assert_eq!(locks.held_count(), 2);
    }

    #[test]
    fn overlapping_roots_time_out() {
        let locks = SubtreeLocks::new();
        let _held = locks
            .acquire(roots(&["a", "b"]), Duration::from_millis(10))
            .unwrap();
        assert!(locks
            .acquire(roots(&["b", "c"]), Duration::from_millis(20))
            .is_none());
        assert_eq!(locks.held_count(), 2);
    }

    #[test]
    fn release_wakes_waiters() {
        let locks = Arc::new(SubtreeLocks::new());
        let guard = locks.acquire(roots(&["a"]), Duration::from_millis(10)).unwrap();
        let waiter = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || {
                locks
                    .acquire(roots(&["a"]), Duration::from_secs(5))
                    .map(|guard| guard.roots().len())
            })
        };
        thread::sleep(Duration::from_millis(20));
        drop(guard);
        assert_eq!(waiter.join().unwrap(), Some(1));
        assert_eq!(locks.held_count(), 0);
    }
}
