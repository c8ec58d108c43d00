//! Per-subsystem serialization.
//!
//! Connect and Disconnect for the same target NQN must not interleave: a
//! teardown that sees an empty bookkeeping directory while a concurrent
//! connect is about to record its session would drop a live controller.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Lock table keyed by subsystem NQN.
///
/// Entries live only while some caller holds or waits for them.
#[derive(Debug, Clone, Default)]
pub struct SubsystemLocks {
    locks: Arc<LockMap>,
}

impl SubsystemLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until `nqn` is free and returns its guard.
    pub fn lock(&self, nqn: &str) -> SubsystemGuard {
        // Clone the Arc out so the map shard is not held while blocking.
        let lock = self
            .locks
            .entry(nqn.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        SubsystemGuard {
            guard: Some(lock.lock_arc()),
            locks: Arc::clone(&self.locks),
            nqn: nqn.to_string(),
        }
    }

    /// Number of subsystems currently locked or waited on.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns true if no subsystem is locked.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Guard held while operating on one subsystem.
///
/// Dropping the last guard for an NQN also drops its table entry.
pub struct SubsystemGuard {
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
    locks: Arc<LockMap>,
    nqn: String,
}

impl fmt::Debug for SubsystemGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubsystemGuard")
            .field("nqn", &self.nqn)
            .finish()
    }
}

impl Drop for SubsystemGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold their own clone, so a count of one means only the map is left.
        self.locks
            .remove_if(&self.nqn, |_, lock| Arc::strong_count(lock) == 1);
    }
}
