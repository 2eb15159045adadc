//! Per-path coordination locks.
//!
//! The coordination primitive is a map of async `RwLock`s keyed by absolute
//! location: shared scopes for reads, exclusive scopes for writes and for the
//! sync applier. Guards are owned (not borrowed from the map), so a scope can
//! be held across await points and is released by drop on every exit path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::AccessKind;

/// A held coordination scope for exactly one location.
///
/// Dropping the guard releases the scope.
#[derive(Debug)]
pub struct ScopeGuard {
    kind: AccessKind,
    _inner: GuardInner,
}

#[derive(Debug)]
enum GuardInner {
    Shared(OwnedRwLockReadGuard<()>),
    Exclusive(OwnedRwLockWriteGuard<()>),
}

impl ScopeGuard {
    pub fn kind(&self) -> AccessKind {
        self.kind
    }
}

/// Registry of per-location locks.
///
/// Entries are created on first touch and pruned once nobody holds them, so
/// the map does not grow with every path ever coordinated.
#[derive(Debug, Default)]
pub struct PathLockMap {
    locks: Mutex<HashMap<PathBuf, Arc<RwLock<()>>>>,
}

impl PathLockMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, location: &Path) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().expect("path lock map poisoned");
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(location.to_path_buf()).or_default().clone()
    }

    /// Wait for and take a scope on `location`.
    ///
    /// Two exclusive scopes (or an exclusive and a shared one) for the same
    /// location never overlap; scopes for different locations are independent.
    /// No FIFO fairness is promised.
    pub async fn acquire(&self, location: &Path, kind: AccessKind) -> ScopeGuard {
        let lock = self.entry(location);
        let inner = match kind {
            AccessKind::Shared => GuardInner::Shared(lock.read_owned().await),
            AccessKind::Exclusive => GuardInner::Exclusive(lock.write_owned().await),
        };
        ScopeGuard { kind, _inner: inner }
    }

    /// Number of locations currently holding a live lock entry.
    pub fn live_entries(&self) -> usize {
        let locks = self.locks.lock().expect("path lock map poisoned");
        locks
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}
