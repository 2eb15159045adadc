//! Change detection over the provider's enumeration feed.
//!
//! The monitor keeps a snapshot mapping absolute location → (kind,
//! fingerprint). Each feed delivery is diffed against the snapshot: entries
//! new, changed, or gone are collected, translated to root-relative paths,
//! deduplicated, and — only when non-empty — delivered to observers as one
//! batch. When deliveries pile up faster than they are consumed, the monitor
//! drains to the newest enumeration and diffs once, trading intermediate
//! history for current-state correctness.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use cirrus_core::{EntryKind, Fingerprint, RootRelativePath};
use cirrus_provider::{ChangeFeed, Enumeration};

use crate::observers::ObserverRegistry;

/// Lifecycle of a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    /// Waiting for the initial enumeration that seeds the snapshot.
    Starting,
    Observing,
    /// Diffing a fresh enumeration against the snapshot.
    Updating,
    Stopped,
}

/// Out-of-band health signal. Feed failures surface here (and in the log),
/// never as a path batch, so a stalled feed does not masquerade as
/// "no changes".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorHealth {
    Ok,
    /// The provider feed closed or failed; no further batches will arrive.
    FeedLost(String),
    Stopped,
}

type Snapshot = HashMap<PathBuf, (EntryKind, Fingerprint)>;

/// Watches one feed for the lifetime of a drive root.
pub struct ChangeMonitor {
    state: watch::Receiver<MonitorState>,
    health: watch::Receiver<MonitorHealth>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChangeMonitor {
    /// Spawn the monitor task. `root` scopes which enumeration entries are
    /// relevant; anything outside it is ignored.
    pub fn start(root: PathBuf, feed: ChangeFeed, observers: Arc<ObserverRegistry>) -> Self {
        let (state_tx, state) = watch::channel(MonitorState::Idle);
        let (health_tx, health) = watch::channel(MonitorHealth::Ok);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_monitor(
            root,
            feed,
            observers,
            state_tx,
            health_tx,
            cancel.clone(),
        ));
        Self {
            state,
            health,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    /// Watch channel for state transitions (tests await `Observing`).
    pub fn state_watch(&self) -> watch::Receiver<MonitorState> {
        self.state.clone()
    }

    pub fn health(&self) -> MonitorHealth {
        self.health.borrow().clone()
    }

    pub fn health_watch(&self) -> watch::Receiver<MonitorHealth> {
        self.health.clone()
    }

    /// Stop and wait for the task to wind down. Idempotent; no batch is
    /// emitted after this returns.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let task = self.task.lock().expect("monitor task slot poisoned").take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for ChangeMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_monitor(
    root: PathBuf,
    mut feed: ChangeFeed,
    observers: Arc<ObserverRegistry>,
    state_tx: watch::Sender<MonitorState>,
    health_tx: watch::Sender<MonitorHealth>,
    cancel: CancellationToken,
) {
    let _ = state_tx.send(MonitorState::Starting);

    // Seed the snapshot; nothing is emitted for the initial enumeration.
    let mut snapshot: Snapshot = tokio::select! {
        _ = cancel.cancelled() => {
            finish(&feed, &state_tx, &health_tx);
            return;
        }
        first = feed.recv() => match first {
            Some(entries) => to_snapshot(feed.latest(entries), &root),
            None => {
                feed_lost(&health_tx, "change feed closed before the initial enumeration");
                finish(&feed, &state_tx, &health_tx);
                return;
            }
        },
    };
    let _ = state_tx.send(MonitorState::Observing);
    debug!(root = %root.display(), entries = snapshot.len(), "snapshot seeded");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = feed.recv() => {
                let Some(next) = next else {
                    feed_lost(&health_tx, "change feed closed");
                    break;
                };
                let _ = state_tx.send(MonitorState::Updating);
                // Drain to the newest enumeration before diffing.
                let fresh = to_snapshot(feed.latest(next), &root);
                let changed = diff(&snapshot, &fresh, &root);
                snapshot = fresh;
                if !changed.is_empty() && !cancel.is_cancelled() {
                    debug!(count = changed.len(), "delivering change batch");
                    observers.deliver(&changed);
                }
                let _ = state_tx.send(MonitorState::Observing);
            }
        }
    }

    finish(&feed, &state_tx, &health_tx);
}

fn finish(
    feed: &ChangeFeed,
    state_tx: &watch::Sender<MonitorState>,
    health_tx: &watch::Sender<MonitorHealth>,
) {
    feed.stop();
    let _ = state_tx.send(MonitorState::Stopped);
    // A FeedLost report outlives the stop; only a healthy monitor
    // transitions to plain Stopped.
    health_tx.send_if_modified(|h| {
        if *h == MonitorHealth::Ok {
            *h = MonitorHealth::Stopped;
            true
        } else {
            false
        }
    });
}

fn feed_lost(health_tx: &watch::Sender<MonitorHealth>, reason: &str) {
    warn!(reason, "monitor feed lost; no further batches will be emitted");
    let _ = health_tx.send(MonitorHealth::FeedLost(reason.to_string()));
}

fn to_snapshot(entries: Enumeration, root: &Path) -> Snapshot {
    entries
        .into_iter()
        .filter(|e| e.location.starts_with(root) && e.location != root)
        .map(|e| (e.location, (e.kind, e.fingerprint)))
        .collect()
}

fn diff(old: &Snapshot, new: &Snapshot, root: &Path) -> Vec<RootRelativePath> {
    let mut changed = BTreeSet::new();
    for (location, value) in new {
        if old.get(location) != Some(value) {
            if let Some(rel) = RootRelativePath::strip_root(root, location) {
                changed.insert(rel);
            }
        }
    }
    for location in old.keys() {
        if !new.contains_key(location) {
            if let Some(rel) = RootRelativePath::strip_root(root, location) {
                changed.insert(rel);
            }
        }
    }
    changed.into_iter().collect()
}
