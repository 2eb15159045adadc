//! Storage provider boundary for cirrus.
//!
//! The drive core never talks to a sync backend directly; it goes through
//! [`StorageProvider`], which captures the three capabilities the external
//! synchronization agent's platform exposes:
//!
//! 1. **Coordinated access** — a per-location exclusion scope that keeps this
//!    process and the sync agent from touching the same path at once
//!    ([`StorageProvider::coordinate`]).
//! 2. **Materialization** — fetching a remote-only entry's bytes so a read
//!    can proceed against local storage ([`StorageProvider::materialize`]).
//! 3. **Change feed** — a live stream of entry enumerations under the
//!    synchronized root ([`StorageProvider::change_feed`]).
//!
//! [`mirror::MirrorProvider`] is the concrete adapter shipped with the crate:
//! a local directory tree mirrored against an OpenDAL-backed remote replica.

pub mod feed;
pub mod locks;
pub mod mirror;

use std::future::Future;
use std::path::{Path, PathBuf};

use cirrus_core::{DriveResult, EntryKind, Fingerprint};

pub use feed::{ChangeFeed, FeedHandle};
pub use locks::{PathLockMap, ScopeGuard};
pub use mirror::MirrorProvider;

/// Access discipline requested for a coordination scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    /// Concurrent readers allowed; excludes writers.
    Shared,
    /// Sole access; excludes everyone, including the sync applier.
    Exclusive,
}

/// One entry as reported by a provider enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySnapshot {
    /// Absolute location under the provider's local root
    pub location: PathBuf,
    pub kind: EntryKind,
    pub fingerprint: Fingerprint,
    /// False when the bytes live only in the remote replica
    pub materialized: bool,
}

/// Metadata probe result for a single location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStat {
    pub kind: EntryKind,
    pub fingerprint: Fingerprint,
    pub materialized: bool,
}

/// A full enumeration of the synchronized tree at one point in time.
pub type Enumeration = Vec<EntrySnapshot>;

/// Capability set of a synchronized storage backend.
///
/// All futures are `Send` so drive operations can run on a multi-threaded
/// runtime; implementations typically write these methods as `async fn`.
pub trait StorageProvider: Send + Sync + 'static {
    /// Local directory where the synchronized tree is materialized.
    fn local_root(&self) -> &Path;

    /// Acquire a coordination scope for one absolute location.
    ///
    /// The scope is held until the returned guard drops, which happens on
    /// every exit path of the caller, including cancellation.
    fn coordinate(
        &self,
        location: &Path,
        kind: AccessKind,
    ) -> impl Future<Output = DriveResult<ScopeGuard>> + Send;

    /// Metadata-only probe. Never triggers a download.
    fn stat(&self, location: &Path) -> impl Future<Output = DriveResult<Option<EntryStat>>> + Send;

    /// Fetch a remote-only entry's bytes into the local tree.
    ///
    /// Callers must hold an exclusive scope for `location`; the provider does
    /// not re-coordinate internally.
    fn materialize(&self, location: &Path) -> impl Future<Output = DriveResult<()>> + Send;

    /// Remove the entry at `location` locally and from the remote replica,
    /// so it does not reappear as a dehydrated entry.
    ///
    /// Callers must hold an exclusive scope for `location`.
    fn remove(
        &self,
        location: &Path,
        kind: EntryKind,
    ) -> impl Future<Output = DriveResult<()>> + Send;

    /// Current enumeration of every entry under the root, local and remote.
    fn enumerate(&self) -> impl Future<Output = DriveResult<Enumeration>> + Send;

    /// Subscribe to the change feed. Each subscription gets its own stream
    /// starting with a fresh enumeration.
    fn change_feed(&self) -> ChangeFeed;
}

/// Write `bytes` to a hidden temp file beside `location`, then rename into
/// place. A coordinated reader never observes a partial write.
pub async fn write_atomic(location: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let file_name = location
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("entry");
    let tmp = location.with_file_name(format!(
        ".{file_name}.{}.tmp",
        uuid::Uuid::new_v4().simple()
    ));
    tokio::fs::write(&tmp, bytes).await?;
    match tokio::fs::rename(&tmp, location).await {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp).await;
            Err(e)
        }
    }
}

/// True for the transient artifacts [`write_atomic`] leaves behind if
/// interrupted; enumeration skips them.
pub(crate) fn is_temp_artifact(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.') && n.ends_with(".tmp"))
}
