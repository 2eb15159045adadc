//! The public drive surface.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use cirrus_core::{DriveError, DriveResult, EntryKind, RootRelativePath};
use cirrus_provider::StorageProvider;

use crate::gate::CoordinationGate;
use crate::monitor::ChangeMonitor;
use crate::observers::{DriveObserver, ObserverId, ObserverRegistry};

/// Coordinated, observable access to one synchronized root.
///
/// All operations are safe to call concurrently; two operations on the same
/// path are serialized by the coordination scope, operations on different
/// paths run independently. Construction ensures the root directory exists
/// and starts the change monitor before returning, so no change between
/// construction and the first observer registration goes undetected — though
/// a batch delivered before any observer registers is simply dropped.
pub struct CloudDrive<P: StorageProvider> {
    provider: Arc<P>,
    gate: CoordinationGate<P>,
    observers: Arc<ObserverRegistry>,
    monitor: ChangeMonitor,
    root: PathBuf,
}

impl<P: StorageProvider> CloudDrive<P> {
    /// Open a drive over `provider`, optionally scoped to a subdirectory of
    /// the provider's root.
    pub async fn new(provider: P, subdirectory: Option<RootRelativePath>) -> DriveResult<Self> {
        let provider = Arc::new(provider);
        let sub = subdirectory.unwrap_or_default();
        let root = sub.resolve_under(provider.local_root());

        let gate = CoordinationGate::new(provider.clone(), root.clone());
        gate.create_dir(&RootRelativePath::root()).await?;

        let observers = Arc::new(ObserverRegistry::new());
        let monitor = ChangeMonitor::start(root.clone(), provider.change_feed(), observers.clone());
        info!(root = %root.display(), "cloud drive ready");

        Ok(Self {
            provider,
            gate,
            observers,
            monitor,
            root,
        })
    }

    /// Absolute location of the drive root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    pub fn monitor(&self) -> &ChangeMonitor {
        &self.monitor
    }

    /// True iff a directory occupies `path`. A file there yields false,
    /// not an error.
    pub async fn directory_exists(&self, path: &RootRelativePath) -> DriveResult<bool> {
        Ok(self.gate.probe(path).await? == Some(EntryKind::Directory))
    }

    /// True iff a file occupies `path`.
    pub async fn file_exists(&self, path: &RootRelativePath) -> DriveResult<bool> {
        Ok(self.gate.probe(path).await? == Some(EntryKind::File))
    }

    /// Create `path` and any missing intermediates. Idempotent.
    pub async fn create_directory(&self, path: &RootRelativePath) -> DriveResult<()> {
        self.gate.create_dir(path).await
    }

    /// Coordinated read; downloads the entry first if it is not yet local.
    pub async fn read_file(&self, path: &RootRelativePath) -> DriveResult<Vec<u8>> {
        self.gate.read(path).await
    }

    /// Coordinated write; replaces any existing file at `path`.
    pub async fn write_file(&self, data: &[u8], path: &RootRelativePath) -> DriveResult<()> {
        self.gate.write(path, data, true).await
    }

    /// Copy an external file's bytes into the tree. Unlike [`write_file`],
    /// upload never overwrites: an existing entry at `to` fails with
    /// [`DriveError::AlreadyExists`] and is left unmodified. Remove first to
    /// replace via upload.
    ///
    /// [`write_file`]: CloudDrive::write_file
    pub async fn upload(&self, from: &Path, to: &RootRelativePath) -> DriveResult<()> {
        // The source is outside the coordinated tree; read it up front.
        let bytes = tokio::fs::read(from).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DriveError::NotFound(from.to_path_buf())
            } else {
                DriveError::Io(e)
            }
        })?;
        self.gate.write(to, &bytes, false).await
    }

    /// Coordinated read-modify-write of one file; see
    /// [`CoordinationGate::mutate`].
    pub async fn update_file<F>(&self, path: &RootRelativePath, transform: F) -> DriveResult<()>
    where
        F: FnOnce(Vec<u8>) -> anyhow::Result<Vec<u8>> + Send,
    {
        self.gate.mutate(path, transform).await
    }

    /// Remove the file at `path`. A directory there fails with
    /// [`DriveError::TypeMismatch`].
    pub async fn remove_file(&self, path: &RootRelativePath) -> DriveResult<()> {
        self.gate.delete(path, EntryKind::File).await
    }

    /// Remove the directory at `path`, recursively.
    pub async fn remove_directory(&self, path: &RootRelativePath) -> DriveResult<()> {
        self.gate.delete(path, EntryKind::Directory).await
    }

    /// Register an observer for change batches. Keep the returned id to
    /// unregister; past batches are not replayed.
    pub fn add_observer(&self, observer: Arc<dyn DriveObserver>) -> ObserverId {
        self.observers.add(observer)
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }

    /// Stop the change monitor and wait for it to wind down. Idempotent.
    /// Dropping the drive cancels the monitor without waiting.
    pub async fn shutdown(&self) {
        self.monitor.stop().await;
    }
}
