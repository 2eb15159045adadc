//! Coordinated filesystem operations.
//!
//! Every touch of the synchronized tree goes through one of these operations,
//! each of which holds a coordination scope for the whole duration, including
//! any materialization wait. Materializing and then reading as two separate
//! scopes would let the sync agent evict or replace the entry in between.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use cirrus_core::{DriveError, DriveResult, EntryKind, RootRelativePath};
use cirrus_provider::{write_atomic, AccessKind, StorageProvider};

/// Wraps a provider with path resolution and the coordination discipline.
pub struct CoordinationGate<P> {
    provider: Arc<P>,
    root: PathBuf,
}

impl<P: StorageProvider> CoordinationGate<P> {
    pub fn new(provider: Arc<P>, root: PathBuf) -> Self {
        Self { provider, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn locate(&self, path: &RootRelativePath) -> PathBuf {
        path.resolve_under(&self.root)
    }

    /// Coordinated read. Materializes the entry first if its bytes are still
    /// remote; the caller suspends until the download completes or fails.
    pub async fn read(&self, path: &RootRelativePath) -> DriveResult<Vec<u8>> {
        let location = self.locate(path);

        // Fast path: already local, a shared scope suffices.
        {
            let _scope = self
                .provider
                .coordinate(&location, AccessKind::Shared)
                .await?;
            match tokio::fs::metadata(&location).await {
                Ok(meta) if meta.is_dir() => {
                    return Err(DriveError::TypeMismatch {
                        path: location,
                        expected: EntryKind::File,
                        found: EntryKind::Directory,
                    })
                }
                Ok(_) => return Ok(tokio::fs::read(&location).await?),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        // Not local yet. Re-check under an exclusive scope so the download
        // and the read happen inside a single coordination scope.
        let _scope = self
            .provider
            .coordinate(&location, AccessKind::Exclusive)
            .await?;
        match self.provider.stat(&location).await? {
            None => Err(DriveError::NotFound(location)),
            Some(stat) if stat.kind == EntryKind::Directory => Err(DriveError::TypeMismatch {
                path: location,
                expected: EntryKind::File,
                found: EntryKind::Directory,
            }),
            Some(stat) => {
                if !stat.materialized {
                    self.provider.materialize(&location).await?;
                }
                Ok(tokio::fs::read(&location).await?)
            }
        }
    }

    /// Coordinated write, committed via temp+rename under the exclusive
    /// scope. With `overwrite` false an existing entry (local or still
    /// remote) fails the call and is left untouched.
    pub async fn write(
        &self,
        path: &RootRelativePath,
        bytes: &[u8],
        overwrite: bool,
    ) -> DriveResult<()> {
        let location = self.locate(path);
        let _scope = self
            .provider
            .coordinate(&location, AccessKind::Exclusive)
            .await?;
        match self.provider.stat(&location).await? {
            Some(stat) if stat.kind == EntryKind::Directory => {
                return Err(DriveError::TypeMismatch {
                    path: location,
                    expected: EntryKind::File,
                    found: EntryKind::Directory,
                })
            }
            Some(_) if !overwrite => return Err(DriveError::AlreadyExists(location)),
            _ => {}
        }
        write_atomic(&location, bytes).await?;
        debug!(path = %path, bytes = bytes.len(), "coordinated write committed");
        Ok(())
    }

    /// Coordinated read-modify-write. The transform receives the current
    /// contents (empty for a new entry) and returns the replacement; the
    /// result is committed atomically, or discarded if the transform fails.
    pub async fn mutate<F>(&self, path: &RootRelativePath, transform: F) -> DriveResult<()>
    where
        F: FnOnce(Vec<u8>) -> anyhow::Result<Vec<u8>> + Send,
    {
        let location = self.locate(path);
        let _scope = self
            .provider
            .coordinate(&location, AccessKind::Exclusive)
            .await?;

        let current = match self.provider.stat(&location).await? {
            None => Vec::new(),
            Some(stat) if stat.kind == EntryKind::Directory => {
                return Err(DriveError::TypeMismatch {
                    path: location,
                    expected: EntryKind::File,
                    found: EntryKind::Directory,
                })
            }
            Some(stat) => {
                if !stat.materialized {
                    self.provider.materialize(&location).await?;
                }
                tokio::fs::read(&location).await?
            }
        };

        let next = transform(current).map_err(DriveError::Mutation)?;
        write_atomic(&location, &next)
            .await
            .map_err(|e| DriveError::Mutation(anyhow::Error::new(e).context("committing transform output")))?;
        debug!(path = %path, "coordinated mutation committed");
        Ok(())
    }

    /// Coordinated removal. The entry must exist and match `expecting`.
    pub async fn delete(&self, path: &RootRelativePath, expecting: EntryKind) -> DriveResult<()> {
        let location = self.locate(path);
        let _scope = self
            .provider
            .coordinate(&location, AccessKind::Exclusive)
            .await?;
        match self.provider.stat(&location).await? {
            None => Err(DriveError::NotFound(location)),
            Some(stat) if stat.kind != expecting => Err(DriveError::TypeMismatch {
                path: location,
                expected: expecting,
                found: stat.kind,
            }),
            Some(_) => self.provider.remove(&location, expecting).await,
        }
    }

    /// Coordinated directory creation, intermediates included. Idempotent;
    /// fails only when a file occupies the path.
    pub async fn create_dir(&self, path: &RootRelativePath) -> DriveResult<()> {
        let location = self.locate(path);
        let _scope = self
            .provider
            .coordinate(&location, AccessKind::Exclusive)
            .await?;
        match self.provider.stat(&location).await? {
            Some(stat) if stat.kind == EntryKind::File => Err(DriveError::TypeMismatch {
                path: location,
                expected: EntryKind::Directory,
                found: EntryKind::File,
            }),
            Some(_) => Ok(()),
            None => {
                tokio::fs::create_dir_all(&location).await?;
                debug!(path = %path, "created directory");
                Ok(())
            }
        }
    }

    /// Coordinated existence-and-kind probe. Metadata only, never downloads.
    pub async fn probe(&self, path: &RootRelativePath) -> DriveResult<Option<EntryKind>> {
        let location = self.locate(path);
        let _scope = self
            .provider
            .coordinate(&location, AccessKind::Shared)
            .await?;
        Ok(self.provider.stat(&location).await?.map(|s| s.kind))
    }
}
