//! OpenDAL-backed mirror adapter.
//!
//! `MirrorProvider` pairs a local directory (the materialized tree) with a
//! remote replica reached through an OpenDAL [`Operator`]. Entries present in
//! the replica but absent locally show up in enumerations and stats as
//! dehydrated (`materialized: false`); [`StorageProvider::materialize`]
//! fetches their bytes and commits them atomically.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use opendal::Operator;
use tracing::{debug, info};

use cirrus_core::config::{DriveConfig, MonitorConfig, RemoteConfig};
use cirrus_core::{DriveError, DriveResult, EntryKind, Fingerprint, RootRelativePath};

use crate::feed::{spawn_enumeration_feed, ChangeFeed};
use crate::locks::{PathLockMap, ScopeGuard};
use crate::{is_temp_artifact, write_atomic, AccessKind, EntrySnapshot, EntryStat, Enumeration};
use crate::StorageProvider;

/// Local tree + remote replica, coordinated through a per-path lock map.
#[derive(Clone)]
pub struct MirrorProvider {
    local_root: PathBuf,
    remote: Operator,
    remote_prefix: String,
    locks: Arc<PathLockMap>,
    monitor: MonitorConfig,
}

impl MirrorProvider {
    /// Build from configuration, resolving and creating the container root.
    pub async fn new(cfg: &DriveConfig, remote: Operator) -> DriveResult<Self> {
        let container = cfg.container.identifier.as_deref().unwrap_or("default");
        let local_root = cfg.container.base_dir.join(container);
        Self::with_root(local_root, remote, &cfg.remote.prefix, cfg.monitor.clone()).await
    }

    /// Build over an explicit local root.
    pub async fn with_root(
        local_root: PathBuf,
        remote: Operator,
        remote_prefix: &str,
        monitor: MonitorConfig,
    ) -> DriveResult<Self> {
        tokio::fs::create_dir_all(&local_root).await?;
        info!(root = %local_root.display(), "mirror provider ready");
        Ok(Self {
            local_root,
            remote,
            remote_prefix: remote_prefix.trim_matches('/').to_string(),
            locks: Arc::new(PathLockMap::new()),
            monitor,
        })
    }

    /// S3-compatible operator for the remote replica (SeaweedFS, MinIO, AWS).
    ///
    /// Path-style addressing is the default in opendal 0.55, which is what
    /// SeaweedFS and MinIO require.
    pub fn build_operator(
        remote: &RemoteConfig,
        access_key_id: &str,
        secret_access_key: &str,
    ) -> DriveResult<Operator> {
        let builder = opendal::services::S3::default()
            .endpoint(&remote.endpoint)
            .region(&remote.region)
            .bucket(&remote.bucket)
            .access_key_id(access_key_id)
            .secret_access_key(secret_access_key);

        let op = Operator::new(builder)
            .map_err(storage_err)?
            .layer(opendal::layers::LoggingLayer::default())
            .layer(
                opendal::layers::RetryLayer::new()
                    .with_max_times(5)
                    .with_jitter(),
            )
            .finish();
        Ok(op)
    }

    /// Remote object key for an absolute location, or `None` for the root
    /// itself and for locations outside the tree.
    fn remote_key(&self, location: &Path) -> Option<String> {
        let rel = RootRelativePath::strip_root(&self.local_root, location)?;
        if rel.is_root() {
            return None;
        }
        Some(if self.remote_prefix.is_empty() {
            rel.to_string()
        } else {
            format!("{}/{}", self.remote_prefix, rel)
        })
    }

    fn list_prefix(&self) -> String {
        if self.remote_prefix.is_empty() {
            "/".to_string()
        } else {
            format!("{}/", self.remote_prefix)
        }
    }

    async fn enumerate_entries(&self) -> DriveResult<Enumeration> {
        // Local walk wins over the remote listing for paths present in both:
        // the local state is what a coordinated reader would see.
        let root = self.local_root.clone();
        let locals = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            walk_local(&root, &mut out)?;
            Ok::<_, std::io::Error>(out)
        })
        .await
        .map_err(|e| DriveError::Io(std::io::Error::other(e)))??;

        let mut entries: BTreeMap<PathBuf, EntrySnapshot> = locals
            .into_iter()
            .map(|e| (e.location.clone(), e))
            .collect();

        let prefix = self.list_prefix();
        let listed = self
            .remote
            .list_with(&prefix)
            .recursive(true)
            .await
            .map_err(storage_err)?;
        for entry in listed {
            let meta = entry.metadata();
            if meta.mode().is_dir() {
                continue;
            }
            let rel_str = entry
                .path()
                .strip_prefix(prefix.trim_start_matches('/'))
                .unwrap_or(entry.path());
            let Ok(rel) = RootRelativePath::parse(rel_str) else {
                continue;
            };
            if rel.is_root() {
                continue;
            }
            let location = rel.resolve_under(&self.local_root);
            entries.entry(location.clone()).or_insert_with(|| EntrySnapshot {
                location,
                kind: EntryKind::File,
                fingerprint: Fingerprint::new(remote_mtime(meta), meta.content_length()),
                materialized: false,
            });
        }

        Ok(entries.into_values().collect())
    }
}

impl StorageProvider for MirrorProvider {
    fn local_root(&self) -> &Path {
        &self.local_root
    }

    async fn coordinate(&self, location: &Path, kind: AccessKind) -> DriveResult<ScopeGuard> {
        Ok(self.locks.acquire(location, kind).await)
    }

    async fn stat(&self, location: &Path) -> DriveResult<Option<EntryStat>> {
        match tokio::fs::metadata(location).await {
            Ok(meta) => {
                let kind = if meta.is_dir() {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                };
                return Ok(Some(EntryStat {
                    kind,
                    fingerprint: Fingerprint::from_metadata(&meta),
                    materialized: true,
                }));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        // Not local: consult the remote replica.
        let Some(key) = self.remote_key(location) else {
            return Ok(None);
        };
        match self.remote.stat(&key).await {
            Ok(meta) => Ok(Some(EntryStat {
                kind: EntryKind::File,
                fingerprint: Fingerprint::new(remote_mtime(&meta), meta.content_length()),
                materialized: false,
            })),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => {
                // A directory implied by deeper keys.
                let children = self
                    .remote
                    .list_with(&format!("{key}/"))
                    .limit(1)
                    .await
                    .map_err(storage_err)?;
                if children.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(EntryStat {
                        kind: EntryKind::Directory,
                        fingerprint: Fingerprint::new(0, 0),
                        materialized: true,
                    }))
                }
            }
            Err(e) => Err(storage_err(e)),
        }
    }

    async fn materialize(&self, location: &Path) -> DriveResult<()> {
        let key = self.remote_key(location).ok_or_else(|| DriveError::Download {
            path: location.to_path_buf(),
            reason: "location is outside the synchronized tree".into(),
        })?;
        let data = self
            .remote
            .read(&key)
            .await
            .map_err(|e| DriveError::Download {
                path: location.to_path_buf(),
                reason: e.to_string(),
            })?;
        let bytes: bytes::Bytes = data.to_bytes();
        if let Some(parent) = location.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        write_atomic(location, &bytes).await?;
        info!(path = %location.display(), bytes = bytes.len(), "materialized remote entry");
        Ok(())
    }

    async fn remove(&self, location: &Path, kind: EntryKind) -> DriveResult<()> {
        match kind {
            EntryKind::File => {
                match tokio::fs::remove_file(location).await {
                    Ok(()) => {}
                    // Dehydrated entries have no local bytes to remove.
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                if let Some(key) = self.remote_key(location) {
                    self.remote.delete(&key).await.map_err(storage_err)?;
                }
            }
            EntryKind::Directory => {
                match tokio::fs::remove_dir_all(location).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                if let Some(key) = self.remote_key(location) {
                    self.remote
                        .remove_all(&format!("{key}/"))
                        .await
                        .map_err(storage_err)?;
                }
            }
        }
        debug!(path = %location.display(), %kind, "removed entry");
        Ok(())
    }

    async fn enumerate(&self) -> DriveResult<Enumeration> {
        self.enumerate_entries().await
    }

    fn change_feed(&self) -> ChangeFeed {
        let provider = self.clone();
        spawn_enumeration_feed(
            self.local_root.clone(),
            Duration::from_secs(self.monitor.poll_interval_secs.max(1)),
            Duration::from_millis(self.monitor.debounce_ms),
            self.monitor.feed_capacity,
            move || {
                let provider = provider.clone();
                async move { provider.enumerate_entries().await }
            },
        )
    }
}

fn walk_local(dir: &Path, out: &mut Vec<EntrySnapshot>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if is_temp_artifact(&path) {
            continue;
        }
        let meta = entry.metadata()?;
        let kind = if meta.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        out.push(EntrySnapshot {
            location: path.clone(),
            kind,
            fingerprint: Fingerprint::from_metadata(&meta),
            materialized: true,
        });
        if meta.is_dir() {
            walk_local(&path, out)?;
        }
    }
    Ok(())
}

fn remote_mtime(meta: &opendal::Metadata) -> u64 {
    meta.last_modified()
        .map(|t| t.into_inner().as_second().max(0) as u64)
        .unwrap_or(0)
}

fn storage_err(e: opendal::Error) -> DriveError {
    DriveError::Storage(e.to_string())
}
