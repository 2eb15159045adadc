use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level drive configuration (loaded from cirrus.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub container: ContainerConfig,
    pub remote: RemoteConfig,
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Container identifier (None = the application's default container)
    pub identifier: Option<String>,
    /// Root-relative subdirectory inside the container to scope the drive to
    pub subdirectory: Option<String>,
    /// Base directory under which container trees are materialized
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// S3-compatible endpoint holding the replicated tree
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket name
    pub bucket: String,
    /// Key prefix under which the container's entries live
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Periodic re-enumeration interval in seconds (default: 2)
    pub poll_interval_secs: u64,
    /// Quiet window for coalescing bursts of watcher events, in milliseconds
    pub debounce_ms: u64,
    /// Capacity of the change-feed channel
    pub feed_capacity: usize,
}

impl DriveConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            identifier: None,
            subdirectory: None,
            base_dir: PathBuf::from("~/.local/share/cirrus/containers"),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "cirrus".into(),
            prefix: String::new(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2,
            debounce_ms: 200,
            feed_capacity: 8,
        }
    }
}
