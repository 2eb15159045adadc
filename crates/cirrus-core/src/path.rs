//! Root-relative path values.
//!
//! Every location the drive touches is expressed as a [`RootRelativePath`]:
//! an ordered list of components interpreted under a configured synchronized
//! root, never an absolute filesystem location. Values are immutable and
//! normalized at construction, so equality, ordering, and hashing are
//! structural over the component sequence.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::error::{DriveError, DriveResult};

/// A normalized path under the synchronized root.
///
/// The empty path refers to the root itself. Components never contain
/// separators, and `.`/`..` cannot be represented.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RootRelativePath {
    components: Vec<String>,
}

impl RootRelativePath {
    /// The empty path: the configured root itself.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a separator-delimited string, normalizing as it goes.
    ///
    /// Empty segments and `.` are skipped (so `"a//b/./c"` equals `"a/b/c"`);
    /// `..` is rejected because a root-relative path must never escape the root.
    pub fn parse(s: &str) -> DriveResult<Self> {
        let mut components = Vec::new();
        for seg in s.split(['/', '\\']) {
            match seg {
                "" | "." => continue,
                ".." => return Err(DriveError::InvalidPath(s.to_string())),
                _ => components.push(seg.to_string()),
            }
        }
        Ok(Self { components })
    }

    /// Return a new path with `component` appended.
    ///
    /// Fails with [`DriveError::InvalidPath`] if the component is empty,
    /// contains a separator, or is `.`/`..`.
    pub fn appending(&self, component: &str) -> DriveResult<Self> {
        if component.is_empty()
            || component == "."
            || component == ".."
            || component.contains(['/', '\\'])
        {
            return Err(DriveError::InvalidPath(component.to_string()));
        }
        let mut components = self.components.clone();
        components.push(component.to_string());
        Ok(Self { components })
    }

    /// Concatenate two root-relative paths.
    pub fn join(&self, other: &RootRelativePath) -> Self {
        let mut components = self.components.clone();
        components.extend(other.components.iter().cloned());
        Self { components }
    }

    /// The path one level up, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.components.is_empty() {
            return None;
        }
        Some(Self {
            components: self.components[..self.components.len() - 1].to_vec(),
        })
    }

    /// The final component, or `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// Absolute location of this path under `root`.
    pub fn resolve_under(&self, root: &Path) -> PathBuf {
        let mut out = root.to_path_buf();
        for c in &self.components {
            out.push(c);
        }
        out
    }

    /// Translate an absolute `location` back into root-relative form.
    ///
    /// Returns `None` when `location` lies outside `root` or contains
    /// components that cannot be expressed (non-UTF-8, `..`).
    pub fn strip_root(root: &Path, location: &Path) -> Option<Self> {
        let rel = location.strip_prefix(root).ok()?;
        let mut components = Vec::new();
        for c in rel.components() {
            match c {
                Component::Normal(os) => components.push(os.to_str()?.to_string()),
                Component::CurDir => continue,
                _ => return None,
            }
        }
        Some(Self { components })
    }
}

impl fmt::Display for RootRelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.components.join("/"))
    }
}

impl std::str::FromStr for RootRelativePath {
    type Err = DriveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RootRelativePath {
    type Error = DriveError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<RootRelativePath> for String {
    fn from(p: RootRelativePath) -> String {
        p.to_string()
    }
}
