use std::path::PathBuf;
use thiserror::Error;

use crate::types::EntryKind;

pub type DriveResult<T> = Result<T, DriveError>;

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("no entry at {0}")]
    NotFound(PathBuf),

    #[error("entry already exists at {0}")]
    AlreadyExists(PathBuf),

    #[error("expected {expected} at {path}, found {found}")]
    TypeMismatch {
        path: PathBuf,
        expected: EntryKind,
        found: EntryKind,
    },

    #[error("invalid path component: {0:?}")]
    InvalidPath(String),

    #[error("download failed for {path}: {reason}")]
    Download { path: PathBuf, reason: String },

    #[error("update transform failed: {0}")]
    Mutation(anyhow::Error),

    #[error("coordination failed: {0}")]
    Coordination(String),

    #[error("remote store error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriveError {
    /// True if the error means "the entry simply isn't there" rather than a fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DriveError::NotFound(_))
    }
}
