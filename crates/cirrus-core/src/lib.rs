pub mod config;
pub mod error;
pub mod path;
pub mod types;

pub use error::{DriveError, DriveResult};
pub use path::RootRelativePath;
pub use types::{EntryKind, Fingerprint};
