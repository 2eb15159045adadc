//! Safe asynchronous access to a directory tree that an external sync agent
//! mutates concurrently.
//!
//! Three pieces cooperate:
//!
//! - [`gate::CoordinationGate`] wraps every filesystem touch in a coordination
//!   scope so local operations never race the sync agent, and materializes
//!   remote-only entries before reads return.
//! - [`monitor::ChangeMonitor`] diffs provider enumerations against a known
//!   snapshot and emits deduplicated batches of changed root-relative paths.
//! - [`drive::CloudDrive`] is the public surface: coordinated file and
//!   directory operations plus observer registration for change batches.
//!
//! Direct filesystem access to the synchronized tree bypasses the safety
//! contract; everything goes through the drive.

pub mod drive;
pub mod gate;
pub mod monitor;
pub mod observers;

pub use cirrus_core::{DriveError, DriveResult, EntryKind, RootRelativePath};
pub use drive::CloudDrive;
pub use gate::CoordinationGate;
pub use monitor::{ChangeMonitor, MonitorHealth, MonitorState};
pub use observers::{DriveObserver, ObserverId, ObserverRegistry};
