//! Filesystem-facing pieces of cairn.
//!
//! - [`SnapshotDir`] -- the directory of named snapshots: list names, look
//!   one up, or create one by capturing a live tree
//! - [`DiskTree`] -- a directory on disk used as the live tree to capture
//!
//! Errors carry an [`ErrorKind`](cairn_types::ErrorKind) so an adapter can
//! map them to its own not-found and I/O-error responses without matching
//! on every variant.

pub mod disk;
pub mod error;
pub mod snapshot_dir;

pub use disk::DiskTree;
pub use error::{FsError, FsResult};
pub use snapshot_dir::{SnapshotDir, LISTING_MODE};
