//! Snapshot capture and restore for cairn.
//!
//! A snapshot is an immutable, content-addressed image of a directory tree.
//! [`capture`](capture::capture) walks a [`LiveTree`] through one consistent
//! view, stores the tree as chunks, and then binds the snapshot's name to its
//! root in the catalog. [`open`](restore::open) turns a root key back into a
//! lazily fetched, read-only tree of [`Node`]s.
//!
//! # Ordering
//!
//! The root chunk is always stored before the catalog entry that refers to
//! it is committed. An interrupted capture leaves an unreferenced chunk
//! behind and no catalog entry.

pub mod capture;
pub mod codec;
pub mod error;
pub mod live;
pub mod restore;
pub mod wire;

pub use capture::{capture, record, validate_name, SNAPSHOT_BUCKET};
pub use codec::{CodecError, CodecResult};
pub use error::{SnapError, SnapResult};
pub use live::{LiveEntry, LiveKind, LiveTree, LiveView, MemTree};
pub use restore::{
    open, EntryInfo, LazyEntry, Node, NodeAttr, NodeKind, RootNode, SnapDir, SnapFile, DIR_MODE,
    EXEC_MODE, FILE_MODE,
};
pub use wire::{Dir, Dirent, DirentKind, File, Snapshot, SnapshotRef};
