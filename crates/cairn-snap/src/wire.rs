//! Serialized snapshot structures.
//!
//! A snapshot is a tree of chunks:
//!
//! ```text
//! catalog["s1"] = SnapshotRef { key } ──► "snap" chunk: Snapshot { name, contents: Dir }
//!                                                                  │
//!                                      "dir" blob: [Dirent, ...] ◄─┘
//!                                         │            │
//!                           "file" blob ◄─┘            └─► "dir" blob ...
//! ```
//!
//! Nodes own only keys, never pointers into the live tree, so a snapshot
//! is self-describing once stored.

use cairn_cas::Manifest;
use cairn_types::Key;
use serde::{Deserialize, Serialize};

/// The catalog's pointer to a snapshot's root chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRef {
    pub key: Key,
}

/// The record stored in a snapshot's `"snap"` chunk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The name given at capture time.
    pub name: String,
    /// Root directory of the captured tree.
    pub contents: Dir,
}

/// A directory: a `"dir"` blob holding its sorted entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dir {
    pub manifest: Manifest,
    /// Number of entries in the listing.
    pub entries: u64,
}

/// A regular file: a `"file"` blob plus permission bits worth keeping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub manifest: Manifest,
    pub executable: bool,
}

/// One named entry of a directory listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dirent {
    pub name: String,
    pub kind: DirentKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirentKind {
    File(File),
    Dir(Dir),
}

impl Dirent {
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, DirentKind::Dir(_))
    }
}
