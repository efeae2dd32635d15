//! Content-addressed chunk storage for cairn.
//!
//! Every piece of data in a cairn volume (file bodies, directory listings,
//! snapshot records) is stored as an immutable [`Chunk`] identified by the
//! BLAKE3 digest of its type tag, indirection level and bytes.
//!
//! # Storage Backends
//!
//! All backends implement the [`ChunkStore`] trait:
//!
//! - [`InMemoryChunkStore`] -- `HashMap`-based store for tests and embedding
//! - [`FileChunkStore`] -- one file per chunk under a fan-out directory
//!
//! # Design Rules
//!
//! 1. Chunks are immutable once written. There is no update and no delete;
//!    reclaiming orphans is an external concern.
//! 2. `add` is idempotent by construction. Two callers adding the same
//!    content race harmlessly on the same key.
//! 3. `get` checks the recorded type and level and re-hashes the content.
//!    A mismatch is [`CasError::Corrupt`], never [`CasError::NotFound`].
//! 4. I/O failures surface as [`CasError::StorageUnavailable`]; nothing is
//!    retried internally.
//!
//! Content larger than one chunk is split by the [`blob`] module into a tree
//! of leaf chunks (level 0) and index chunks (level > 0).

pub mod blob;
pub mod chunk;
pub mod error;
pub mod file;
pub mod hasher;
pub mod memory;
pub mod traits;

pub use blob::{BlobConfig, BlobReader, Manifest};
pub use chunk::{Chunk, TYPE_DIR, TYPE_FILE, TYPE_SNAP};
pub use error::{CasError, CasResult};
pub use file::FileChunkStore;
pub use hasher::ChunkHasher;
pub use memory::{InMemoryChunkStore, StoreStats};
pub use traits::ChunkStore;
