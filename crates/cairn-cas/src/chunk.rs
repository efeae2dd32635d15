use cairn_types::Key;
use serde::{Deserialize, Serialize};

use crate::error::{CasError, CasResult};
use crate::hasher::ChunkHasher;

/// Type tag of a snapshot record chunk.
pub const TYPE_SNAP: &str = "snap";
/// Type tag of directory listing chunks.
pub const TYPE_DIR: &str = "dir";
/// Type tag of file body chunks.
pub const TYPE_FILE: &str = "file";

/// Longest accepted type tag, in bytes.
pub const MAX_TYPE_LEN: usize = 32;

/// The unit of storage: a type tag, an indirection level and a payload.
///
/// Level 0 chunks hold data. Chunks at a higher level are index chunks whose
/// payload is a packed list of child [`Key`]s one level down.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Role of the chunk, e.g. `"snap"`, `"dir"`, `"file"`.
    pub chunk_type: String,
    /// Indirection depth; 0 is leaf data.
    pub level: u8,
    /// Raw payload.
    pub buf: Vec<u8>,
}

impl Chunk {
    pub fn new(chunk_type: impl Into<String>, level: u8, buf: Vec<u8>) -> Self {
        Self {
            chunk_type: chunk_type.into(),
            level,
            buf,
        }
    }

    /// Content address of this chunk.
    pub fn key(&self) -> Key {
        ChunkHasher::CHUNK.hash(&self.chunk_type, self.level, &self.buf)
    }

    /// Payload size in bytes.
    pub fn size(&self) -> u64 {
        self.buf.len() as u64
    }

    /// Reject chunks no backend should store.
    pub(crate) fn validate(&self) -> CasResult<()> {
        if self.chunk_type.is_empty() {
            return Err(CasError::Invalid("empty chunk type".into()));
        }
        if self.chunk_type.len() > MAX_TYPE_LEN {
            return Err(CasError::Invalid(format!(
                "chunk type longer than {MAX_TYPE_LEN} bytes: {:?}",
                self.chunk_type
            )));
        }
        Ok(())
    }

    /// Check a chunk read back from storage against what the caller expects.
    ///
    /// Used by every backend's `get`. A mismatch in type, level or digest is
    /// corruption.
    pub(crate) fn verify(self, key: &Key, chunk_type: &str, level: u8) -> CasResult<Self> {
        if self.chunk_type != chunk_type {
            return Err(CasError::corrupt(
                key,
                format!("expected type {chunk_type:?}, found {:?}", self.chunk_type),
            ));
        }
        if self.level != level {
            return Err(CasError::corrupt(
                key,
                format!("expected level {level}, found {}", self.level),
            ));
        }
        if !ChunkHasher::CHUNK.verify(&self.chunk_type, self.level, &self.buf, key) {
            return Err(CasError::corrupt(key, "content does not match key"));
        }
        Ok(self)
    }
}
