use cairn_types::Key;

use crate::chunk::Chunk;
use crate::error::CasResult;

/// Content-addressed chunk store.
///
/// All implementations must satisfy these invariants:
/// - `add` of identical content always yields the same key, and storing it a
///   second time does not grow the store.
/// - `add` needs no coordination between callers; the digest resolves races.
/// - `get` of an absent key is [`NotFound`](crate::CasError::NotFound).
/// - `get` of a present chunk whose recorded type or level differs from the
///   expectation, or whose bytes no longer hash to the key, is
///   [`Corrupt`](crate::CasError::Corrupt).
/// - Medium failures are [`StorageUnavailable`](crate::CasError::StorageUnavailable).
pub trait ChunkStore: Send + Sync {
    /// Store a chunk and return its key. A no-op if it is already stored.
    fn add(&self, chunk: &Chunk) -> CasResult<Key>;

    /// Fetch the chunk stored under `key`, checking its type and level.
    fn get(&self, key: &Key, chunk_type: &str, level: u8) -> CasResult<Chunk>;

    /// Whether any chunk is stored under `key`. Performs no verification.
    fn contains(&self, key: &Key) -> CasResult<bool>;
}
