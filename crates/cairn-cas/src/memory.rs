use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use cairn_types::Key;
use tracing::debug;

use crate::chunk::Chunk;
use crate::error::{CasError, CasResult};
use crate::traits::ChunkStore;

/// Counters describing what a store has seen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Calls to `add`, including deduplicated ones.
    pub adds: u64,
    /// Calls to `add` whose content was already stored.
    pub dedup_hits: u64,
    /// Distinct chunks currently stored.
    pub chunks: u64,
    /// Total payload bytes across stored chunks.
    pub bytes: u64,
}

/// In-memory, HashMap-based chunk store.
///
/// Intended for tests and embedding. Chunks are held behind a `RwLock` and
/// cloned on read and write.
pub struct InMemoryChunkStore {
    chunks: RwLock<HashMap<Key, Chunk>>,
    adds: AtomicU64,
    dedup_hits: AtomicU64,
}

impl InMemoryChunkStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
            adds: AtomicU64::new(0),
            dedup_hits: AtomicU64::new(0),
        }
    }

    /// Number of chunks currently stored.
    pub fn len(&self) -> usize {
        self.chunks.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.chunks.read().expect("lock poisoned").is_empty()
    }

    /// Total payload bytes across all stored chunks.
    pub fn total_bytes(&self) -> u64 {
        self.chunks
            .read()
            .expect("lock poisoned")
            .values()
            .map(Chunk::size)
            .sum()
    }

    /// Snapshot of the store's counters.
    pub fn stats(&self) -> StoreStats {
        let map = self.chunks.read().expect("lock poisoned");
        StoreStats {
            adds: self.adds.load(Ordering::Relaxed),
            dedup_hits: self.dedup_hits.load(Ordering::Relaxed),
            chunks: map.len() as u64,
            bytes: map.values().map(Chunk::size).sum(),
        }
    }

    /// Sorted list of every stored key.
    pub fn keys(&self) -> Vec<Key> {
        let map = self.chunks.read().expect("lock poisoned");
        let mut keys: Vec<Key> = map.keys().copied().collect();
        keys.sort();
        keys
    }

    /// Overwrite whatever is stored under `key` without re-hashing.
    ///
    /// Fault injection for tests: this is the only way to make the store hold
    /// content that does not match its key.
    pub fn replace_raw(&self, key: Key, chunk: Chunk) {
        self.chunks
            .write()
            .expect("lock poisoned")
            .insert(key, chunk);
    }

    /// Drop the chunk under `key`, simulating lost storage. Returns whether
    /// it was present.
    pub fn remove_raw(&self, key: &Key) -> bool {
        self.chunks
            .write()
            .expect("lock poisoned")
            .remove(key)
            .is_some()
    }
}

impl Default for InMemoryChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkStore for InMemoryChunkStore {
    fn add(&self, chunk: &Chunk) -> CasResult<Key> {
        chunk.validate()?;
        let key = chunk.key();
        self.adds.fetch_add(1, Ordering::Relaxed);
        let mut map = self.chunks.write().expect("lock poisoned");
        match map.entry(key) {
            Entry::Occupied(_) => {
                self.dedup_hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key.short_hex(), chunk_type = %chunk.chunk_type, "chunk deduplicated");
            }
            Entry::Vacant(slot) => {
                slot.insert(chunk.clone());
                debug!(
                    key = %key.short_hex(),
                    chunk_type = %chunk.chunk_type,
                    level = chunk.level,
                    size = chunk.buf.len(),
                    "chunk added"
                );
            }
        }
        Ok(key)
    }

    fn get(&self, key: &Key, chunk_type: &str, level: u8) -> CasResult<Chunk> {
        let stored = {
            let map = self.chunks.read().expect("lock poisoned");
            map.get(key).cloned()
        };
        let chunk = stored.ok_or(CasError::NotFound { key: *key })?;
        chunk.verify(key, chunk_type, level)
    }

    fn contains(&self, key: &Key) -> CasResult<bool> {
        Ok(self.chunks.read().expect("lock poisoned").contains_key(key))
    }
}

impl std::fmt::Debug for InMemoryChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryChunkStore")
            .field("chunk_count", &self.len())
            .finish()
    }
}
