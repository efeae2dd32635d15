//! Multi-level blobs: content of any size stored as a tree of chunks.
//!
//! Content is cut into `chunk_size` leaves stored at level 0. While more than
//! one chunk remains at a level, up to `fanout` consecutive keys are packed
//! into an index chunk one level up. The single chunk left at the top is the
//! blob's root. Every chunk of a blob carries the blob's type tag, so a
//! `"file"` body and a `"dir"` listing never share index chunks.
//!
//! The tree is left-packed, so the path to leaf `i` is computed from `i`
//! alone and reading a byte range fetches only the chunks covering it.

use std::collections::HashMap;
use std::io::Read;

use cairn_types::{Interrupt, Key, KEY_LEN};
use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;
use crate::error::{CasError, CasResult};
use crate::traits::ChunkStore;

/// How content is cut into chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobConfig {
    /// Payload bytes per leaf chunk.
    pub chunk_size: u32,
    /// Child keys per index chunk.
    pub fanout: u32,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            fanout: 1024,
        }
    }
}

impl BlobConfig {
    pub fn validate(&self) -> CasResult<()> {
        if self.chunk_size == 0 {
            return Err(CasError::Invalid("chunk_size must be positive".into()));
        }
        if self.fanout < 2 {
            return Err(CasError::Invalid("fanout must be at least 2".into()));
        }
        Ok(())
    }
}

/// Everything needed to read a blob back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Type tag shared by every chunk of the blob.
    pub chunk_type: String,
    /// Key of the top chunk.
    pub root: Key,
    /// Content length in bytes.
    pub size: u64,
    pub chunk_size: u32,
    pub fanout: u32,
}

impl Manifest {
    /// Number of leaf chunks. An empty blob still has one (empty) leaf.
    pub fn leaf_count(&self) -> u64 {
        if self.chunk_size == 0 {
            return 1;
        }
        self.size.div_ceil(u64::from(self.chunk_size)).max(1)
    }

    /// Level of the root chunk.
    pub fn level(&self) -> u8 {
        let fanout = u64::from(self.fanout.max(2));
        let mut n = self.leaf_count();
        let mut level = 0u8;
        while n > 1 {
            n = n.div_ceil(fanout);
            level += 1;
        }
        level
    }

    fn validate(&self) -> CasResult<()> {
        if self.chunk_size == 0 || self.fanout < 2 {
            return Err(CasError::corrupt(
                &self.root,
                format!(
                    "unusable manifest: chunk_size={} fanout={}",
                    self.chunk_size, self.fanout
                ),
            ));
        }
        Ok(())
    }
}

/// Store `data` as a blob of `chunk_type` chunks.
pub fn write(
    store: &dyn ChunkStore,
    chunk_type: &str,
    data: &[u8],
    config: &BlobConfig,
    intr: &Interrupt,
) -> CasResult<Manifest> {
    write_reader(store, chunk_type, data, config, intr)
}

/// Store everything `reader` yields as a blob, holding at most one leaf in
/// memory. Produces the same manifest as [`write`] over the same bytes.
pub fn write_reader(
    store: &dyn ChunkStore,
    chunk_type: &str,
    mut reader: impl Read,
    config: &BlobConfig,
    intr: &Interrupt,
) -> CasResult<Manifest> {
    config.validate()?;

    let chunk_size = u64::from(config.chunk_size);
    let mut keys = Vec::new();
    let mut size = 0u64;
    loop {
        intr.check()?;
        let mut piece = Vec::with_capacity(config.chunk_size as usize);
        (&mut reader)
            .take(chunk_size)
            .read_to_end(&mut piece)
            .map_err(|e| CasError::io("read content", e))?;
        if piece.is_empty() && !keys.is_empty() {
            break;
        }
        let len = piece.len() as u64;
        size += len;
        keys.push(store.add(&Chunk::new(chunk_type, 0, piece))?);
        if len < chunk_size {
            break;
        }
    }

    let mut level = 0u8;
    while keys.len() > 1 {
        intr.check()?;
        level += 1;
        keys = keys
            .chunks(config.fanout as usize)
            .map(|group| {
                let mut buf = Vec::with_capacity(group.len() * KEY_LEN);
                for key in group {
                    buf.extend_from_slice(key.as_bytes());
                }
                store.add(&Chunk::new(chunk_type, level, buf))
            })
            .collect::<CasResult<Vec<Key>>>()?;
    }

    let manifest = Manifest {
        chunk_type: chunk_type.to_string(),
        root: keys[0],
        size,
        chunk_size: config.chunk_size,
        fanout: config.fanout,
    };
    debug_assert_eq!(manifest.level(), level);
    Ok(manifest)
}

/// Read a whole blob.
pub fn read_all(
    store: &dyn ChunkStore,
    manifest: &Manifest,
    intr: &Interrupt,
) -> CasResult<Vec<u8>> {
    BlobReader::new(store, manifest).read_all(intr)
}

/// Random-access reader over one blob.
///
/// Index chunks are cached for the lifetime of the reader, so sequential
/// reads fetch each index chunk once.
pub struct BlobReader<'a> {
    store: &'a dyn ChunkStore,
    manifest: &'a Manifest,
    index_cache: HashMap<Key, Vec<Key>>,
}

impl<'a> BlobReader<'a> {
    pub fn new(store: &'a dyn ChunkStore, manifest: &'a Manifest) -> Self {
        Self {
            store,
            manifest,
            index_cache: HashMap::new(),
        }
    }

    /// Read up to `len` bytes starting at `offset`. Reads past the end are
    /// truncated; a read starting at or past the end is empty.
    pub fn read_at(&mut self, offset: u64, len: u64, intr: &Interrupt) -> CasResult<Vec<u8>> {
        self.manifest.validate()?;
        let size = self.manifest.size;
        if offset >= size || len == 0 {
            return Ok(Vec::new());
        }
        let end = offset.saturating_add(len).min(size);
        let chunk_size = u64::from(self.manifest.chunk_size);
        let first = offset / chunk_size;
        let last = (end - 1) / chunk_size;

        let mut out = Vec::with_capacity((end - offset) as usize);
        for idx in first..=last {
            intr.check()?;
            let leaf = self.leaf(idx)?;
            let leaf_start = idx * chunk_size;
            let from = (offset.max(leaf_start) - leaf_start) as usize;
            let to = (end.min(leaf_start + leaf.len() as u64) - leaf_start) as usize;
            out.extend_from_slice(&leaf[from..to]);
        }
        Ok(out)
    }

    pub fn read_all(&mut self, intr: &Interrupt) -> CasResult<Vec<u8>> {
        self.read_at(0, self.manifest.size, intr)
    }

    fn leaf(&mut self, idx: u64) -> CasResult<Vec<u8>> {
        let key = self.leaf_key(idx)?;
        let chunk = self.store.get(&key, &self.manifest.chunk_type, 0)?;
        let chunk_size = u64::from(self.manifest.chunk_size);
        let expected = chunk_size.min(self.manifest.size - idx * chunk_size);
        if chunk.size() != expected {
            return Err(CasError::corrupt(
                &key,
                format!("leaf {idx} holds {} bytes, expected {expected}", chunk.size()),
            ));
        }
        Ok(chunk.buf)
    }

    fn leaf_key(&mut self, idx: u64) -> CasResult<Key> {
        let fanout = u64::from(self.manifest.fanout);
        let mut key = self.manifest.root;
        for level in (1..=self.manifest.level()).rev() {
            let span = fanout.checked_pow(u32::from(level) - 1).unwrap_or(u64::MAX);
            let slot = ((idx / span) % fanout) as usize;
            let children = self.index(&key, level)?;
            key = *children.get(slot).ok_or_else(|| {
                CasError::corrupt(&key, format!("index chunk has no slot {slot}"))
            })?;
        }
        Ok(key)
    }

    fn index(&mut self, key: &Key, level: u8) -> CasResult<&Vec<Key>> {
        if !self.index_cache.contains_key(key) {
            let chunk = self.store.get(key, &self.manifest.chunk_type, level)?;
            if chunk.buf.len() % KEY_LEN != 0 {
                return Err(CasError::corrupt(
                    key,
                    format!("index chunk length {} is not a multiple of {KEY_LEN}", chunk.buf.len()),
                ));
            }
            let children = chunk
                .buf
                .chunks_exact(KEY_LEN)
                .map(|raw| Key::from_slice(raw).map_err(|e| CasError::corrupt(key, e.to_string())))
                .collect::<CasResult<Vec<Key>>>()?;
            self.index_cache.insert(*key, children);
        }
        Ok(&self.index_cache[key])
    }
}
