use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use cairn_types::Key;
use tracing::debug;

use crate::chunk::Chunk;
use crate::error::{CasError, CasResult};
use crate::memory::StoreStats;
use crate::traits::ChunkStore;

const OBJECTS_DIR: &str = "objects";
const TMP_DIR: &str = "tmp";

/// On-disk chunk store: one file per chunk.
///
/// Layout, analogous to git's loose objects:
/// ```text
/// <root>/objects/ab/cdef0123...   bincode-encoded Chunk
/// <root>/tmp/                     staging area for in-flight writes
/// ```
///
/// A chunk is written to a temporary file in `tmp/`, synced, and renamed into
/// place, after which its fan-out directory is synced too. `add` returns only
/// once the chunk survives power loss. The rename is atomic, so a crash never
/// leaves a partial chunk under its final name, and two writers racing on the
/// same key both rename identical bytes over each other.
pub struct FileChunkStore {
    root: PathBuf,
    adds: AtomicU64,
    dedup_hits: AtomicU64,
}

impl FileChunkStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: &Path) -> CasResult<Self> {
        fs::create_dir_all(root.join(OBJECTS_DIR)).map_err(|e| CasError::io("open", e))?;
        fs::create_dir_all(root.join(TMP_DIR)).map_err(|e| CasError::io("open", e))?;
        Ok(Self {
            root: root.to_path_buf(),
            adds: AtomicU64::new(0),
            dedup_hits: AtomicU64::new(0),
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a chunk with `key` is stored at.
    pub fn path_for(&self, key: &Key) -> PathBuf {
        let hex = key.to_hex();
        self.root.join(OBJECTS_DIR).join(&hex[..2]).join(&hex[2..])
    }

    /// Counters for this handle. `chunks` and `bytes` are not tracked on
    /// disk and are reported as zero.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            adds: self.adds.load(Ordering::Relaxed),
            dedup_hits: self.dedup_hits.load(Ordering::Relaxed),
            ..StoreStats::default()
        }
    }

    fn write_new(&self, path: &Path, chunk: &Chunk) -> CasResult<()> {
        let data = bincode::serialize(chunk)
            .map_err(|e| CasError::Invalid(format!("cannot encode chunk: {e}")))?;

        let mut tmp = tempfile::NamedTempFile::new_in(self.root.join(TMP_DIR))
            .map_err(|e| CasError::io("add", e))?;
        tmp.write_all(&data).map_err(|e| CasError::io("add", e))?;
        tmp.as_file().sync_all().map_err(|e| CasError::io("add", e))?;

        let parent = path
            .parent()
            .ok_or_else(|| CasError::Invalid(format!("chunk path {} has no parent", path.display())))?;
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| CasError::io("add", e))?;
            sync_dir(&self.root.join(OBJECTS_DIR)).map_err(|e| CasError::io("add", e))?;
        }
        tmp.persist(path).map_err(|e| CasError::io("add", e.error))?;
        sync_dir(parent).map_err(|e| CasError::io("add", e))?;
        Ok(())
    }
}

/// Make renames and new entries in `dir` durable.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

impl ChunkStore for FileChunkStore {
    fn add(&self, chunk: &Chunk) -> CasResult<Key> {
        chunk.validate()?;
        let key = chunk.key();
        self.adds.fetch_add(1, Ordering::Relaxed);
        let path = self.path_for(&key);
        if path.exists() {
            self.dedup_hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key.short_hex(), "chunk deduplicated");
            return Ok(key);
        }
        self.write_new(&path, chunk)?;
        debug!(
            key = %key.short_hex(),
            chunk_type = %chunk.chunk_type,
            level = chunk.level,
            size = chunk.buf.len(),
            "chunk written"
        );
        Ok(key)
    }

    fn get(&self, key: &Key, chunk_type: &str, level: u8) -> CasResult<Chunk> {
        let data = match fs::read(self.path_for(key)) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CasError::NotFound { key: *key });
            }
            Err(e) => return Err(CasError::io("get", e)),
        };
        let chunk: Chunk = bincode::deserialize(&data)
            .map_err(|e| CasError::corrupt(key, format!("cannot decode: {e}")))?;
        chunk.verify(key, chunk_type, level)
    }

    fn contains(&self, key: &Key) -> CasResult<bool> {
        match fs::metadata(self.path_for(key)) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CasError::io("contains", e)),
        }
    }
}

impl std::fmt::Debug for FileChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileChunkStore")
            .field("root", &self.root)
            .finish()
    }
}
