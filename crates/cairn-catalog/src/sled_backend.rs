//! Persistent catalog on top of `sled`.
//!
//! Each bucket is a `sled` tree. Write transactions buffer their changes and
//! apply them on commit as one atomic `sled::Batch` per bucket, followed by a
//! flush, so a committed entry is durable before `commit` returns.
//!
//! `sled` does not offer point-in-time snapshots. A read transaction instead
//! copies every bucket when it begins, while holding the writer lock, so no
//! commit can land half way through the copy. Catalogs hold one small
//! reference per snapshot, which keeps the copy cheap. A read that begins
//! while a write transaction is open waits for it to finish, so a thread
//! must not begin a read while holding a write.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::error::{CatalogError, CatalogResult};
use crate::traits::{validate_name, Catalog, ReadTxn, WriteTxn};

/// A [`Catalog`] stored in a `sled` database.
pub struct SledCatalog {
    db: sled::Db,
    writer: Mutex<()>,
}

impl SledCatalog {
    /// Open (or create) a catalog database at `path`.
    pub fn open(path: &Path) -> CatalogResult<Self> {
        let db = sled::open(path).map_err(|source| CatalogError::Storage { op: "open", source })?;
        Ok(Self::from_db(db))
    }

    /// Open a throwaway catalog that is deleted when dropped.
    pub fn temporary() -> CatalogResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|source| CatalogError::Storage { op: "open", source })?;
        Ok(Self::from_db(db))
    }

    /// Wrap an already opened database.
    pub fn from_db(db: sled::Db) -> Self {
        Self {
            db,
            writer: Mutex::new(()),
        }
    }
}

impl std::fmt::Debug for SledCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledCatalog").finish_non_exhaustive()
    }
}

impl Catalog for SledCatalog {
    fn begin_read(&self) -> CatalogResult<Box<dyn ReadTxn + '_>> {
        let _guard = self.writer.lock().expect("lock poisoned");
        let mut buckets = BTreeMap::new();
        for raw in self.db.tree_names() {
            if raw.as_ref() == DEFAULT_TREE {
                continue;
            }
            let bucket = decode_name("bucket names", &raw)?;
            let contents = scan(&self.db, &bucket)?;
            buckets.insert(bucket, contents);
        }
        Ok(Box::new(SledReadTxn { buckets }))
    }

    fn begin_write(&self) -> CatalogResult<Box<dyn WriteTxn + '_>> {
        let guard = self.writer.lock().expect("lock poisoned");
        Ok(Box::new(SledWriteTxn {
            db: &self.db,
            _guard: guard,
            created: BTreeSet::new(),
            pending: BTreeMap::new(),
        }))
    }
}

/// Name of the tree `sled` keeps for itself. It is never a bucket.
const DEFAULT_TREE: &[u8] = b"__sled__default";

fn storage(op: &'static str) -> impl FnOnce(sled::Error) -> CatalogError {
    move |source| CatalogError::Storage { op, source }
}

fn bucket_exists(db: &sled::Db, bucket: &str) -> CatalogResult<bool> {
    Ok(bucket.as_bytes() != DEFAULT_TREE
        && db
            .tree_names()
            .iter()
            .any(|name| name.as_ref() == bucket.as_bytes()))
}

fn open_bucket(db: &sled::Db, bucket: &str) -> CatalogResult<sled::Tree> {
    if !bucket_exists(db, bucket)? {
        return Err(CatalogError::missing(bucket));
    }
    db.open_tree(bucket).map_err(storage("open bucket"))
}

fn decode_name(bucket: &str, raw: &[u8]) -> CatalogResult<String> {
    String::from_utf8(raw.to_vec()).map_err(|e| CatalogError::Corrupt {
        bucket: bucket.to_string(),
        reason: format!("entry name is not UTF-8: {e}"),
    })
}

fn scan(db: &sled::Db, bucket: &str) -> CatalogResult<BTreeMap<String, Vec<u8>>> {
    let tree = open_bucket(db, bucket)?;
    let mut out = BTreeMap::new();
    for item in tree.iter() {
        let (k, v) = item.map_err(storage("iterate"))?;
        out.insert(decode_name(bucket, &k)?, v.to_vec());
    }
    Ok(out)
}

/// A copy of every bucket taken when the transaction began.
struct SledReadTxn {
    buckets: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
}

impl SledReadTxn {
    fn bucket(&self, bucket: &str) -> CatalogResult<&BTreeMap<String, Vec<u8>>> {
        self.buckets
            .get(bucket)
            .ok_or_else(|| CatalogError::missing(bucket))
    }
}

impl ReadTxn for SledReadTxn {
    fn has_bucket(&self, bucket: &str) -> CatalogResult<bool> {
        Ok(self.buckets.contains_key(bucket))
    }

    fn get(&self, bucket: &str, name: &str) -> CatalogResult<Option<Vec<u8>>> {
        Ok(self.bucket(bucket)?.get(name).cloned())
    }

    fn iter(&self, bucket: &str) -> CatalogResult<Vec<(String, Vec<u8>)>> {
        Ok(self
            .bucket(bucket)?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// `None` marks a pending delete.
type Pending = BTreeMap<String, BTreeMap<String, Option<Vec<u8>>>>;

struct SledWriteTxn<'a> {
    db: &'a sled::Db,
    _guard: MutexGuard<'a, ()>,
    created: BTreeSet<String>,
    pending: Pending,
}

impl SledWriteTxn<'_> {
    fn require_bucket(&self, bucket: &str) -> CatalogResult<()> {
        if self.created.contains(bucket) || bucket_exists(self.db, bucket)? {
            Ok(())
        } else {
            Err(CatalogError::missing(bucket))
        }
    }

    fn stored(&self, bucket: &str, name: &str) -> CatalogResult<Option<Vec<u8>>> {
        if self.created.contains(bucket) && !bucket_exists(self.db, bucket)? {
            return Ok(None);
        }
        let tree = open_bucket(self.db, bucket)?;
        let value = tree.get(name.as_bytes()).map_err(storage("get"))?;
        Ok(value.map(|v| v.to_vec()))
    }
}

impl ReadTxn for SledWriteTxn<'_> {
    fn has_bucket(&self, bucket: &str) -> CatalogResult<bool> {
        Ok(self.created.contains(bucket) || bucket_exists(self.db, bucket)?)
    }

    fn get(&self, bucket: &str, name: &str) -> CatalogResult<Option<Vec<u8>>> {
        self.require_bucket(bucket)?;
        if let Some(op) = self.pending.get(bucket).and_then(|ops| ops.get(name)) {
            return Ok(op.clone());
        }
        self.stored(bucket, name)
    }

    fn iter(&self, bucket: &str) -> CatalogResult<Vec<(String, Vec<u8>)>> {
        self.require_bucket(bucket)?;
        let mut merged = if bucket_exists(self.db, bucket)? {
            scan(self.db, bucket)?
        } else {
            BTreeMap::new()
        };
        if let Some(ops) = self.pending.get(bucket) {
            for (name, op) in ops {
                match op {
                    Some(value) => merged.insert(name.clone(), value.clone()),
                    None => merged.remove(name),
                };
            }
        }
        Ok(merged.into_iter().collect())
    }
}

impl WriteTxn for SledWriteTxn<'_> {
    fn create_bucket(&mut self, bucket: &str) -> CatalogResult<()> {
        validate_name("bucket", bucket)?;
        self.created.insert(bucket.to_string());
        Ok(())
    }

    fn put(&mut self, bucket: &str, name: &str, value: &[u8]) -> CatalogResult<()> {
        validate_name("entry", name)?;
        self.require_bucket(bucket)?;
        self.pending
            .entry(bucket.to_string())
            .or_default()
            .insert(name.to_string(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, bucket: &str, name: &str) -> CatalogResult<bool> {
        let existed = self.get(bucket, name)?.is_some();
        self.pending
            .entry(bucket.to_string())
            .or_default()
            .insert(name.to_string(), None);
        Ok(existed)
    }

    fn commit(self: Box<Self>) -> CatalogResult<()> {
        for bucket in &self.created {
            self.db.open_tree(bucket).map_err(storage("create bucket"))?;
        }
        let mut writes = 0usize;
        for (bucket, ops) in &self.pending {
            let tree = self.db.open_tree(bucket).map_err(storage("commit"))?;
            let mut batch = sled::Batch::default();
            for (name, op) in ops {
                match op {
                    Some(value) => batch.insert(name.as_bytes(), value.as_slice()),
                    None => batch.remove(name.as_bytes()),
                }
                writes += 1;
            }
            tree.apply_batch(batch).map_err(storage("commit"))?;
        }
        self.db.flush().map_err(storage("flush"))?;
        debug!(buckets = self.pending.len(), writes, "catalog commit");
        Ok(())
    }
}
