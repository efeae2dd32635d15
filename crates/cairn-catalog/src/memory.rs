//! In-memory catalog for tests and embedding.
//!
//! [`InMemoryCatalog`] keeps the whole catalog as one immutable map behind
//! an `Arc`. A read transaction clones the `Arc` and so holds a frozen
//! snapshot for as long as it lives. A write transaction takes the single
//! writer lock, edits a private copy, and swaps it in on commit.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tracing::debug;

use crate::error::{CatalogError, CatalogResult};
use crate::traits::{validate_name, Catalog, ReadTxn, WriteTxn};

type Bucket = BTreeMap<String, Vec<u8>>;
type Buckets = BTreeMap<String, Bucket>;

/// An in-memory implementation of [`Catalog`].
///
/// Data is lost when the catalog is dropped.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    state: RwLock<Arc<Buckets>>,
    writer: Mutex<()>,
}

impl InMemoryCatalog {
    /// Create a new catalog with no buckets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog with the given buckets already present.
    pub fn with_buckets(buckets: &[&str]) -> Self {
        let map: Buckets = buckets
            .iter()
            .map(|b| (b.to_string(), Bucket::new()))
            .collect();
        Self {
            state: RwLock::new(Arc::new(map)),
            writer: Mutex::new(()),
        }
    }

    fn snapshot(&self) -> Arc<Buckets> {
        Arc::clone(&self.state.read().expect("lock poisoned"))
    }
}

impl Catalog for InMemoryCatalog {
    fn begin_read(&self) -> CatalogResult<Box<dyn ReadTxn + '_>> {
        Ok(Box::new(MemReadTxn {
            snapshot: self.snapshot(),
        }))
    }

    fn begin_write(&self) -> CatalogResult<Box<dyn WriteTxn + '_>> {
        let guard = self.writer.lock().expect("lock poisoned");
        let working = (*self.snapshot()).clone();
        Ok(Box::new(MemWriteTxn {
            catalog: self,
            _guard: guard,
            working,
        }))
    }
}

fn bucket<'a>(map: &'a Buckets, name: &str) -> CatalogResult<&'a Bucket> {
    map.get(name).ok_or_else(|| CatalogError::missing(name))
}

struct MemReadTxn {
    snapshot: Arc<Buckets>,
}

impl ReadTxn for MemReadTxn {
    fn has_bucket(&self, bucket_name: &str) -> CatalogResult<bool> {
        Ok(self.snapshot.contains_key(bucket_name))
    }

    fn get(&self, bucket_name: &str, name: &str) -> CatalogResult<Option<Vec<u8>>> {
        Ok(bucket(&self.snapshot, bucket_name)?.get(name).cloned())
    }

    fn iter(&self, bucket_name: &str) -> CatalogResult<Vec<(String, Vec<u8>)>> {
        Ok(bucket(&self.snapshot, bucket_name)?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

struct MemWriteTxn<'a> {
    catalog: &'a InMemoryCatalog,
    _guard: MutexGuard<'a, ()>,
    working: Buckets,
}

impl ReadTxn for MemWriteTxn<'_> {
    fn has_bucket(&self, bucket_name: &str) -> CatalogResult<bool> {
        Ok(self.working.contains_key(bucket_name))
    }

    fn get(&self, bucket_name: &str, name: &str) -> CatalogResult<Option<Vec<u8>>> {
        Ok(bucket(&self.working, bucket_name)?.get(name).cloned())
    }

    fn iter(&self, bucket_name: &str) -> CatalogResult<Vec<(String, Vec<u8>)>> {
        Ok(bucket(&self.working, bucket_name)?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

impl WriteTxn for MemWriteTxn<'_> {
    fn create_bucket(&mut self, bucket_name: &str) -> CatalogResult<()> {
        validate_name("bucket", bucket_name)?;
        self.working.entry(bucket_name.to_string()).or_default();
        Ok(())
    }

    fn put(&mut self, bucket_name: &str, name: &str, value: &[u8]) -> CatalogResult<()> {
        validate_name("entry", name)?;
        let bucket = self
            .working
            .get_mut(bucket_name)
            .ok_or_else(|| CatalogError::missing(bucket_name))?;
        bucket.insert(name.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, bucket_name: &str, name: &str) -> CatalogResult<bool> {
        let bucket = self
            .working
            .get_mut(bucket_name)
            .ok_or_else(|| CatalogError::missing(bucket_name))?;
        Ok(bucket.remove(name).is_some())
    }

    fn commit(self: Box<Self>) -> CatalogResult<()> {
        let this = *self;
        *this.catalog.state.write().expect("lock poisoned") = Arc::new(this.working);
        debug!("catalog commit");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{init_bucket, update, view};

    const BUCKET: &str = "snap";

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::with_buckets(&[BUCKET])
    }

    fn put(catalog: &InMemoryCatalog, name: &str, value: &[u8]) {
        update(catalog, |txn| txn.put(BUCKET, name, value)).unwrap();
    }

    #[test]
    fn put_then_get() {
        let c = catalog();
        put(&c, "s1", b"ref");
        let got = view(&c, |txn| txn.get(BUCKET, "s1")).unwrap();
        assert_eq!(got.as_deref(), Some(&b"ref"[..]));
    }

    #[test]
    fn get_absent_is_none() {
        let c = catalog();
        assert!(view(&c, |txn| txn.get(BUCKET, "nope")).unwrap().is_none());
    }

    #[test]
    fn missing_bucket_is_schema_violation() {
        let c = InMemoryCatalog::new();
        let err = view(&c, |txn| txn.get(BUCKET, "x")).unwrap_err();
        assert!(matches!(err, CatalogError::SchemaInvariantViolated { .. }));
        let err = update(&c, |txn| txn.put(BUCKET, "x", b"y")).unwrap_err();
        assert!(matches!(err, CatalogError::SchemaInvariantViolated { .. }));
    }

    #[test]
    fn init_bucket_is_idempotent() {
        let c = InMemoryCatalog::new();
        init_bucket(&c, BUCKET).unwrap();
        put(&c, "kept", b"1");
        init_bucket(&c, BUCKET).unwrap();
        assert!(view(&c, |txn| txn.get(BUCKET, "kept")).unwrap().is_some());
    }

    #[test]
    fn iter_is_ordered_by_name() {
        let c = catalog();
        for name in ["c", "a", "b"] {
            put(&c, name, name.as_bytes());
        }
        let names: Vec<String> = view(&c, |txn| txn.iter(BUCKET))
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn overwrite_supersedes() {
        let c = catalog();
        put(&c, "s1", b"old");
        put(&c, "s1", b"new");
        let got = view(&c, |txn| txn.get(BUCKET, "s1")).unwrap();
        assert_eq!(got.as_deref(), Some(&b"new"[..]));
    }

    #[test]
    fn read_txn_is_isolated_from_later_commits() {
        let c = catalog();
        put(&c, "before", b"1");
        let reader = c.begin_read().unwrap();
        put(&c, "after", b"2");
        assert!(reader.get(BUCKET, "after").unwrap().is_none());
        assert_eq!(reader.iter(BUCKET).unwrap().len(), 1);
        drop(reader);
        assert!(view(&c, |txn| txn.get(BUCKET, "after")).unwrap().is_some());
    }

    #[test]
    fn dropped_write_txn_publishes_nothing() {
        let c = catalog();
        {
            let mut txn = c.begin_write().unwrap();
            txn.put(BUCKET, "ghost", b"x").unwrap();
            assert!(txn.get(BUCKET, "ghost").unwrap().is_some());
        }
        assert!(view(&c, |txn| txn.get(BUCKET, "ghost")).unwrap().is_none());
    }

    #[test]
    fn failing_update_closure_publishes_nothing() {
        let c = catalog();
        let result: CatalogResult<()> = update(&c, |txn| {
            txn.put(BUCKET, "half", b"x")?;
            Err(CatalogError::Invalid("boom".into()))
        });
        assert!(result.is_err());
        assert!(view(&c, |txn| txn.get(BUCKET, "half")).unwrap().is_none());
    }

    #[test]
    fn delete_reports_presence() {
        let c = catalog();
        put(&c, "gone", b"x");
        assert!(update(&c, |txn| txn.delete(BUCKET, "gone")).unwrap());
        assert!(!update(&c, |txn| txn.delete(BUCKET, "gone")).unwrap());
    }

    #[test]
    fn empty_name_is_invalid() {
        let c = catalog();
        let err = update(&c, |txn| txn.put(BUCKET, "", b"x")).unwrap_err();
        assert!(matches!(err, CatalogError::Invalid(_)));
    }

    #[test]
    fn readers_do_not_block_writers() {
        use std::sync::Arc;
        use std::thread;

        let c = Arc::new(catalog());
        let reader = c.begin_read().unwrap();
        let writer = {
            let c = Arc::clone(&c);
            thread::spawn(move || {
                update(c.as_ref(), |txn| txn.put(BUCKET, "concurrent", b"x")).unwrap();
            })
        };
        writer.join().expect("writer should not panic");
        assert!(reader.get(BUCKET, "concurrent").unwrap().is_none());
    }
}
