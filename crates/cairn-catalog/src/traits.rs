//! The [`Catalog`] trait and its transaction interfaces.

use crate::error::{CatalogError, CatalogResult};

/// A consistent, read-only view of the catalog.
///
/// Every read through one transaction observes the same state, regardless
/// of writes committed after it began.
pub trait ReadTxn {
    /// Whether `bucket` exists.
    fn has_bucket(&self, bucket: &str) -> CatalogResult<bool>;

    /// Value stored under `name`, or `None` if absent.
    ///
    /// Fails with `SchemaInvariantViolated` if the bucket does not exist.
    fn get(&self, bucket: &str, name: &str) -> CatalogResult<Option<Vec<u8>>>;

    /// All pairs of `bucket`, ordered by name.
    ///
    /// Fails with `SchemaInvariantViolated` if the bucket does not exist.
    fn iter(&self, bucket: &str) -> CatalogResult<Vec<(String, Vec<u8>)>>;
}

/// A pending set of changes, published atomically by [`WriteTxn::commit`].
///
/// Reads through a write transaction see its own uncommitted changes.
/// Dropping the transaction without committing discards them.
pub trait WriteTxn: ReadTxn {
    /// Create `bucket` if it does not exist.
    fn create_bucket(&mut self, bucket: &str) -> CatalogResult<()>;

    /// Bind `name` to `value`, replacing any previous binding.
    fn put(&mut self, bucket: &str, name: &str, value: &[u8]) -> CatalogResult<()>;

    /// Remove the binding for `name`. Returns `true` if it existed.
    fn delete(&mut self, bucket: &str, name: &str) -> CatalogResult<bool>;

    /// Publish every change made through this transaction.
    fn commit(self: Box<Self>) -> CatalogResult<()>;
}

/// A transactional store of named buckets.
///
/// Implementations must be thread-safe. Read transactions must not block
/// on, or be blocked by, write transactions. Concurrent writers are
/// serialized; the last one to commit wins.
pub trait Catalog: Send + Sync {
    fn begin_read(&self) -> CatalogResult<Box<dyn ReadTxn + '_>>;

    fn begin_write(&self) -> CatalogResult<Box<dyn WriteTxn + '_>>;
}

/// Run `f` inside a read transaction.
pub fn view<T, E>(
    catalog: &dyn Catalog,
    f: impl FnOnce(&dyn ReadTxn) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<CatalogError>,
{
    let txn = catalog.begin_read()?;
    f(txn.as_ref())
}

/// Run `f` inside a write transaction, committing if it succeeds.
///
/// If `f` fails the transaction is dropped and nothing is published.
pub fn update<T, E>(
    catalog: &dyn Catalog,
    f: impl FnOnce(&mut dyn WriteTxn) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<CatalogError>,
{
    let mut txn = catalog.begin_write()?;
    let out = f(txn.as_mut())?;
    txn.commit()?;
    Ok(out)
}

/// Create `bucket` in its own write transaction. Idempotent.
pub fn init_bucket(catalog: &dyn Catalog, bucket: &str) -> CatalogResult<()> {
    update(catalog, |txn| txn.create_bucket(bucket))
}

pub(crate) fn validate_name(kind: &str, name: &str) -> CatalogResult<()> {
    if name.is_empty() {
        return Err(CatalogError::Invalid(format!("empty {kind} name")));
    }
    Ok(())
}
