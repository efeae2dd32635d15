//! The directory of named snapshots.

use std::sync::Arc;

use cairn_cas::{BlobConfig, ChunkStore};
use cairn_catalog::{init_bucket, view, Catalog, CatalogError};
use cairn_snap::codec::decode_ref;
use cairn_snap::{capture, restore, EntryInfo, LiveTree, NodeAttr, NodeKind, RootNode, SNAPSHOT_BUCKET};
use cairn_types::{ErrorKind, Interrupt, Key};
use tracing::debug;

use crate::error::{FsError, FsResult};

/// Permission bits of the listing directory. Creating an entry in it takes
/// a snapshot, so unlike restored trees it is writable.
pub const LISTING_MODE: u32 = 0o755;

/// Named snapshots: a catalog bucket of references plus the chunk store
/// they point into.
///
/// Both handles are injected, so several independent instances can live in
/// one process.
pub struct SnapshotDir {
    store: Arc<dyn ChunkStore>,
    catalog: Arc<dyn Catalog>,
    config: BlobConfig,
}

impl SnapshotDir {
    /// Create the snapshot bucket if needed, then open.
    pub fn init(
        store: Arc<dyn ChunkStore>,
        catalog: Arc<dyn Catalog>,
        config: BlobConfig,
    ) -> FsResult<Self> {
        init_bucket(catalog.as_ref(), SNAPSHOT_BUCKET)
            .map_err(FsError::catalog("create bucket", SNAPSHOT_BUCKET))?;
        Self::open(store, catalog, config)
    }

    /// Open over an initialized catalog.
    ///
    /// Fails with `SchemaInvariantViolated` if the snapshot bucket is absent.
    pub fn open(
        store: Arc<dyn ChunkStore>,
        catalog: Arc<dyn Catalog>,
        config: BlobConfig,
    ) -> FsResult<Self> {
        let present = view(catalog.as_ref(), |txn| txn.has_bucket(SNAPSHOT_BUCKET))
            .map_err(FsError::catalog("open", SNAPSHOT_BUCKET))?;
        if !present {
            return Err(FsError::catalog("open", SNAPSHOT_BUCKET)(
                CatalogError::SchemaInvariantViolated {
                    bucket: SNAPSHOT_BUCKET.to_string(),
                },
            ));
        }
        Ok(Self {
            store,
            catalog,
            config,
        })
    }

    pub fn config(&self) -> &BlobConfig {
        &self.config
    }

    /// All snapshot names in order. Reads only the catalog.
    pub fn list_names(&self, intr: &Interrupt) -> FsResult<Vec<String>> {
        intr.check()?;
        let pairs = view(self.catalog.as_ref(), |txn| txn.iter(SNAPSHOT_BUCKET))
            .map_err(FsError::catalog("list snapshots", SNAPSHOT_BUCKET))?;
        Ok(pairs.into_iter().map(|(name, _)| name).collect())
    }

    /// Snapshot names as directory entries.
    pub fn list_entries(&self, intr: &Interrupt) -> FsResult<Vec<EntryInfo>> {
        Ok(self
            .list_names(intr)?
            .into_iter()
            .map(|name| EntryInfo {
                name,
                kind: NodeKind::Dir,
                size: 0,
            })
            .collect())
    }

    /// Open the snapshot bound to `name`.
    pub fn lookup_by_name(&self, name: &str, intr: &Interrupt) -> FsResult<RootNode> {
        intr.check()?;
        let buf = view(self.catalog.as_ref(), |txn| txn.get(SNAPSHOT_BUCKET, name))
            .map_err(FsError::catalog("look up snapshot", name))?
            .ok_or_else(|| FsError::NotFound {
                name: name.to_string(),
            })?;
        let snapshot_ref = decode_ref(&buf).map_err(|e| FsError::CorruptReference {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        debug!(snapshot = name, key = %snapshot_ref.key.short_hex(), "snapshot resolved");
        self.open_referenced(name, &snapshot_ref.key, intr)
    }

    /// Open a root that the catalog binds to `name`. The binding guarantees
    /// the root was stored, so its absence is corruption.
    fn open_referenced(&self, name: &str, key: &Key, intr: &Interrupt) -> FsResult<RootNode> {
        match restore::open(Arc::clone(&self.store), key, intr) {
            Ok(root) => Ok(root),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(FsError::DanglingReference {
                name: name.to_string(),
                key: *key,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Capture `live` as `name` and open the result.
    pub fn create_by_name(
        &self,
        name: &str,
        live: &dyn LiveTree,
        intr: &Interrupt,
    ) -> FsResult<RootNode> {
        let snapshot_ref = capture(
            name,
            live,
            self.store.as_ref(),
            self.catalog.as_ref(),
            &self.config,
            intr,
        )?;
        self.open_referenced(name, &snapshot_ref.key, intr)
    }

    /// Attributes of the listing directory itself.
    pub fn attr(&self, intr: &Interrupt) -> FsResult<NodeAttr> {
        let entries = self.list_names(intr)?.len() as u64;
        Ok(NodeAttr {
            kind: NodeKind::Dir,
            size: entries,
            mode: LISTING_MODE,
            nlink: 2,
        })
    }
}

impl std::fmt::Debug for SnapshotDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotDir")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
