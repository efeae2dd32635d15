//! Capturing a live tree into a snapshot.
//!
//! Capture walks one [`LiveView`], storing every file body and directory
//! listing as blobs, then stores the `"snap"` root chunk and only after
//! that binds the name in the catalog. A crash or interrupt between the two
//! leaves an orphaned chunk, never a name pointing at missing content.

use cairn_cas::{blob, BlobConfig, Chunk, ChunkStore, TYPE_DIR, TYPE_SNAP};
use cairn_catalog::Catalog;
use cairn_types::{ErrorKind, Interrupt, Key};
use tracing::{debug, info};

use crate::codec::{encode_dirents, encode_ref, encode_snapshot};
use crate::error::{SnapError, SnapResult};
use crate::live::{LiveKind, LiveTree, LiveView};
use crate::wire::{Dir, Dirent, DirentKind, File, Snapshot, SnapshotRef};

/// Catalog bucket holding name → [`SnapshotRef`] bindings.
pub const SNAPSHOT_BUCKET: &str = "snap";

/// Check that `name` can be used as a snapshot or entry name.
pub fn validate_name(name: &str) -> SnapResult<()> {
    let reason = if name.is_empty() {
        "empty"
    } else if name == "." || name == ".." {
        "reserved"
    } else if name.contains('/') {
        "contains '/'"
    } else if name.contains('\0') {
        "contains NUL"
    } else {
        return Ok(());
    };
    Err(SnapError::InvalidName {
        name: name.to_string(),
        reason,
    })
}

pub(crate) fn ensure_nonempty(name: &str, buf: &[u8]) -> SnapResult<()> {
    if buf.is_empty() {
        return Err(SnapError::EmptySerialization {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn capture_dir(
    view: &dyn LiveView,
    path: &mut Vec<String>,
    store: &dyn ChunkStore,
    config: &BlobConfig,
    intr: &Interrupt,
) -> SnapResult<Dir> {
    let mut listing = view.list_dir(path)?;
    listing.sort_by(|a, b| a.name.cmp(&b.name));
    if let Some(pair) = listing.windows(2).find(|w| w[0].name == w[1].name) {
        return Err(SnapError::live(
            path,
            ErrorKind::Invalid,
            format!("duplicate entry {:?}", pair[0].name),
        ));
    }

    let mut dirents = Vec::with_capacity(listing.len());
    for entry in listing {
        intr.check()?;
        validate_name(&entry.name)?;
        path.push(entry.name);
        let kind = match entry.kind {
            LiveKind::File { executable } => DirentKind::File(File {
                manifest: view.file_manifest(path, store, config, intr)?,
                executable,
            }),
            LiveKind::Dir => DirentKind::Dir(capture_dir(view, path, store, config, intr)?),
        };
        let name = path.pop().unwrap_or_default();
        dirents.push(Dirent { name, kind });
    }

    let buf = encode_dirents(&dirents).map_err(SnapError::Encode)?;
    let manifest = blob::write(store, TYPE_DIR, &buf, config, intr)
        .map_err(SnapError::store("store directory"))?;
    debug!(
        path = %path.join("/"),
        entries = dirents.len(),
        key = %manifest.root.short_hex(),
        "directory captured"
    );
    Ok(Dir {
        manifest,
        entries: dirents.len() as u64,
    })
}

/// Store a snapshot of `live` without binding it to a name.
///
/// Returns the key of the `"snap"` chunk and the record stored in it.
pub fn record(
    name: &str,
    live: &dyn LiveTree,
    store: &dyn ChunkStore,
    config: &BlobConfig,
    intr: &Interrupt,
) -> SnapResult<(Key, Snapshot)> {
    validate_name(name)?;
    debug!(snapshot = name, "capture started");
    let contents = {
        let view = live.begin_read()?;
        capture_dir(view.as_ref(), &mut Vec::new(), store, config, intr)?
    };
    let snapshot = Snapshot {
        name: name.to_string(),
        contents,
    };
    let buf = encode_snapshot(&snapshot).map_err(SnapError::Encode)?;
    ensure_nonempty(name, &buf)?;
    let key = store
        .add(&Chunk::new(TYPE_SNAP, 0, buf))
        .map_err(SnapError::store("store snapshot"))?;
    Ok((key, snapshot))
}

/// Capture `live` and bind it to `name`, superseding any earlier binding.
pub fn capture(
    name: &str,
    live: &dyn LiveTree,
    store: &dyn ChunkStore,
    catalog: &dyn Catalog,
    config: &BlobConfig,
    intr: &Interrupt,
) -> SnapResult<SnapshotRef> {
    let (key, snapshot) = record(name, live, store, config, intr)?;
    let snapshot_ref = SnapshotRef { key };
    let buf = encode_ref(&snapshot_ref).map_err(SnapError::Encode)?;

    intr.check()?;
    cairn_catalog::update(catalog, |txn| txn.put(SNAPSHOT_BUCKET, name, &buf)).map_err(
        |source| SnapError::Catalog {
            op: "record snapshot",
            source,
        },
    )?;

    info!(
        snapshot = name,
        key = %key.short_hex(),
        entries = snapshot.contents.entries,
        "snapshot captured"
    );
    Ok(snapshot_ref)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_dirents, decode_ref, decode_snapshot};
    use crate::live::MemTree;
    use cairn_cas::{CasResult, InMemoryChunkStore};
    use cairn_catalog::{view, InMemoryCatalog};

    fn sample_tree() -> MemTree {
        let tree = MemTree::new();
        tree.write_file("a", "hello").unwrap();
        tree.write_file("b/c", "world").unwrap();
        tree
    }

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::with_buckets(&[SNAPSHOT_BUCKET])
    }

    fn root_names(store: &InMemoryChunkStore, key: &Key) -> Vec<String> {
        let chunk = store.get(key, TYPE_SNAP, 0).unwrap();
        let snapshot = decode_snapshot(&chunk.buf).unwrap();
        let buf = blob::read_all(store, &snapshot.contents.manifest, &Interrupt::never()).unwrap();
        decode_dirents(&buf)
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect()
    }

    // =========================================================================
    // Capture
    // =========================================================================

    #[test]
    fn capture_binds_name_to_root() {
        let store = InMemoryChunkStore::new();
        let cat = catalog();
        let r = capture(
            "s1",
            &sample_tree(),
            &store,
            &cat,
            &BlobConfig::default(),
            &Interrupt::never(),
        )
        .unwrap();

        let stored = view(&cat, |txn| txn.get(SNAPSHOT_BUCKET, "s1")).unwrap().unwrap();
        assert_eq!(decode_ref(&stored).unwrap(), r);

        let chunk = store.get(&r.key, TYPE_SNAP, 0).unwrap();
        let snapshot = decode_snapshot(&chunk.buf).unwrap();
        assert_eq!(snapshot.name, "s1");
        assert_eq!(snapshot.contents.entries, 2);
        assert_eq!(root_names(&store, &r.key), vec!["a", "b"]);
    }

    #[test]
    fn recapture_reuses_every_content_chunk() {
        let store = InMemoryChunkStore::new();
        let cat = catalog();
        let tree = sample_tree();
        let config = BlobConfig::default();
        let intr = Interrupt::never();

        capture("s1", &tree, &store, &cat, &config, &intr).unwrap();
        let before = store.keys();
        let hits_before = store.stats().dedup_hits;

        capture("s2", &tree, &store, &cat, &config, &intr).unwrap();
        let after = store.keys();

        // Only the "snap" chunk differs, since it carries the name.
        assert_eq!(after.len(), before.len() + 1);
        assert!(before.iter().all(|k| after.contains(k)));
        assert_eq!(store.stats().dedup_hits - hits_before, before.len() as u64 - 1);
    }

    #[test]
    fn same_name_is_superseded() {
        let store = InMemoryChunkStore::new();
        let cat = catalog();
        let tree = sample_tree();
        let config = BlobConfig::default();
        let intr = Interrupt::never();

        let first = capture("s", &tree, &store, &cat, &config, &intr).unwrap();
        tree.write_file("extra", "!").unwrap();
        let second = capture("s", &tree, &store, &cat, &config, &intr).unwrap();
        assert_ne!(first, second);

        let stored = view(&cat, |txn| txn.get(SNAPSHOT_BUCKET, "s")).unwrap().unwrap();
        assert_eq!(decode_ref(&stored).unwrap(), second);
        // The old root stays in the store, just unreferenced.
        assert!(store.contains(&first.key).unwrap());
    }

    #[test]
    fn empty_tree_is_a_valid_snapshot() {
        let store = InMemoryChunkStore::new();
        let cat = catalog();
        let r = capture(
            "empty",
            &MemTree::new(),
            &store,
            &cat,
            &BlobConfig::default(),
            &Interrupt::never(),
        )
        .unwrap();
        assert!(root_names(&store, &r.key).is_empty());
    }

    #[test]
    fn invalid_names_are_rejected() {
        for name in ["", ".", "..", "a/b", "nul\0"] {
            let err = validate_name(name).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Invalid, "{name:?}");
        }
        validate_name("2024-01-01").unwrap();
    }

    #[test]
    fn empty_serialization_is_a_bug_marker() {
        let err = ensure_nonempty("s1", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptySerialization);
        ensure_nonempty("s1", &[0]).unwrap();
    }

    #[test]
    fn missing_bucket_fails_capture() {
        let store = InMemoryChunkStore::new();
        let cat = InMemoryCatalog::new();
        let err = capture(
            "s1",
            &sample_tree(),
            &store,
            &cat,
            &BlobConfig::default(),
            &Interrupt::never(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaInvariantViolated);
    }

    // =========================================================================
    // Isolation and aborts
    // =========================================================================

    /// Writes a file into the tree right after handing out a view.
    struct RacingTree {
        tree: MemTree,
    }

    impl LiveTree for RacingTree {
        fn begin_read(&self) -> SnapResult<Box<dyn LiveView + '_>> {
            let view = self.tree.begin_read()?;
            self.tree.write_file("late", "not included")?;
            self.tree.write_file("b/late", "not included")?;
            Ok(view)
        }
    }

    #[test]
    fn concurrent_mutation_is_not_captured() {
        let store = InMemoryChunkStore::new();
        let cat = catalog();
        let live = RacingTree {
            tree: sample_tree(),
        };
        let r = capture(
            "s1",
            &live,
            &store,
            &cat,
            &BlobConfig::default(),
            &Interrupt::never(),
        )
        .unwrap();
        assert_eq!(root_names(&store, &r.key), vec!["a", "b"]);
        assert!(live.tree.read_file("late").is_some());
    }

    /// Trips an interrupt as soon as a snapshot root has been stored.
    struct TripOnSnap {
        inner: InMemoryChunkStore,
        intr: Interrupt,
    }

    impl ChunkStore for TripOnSnap {
        fn add(&self, chunk: &Chunk) -> CasResult<Key> {
            let key = self.inner.add(chunk)?;
            if chunk.chunk_type == TYPE_SNAP {
                self.intr.trip();
            }
            Ok(key)
        }

        fn get(&self, key: &Key, chunk_type: &str, level: u8) -> CasResult<Chunk> {
            self.inner.get(key, chunk_type, level)
        }

        fn contains(&self, key: &Key) -> CasResult<bool> {
            self.inner.contains(key)
        }
    }

    #[test]
    fn abort_after_chunk_write_leaves_no_catalog_entry() {
        let intr = Interrupt::new();
        let store = TripOnSnap {
            inner: InMemoryChunkStore::new(),
            intr: intr.clone(),
        };
        let cat = catalog();
        let err = capture("s1", &sample_tree(), &store, &cat, &BlobConfig::default(), &intr)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Interrupted);

        let names = view(&cat, |txn| txn.iter(SNAPSHOT_BUCKET)).unwrap();
        assert!(names.is_empty());

        // The root chunk was written and is simply orphaned.
        let roots = store
            .inner
            .keys()
            .into_iter()
            .filter(|k| store.inner.get(k, TYPE_SNAP, 0).is_ok())
            .count();
        assert_eq!(roots, 1);
    }

    #[test]
    fn tripped_interrupt_stops_the_walk() {
        let store = InMemoryChunkStore::new();
        let cat = catalog();
        let intr = Interrupt::new();
        intr.trip();
        let err = capture("s1", &sample_tree(), &store, &cat, &BlobConfig::default(), &intr)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Interrupted);
        assert!(view(&cat, |txn| txn.get(SNAPSHOT_BUCKET, "s1")).unwrap().is_none());
    }

    /// Reports the same child twice.
    struct DuplicatingView;

    impl LiveView for DuplicatingView {
        fn list_dir(&self, _path: &[String]) -> SnapResult<Vec<crate::live::LiveEntry>> {
            let entry = crate::live::LiveEntry {
                name: "twice".into(),
                kind: LiveKind::Dir,
            };
            Ok(vec![entry.clone(), entry])
        }

        fn file_manifest(
            &self,
            path: &[String],
            _store: &dyn ChunkStore,
            _config: &BlobConfig,
            _intr: &Interrupt,
        ) -> SnapResult<cairn_cas::Manifest> {
            Err(SnapError::live(path, ErrorKind::NotFound, "no files here"))
        }
    }

    struct DuplicatingTree;

    impl LiveTree for DuplicatingTree {
        fn begin_read(&self) -> SnapResult<Box<dyn LiveView + '_>> {
            Ok(Box::new(DuplicatingView))
        }
    }

    #[test]
    fn duplicate_live_entries_are_rejected() {
        let store = InMemoryChunkStore::new();
        let err = record(
            "dup",
            &DuplicatingTree,
            &store,
            &BlobConfig::default(),
            &Interrupt::never(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }
}
