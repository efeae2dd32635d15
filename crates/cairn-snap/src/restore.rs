//! Lazy, read-only restore of stored snapshots.
//!
//! [`open`] fetches only the `"snap"` root chunk. Every other chunk is
//! fetched when a caller lists a directory or reads a file, and nothing is
//! cached between calls, so an open tree pins no store or catalog resources.
//! Distinct `open` calls share no mutable state.

use std::sync::Arc;

use cairn_cas::{blob, BlobReader, ChunkStore, Manifest, TYPE_DIR, TYPE_FILE, TYPE_SNAP};
use cairn_types::{Interrupt, Key};
use tracing::debug;

use crate::codec::{decode_dirents, decode_snapshot};
use crate::error::{SnapError, SnapResult};
use crate::wire::{Dir, Dirent, DirentKind, File};

/// Permission bits of restored directories.
pub const DIR_MODE: u32 = 0o555;
/// Permission bits of restored regular files.
pub const FILE_MODE: u32 = 0o444;
/// Permission bits of restored executable files.
pub const EXEC_MODE: u32 = 0o555;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Dir,
}

/// Attributes of a restored node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeAttr {
    pub kind: NodeKind,
    /// File length in bytes, or number of entries for a directory.
    pub size: u64,
    pub mode: u32,
    pub nlink: u32,
}

/// One line of a directory listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub kind: NodeKind,
    pub size: u64,
}

fn check_type(manifest: &Manifest, expected: &'static str, what: &'static str) -> SnapResult<()> {
    if manifest.chunk_type != expected {
        return Err(SnapError::Corrupt {
            what,
            key: manifest.root,
            reason: format!("blob type {:?}, expected {expected:?}", manifest.chunk_type),
        });
    }
    Ok(())
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty() && *s != ".")
}

/// Open the snapshot whose `"snap"` chunk is stored under `key`.
///
/// A missing or undecodable root is [`SnapError::CannotServeSnapshot`],
/// keeping the kind of the underlying failure.
pub fn open(store: Arc<dyn ChunkStore>, key: &Key, intr: &Interrupt) -> SnapResult<RootNode> {
    let cannot = |source: SnapError| SnapError::CannotServeSnapshot {
        key: *key,
        source: Box::new(source),
    };
    intr.check()?;
    let chunk = store
        .get(key, TYPE_SNAP, 0)
        .map_err(|source| cannot(SnapError::Store {
            op: "fetch snapshot",
            source,
        }))?;
    let snapshot = decode_snapshot(&chunk.buf).map_err(|e| {
        cannot(SnapError::Corrupt {
            what: "snapshot",
            key: *key,
            reason: e.to_string(),
        })
    })?;
    debug!(key = %key.short_hex(), name = %snapshot.name, "snapshot opened");
    Ok(RootNode {
        name: snapshot.name,
        key: *key,
        dir: SnapDir {
            store,
            dir: snapshot.contents,
        },
    })
}

/// The root of an opened snapshot.
#[derive(Clone)]
pub struct RootNode {
    name: String,
    key: Key,
    dir: SnapDir,
}

impl RootNode {
    /// The name recorded at capture time.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key of the `"snap"` chunk this tree was opened from.
    pub fn key(&self) -> Key {
        self.key
    }

    pub fn dir(&self) -> &SnapDir {
        &self.dir
    }

    pub fn list(&self, intr: &Interrupt) -> SnapResult<Vec<EntryInfo>> {
        self.dir.list(intr)
    }

    pub fn lookup(&self, name: &str, intr: &Interrupt) -> SnapResult<Node> {
        self.dir.lookup(name, intr)
    }

    pub fn walk(&self, path: &str, intr: &Interrupt) -> SnapResult<Node> {
        self.dir.walk(path, intr)
    }

    pub fn attr(&self) -> NodeAttr {
        self.dir.attr()
    }

    pub fn into_node(self) -> Node {
        Node::Dir(self.dir)
    }
}

impl std::fmt::Debug for RootNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootNode")
            .field("name", &self.name)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// A restored directory.
#[derive(Clone)]
pub struct SnapDir {
    store: Arc<dyn ChunkStore>,
    dir: Dir,
}

impl SnapDir {
    fn read_dirents(&self, intr: &Interrupt) -> SnapResult<Vec<Dirent>> {
        let manifest = &self.dir.manifest;
        check_type(manifest, TYPE_DIR, "directory")?;
        let buf = blob::read_all(self.store.as_ref(), manifest, intr)
            .map_err(SnapError::referenced("read directory"))?;
        let corrupt = |reason: String| SnapError::Corrupt {
            what: "directory",
            key: manifest.root,
            reason,
        };
        let dirents = decode_dirents(&buf).map_err(|e| corrupt(e.to_string()))?;
        if dirents.len() as u64 != self.dir.entries {
            return Err(corrupt(format!(
                "listing has {} entries, expected {}",
                dirents.len(),
                self.dir.entries
            )));
        }
        if dirents.windows(2).any(|w| w[0].name >= w[1].name) {
            return Err(corrupt("entries are not strictly ordered".into()));
        }
        Ok(dirents)
    }

    fn node(&self, dirent: Dirent) -> Node {
        node_for(&self.store, dirent)
    }

    /// Names, kinds and sizes of the immediate children.
    pub fn list(&self, intr: &Interrupt) -> SnapResult<Vec<EntryInfo>> {
        Ok(self
            .read_dirents(intr)?
            .into_iter()
            .map(|d| {
                let (kind, size) = match &d.kind {
                    DirentKind::File(f) => (NodeKind::File, f.manifest.size),
                    DirentKind::Dir(dir) => (NodeKind::Dir, dir.entries),
                };
                EntryInfo {
                    name: d.name,
                    kind,
                    size,
                }
            })
            .collect())
    }

    /// Children as unresolved entries. Each call fetches the listing again.
    pub fn entries(&self, intr: &Interrupt) -> SnapResult<impl Iterator<Item = LazyEntry>> {
        let store = Arc::clone(&self.store);
        Ok(self
            .read_dirents(intr)?
            .into_iter()
            .map(move |dirent| LazyEntry {
                store: Arc::clone(&store),
                dirent,
            }))
    }

    /// The child called `name`.
    pub fn lookup(&self, name: &str, intr: &Interrupt) -> SnapResult<Node> {
        let mut dirents = self.read_dirents(intr)?;
        match dirents.binary_search_by(|d| d.name.as_str().cmp(name)) {
            Ok(idx) => Ok(self.node(dirents.swap_remove(idx))),
            Err(_) => Err(SnapError::NoSuchEntry {
                name: name.to_string(),
            }),
        }
    }

    /// Resolve a slash-separated path one segment at a time. The empty path
    /// is this directory.
    pub fn walk(&self, path: &str, intr: &Interrupt) -> SnapResult<Node> {
        let mut node = Node::Dir(self.clone());
        for segment in split_path(path) {
            node = node.lookup(segment, intr)?;
        }
        Ok(node)
    }

    pub fn attr(&self) -> NodeAttr {
        NodeAttr {
            kind: NodeKind::Dir,
            size: self.dir.entries,
            mode: DIR_MODE,
            nlink: 2,
        }
    }
}

impl std::fmt::Debug for SnapDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapDir")
            .field("root", &self.dir.manifest.root)
            .field("entries", &self.dir.entries)
            .finish_non_exhaustive()
    }
}

/// A restored regular file.
#[derive(Clone)]
pub struct SnapFile {
    store: Arc<dyn ChunkStore>,
    name: String,
    file: File,
}

impl SnapFile {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.file.manifest.size
    }

    pub fn executable(&self) -> bool {
        self.file.executable
    }

    /// Read up to `len` bytes at `offset`, fetching only the chunks that
    /// cover the range.
    pub fn read_at(&self, offset: u64, len: u64, intr: &Interrupt) -> SnapResult<Vec<u8>> {
        check_type(&self.file.manifest, TYPE_FILE, "file")?;
        BlobReader::new(self.store.as_ref(), &self.file.manifest)
            .read_at(offset, len, intr)
            .map_err(SnapError::referenced("read file"))
    }

    pub fn read_all(&self, intr: &Interrupt) -> SnapResult<Vec<u8>> {
        self.read_at(0, self.size(), intr)
    }

    pub fn attr(&self) -> NodeAttr {
        NodeAttr {
            kind: NodeKind::File,
            size: self.size(),
            mode: if self.file.executable { EXEC_MODE } else { FILE_MODE },
            nlink: 1,
        }
    }
}

impl std::fmt::Debug for SnapFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapFile")
            .field("name", &self.name)
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}

fn node_for(store: &Arc<dyn ChunkStore>, dirent: Dirent) -> Node {
    match dirent.kind {
        DirentKind::Dir(dir) => Node::Dir(SnapDir {
            store: Arc::clone(store),
            dir,
        }),
        DirentKind::File(file) => Node::File(SnapFile {
            store: Arc::clone(store),
            name: dirent.name,
            file,
        }),
    }
}

/// A directory entry whose node has not been built yet.
#[derive(Clone)]
pub struct LazyEntry {
    store: Arc<dyn ChunkStore>,
    dirent: Dirent,
}

impl LazyEntry {
    pub fn name(&self) -> &str {
        &self.dirent.name
    }

    pub fn kind(&self) -> NodeKind {
        if self.dirent.is_dir() {
            NodeKind::Dir
        } else {
            NodeKind::File
        }
    }

    pub fn resolve(self) -> Node {
        node_for(&self.store, self.dirent)
    }
}

impl std::fmt::Debug for LazyEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyEntry")
            .field("name", &self.dirent.name)
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

/// Any restored node.
#[derive(Clone, Debug)]
pub enum Node {
    Dir(SnapDir),
    File(SnapFile),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Dir(_) => NodeKind::Dir,
            Node::File(_) => NodeKind::File,
        }
    }

    pub fn attr(&self) -> NodeAttr {
        match self {
            Node::Dir(d) => d.attr(),
            Node::File(f) => f.attr(),
        }
    }

    pub fn list(&self, intr: &Interrupt) -> SnapResult<Vec<EntryInfo>> {
        self.as_dir()?.list(intr)
    }

    pub fn lookup(&self, name: &str, intr: &Interrupt) -> SnapResult<Node> {
        self.as_dir()?.lookup(name, intr)
    }

    pub fn as_dir(&self) -> SnapResult<&SnapDir> {
        match self {
            Node::Dir(d) => Ok(d),
            Node::File(f) => Err(SnapError::NotADirectory {
                name: f.name.clone(),
            }),
        }
    }

    pub fn as_file(&self) -> Option<&SnapFile> {
        match self {
            Node::File(f) => Some(f),
            Node::Dir(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{capture, record, SNAPSHOT_BUCKET};
    use crate::live::MemTree;
    use cairn_cas::{BlobConfig, Chunk, InMemoryChunkStore};
    use cairn_catalog::InMemoryCatalog;
    use cairn_types::ErrorKind;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn never() -> Interrupt {
        Interrupt::never()
    }

    fn stored(tree: &MemTree, config: &BlobConfig) -> (Arc<InMemoryChunkStore>, Key) {
        let store = Arc::new(InMemoryChunkStore::new());
        let (key, _) = record("snap", tree, store.as_ref(), config, &never()).unwrap();
        (store, key)
    }

    fn open_tree(tree: &MemTree) -> (Arc<InMemoryChunkStore>, RootNode) {
        let (store, key) = stored(tree, &BlobConfig::default());
        let root = open(store.clone(), &key, &never()).unwrap();
        (store, root)
    }

    fn sample_tree() -> MemTree {
        let tree = MemTree::new();
        tree.write_file("a", "hello").unwrap();
        tree.write_file("b/c", "world").unwrap();
        tree.write_executable("run", "#!/bin/sh\n").unwrap();
        tree
    }

    fn read(node: &Node) -> Vec<u8> {
        node.as_file().unwrap().read_all(&never()).unwrap()
    }

    // =========================================================================
    // Open and traverse
    // =========================================================================

    #[test]
    fn open_lists_root() {
        let (_, root) = open_tree(&sample_tree());
        assert_eq!(root.name(), "snap");
        let listing = root.list(&never()).unwrap();
        assert_eq!(
            listing,
            vec![
                EntryInfo { name: "a".into(), kind: NodeKind::File, size: 5 },
                EntryInfo { name: "b".into(), kind: NodeKind::Dir, size: 1 },
                EntryInfo { name: "run".into(), kind: NodeKind::File, size: 10 },
            ]
        );
    }

    #[test]
    fn lookup_and_walk_read_content() {
        let (_, root) = open_tree(&sample_tree());
        assert_eq!(read(&root.lookup("a", &never()).unwrap()), b"hello");
        let b = root.lookup("b", &never()).unwrap();
        assert_eq!(read(&b.lookup("c", &never()).unwrap()), b"world");
        assert_eq!(read(&root.walk("b/c", &never()).unwrap()), b"world");
        assert_eq!(root.walk("", &never()).unwrap().kind(), NodeKind::Dir);
    }

    #[test]
    fn attrs_are_read_only() {
        let (_, root) = open_tree(&sample_tree());
        assert_eq!(root.attr().mode, DIR_MODE);
        assert_eq!(root.attr().size, 3);
        let a = root.lookup("a", &never()).unwrap().attr();
        assert_eq!((a.kind, a.size, a.mode, a.nlink), (NodeKind::File, 5, FILE_MODE, 1));
        let run = root.lookup("run", &never()).unwrap().attr();
        assert_eq!(run.mode, EXEC_MODE);
    }

    #[test]
    fn missing_child_is_not_found() {
        let (_, root) = open_tree(&sample_tree());
        let err = root.lookup("zzz", &never()).unwrap_err();
        assert!(matches!(err, SnapError::NoSuchEntry { .. }));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(root.walk("b/nope", &never()).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn directory_operations_on_a_file_are_invalid() {
        let (_, root) = open_tree(&sample_tree());
        let a = root.lookup("a", &never()).unwrap();
        assert_eq!(a.list(&never()).unwrap_err().kind(), ErrorKind::Invalid);
        assert_eq!(a.lookup("x", &never()).unwrap_err().kind(), ErrorKind::Invalid);
        assert_eq!(root.walk("a/x", &never()).unwrap_err().kind(), ErrorKind::Invalid);
    }

    #[test]
    fn lazy_entries_resolve_on_demand() {
        let (_, root) = open_tree(&sample_tree());
        let entries: Vec<LazyEntry> = root.dir().entries(&never()).unwrap().collect();
        let names: Vec<&str> = entries.iter().map(LazyEntry::name).collect();
        assert_eq!(names, vec!["a", "b", "run"]);
        assert_eq!(entries[1].kind(), NodeKind::Dir);

        let b = entries[1].clone().resolve();
        assert_eq!(b.list(&never()).unwrap()[0].name, "c");

        // Restartable: a second pass sees the same entries.
        assert_eq!(root.dir().entries(&never()).unwrap().count(), 3);
    }

    #[test]
    fn read_at_fetches_ranges_of_large_files() {
        let config = BlobConfig {
            chunk_size: 4,
            fanout: 2,
        };
        let data: Vec<u8> = (0u8..=99).collect();
        let tree = MemTree::new();
        tree.write_file("big", data.clone()).unwrap();
        let (store, key) = stored(&tree, &config);
        let root = open(store, &key, &never()).unwrap();
        let big = root.lookup("big", &never()).unwrap();
        let file = big.as_file().unwrap();
        assert_eq!(file.size(), 100);
        assert_eq!(file.read_at(10, 7, &never()).unwrap(), &data[10..17]);
        assert_eq!(file.read_at(98, 10, &never()).unwrap(), &data[98..]);
        assert!(file.read_at(100, 1, &never()).unwrap().is_empty());
        assert_eq!(file.read_all(&never()).unwrap(), data);
    }

    #[test]
    fn empty_file_round_trips() {
        let tree = MemTree::new();
        tree.write_file("empty", "").unwrap();
        let (_, root) = open_tree(&tree);
        assert!(read(&root.lookup("empty", &never()).unwrap()).is_empty());
    }

    // =========================================================================
    // Failures
    // =========================================================================

    #[test]
    fn unknown_root_cannot_be_served() {
        let store: Arc<dyn ChunkStore> = Arc::new(InMemoryChunkStore::new());
        let err = open(store, &Key::digest(b"nothing"), &never()).unwrap_err();
        assert!(matches!(err, SnapError::CannotServeSnapshot { .. }));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn altered_root_is_corrupt_not_missing() {
        let (store, key) = stored(&sample_tree(), &BlobConfig::default());
        store.replace_raw(key, Chunk::new(TYPE_SNAP, 0, b"garbage".to_vec()));
        let err = open(store, &key, &never()).unwrap_err();
        assert!(matches!(err, SnapError::CannotServeSnapshot { .. }));
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn undecodable_root_is_corrupt() {
        let store = Arc::new(InMemoryChunkStore::new());
        let key = store.add(&Chunk::new(TYPE_SNAP, 0, vec![1, 2, 3])).unwrap();
        let err = open(store, &key, &never()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn altered_file_chunk_is_corrupt_on_read() {
        let tree = MemTree::new();
        tree.write_file("f", "original").unwrap();
        let (store, root) = open_tree(&tree);
        let leaf = Chunk::new(TYPE_FILE, 0, b"original".to_vec()).key();
        store.replace_raw(leaf, Chunk::new(TYPE_FILE, 0, b"tampered".to_vec()));
        let f = root.lookup("f", &never()).unwrap();
        let err = f.as_file().unwrap().read_all(&never()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn missing_file_chunk_is_corrupt_not_missing() {
        let tree = MemTree::new();
        tree.write_file("f", "original").unwrap();
        let (store, root) = open_tree(&tree);
        assert!(store.remove_raw(&Chunk::new(TYPE_FILE, 0, b"original".to_vec()).key()));
        let f = root.lookup("f", &never()).unwrap();
        let err = f.as_file().unwrap().read_all(&never()).unwrap_err();
        assert!(matches!(err, SnapError::Corrupt { what: "missing chunk", .. }));
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn missing_directory_chunk_is_corrupt_not_missing() {
        let (store, root) = open_tree(&sample_tree());
        let Node::Dir(b) = root.lookup("b", &never()).unwrap() else {
            panic!("b is a directory");
        };
        assert!(store.remove_raw(&b.dir.manifest.root));
        let err = root.walk("b/c", &never()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        assert_eq!(b.list(&never()).unwrap_err().kind(), ErrorKind::Corrupt);
        // A name that was never there is still an ordinary miss.
        assert_eq!(root.lookup("zzz", &never()).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn tripped_interrupt_stops_restore() {
        let (store, key) = stored(&sample_tree(), &BlobConfig::default());
        let intr = Interrupt::new();
        let root = open(store.clone(), &key, &intr).unwrap();
        intr.trip();
        assert_eq!(root.list(&intr).unwrap_err().kind(), ErrorKind::Interrupted);
        assert_eq!(open(store, &key, &intr).unwrap_err().kind(), ErrorKind::Interrupted);
    }

    #[test]
    fn concurrent_opens_are_independent() {
        let store = Arc::new(InMemoryChunkStore::new());
        let cat = InMemoryCatalog::with_buckets(&[SNAPSHOT_BUCKET]);
        let r = capture(
            "s1",
            &sample_tree(),
            store.as_ref(),
            &cat,
            &BlobConfig::default(),
            &never(),
        )
        .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store: Arc<dyn ChunkStore> = store.clone();
                std::thread::spawn(move || {
                    let root = open(store, &r.key, &Interrupt::never()).unwrap();
                    let c = root.walk("b/c", &Interrupt::never()).unwrap();
                    c.as_file().unwrap().read_all(&Interrupt::never()).unwrap()
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), b"world");
        }
    }

    // =========================================================================
    // Round trip
    // =========================================================================

    fn collect(node: &Node, prefix: &str, out: &mut BTreeMap<String, Vec<u8>>) {
        match node {
            Node::File(f) => {
                out.insert(prefix.to_string(), f.read_all(&never()).unwrap());
            }
            Node::Dir(d) => {
                for entry in d.entries(&never()).unwrap() {
                    let path = format!("{prefix}/{}", entry.name());
                    collect(&entry.resolve(), &path, out);
                }
            }
        }
    }

    proptest! {
        #[test]
        fn restored_tree_matches_captured_tree(
            files in prop::collection::btree_map("[a-z]{1,8}", prop::collection::vec(any::<u8>(), 0..64), 0..8),
        ) {
            let tree = MemTree::new();
            let mut expected = BTreeMap::new();
            for (name, data) in &files {
                tree.write_file(name, data.clone()).unwrap();
                tree.write_file(&format!("SUB/{name}"), data.clone()).unwrap();
                expected.insert(format!("/{name}"), data.clone());
                expected.insert(format!("/SUB/{name}"), data.clone());
            }
            let config = BlobConfig { chunk_size: 16, fanout: 2 };
            let (store, key) = stored(&tree, &config);
            let root = open(store, &key, &never()).unwrap();
            let mut got = BTreeMap::new();
            collect(&root.into_node(), "", &mut got);
            prop_assert_eq!(got, expected);
        }
    }
}
