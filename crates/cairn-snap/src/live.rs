//! The live tree a snapshot is captured from.
//!
//! Capture only needs two things from the live filesystem: a way to list a
//! directory and a way to turn a file's current bytes into a blob. Both go
//! through a [`LiveView`], obtained from [`LiveTree::begin_read`], and every
//! call through one view must observe the same state of the tree.
//!
//! [`MemTree`] is an in-memory live tree with real snapshot isolation: its
//! directories are shared copy-on-write, so a view pins the root it started
//! from while writers build new versions beside it.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use cairn_cas::{blob, BlobConfig, ChunkStore, Manifest, TYPE_FILE};
use cairn_types::{ErrorKind, Interrupt};

use crate::error::{SnapError, SnapResult};

/// What a live entry is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LiveKind {
    File { executable: bool },
    Dir,
}

/// One child of a live directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiveEntry {
    pub name: String,
    pub kind: LiveKind,
}

/// A consistent read view of a live tree.
///
/// Paths are sequences of entry names from the tree's root; the empty path
/// is the root itself.
pub trait LiveView {
    /// The children of the directory at `path`, in any order.
    fn list_dir(&self, path: &[String]) -> SnapResult<Vec<LiveEntry>>;

    /// Store the current content of the file at `path` and describe it.
    fn file_manifest(
        &self,
        path: &[String],
        store: &dyn ChunkStore,
        config: &BlobConfig,
        intr: &Interrupt,
    ) -> SnapResult<Manifest>;
}

/// A mutable tree that can hand out consistent read views.
pub trait LiveTree: Send + Sync {
    fn begin_read(&self) -> SnapResult<Box<dyn LiveView + '_>>;
}

#[derive(Clone, Debug, Default)]
struct MemDir {
    entries: BTreeMap<String, MemNode>,
}

#[derive(Clone, Debug)]
enum MemNode {
    File { data: Arc<[u8]>, executable: bool },
    Dir(Arc<MemDir>),
}

/// In-memory, copy-on-write live tree.
#[derive(Debug, Default)]
pub struct MemTree {
    root: RwLock<Arc<MemDir>>,
}

fn split(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn lookup<'a>(root: &'a MemDir, path: &[String]) -> SnapResult<Option<&'a MemNode>> {
    let Some((last, parents)) = path.split_last() else {
        return Ok(None);
    };
    let mut dir = root;
    for (depth, name) in parents.iter().enumerate() {
        dir = match dir.entries.get(name) {
            Some(MemNode::Dir(child)) => &**child,
            Some(MemNode::File { .. }) => {
                return Err(SnapError::live(&path[..=depth], ErrorKind::Invalid, "not a directory"))
            }
            None => return Err(SnapError::live(&path[..=depth], ErrorKind::NotFound, "no such directory")),
        };
    }
    Ok(dir.entries.get(last))
}

fn dir_mut<'a>(mut dir: &'a mut MemDir, path: &[String]) -> SnapResult<&'a mut MemDir> {
    for (depth, name) in path.iter().enumerate() {
        let node = dir
            .entries
            .entry(name.clone())
            .or_insert_with(|| MemNode::Dir(Arc::default()));
        dir = match node {
            MemNode::Dir(child) => Arc::make_mut(child),
            MemNode::File { .. } => {
                return Err(SnapError::live(&path[..=depth], ErrorKind::Invalid, "not a directory"))
            }
        };
    }
    Ok(dir)
}

impl MemTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut MemDir) -> SnapResult<T>) -> SnapResult<T> {
        let mut root = self.root.write().expect("lock poisoned");
        f(Arc::make_mut(&mut root))
    }

    /// Create or replace the file at `path`, creating missing parents.
    pub fn write_file(&self, path: &str, data: impl Into<Vec<u8>>) -> SnapResult<()> {
        self.put_file(path, data.into(), false)
    }

    /// Like [`MemTree::write_file`], marking the file executable.
    pub fn write_executable(&self, path: &str, data: impl Into<Vec<u8>>) -> SnapResult<()> {
        self.put_file(path, data.into(), true)
    }

    fn put_file(&self, path: &str, data: Vec<u8>, executable: bool) -> SnapResult<()> {
        let segments = split(path);
        let Some((name, parents)) = segments.split_last() else {
            return Err(SnapError::live(&segments, ErrorKind::Invalid, "cannot write the root"));
        };
        self.mutate(|root| {
            let dir = dir_mut(root, parents)?;
            if let Some(MemNode::Dir(_)) = dir.entries.get(name) {
                return Err(SnapError::live(&segments, ErrorKind::Invalid, "is a directory"));
            }
            dir.entries.insert(
                name.clone(),
                MemNode::File {
                    data: data.into(),
                    executable,
                },
            );
            Ok(())
        })
    }

    /// Create the directory at `path` and any missing parents.
    pub fn mkdir(&self, path: &str) -> SnapResult<()> {
        let segments = split(path);
        self.mutate(|root| dir_mut(root, &segments).map(|_| ()))
    }

    /// Remove the entry at `path`. Returns `true` if it existed.
    pub fn remove(&self, path: &str) -> SnapResult<bool> {
        let segments = split(path);
        let Some((name, parents)) = segments.split_last() else {
            return Err(SnapError::live(&segments, ErrorKind::Invalid, "cannot remove the root"));
        };
        self.mutate(|root| {
            if lookup(root, &segments)?.is_none() {
                return Ok(false);
            }
            Ok(dir_mut(root, parents)?.entries.remove(name).is_some())
        })
    }

    /// Current content of the file at `path`, if there is one.
    pub fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        let root = Arc::clone(&self.root.read().expect("lock poisoned"));
        match lookup(&root, &split(path)) {
            Ok(Some(MemNode::File { data, .. })) => Some(data.to_vec()),
            _ => None,
        }
    }
}

impl LiveTree for MemTree {
    fn begin_read(&self) -> SnapResult<Box<dyn LiveView + '_>> {
        let root = Arc::clone(&self.root.read().expect("lock poisoned"));
        Ok(Box::new(MemView { root }))
    }
}

/// A pinned version of a [`MemTree`].
struct MemView {
    root: Arc<MemDir>,
}

impl MemView {
    fn dir(&self, path: &[String]) -> SnapResult<&MemDir> {
        if path.is_empty() {
            return Ok(&self.root);
        }
        match lookup(&self.root, path)? {
            Some(MemNode::Dir(dir)) => Ok(&**dir),
            Some(MemNode::File { .. }) => Err(SnapError::live(path, ErrorKind::Invalid, "not a directory")),
            None => Err(SnapError::live(path, ErrorKind::NotFound, "no such directory")),
        }
    }
}

impl LiveView for MemView {
    fn list_dir(&self, path: &[String]) -> SnapResult<Vec<LiveEntry>> {
        Ok(self
            .dir(path)?
            .entries
            .iter()
            .map(|(name, node)| LiveEntry {
                name: name.clone(),
                kind: match node {
                    MemNode::File { executable, .. } => LiveKind::File {
                        executable: *executable,
                    },
                    MemNode::Dir(_) => LiveKind::Dir,
                },
            })
            .collect())
    }

    fn file_manifest(
        &self,
        path: &[String],
        store: &dyn ChunkStore,
        config: &BlobConfig,
        intr: &Interrupt,
    ) -> SnapResult<Manifest> {
        match lookup(&self.root, path)? {
            Some(MemNode::File { data, .. }) => {
                blob::write(store, TYPE_FILE, data, config, intr).map_err(SnapError::store("store file"))
            }
            Some(MemNode::Dir(_)) => Err(SnapError::live(path, ErrorKind::Invalid, "is a directory")),
            None => Err(SnapError::live(path, ErrorKind::NotFound, "no such file")),
        }
    }
}
