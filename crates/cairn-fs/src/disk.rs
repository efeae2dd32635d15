//! A live tree backed by a real directory.
//!
//! [`DiskTree`] reads straight from the filesystem and cannot pin a point in
//! time: a file changed while a capture is walking may be seen in either
//! state. Symlinks and special files are skipped.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use cairn_cas::{blob, BlobConfig, ChunkStore, Manifest, TYPE_FILE};
use cairn_snap::{LiveEntry, LiveKind, LiveTree, LiveView, SnapError, SnapResult};
use cairn_types::{ErrorKind, Interrupt};
use tracing::warn;
use walkdir::WalkDir;

/// Directory on disk used as a capture source.
#[derive(Clone, Debug)]
pub struct DiskTree {
    root: PathBuf,
}

impl DiskTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn io_kind(e: &io::Error) -> ErrorKind {
    match e.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        io::ErrorKind::Interrupted => ErrorKind::Interrupted,
        _ => ErrorKind::StorageUnavailable,
    }
}

fn live_error(path: &Path, kind: ErrorKind, reason: impl Into<String>) -> SnapError {
    SnapError::Live {
        path: path.display().to_string(),
        kind,
        reason: reason.into(),
    }
}

fn from_io(path: &Path, e: io::Error) -> SnapError {
    live_error(path, io_kind(&e), e.to_string())
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    false
}

impl LiveTree for DiskTree {
    fn begin_read(&self) -> SnapResult<Box<dyn LiveView + '_>> {
        let meta = fs::metadata(&self.root).map_err(|e| from_io(&self.root, e))?;
        if !meta.is_dir() {
            return Err(live_error(&self.root, ErrorKind::Invalid, "not a directory"));
        }
        Ok(Box::new(DiskView { root: &self.root }))
    }
}

struct DiskView<'a> {
    root: &'a Path,
}

impl DiskView<'_> {
    fn resolve(&self, path: &[String]) -> PathBuf {
        let mut out = self.root.to_path_buf();
        out.extend(path);
        out
    }
}

impl LiveView for DiskView<'_> {
    fn list_dir(&self, path: &[String]) -> SnapResult<Vec<LiveEntry>> {
        let dir = self.resolve(path);
        let mut entries = Vec::new();
        for item in WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = item.map_err(|e| {
                let at = e.path().unwrap_or(&dir).to_path_buf();
                match e.into_io_error() {
                    Some(io) => from_io(&at, io),
                    None => live_error(&at, ErrorKind::Invalid, "filesystem loop"),
                }
            })?;
            let file_type = entry.file_type();
            let kind = if file_type.is_dir() {
                LiveKind::Dir
            } else if file_type.is_file() {
                let meta = entry.metadata().map_err(|e| {
                    live_error(entry.path(), ErrorKind::StorageUnavailable, e.to_string())
                })?;
                LiveKind::File {
                    executable: is_executable(&meta),
                }
            } else {
                warn!(path = %entry.path().display(), "skipping special file");
                continue;
            };
            let Some(name) = entry.file_name().to_str() else {
                return Err(live_error(entry.path(), ErrorKind::Invalid, "name is not UTF-8"));
            };
            entries.push(LiveEntry {
                name: name.to_string(),
                kind,
            });
        }
        Ok(entries)
    }

    fn file_manifest(
        &self,
        path: &[String],
        store: &dyn ChunkStore,
        config: &BlobConfig,
        intr: &Interrupt,
    ) -> SnapResult<Manifest> {
        let file = self.resolve(path);
        let reader = fs::File::open(&file).map_err(|e| from_io(&file, e))?;
        blob::write_reader(store, TYPE_FILE, io::BufReader::new(reader), config, intr).map_err(
            |source| SnapError::Store {
                op: "store file",
                source,
            },
        )
    }
}
