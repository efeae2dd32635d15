use cairn_catalog::CatalogError;
use cairn_snap::SnapError;
use cairn_types::{ErrorKind, Interrupted, Key};
use thiserror::Error;

/// Errors surfaced by the snapshot listing directory.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("no snapshot named {name:?}")]
    NotFound { name: String },

    /// The catalog entry exists but its bytes do not decode.
    #[error("corrupt reference for snapshot {name:?}: {reason}")]
    CorruptReference { name: String, reason: String },

    /// The catalog entry decodes but the snapshot it names is not stored.
    #[error("snapshot {name:?} refers to missing root {key}")]
    DanglingReference { name: String, key: Key },

    #[error(transparent)]
    Snap(#[from] SnapError),

    /// A catalog call failed. `name` is the snapshot, or the bucket for
    /// whole-listing operations.
    #[error("{op} {name:?}: {source}")]
    Catalog {
        op: &'static str,
        name: String,
        #[source]
        source: CatalogError,
    },

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl FsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::CorruptReference { .. } | Self::DanglingReference { .. } => ErrorKind::Corrupt,
            Self::Snap(e) => e.kind(),
            Self::Catalog { source, .. } => source.kind(),
            Self::Interrupted(_) => ErrorKind::Interrupted,
        }
    }

    pub(crate) fn catalog(op: &'static str, name: &str) -> impl FnOnce(CatalogError) -> FsError {
        let name = name.to_string();
        move |source| FsError::Catalog { op, name, source }
    }
}

pub type FsResult<T> = Result<T, FsError>;
