//! Error types for snapshot capture and restore.

use cairn_cas::CasError;
use cairn_catalog::CatalogError;
use cairn_types::{ErrorKind, Interrupted, Key};
use thiserror::Error;

use crate::codec::CodecError;

/// Errors that can occur while capturing or restoring a snapshot.
#[derive(Debug, Error)]
pub enum SnapError {
    /// A snapshot root could not be fetched or decoded.
    ///
    /// Keeps the kind of the wrapped failure: a corrupt root stays corrupt.
    #[error("cannot serve snapshot {key}: {source}")]
    CannotServeSnapshot {
        key: Key,
        #[source]
        source: Box<SnapError>,
    },

    /// A chunk store call failed.
    #[error("{op}: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: CasError,
    },

    /// A catalog call failed.
    #[error("{op}: {source}")]
    Catalog {
        op: &'static str,
        #[source]
        source: CatalogError,
    },

    /// A stored structure failed to decode.
    #[error("corrupt {what} {key}: {reason}")]
    Corrupt {
        what: &'static str,
        key: Key,
        reason: String,
    },

    /// Encoding produced zero bytes. This is a bug, not an empty snapshot.
    #[error("marshaled snapshot {name:?} is empty")]
    EmptySerialization { name: String },

    /// A structure could not be encoded.
    #[error(transparent)]
    Encode(CodecError),

    /// The live tree could not be read.
    #[error("live tree {path:?}: {reason}")]
    Live {
        path: String,
        kind: ErrorKind,
        reason: String,
    },

    /// A snapshot or entry name is not usable.
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// No entry with this name in a restored directory.
    #[error("no such entry: {name:?}")]
    NoSuchEntry { name: String },

    /// A directory operation was applied to a file.
    #[error("not a directory: {name:?}")]
    NotADirectory { name: String },

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl SnapError {
    pub(crate) fn store(op: &'static str) -> impl FnOnce(CasError) -> SnapError {
        move |source| SnapError::Store { op, source }
    }

    /// Like [`SnapError::store`], for chunks a stored snapshot points at. Such
    /// a chunk going missing is corruption, never an ordinary miss.
    pub(crate) fn referenced(op: &'static str) -> impl FnOnce(CasError) -> SnapError {
        move |source| match source {
            CasError::NotFound { key } => SnapError::Corrupt {
                what: "missing chunk",
                key,
                reason: format!("referenced chunk is absent during {op}"),
            },
            source => SnapError::Store { op, source },
        }
    }

    pub(crate) fn live(path: &[String], kind: ErrorKind, reason: impl Into<String>) -> Self {
        SnapError::Live {
            path: path.join("/"),
            kind,
            reason: reason.into(),
        }
    }

    /// Coarse classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CannotServeSnapshot { source, .. } => source.kind(),
            Self::Store { source, .. } => source.kind(),
            Self::Catalog { source, .. } => source.kind(),
            Self::Corrupt { .. } => ErrorKind::Corrupt,
            Self::EmptySerialization { .. } => ErrorKind::EmptySerialization,
            Self::Encode(_) => ErrorKind::Invalid,
            Self::Live { kind, .. } => *kind,
            Self::InvalidName { .. } | Self::NotADirectory { .. } => ErrorKind::Invalid,
            Self::NoSuchEntry { .. } => ErrorKind::NotFound,
            Self::Interrupted(_) => ErrorKind::Interrupted,
        }
    }
}

/// Convenience type alias for snapshot operations.
pub type SnapResult<T> = std::result::Result<T, SnapError>;
