use cairn_types::{ErrorKind, Interrupted, Key};

/// Errors from chunk store operations.
#[derive(Debug, thiserror::Error)]
pub enum CasError {
    /// No chunk is stored under the key.
    #[error("chunk not found: {key}")]
    NotFound { key: Key },

    /// The stored chunk failed to decode, or failed a type, level or digest
    /// check.
    #[error("corrupt chunk {key}: {reason}")]
    Corrupt { key: Key, reason: String },

    /// The underlying medium failed.
    #[error("storage unavailable during {op}: {source}")]
    StorageUnavailable {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The request was malformed before any storage was touched.
    #[error("invalid chunk request: {0}")]
    Invalid(String),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl CasError {
    pub(crate) fn corrupt(key: &Key, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            key: *key,
            reason: reason.into(),
        }
    }

    pub(crate) fn io(op: &'static str, source: std::io::Error) -> Self {
        Self::StorageUnavailable { op, source }
    }

    /// Coarse classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Corrupt { .. } => ErrorKind::Corrupt,
            Self::StorageUnavailable { .. } => ErrorKind::StorageUnavailable,
            Self::Invalid(_) => ErrorKind::Invalid,
            Self::Interrupted(_) => ErrorKind::Interrupted,
        }
    }
}

/// Result alias for chunk store operations.
pub type CasResult<T> = Result<T, CasError>;
