//! Error types for catalog operations.

use cairn_types::ErrorKind;
use thiserror::Error;

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// An expected bucket does not exist.
    #[error("catalog bucket missing: {bucket}")]
    SchemaInvariantViolated { bucket: String },

    /// Stored data cannot be interpreted (e.g. a key that is not UTF-8).
    #[error("corrupt catalog entry in {bucket}: {reason}")]
    Corrupt { bucket: String, reason: String },

    /// The request was malformed.
    #[error("invalid catalog request: {0}")]
    Invalid(String),

    /// The storage engine failed.
    #[error("catalog storage unavailable during {op}: {source}")]
    Storage {
        op: &'static str,
        #[source]
        source: sled::Error,
    },
}

impl CatalogError {
    pub(crate) fn missing(bucket: &str) -> Self {
        Self::SchemaInvariantViolated {
            bucket: bucket.to_string(),
        }
    }

    /// Coarse classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SchemaInvariantViolated { .. } => ErrorKind::SchemaInvariantViolated,
            Self::Corrupt { .. } => ErrorKind::Corrupt,
            Self::Invalid(_) => ErrorKind::Invalid,
            Self::Storage { .. } => ErrorKind::StorageUnavailable,
        }
    }
}

/// Convenience type alias for catalog operations.
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;
