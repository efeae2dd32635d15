use std::fmt;

/// Coarse classification of a failure.
///
/// Every cairn error type maps onto one of these so that an adapter at the
/// edge (a vfs layer, a CLI) can pick its own vocabulary without matching on
/// each crate's variants. `Corrupt` and `SchemaInvariantViolated` must never
/// be reported as `NotFound`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An absent key or name. Recoverable; the caller decides.
    NotFound,
    /// Stored bytes failed to decode or failed a type/level/digest check.
    Corrupt,
    /// An expected catalog bucket is missing. Fatal, never retried.
    SchemaInvariantViolated,
    /// A serializer produced zero bytes where content was required.
    EmptySerialization,
    /// The underlying medium failed. May be retried by the caller.
    StorageUnavailable,
    /// The caller aborted the operation.
    Interrupted,
    /// The request itself was malformed (bad name, wrong node type).
    Invalid,
}

impl ErrorKind {
    /// Whether retrying the same call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StorageUnavailable | Self::Interrupted)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not found",
            Self::Corrupt => "corrupt",
            Self::SchemaInvariantViolated => "schema invariant violated",
            Self::EmptySerialization => "empty serialization",
            Self::StorageUnavailable => "storage unavailable",
            Self::Interrupted => "interrupted",
            Self::Invalid => "invalid request",
        };
        f.write_str(s)
    }
}
