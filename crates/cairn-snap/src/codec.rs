//! Deterministic byte encoding of the [`wire`](crate::wire) structures.
//!
//! Uses bincode with fixed-width integers and rejects trailing bytes, so
//! equal values always encode to equal bytes and decoding is exact.

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::wire::{Dirent, Snapshot, SnapshotRef};

/// A structure failed to encode or decode.
#[derive(Debug, thiserror::Error)]
#[error("cannot {op} {what}: {source}")]
pub struct CodecError {
    pub op: &'static str,
    pub what: &'static str,
    #[source]
    pub source: bincode::Error,
}

pub type CodecResult<T> = Result<T, CodecError>;

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

fn encode<T: Serialize>(what: &'static str, value: &T) -> CodecResult<Vec<u8>> {
    options().serialize(value).map_err(|source| CodecError {
        op: "encode",
        what,
        source,
    })
}

fn decode<T: DeserializeOwned>(what: &'static str, buf: &[u8]) -> CodecResult<T> {
    options().deserialize(buf).map_err(|source| CodecError {
        op: "decode",
        what,
        source,
    })
}

pub fn encode_snapshot(snapshot: &Snapshot) -> CodecResult<Vec<u8>> {
    encode("snapshot", snapshot)
}

pub fn decode_snapshot(buf: &[u8]) -> CodecResult<Snapshot> {
    decode("snapshot", buf)
}

pub fn encode_ref(snapshot_ref: &SnapshotRef) -> CodecResult<Vec<u8>> {
    encode("snapshot ref", snapshot_ref)
}

pub fn decode_ref(buf: &[u8]) -> CodecResult<SnapshotRef> {
    decode("snapshot ref", buf)
}

pub fn encode_dirents(dirents: &[Dirent]) -> CodecResult<Vec<u8>> {
    encode("directory", &dirents)
}

pub fn decode_dirents(buf: &[u8]) -> CodecResult<Vec<Dirent>> {
    decode("directory", buf)
}
