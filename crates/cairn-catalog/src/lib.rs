//! Transactional catalog for cairn.
//!
//! The catalog is a small embedded key/value store organised in named
//! buckets of `name -> bytes` pairs. It is the only mutable state of the
//! snapshot subsystem: everything it points at lives in the chunk store.
//!
//! # Transactions
//!
//! - A read transaction ([`ReadTxn`]) sees the catalog as of the moment it
//!   began and never blocks writers.
//! - A write transaction ([`WriteTxn`]) buffers its changes and publishes
//!   them atomically on [`WriteTxn::commit`]. Dropping it without committing
//!   discards everything.
//!
//! The [`view`] and [`update`] helpers wrap both in closures.
//!
//! # Backends
//!
//! - [`InMemoryCatalog`] -- copy-on-write snapshots, for tests and embedding
//! - [`SledCatalog`] -- persistent, one `sled` tree per bucket
//!
//! Touching a bucket that was never created is
//! [`CatalogError::SchemaInvariantViolated`]: buckets are created once at
//! initialisation, so a missing one means the catalog is not what the caller
//! thinks it is.

pub mod error;
pub mod memory;
pub mod sled_backend;
pub mod traits;

pub use error::{CatalogError, CatalogResult};
pub use memory::InMemoryCatalog;
pub use sled_backend::SledCatalog;
pub use traits::{init_bucket, update, view, Catalog, ReadTxn, WriteTxn};
