//! Foundation types for cairn.
//!
//! Every other cairn crate depends on `cairn-types`.
//!
//! # Key Types
//!
//! - [`Key`] -- Content address of a stored chunk (BLAKE3 digest)
//! - [`ErrorKind`] -- Coarse classification shared by every cairn error type
//! - [`Interrupt`] -- Caller-owned cancellation flag

pub mod error;
pub mod interrupt;
pub mod key;
pub mod kind;

pub use error::TypeError;
pub use interrupt::{Interrupt, Interrupted};
pub use key::{Key, KEY_LEN};
pub use kind::ErrorKind;
