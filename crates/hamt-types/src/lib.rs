//! Foundation types for HAMT containers.
//!
//! Every other crate in the workspace depends on `hamt-types` for the
//! identifier that names persisted blocks.
//!
//! # Key Types
//!
//! - [`ContentAddress`] — BLAKE3 digest naming an immutable block of bytes
//! - [`TypeError`] — failures parsing an address from text

pub mod address;
pub mod error;

pub use address::ContentAddress;
pub use error::TypeError;
