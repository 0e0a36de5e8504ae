//! Block storage for HAMT containers.
//!
//! A [`Storage`] is a write-once address space of opaque byte blocks keyed by
//! [`ContentAddress`](hamt_types::ContentAddress). The caller computes the
//! address; storage only persists and retrieves bytes under it. The store
//! never interprets block contents.
//!
//! # Backends
//!
//! - [`MemoryStorage`] -- `HashMap`-based store for tests and embedding
//! - [`FsStorage`] -- one file per block under a root directory
//! - [`RemoteBlockStorage`] -- distributed block store behind a [`BlockService`]
//! - [`RemoteKvStorage`] -- remote key-value cache behind a [`KvService`]
//!
//! # Failure Model
//!
//! Every backend separates "address absent" ([`StoreError::NotFound`]) from
//! "backend could not answer" ([`StoreError::Unavailable`]). Nothing here
//! retries; retry policy belongs to the caller.

pub mod block;
pub mod error;
pub mod fs;
pub mod kv;
pub mod memory;
pub mod traits;

pub use block::{BlockService, InMemoryBlockService, RemoteBlockStorage};
pub use error::{StoreError, StoreResult, TransportError};
pub use fs::FsStorage;
pub use kv::{InMemoryKvService, KvService, RemoteKvStorage};
pub use memory::MemoryStorage;
pub use traits::{BlockWrite, Storage};
