//! Persistent, content-addressed key-value containers.
//!
//! A [`Container`] accumulates staged writes, commits them into an immutable
//! trie snapshot persisted through a [`Storage`](hamt_store::Storage)
//! binding, and can later be reopened from the snapshot's
//! [`ContentAddress`]. A value may link to another container's snapshot, so
//! containers form a DAG addressed by content hash.
//!
//! # Lifecycle
//!
//! ```
//! use std::sync::Arc;
//! use hamt_container::{ContainerBuilder, Value};
//!
//! let child = Arc::new(ContainerBuilder::new().identity("child").build()?);
//! child.stage("foo", "bar")?;
//! child.commit()?;
//!
//! let parent = ContainerBuilder::new()
//!     .identity("parent")
//!     .storage(child.storage())
//!     .build()?;
//! parent.stage("child", &child)?;
//! parent.commit()?;
//!
//! let reopened = ContainerBuilder::new().from_nested(&parent, "child").build()?;
//! assert_eq!(reopened.get("foo")?, Value::Text("bar".into()));
//! assert_eq!(reopened.identity(), b"child");
//! # Ok::<(), hamt_container::ContainerError>(())
//! ```
//!
//! # Modules
//!
//! - [`value`] -- value kinds, the node decoder and stageable values
//! - [`container`] -- the container state machine
//! - [`builder`] -- configuration validation and construction
//! - [`key`] -- key normalization and the reserved identity key

pub mod builder;
pub mod container;
pub mod error;
pub mod key;
pub mod value;

pub use builder::{ContainerBuilder, ContainerConfig, DEFAULT_IDENTITY};
pub use container::{Container, EntryWriter, ExtraWrite};
pub use error::{ContainerError, ContainerResult, DecodeError};
pub use key::{display_key, normalize_key, RESERVED_KEY};
pub use value::{decode, Staged, Value, ValueKind};

pub use hamt_store::Storage;
pub use hamt_trie::TrieParams;
pub use hamt_types::ContentAddress;
