//! Hashed array-mapped trie (HAMT) over content-addressed blocks.
//!
//! The trie turns a string-keyed map of [`Node`] values into a tree of
//! immutable blocks persisted through a [`Storage`](hamt_store::Storage).
//! Construction is canonical: the same entries always produce the same root
//! address, independent of assignment order, because the layout of every
//! node is a pure function of the entry set.
//!
//! # Building
//!
//! ```text
//! TrieBuilder::new(params, storage) -> begin_map(hint) -> assign_key/assign_* -> finish
//!                                   -> finalize(builder) -> Trie
//! ```
//!
//! # Reading
//!
//! [`Trie::load`] fetches and verifies the root block; child blocks are
//! fetched lazily by [`Trie::lookup`] and [`Trie::entries`].

pub mod builder;
pub mod error;
mod hamt;
pub mod node;
pub mod params;
pub mod trie;

pub use builder::{finalize, MapAssembler, TrieBuilder};
pub use error::{TrieError, TrieResult};
pub use node::{Node, NodeKind};
pub use params::TrieParams;
pub use trie::{Entries, Trie};
