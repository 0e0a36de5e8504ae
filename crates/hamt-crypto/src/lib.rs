//! Content hashing for HAMT container blocks.
//!
//! Every block the trie layer persists is addressed by a domain-separated
//! BLAKE3 hash. The domain tag carries the scheme version, so a future change
//! to the node encoding produces a disjoint address space.

pub mod hasher;

pub use hasher::ContentHasher;
