use hamt_store::StoreError;
use hamt_types::ContentAddress;

/// Errors from trie construction and traversal.
#[derive(Debug, thiserror::Error)]
pub enum TrieError {
    /// Storage failure, surfaced verbatim so callers can tell a missing block
    /// from an unreachable backend.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// A block's bytes do not hash to the address they were stored under.
    #[error("hash mismatch for block {address}")]
    HashMismatch { address: ContentAddress },

    #[error("invalid trie parameters: {0}")]
    InvalidParams(String),

    /// Key/value assignments were not paired correctly.
    #[error("map assembler misuse: {0}")]
    AssemblerState(&'static str),
}

/// Result alias for trie operations.
pub type TrieResult<T> = Result<T, TrieError>;
