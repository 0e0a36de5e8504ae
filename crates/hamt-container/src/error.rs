use hamt_store::StoreError;
use hamt_trie::{NodeKind, TrieError};
use hamt_types::ContentAddress;

use crate::value::ValueKind;

/// Errors from container operations.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// A content address or lookup was requested before any commit or load.
    #[error("container {identity:?} has not been committed")]
    NotCommitted { identity: String },

    /// The key is absent from the committed snapshot.
    #[error("key not found: {key}")]
    NotFound { key: String },

    /// Nested resolution found no link under the key in the parent.
    #[error("no nested container under key {key}")]
    NoNestedFound { key: String },

    /// A typed accessor found a value of another kind.
    #[error("kind mismatch: expected {expected}, found {found}")]
    KindMismatch { expected: ValueKind, found: ValueKind },

    /// The value cannot be encoded into a container.
    #[error("unsupported value kind: {0}")]
    UnsupportedValueKind(String),

    /// The builder received mutually exclusive options.
    #[error("configuration conflict: {0}")]
    ConfigurationConflict(&'static str),

    /// Storage failure, surfaced verbatim from the backend.
    #[error(transparent)]
    Store(StoreError),

    #[error("trie error: {0}")]
    Trie(TrieError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A persisted key is not in the normalized hex form.
    #[error("persisted key is not hex-encoded: {0}")]
    CorruptKey(String),

    /// The loaded snapshot carries no readable identity entry.
    #[error("snapshot {address} has no identity entry")]
    MissingIdentity { address: ContentAddress },

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

impl ContainerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_kind_mismatch(&self) -> bool {
        matches!(self, Self::KindMismatch { .. })
    }
}

impl From<StoreError> for ContainerError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<TrieError> for ContainerError {
    fn from(err: TrieError) -> Self {
        // Unwrap storage failures so callers see the backend variant directly.
        match err {
            TrieError::Store(store) => Self::Store(store),
            other => Self::Trie(other),
        }
    }
}

/// Failure classifying a persisted node.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("node of kind {0} is not a basic value")]
    UnsupportedKind(NodeKind),
}

/// Result alias for container operations.
pub type ContainerResult<T> = Result<T, ContainerError>;
