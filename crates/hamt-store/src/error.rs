use hamt_types::ContentAddress;

/// Errors from block storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No block exists at the requested address.
    #[error("block not found: {0}")]
    NotFound(ContentAddress),

    /// The backend could not be reached or refused the request.
    ///
    /// Distinct from [`StoreError::NotFound`]: the block may well exist.
    #[error("{backend} storage unavailable: {reason}")]
    Unavailable {
        backend: &'static str,
        reason: String,
    },

    /// I/O error from a local backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend returned bytes it could not decode.
    #[error("corrupt block {address}: {reason}")]
    Encoding {
        address: ContentAddress,
        reason: String,
    },

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

impl StoreError {
    /// Returns `true` if the block is known to be absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` if the backend failed to answer.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Failure reported by a remote transport (connection refused, timeout, ...).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
