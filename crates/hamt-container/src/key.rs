//! Key normalization.
//!
//! Caller keys are arbitrary byte strings. They are persisted as lowercase
//! hex so that any byte sequence, printable or not, maps to a valid trie key.
//! The reserved identity key is stored verbatim; it contains characters that
//! never appear in hex output, so no caller key can collide with it.

/// Trie key under which every snapshot records its container's identity.
///
/// This is the one key in a persisted snapshot that is not hex: it is written
/// as this literal, so readers expecting an all-hex layout must skip it.
pub const RESERVED_KEY: &str = "__META_RESERVED_HAMT_KEY__";

/// Persisted form of a caller key.
pub fn normalize_key(key: &[u8]) -> String {
    hex::encode(key)
}

/// Inverse of [`normalize_key`]. `None` for keys not produced by it.
pub fn denormalize_key(key: &str) -> Option<Vec<u8>> {
    hex::decode(key).ok()
}

/// Human-readable rendering of a key: printable ASCII as-is, anything else
/// as hex.
pub fn display_key(key: &[u8]) -> String {
    if !key.is_empty() && key.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        String::from_utf8_lossy(key).into_owned()
    } else {
        hex::encode(key)
    }
}
