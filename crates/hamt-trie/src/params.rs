use serde::{Deserialize, Serialize};

use crate::error::{TrieError, TrieResult};

/// Shape parameters of a trie.
///
/// `bit_width` is the number of hash bits consumed per level (fan-out
/// `2^bit_width`); `bucket_size` is the most entries a slot holds inline
/// before it is split into a child node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrieParams {
    pub bit_width: u8,
    pub bucket_size: usize,
}

impl TrieParams {
    pub const MAX_BIT_WIDTH: u8 = 8;

    pub fn new(bit_width: u8, bucket_size: usize) -> TrieResult<Self> {
        let params = Self {
            bit_width,
            bucket_size,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> TrieResult<()> {
        if self.bit_width == 0 || self.bit_width > Self::MAX_BIT_WIDTH {
            return Err(TrieError::InvalidParams(format!(
                "bit_width must be in 1..={}, got {}",
                Self::MAX_BIT_WIDTH,
                self.bit_width
            )));
        }
        if self.bucket_size == 0 {
            return Err(TrieError::InvalidParams("bucket_size must be at least 1".into()));
        }
        Ok(())
    }

    /// Number of slots per node.
    pub fn fanout(&self) -> usize {
        1 << self.bit_width
    }
}

impl Default for TrieParams {
    fn default() -> Self {
        Self {
            bit_width: 3,
            bucket_size: 64,
        }
    }
}
