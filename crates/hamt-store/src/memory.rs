use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use hamt_types::ContentAddress;

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlockWrite, Storage};

/// In-memory, HashMap-based block store.
///
/// Intended for tests and embedding. Blocks are held behind a `RwLock` for
/// safe concurrent access and shared as reference-counted [`Bytes`], so reads
/// do not copy. Never fails after a successful write.
pub struct MemoryStorage {
    blocks: RwLock<HashMap<ContentAddress, Bytes>>,
}

impl MemoryStorage {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            blocks: RwLock::new(HashMap::new()),
        }
    }

    fn read_blocks(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<ContentAddress, Bytes>>> {
        self.blocks
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write_blocks(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<ContentAddress, Bytes>>> {
        self.blocks
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    /// Number of blocks currently stored.
    pub fn len(&self) -> usize {
        self.blocks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes across all stored blocks.
    pub fn total_bytes(&self) -> u64 {
        self.blocks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|block| block.len() as u64)
            .sum()
    }

    /// Return a sorted list of all addresses in the store.
    pub fn all_addresses(&self) -> Vec<ContentAddress> {
        let map = self.blocks.read().unwrap_or_else(PoisonError::into_inner);
        let mut addresses: Vec<ContentAddress> = map.keys().copied().collect();
        addresses.sort();
        addresses
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn read(&self, address: &ContentAddress) -> StoreResult<Bytes> {
        self.read_blocks()?
            .get(address)
            .cloned()
            .ok_or(StoreError::NotFound(*address))
    }

    fn begin_write(&self) -> StoreResult<BlockWrite<'_>> {
        Ok(BlockWrite::new(move |address, data| {
            // Idempotent: the same address always carries the same bytes.
            self.write_blocks()?.entry(*address).or_insert(data);
            Ok(())
        }))
    }

    fn contains(&self, address: &ContentAddress) -> StoreResult<bool> {
        Ok(self.read_blocks()?.contains_key(address))
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("block_count", &self.len())
            .finish()
    }
}
