//! Distributed block store binding.
//!
//! [`RemoteBlockStorage`] adapts any [`BlockService`] (an IPFS-style
//! `block/get` + `block/put` API) to the [`Storage`] contract. The wire client
//! is supplied by the embedding application; this module owns the error
//! mapping.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use hamt_types::ContentAddress;
use tracing::debug;

use crate::error::{StoreError, StoreResult, TransportError};
use crate::traits::{BlockWrite, Storage};

/// Client for a remote block service.
pub trait BlockService: Send + Sync + std::fmt::Debug {
    /// Fetch a block. `Ok(None)` means the service answered that it has no
    /// block at `address`.
    fn block_get(&self, address: &ContentAddress) -> Result<Option<Vec<u8>>, TransportError>;

    /// Upload a block under `address`.
    fn block_put(&self, address: &ContentAddress, data: &[u8]) -> Result<(), TransportError>;
}

impl<S: BlockService + ?Sized> BlockService for Arc<S> {
    fn block_get(&self, address: &ContentAddress) -> Result<Option<Vec<u8>>, TransportError> {
        (**self).block_get(address)
    }

    fn block_put(&self, address: &ContentAddress, data: &[u8]) -> Result<(), TransportError> {
        (**self).block_put(address, data)
    }
}

/// [`Storage`] backed by a remote block service.
#[derive(Debug)]
pub struct RemoteBlockStorage<S> {
    service: S,
}

impl<S: BlockService> RemoteBlockStorage<S> {
    const BACKEND: &'static str = "remote-block";

    pub fn new(service: S) -> Self {
        Self { service }
    }

    /// The underlying service client.
    pub fn service(&self) -> &S {
        &self.service
    }

    fn unavailable(err: TransportError) -> StoreError {
        StoreError::Unavailable {
            backend: Self::BACKEND,
            reason: err.0,
        }
    }
}

impl<S: BlockService> Storage for RemoteBlockStorage<S> {
    fn backend(&self) -> &'static str {
        Self::BACKEND
    }

    fn read(&self, address: &ContentAddress) -> StoreResult<Bytes> {
        match self.service.block_get(address).map_err(Self::unavailable)? {
            Some(data) => Ok(Bytes::from(data)),
            None => Err(StoreError::NotFound(*address)),
        }
    }

    fn begin_write(&self) -> StoreResult<BlockWrite<'_>> {
        Ok(BlockWrite::new(move |address, data| {
            self.service
                .block_put(address, &data)
                .map_err(Self::unavailable)?;
            debug!(address = %address.short_hex(), len = data.len(), "block uploaded");
            Ok(())
        }))
    }
}

/// In-process [`BlockService`] for tests and single-process deployments.
///
/// Can be switched offline to exercise transport failure paths.
#[derive(Debug)]
pub struct InMemoryBlockService {
    blocks: RwLock<HashMap<ContentAddress, Vec<u8>>>,
    available: AtomicBool,
}

impl InMemoryBlockService {
    pub fn new() -> Self {
        Self {
            blocks: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the service going offline (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), TransportError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::new("connection refused"))
        }
    }
}

impl Default for InMemoryBlockService {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockService for InMemoryBlockService {
    fn block_get(&self, address: &ContentAddress) -> Result<Option<Vec<u8>>, TransportError> {
        self.check_available()?;
        let blocks = self
            .blocks
            .read()
            .map_err(|e| TransportError::new(format!("lock poisoned: {e}")))?;
        Ok(blocks.get(address).cloned())
    }

    fn block_put(&self, address: &ContentAddress, data: &[u8]) -> Result<(), TransportError> {
        self.check_available()?;
        let mut blocks = self
            .blocks
            .write()
            .map_err(|e| TransportError::new(format!("lock poisoned: {e}")))?;
        blocks.entry(*address).or_insert_with(|| data.to_vec());
        Ok(())
    }
}
