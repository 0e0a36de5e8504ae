use std::fmt;
use std::io;

use bytes::Bytes;
use hamt_types::ContentAddress;

use crate::error::StoreResult;

/// Write-once block storage keyed by content address.
///
/// All implementations must satisfy these invariants:
/// - A block is immutable once committed. Committing the same address again
///   is a no-op; committing different bytes under an existing address cannot
///   happen because callers derive the address from the bytes.
/// - `read` of an unknown address fails with `StoreError::NotFound`.
/// - Transport failures surface as `StoreError::Unavailable`, never as
///   `NotFound`.
/// - Calls are synchronous and return-or-fail; cancellation and timeouts are
///   the backend's concern.
pub trait Storage: Send + Sync + fmt::Debug {
    /// Short backend name used in logs and error messages.
    fn backend(&self) -> &'static str;

    /// Read the bytes stored at `address`.
    fn read(&self, address: &ContentAddress) -> StoreResult<Bytes>;

    /// Open a byte sink for a new block.
    ///
    /// Nothing is persisted until [`BlockWrite::commit`] associates the
    /// written bytes with their address.
    fn begin_write(&self) -> StoreResult<BlockWrite<'_>>;

    /// Check whether a block exists.
    ///
    /// Default implementation reads the block. Backends may override with a
    /// cheaper check.
    fn contains(&self, address: &ContentAddress) -> StoreResult<bool> {
        match self.read(address) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

type Committer<'a> = Box<dyn FnOnce(&ContentAddress, Bytes) -> StoreResult<()> + Send + 'a>;

/// An in-progress block write: a byte sink plus its commit callback.
///
/// Dropping a `BlockWrite` without committing discards the buffered bytes.
pub struct BlockWrite<'a> {
    buf: Vec<u8>,
    committer: Committer<'a>,
}

impl<'a> BlockWrite<'a> {
    /// Create a sink whose commit hands the buffered bytes to `committer`.
    pub fn new<F>(committer: F) -> Self
    where
        F: FnOnce(&ContentAddress, Bytes) -> StoreResult<()> + Send + 'a,
    {
        Self {
            buf: Vec::new(),
            committer: Box::new(committer),
        }
    }

    /// Bytes written so far.
    pub fn written(&self) -> &[u8] {
        &self.buf
    }

    /// Durably associate the written bytes with `address`.
    pub fn commit(self, address: &ContentAddress) -> StoreResult<()> {
        (self.committer)(address, Bytes::from(self.buf))
    }
}

impl io::Write for BlockWrite<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Debug for BlockWrite<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockWrite")
            .field("buffered", &self.buf.len())
            .finish()
    }
}
