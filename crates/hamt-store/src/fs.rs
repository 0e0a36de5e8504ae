use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use hamt_types::ContentAddress;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlockWrite, Storage};

/// Filesystem block store.
///
/// Each block lives in its own file at `<root>/<aa>/<rest-of-hex>`, fanned
/// out on the first address byte like git's loose objects. Writes land in a
/// temporary file in the target directory and are renamed into place, so a
/// reader never observes a partially written block.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Open (creating if necessary) a block store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn block_path(&self, address: &ContentAddress) -> PathBuf {
        let hex = address.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }

    fn persist(&self, address: &ContentAddress, data: &[u8]) -> StoreResult<()> {
        let path = self.block_path(address);
        if path.exists() {
            return Ok(());
        }
        let dir = path
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "block path has no parent"))?;
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        debug!(address = %address.short_hex(), len = data.len(), "block persisted");
        Ok(())
    }
}

impl Storage for FsStorage {
    fn backend(&self) -> &'static str {
        "fs"
    }

    fn read(&self, address: &ContentAddress) -> StoreResult<Bytes> {
        match std::fs::read(self.block_path(address)) {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound(*address)),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn begin_write(&self) -> StoreResult<BlockWrite<'_>> {
        Ok(BlockWrite::new(move |address, data| self.persist(address, &data)))
    }

    fn contains(&self, address: &ContentAddress) -> StoreResult<bool> {
        Ok(self.block_path(address).is_file())
    }
}
