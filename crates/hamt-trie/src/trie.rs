use std::borrow::Cow;
use std::sync::Arc;

use hamt_store::Storage;
use hamt_types::ContentAddress;
use tracing::debug;

use crate::error::TrieResult;
use crate::hamt::{key_hash, read_block, slot_index, BucketEntry, HamtNode, Pointer, RootNode};
use crate::node::Node;
use crate::params::TrieParams;

/// An immutable, persisted trie.
///
/// Cloning is cheap: the root is shared and child blocks are fetched from the
/// storage binding on demand.
#[derive(Clone)]
pub struct Trie {
    address: ContentAddress,
    root: Arc<RootNode>,
    storage: Arc<dyn Storage>,
}

impl Trie {
    pub(crate) fn from_parts(address: ContentAddress, root: RootNode, storage: Arc<dyn Storage>) -> Self {
        Self {
            address,
            root: Arc::new(root),
            storage,
        }
    }

    /// Fetch and verify the root block at `address`.
    ///
    /// A missing root surfaces the backend's `NotFound` unchanged.
    pub fn load(storage: Arc<dyn Storage>, address: &ContentAddress) -> TrieResult<Self> {
        let root: RootNode = read_block(storage.as_ref(), address)?;
        root.params.validate()?;
        debug!(address = %address.short_hex(), backend = storage.backend(), "trie loaded");
        Ok(Self::from_parts(*address, root, storage))
    }

    /// Content address of the root block.
    pub fn address(&self) -> ContentAddress {
        self.address
    }

    /// Shape the trie was built with.
    pub fn params(&self) -> TrieParams {
        self.root.params
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Look up the value stored under `key`.
    pub fn lookup(&self, key: &str) -> TrieResult<Option<Node>> {
        let hash = key_hash(key);
        let bit_width = self.root.params.bit_width;
        let mut node: Cow<'_, HamtNode> = Cow::Borrowed(&self.root.hamt);
        let mut depth = 0;

        loop {
            let Some(index) = slot_index(&hash, depth, bit_width) else {
                return Ok(None);
            };
            if !node.has_slot(index) {
                return Ok(None);
            }
            let child = match &node.pointers[node.pointer_position(index)] {
                Pointer::Bucket(entries) => {
                    return Ok(entries
                        .binary_search_by(|e| e.key.as_str().cmp(key))
                        .ok()
                        .map(|i| entries[i].value.clone()));
                }
                Pointer::Link(address) => self.load_child(address)?,
            };
            node = Cow::Owned(child);
            depth += 1;
        }
    }

    /// Enumerate every entry in native order: slot order at each level,
    /// key order inside a bucket.
    pub fn entries(&self) -> Entries<'_> {
        Entries {
            trie: self,
            stack: vec![Frame {
                node: Cow::Borrowed(&self.root.hamt),
                next: 0,
            }],
            bucket: Vec::new().into_iter(),
        }
    }

    fn load_child(&self, address: &ContentAddress) -> TrieResult<HamtNode> {
        read_block(self.storage.as_ref(), address)
    }
}

impl std::fmt::Debug for Trie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trie")
            .field("address", &self.address)
            .field("params", &self.root.params)
            .field("backend", &self.storage.backend())
            .finish()
    }
}

struct Frame<'t> {
    node: Cow<'t, HamtNode>,
    next: usize,
}

/// Iterator over a trie's entries.
///
/// Yields an error and stops if a child block cannot be loaded.
pub struct Entries<'t> {
    trie: &'t Trie,
    stack: Vec<Frame<'t>>,
    bucket: std::vec::IntoIter<BucketEntry>,
}

impl Iterator for Entries<'_> {
    type Item = TrieResult<(String, Node)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.bucket.next() {
                return Some(Ok((entry.key, entry.value)));
            }
            let frame = self.stack.last_mut()?;
            let Some(pointer) = frame.node.pointers.get(frame.next).cloned() else {
                self.stack.pop();
                continue;
            };
            frame.next += 1;
            match pointer {
                Pointer::Bucket(entries) => self.bucket = entries.into_iter(),
                Pointer::Link(address) => match self.trie.load_child(&address) {
                    Ok(child) => self.stack.push(Frame {
                        node: Cow::Owned(child),
                        next: 0,
                    }),
                    Err(e) => {
                        self.stack.clear();
                        return Some(Err(e));
                    }
                },
            }
        }
    }
}
